//! HTTP push handler.
//!
//! One request ingests one segment: parse identity, bind (or create) the
//! stream's connection, hand the segment to the transcode pipeline, and
//! answer with rendition URIs or payloads.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::broadcast::process_segment;
use crate::media::{ContainerFormat, MediaSegment};
use crate::node::IngestNode;

use super::multipart::MultipartWriter;
use super::path::parse_push_path;
use super::registry::Connection;
use super::watchdog;

/// Segment duration assumed when the `Content-Duration` header is absent
/// or unparseable.
const DEFAULT_SEGMENT_DURATION_MS: u64 = 2000;

fn http_error(status: StatusCode, msg: String) -> Response {
    error!("{msg}");
    (status, msg).into_response()
}

/// Handle one `POST|PUT /live/<manifestID>/<seqNo>.<ext>` push.
pub async fn handle_push(State(node): State<Arc<IngestNode>>, req: Request) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let headers = req.headers().clone();
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");
    let request_url = format!("http://{host}{path}");

    if method != Method::POST && method != Method::PUT {
        return http_error(
            StatusCode::METHOD_NOT_ALLOWED,
            format!("http push request wrong method={method} url={request_url}"),
        );
    }

    // Read unconditionally; the advertised Content-Length is not trusted.
    let body = match to_bytes(req.into_body(), usize::MAX).await {
        Ok(body) => body,
        Err(e) => {
            return http_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error reading http request body: {e}"),
            );
        }
    };

    let parsed = parse_push_path(&path);
    if parsed.format == ContainerFormat::None {
        // ffmpeg pushes its playlist alongside the segments; reject any
        // extension we do not transcode.
        return http_error(
            StatusCode::BAD_REQUEST,
            format!("ignoring file extension: {}", parsed.extension),
        );
    }
    info!(
        url = %request_url,
        bytes = body.len(),
        duration = headers.get("Content-Duration").and_then(|h| h.to_str().ok()).unwrap_or(""),
        resolution = headers.get("Content-Resolution").and_then(|h| h.to_str().ok()).unwrap_or(""),
        "got push request"
    );

    if parsed.manifest_id.is_empty() {
        return http_error(StatusCode::BAD_REQUEST, format!("Bad URL url={request_url}"));
    }

    let (mut mid, existing) = node.registry.lookup(&parsed.manifest_id);
    if let Some(cxn) = &existing {
        cxn.refresh_last_used();
    }

    let cxn = match existing {
        Some(cxn) => cxn,
        None => {
            let resolution = headers
                .get("Content-Resolution")
                .and_then(|h| h.to_str().ok())
                .unwrap_or("");
            let params = match node
                .resolve_stream_params(&request_url, &parsed, resolution)
                .await
            {
                Ok(params) => params,
                Err(e) => {
                    error!(url = %request_url, err = %e, "stream identity resolution failed");
                    return http_error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("Could not create stream ID: url={request_url}"),
                    );
                }
            };
            let (cxn, created) = match node.register_connection(params) {
                Ok(pair) => pair,
                Err(e) => {
                    return http_error(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        format!("http push error url={request_url} err={e}"),
                    );
                }
            };
            if created {
                watchdog::start_inactivity_reaper(
                    node.clone(),
                    cxn.manifest_id().clone(),
                    mid.clone(),
                );
            }
            if cxn.manifest_id() != &mid {
                // The webhook rewrote the identity. Bind the external name,
                // evicting an older binding for the same connection.
                match node.registry.rebind_external(&mid, cxn.manifest_id()) {
                    Ok(_evicted) => {
                        if !created {
                            // The connection predates this binding; its old
                            // reaper exits once it sees its external name
                            // unbound, so the new binding gets its own.
                            watchdog::start_inactivity_reaper(
                                node.clone(),
                                cxn.manifest_id().clone(),
                                mid.clone(),
                            );
                        }
                    }
                    Err(e) => {
                        warn!(manifest_id = %cxn.manifest_id(), err = %e, "external rebind raced removal");
                    }
                }
                mid = cxn.manifest_id().clone();
            }
            cxn
        }
    };

    let duration_ms = match content_duration(&headers) {
        Some(ms) => ms,
        None => {
            info!("missing duration; filling in a default of 2000ms");
            DEFAULT_SEGMENT_DURATION_MS
        }
    };
    let seg = MediaSegment::new(
        body,
        parsed.file_name.clone(),
        parsed.seq_no,
        Duration::from_millis(duration_ms),
    );

    // Kick the watchdog periodically so the session does not time out
    // during long transcodes. The drop guard cancels the kicker on every
    // exit path, including client disconnect.
    let request_ended = CancellationToken::new();
    let _kick_guard = request_ended.clone().drop_guard();
    watchdog::start_liveness_kicker(node.clone(), mid.clone(), request_ended);

    let urls = match process_segment(&cxn, &seg).await {
        Ok(urls) => urls,
        Err(e) => {
            return http_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("http push error processing segment url={request_url} manifestID={mid} err={e}"),
            );
        }
    };
    if urls.is_empty() {
        info!(
            manifest_id = %mid,
            seq_no = seg.seq_no,
            url = %request_url,
            "no sessions available"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "No sessions available").into_response();
    }

    info!(
        url = %request_url,
        manifest_id = %mid,
        seq_no = seg.seq_no,
        took = ?started.elapsed(),
        "finished transcoding push request"
    );

    let accept = headers
        .get(header::ACCEPT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("");
    if accept != "multipart/mixed" {
        return StatusCode::OK.into_response();
    }
    multipart_response(&cxn, &seg, &urls).await
}

/// Emit one part per rendition, in pipeline order: the payload itself when
/// it is resident in the stream's storage session, a URI reference
/// otherwise.
async fn multipart_response(cxn: &Connection, seg: &MediaSegment, urls: &[String]) -> Response {
    let mut writer = MultipartWriter::new();
    let os = cxn.playlist().os_session().clone();
    for (i, url) in urls.iter().enumerate() {
        let Some(profile) = cxn.profiles().get(i) else {
            warn!(
                manifest_id = %cxn.manifest_id(),
                renditions = urls.len(),
                "more renditions than profiles in multipart response"
            );
            break;
        };
        let data = os.read_data(url).await;
        let (mime, ext, part_body): (&str, &str, &[u8]) = match &data {
            Some(payload) => {
                // Unresolved profile formats render as mpegts.
                let format = match profile.format {
                    ContainerFormat::None => ContainerFormat::Mpegts,
                    f => f,
                };
                (
                    format.mime_type().unwrap_or("application/octet-stream"),
                    format.extension().unwrap_or(".ts"),
                    payload,
                )
            }
            None => ("application/vnd+livepeer.uri", ".txt", url.as_bytes()),
        };
        let name = format!("\"{}_{}{}\"", profile.name, seg.seq_no, ext);
        writer.write_part(
            &[
                ("Content-Type", format!("{mime}; name={name}")),
                ("Content-Length", part_body.len().to_string()),
                ("Content-Disposition", format!("attachment; filename={name}")),
                ("Rendition-Name", profile.name.clone()),
            ],
            part_body,
        );
    }
    let content_type = writer.content_type();
    let body = writer.finish();
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        Body::from(body),
    )
        .into_response()
}

fn content_duration(headers: &HeaderMap) -> Option<u64> {
    headers
        .get("Content-Duration")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::http::Request as HttpRequest;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use parking_lot::Mutex;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    use crate::auth::AuthWebhookRequest;
    use crate::broadcast::sessions::{RenditionInfo, TranscodeResult};
    use crate::broadcast::{BroadcastSession, SessionManager, StaticOrchestratorPool};
    use crate::media::preset_lookup;
    use crate::node::{IngestNode, NodeConfig};
    use crate::playlist::PlaylistManager;
    use crate::server::multipart::parse_multipart;
    use crate::server::registry::{Connection, StreamParameters};
    use crate::server::{IngestServer, IngestServerConfig, ManifestId};
    use crate::storage::{MemoryStore, ObjectStore};

    fn memory_node(mut config: NodeConfig) -> Arc<IngestNode> {
        if config.storage.is_none() {
            config.storage = Some(Arc::new(MemoryStore::new(None)));
        }
        Arc::new(IngestNode::new(config))
    }

    fn test_router(node: &Arc<IngestNode>) -> Router {
        IngestServer::new(IngestServerConfig::default(), node.clone()).build_router()
    }

    async fn send(
        router: &Router,
        method: &str,
        uri: &str,
        body: &str,
        headers: &[(&str, &str)],
    ) -> (StatusCode, HeaderMap, Bytes) {
        let mut builder = HttpRequest::builder().method(method).uri(uri);
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body)
    }

    /// Spawn a stub orchestrator: `/segment` answers with one rendition URL
    /// pointing back at the stub, which serves `payload`.
    async fn spawn_orchestrator(payload: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let seg_url = format!("{base}/transcoded/segment.ts");
        let app = Router::new()
            .route(
                "/segment",
                post(move || async move {
                    Json(TranscodeResult {
                        renditions: vec![RenditionInfo {
                            url: seg_url.clone(),
                            pixels: 100,
                        }],
                    })
                }),
            )
            .route("/transcoded/segment.ts", get(move || async move { payload }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        base
    }

    /// Spawn a stub auth webhook answering with a fixed body and counting
    /// calls.
    async fn spawn_webhook(body: &'static str, calls: Arc<AtomicUsize>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/auth",
            post(move || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    body
                }
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/auth")
    }

    fn boundary_of(headers: &HeaderMap) -> String {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .expect("multipart content type");
        assert!(content_type.starts_with("multipart/mixed; boundary="));
        content_type
            .trim_start_matches("multipart/mixed; boundary=")
            .to_string()
    }

    fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> &'a str {
        headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .unwrap_or_default()
    }

    /// Pre-install a connection the way a registered stream would have one,
    /// but with an explicit session list.
    fn install_connection(
        node: &Arc<IngestNode>,
        mid: &str,
        profiles: Vec<crate::media::VideoProfile>,
        sessions: Vec<BroadcastSession>,
        store: &MemoryStore,
    ) -> Arc<Connection> {
        let os = store.new_session("testPath");
        let params = StreamParameters {
            manifest_id: ManifestId::from(mid),
            external_id: ManifestId::from(mid),
            stream_key: "key".to_string(),
            resolution: "0x0".to_string(),
            format: crate::media::ContainerFormat::Mpegts,
            profiles,
            os: Some(os.clone()),
            record_os: None,
        };
        let playlist = PlaylistManager::new(mid, os, None);
        let cxn = Arc::new(Connection::new(
            params,
            playlist,
            SessionManager::with_sessions(sessions),
        ));
        node.registry.insert(cxn.clone());
        cxn
    }

    #[tokio::test]
    async fn test_push_mpegts_default_path_no_accept() {
        let node = memory_node(NodeConfig::default());
        let router = test_router(&node);
        let (status, _, body) = send(&router, "POST", "/live/mani1/1.ts", "", &[]).await;
        // Empty orchestrator pool still registers the stream; the segment
        // itself gets no renditions.
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(&body[..], b"No sessions available");
        let cxn = node
            .registry
            .get_internal(&ManifestId::from("mani1"))
            .expect("stream registered");
        assert_eq!(cxn.source_bytes(), 0);
    }

    #[tokio::test]
    async fn test_push_multipart_return() {
        let orch = spawn_orchestrator("transcoded binary data").await;
        let node = memory_node(NodeConfig::default());
        let router = test_router(&node);

        let store = MemoryStore::new(Some("test://some.host".to_string()));
        let cxn = install_connection(
            &node,
            "mani",
            vec![preset_lookup("P144p25fps16x9").unwrap()],
            vec![BroadcastSession {
                transcoder: orch.clone(),
                broadcaster_os: None,
            }],
            &store,
        );

        // URI reference part: the rendition payload is not resident.
        let (status, headers, body) = send(
            &router,
            "POST",
            "/live/mani/17.ts",
            "InsteadOf.TS",
            &[("Accept", "multipart/mixed")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let boundary = boundary_of(&headers);
        let parts = parse_multipart(&body, &boundary);
        assert_eq!(parts.len(), 1);
        assert_eq!(
            header_value(&parts[0].0, "Content-Type"),
            "application/vnd+livepeer.uri; name=\"P144p25fps16x9_17.txt\""
        );
        assert_eq!(
            header_value(&parts[0].0, "Content-Disposition"),
            "attachment; filename=\"P144p25fps16x9_17.txt\""
        );
        assert_eq!(header_value(&parts[0].0, "Rendition-Name"), "P144p25fps16x9");
        let uri = String::from_utf8(parts[0].1.clone()).unwrap();
        assert!(uri.ends_with("/transcoded/segment.ts"), "body is the URI: {uri}");
        assert_eq!(cxn.source_bytes(), 12);
        assert_eq!(cxn.transcoded_bytes(), 0);

        // With a broadcaster OS the rendition is downloaded and stored.
        cxn.session_manager().cleanup();
        cxn.session_manager().add(BroadcastSession {
            transcoder: orch.clone(),
            broadcaster_os: Some(store.new_session("testPath")),
        });

        // No Accept header: empty body, but the rendition is persisted.
        let (status, _, body) = send(&router, "POST", "/live/mani/15.ts", "InsteadOf.TS", &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert_eq!(cxn.transcoded_bytes(), 22);

        // Binary part.
        let (status, headers, body) = send(
            &router,
            "POST",
            "/live/mani/12.ts",
            "InsteadOf.TS",
            &[("Accept", "multipart/mixed")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let boundary = boundary_of(&headers);
        let parts = parse_multipart(&body, &boundary);
        assert_eq!(parts.len(), 1);
        assert_eq!(
            header_value(&parts[0].0, "Content-Type"),
            "video/mp2t; name=\"P144p25fps16x9_12.ts\""
        );
        assert_eq!(
            header_value(&parts[0].0, "Content-Disposition"),
            "attachment; filename=\"P144p25fps16x9_12.ts\""
        );
        assert_eq!(header_value(&parts[0].0, "Rendition-Name"), "P144p25fps16x9");
        assert_eq!(parts[0].1, b"transcoded binary data");
        assert_eq!(cxn.source_bytes(), 36);
        assert_eq!(cxn.transcoded_bytes(), 44);

        // Exhausted pool: 503.
        cxn.session_manager().cleanup();
        let (status, _, body) = send(
            &router,
            "POST",
            "/live/mani/13.ts",
            "InsteadOf.TS",
            &[("Accept", "multipart/mixed")],
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(&body[..], b"No sessions available");
    }

    #[tokio::test]
    async fn test_push_method_not_allowed() {
        let node = memory_node(NodeConfig::default());
        let router = test_router(&node);
        let (status, _, _) = send(&router, "GET", "/live/mani/1.ts", "", &[]).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        let (status, _, _) = send(&router, "PUT", "/live/mani/1.ts", "", &[]).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_push_empty_url_error() {
        let node = memory_node(NodeConfig::default());
        let router = test_router(&node);
        let (status, _, body) = send(&router, "POST", "/live/.ts", "", &[]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(&body).contains("Bad URL"));
    }

    #[tokio::test]
    async fn test_push_file_extension_error() {
        let node = memory_node(NodeConfig::default());
        let router = test_router(&node);
        let (status, _, body) = send(&router, "POST", "/live/seg.m3u8", "", &[]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(&body).contains("ignoring file extension"));
    }

    #[tokio::test]
    async fn test_push_storage_error() {
        let node = Arc::new(IngestNode::new(NodeConfig {
            storage: None,
            ..Default::default()
        }));
        // Removing before anything registered is an idempotent no-op.
        assert!(matches!(
            node.remove_stream(&ManifestId::from("seg")),
            Err(crate::error::Error::UnknownStream)
        ));
        let router = test_router(&node);
        let (status, _, body) = send(&router, "POST", "/live/seg.ts", "", &[]).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(String::from_utf8_lossy(&body).contains("ErrStorage"));
    }

    #[tokio::test]
    async fn test_push_auth_webhook_failure() {
        let node = memory_node(NodeConfig {
            auth_webhook_url: Some("http://127.0.0.1:1/auth".to_string()),
            ..Default::default()
        });
        let router = test_router(&node);
        let (status, _, body) = send(&router, "POST", "/live/seg.ts", "", &[]).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(String::from_utf8_lossy(&body).contains("Could not create stream ID"));
    }

    #[tokio::test]
    async fn test_push_webhook_request_url() {
        let seen = Arc::new(Mutex::new(None::<String>));
        let seen_in_handler = seen.clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/auth",
            post(move |Json(req): Json<AuthWebhookRequest>| {
                let seen = seen_in_handler.clone();
                async move {
                    *seen.lock() = Some(req.url);
                    ""
                }
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let node = memory_node(NodeConfig {
            auth_webhook_url: Some(format!("http://{addr}/auth")),
            ..Default::default()
        });
        let router = test_router(&node);
        let (status, _, _) = send(
            &router,
            "POST",
            "/live/seg.ts",
            "",
            &[("Host", "example.com")],
        )
        .await;
        // Empty pool: 503, but the webhook saw the full request URL.
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            seen.lock().as_deref(),
            Some("http://example.com/live/seg.ts")
        );
    }

    #[tokio::test]
    async fn test_push_updates_last_used() {
        let node = memory_node(NodeConfig::default());
        let router = test_router(&node);
        send(&router, "POST", "/live/mani1/1.ts", "", &[]).await;
        let first = node
            .registry
            .get_internal(&ManifestId::from("mani1"))
            .unwrap()
            .last_used();
        tokio::time::sleep(Duration::from_millis(5)).await;
        send(&router, "POST", "/live/mani1/1.ts", "", &[]).await;
        let second = node
            .registry
            .get_internal(&ManifestId::from("mani1"))
            .unwrap()
            .last_used();
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_push_resolution_header() {
        let node = memory_node(NodeConfig::default());
        let router = test_router(&node);
        send(&router, "POST", "/live/nores/0.ts", "", &[]).await;
        let cxn = node.registry.get_internal(&ManifestId::from("nores")).unwrap();
        assert_eq!(cxn.source_profile().resolution, "0x0");

        send(
            &router,
            "POST",
            "/live/res/0.ts",
            "",
            &[("Content-Resolution", "123x456")],
        )
        .await;
        let cxn = node.registry.get_internal(&ManifestId::from("res")).unwrap();
        assert_eq!(cxn.source_profile().resolution, "123x456");
    }

    #[tokio::test]
    async fn test_push_should_remove_session_after_timeout() {
        let node = memory_node(NodeConfig {
            push_timeout: Duration::from_millis(100),
            ..Default::default()
        });
        let router = test_router(&node);
        send(&router, "POST", "/live/mani3/1.ts", "", &[]).await;
        assert!(node.registry.get_internal(&ManifestId::from("mani3")).is_some());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(node.registry.get_internal(&ManifestId::from("mani3")).is_none());
    }

    #[tokio::test]
    async fn test_push_should_not_panic_if_session_already_removed() {
        let node = memory_node(NodeConfig {
            push_timeout: Duration::from_millis(100),
            ..Default::default()
        });
        let router = test_router(&node);
        send(&router, "POST", "/live/mani2/1.ts", "", &[]).await;
        assert!(node.registry.get_internal(&ManifestId::from("mani2")).is_some());
        node.remove_stream(&ManifestId::from("mani2")).unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(node.registry.get_internal(&ManifestId::from("mani2")).is_none());
    }

    #[tokio::test]
    async fn test_push_webhook_rebind_and_timeout() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook = spawn_webhook(r#"{"manifestID": "intmid"}"#, calls.clone()).await;
        let node = memory_node(NodeConfig {
            auth_webhook_url: Some(hook),
            push_timeout: Duration::from_millis(100),
            ..Default::default()
        });
        let router = test_router(&node);

        let (status, _, _) = send(&router, "POST", "/live/extmid1/0.ts", "InsteadOf.TS", &[]).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(node.registry.get_internal(&ManifestId::from("intmid")).is_some());
        assert!(node.registry.get_internal(&ManifestId::from("extmid1")).is_none());
        let (internal, _) = node.registry.lookup(&ManifestId::from("extmid1"));
        assert_eq!(internal.as_str(), "intmid");

        tokio::time::sleep(Duration::from_millis(4)).await;

        let (status, _, _) = send(&router, "POST", "/live/extmid2/0.ts", "InsteadOf.TS", &[]).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // New binding installed, old one evicted, connection preserved.
        assert!(node.registry.get_internal(&ManifestId::from("intmid")).is_some());
        let (internal, _) = node.registry.lookup(&ManifestId::from("extmid2"));
        assert_eq!(internal.as_str(), "intmid");
        assert!(!node.registry.external_bound(&ManifestId::from("extmid1")));

        // Both externals and the internal identity are reaped once idle.
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(node.registry.get_internal(&ManifestId::from("intmid")).is_none());
        assert!(!node.registry.external_bound(&ManifestId::from("extmid1")));
        assert!(!node.registry.external_bound(&ManifestId::from("extmid2")));
    }

    #[tokio::test]
    async fn test_push_set_video_profile_formats() {
        let node = memory_node(NodeConfig {
            default_profiles: vec![
                preset_lookup("P720p25fps16x9").unwrap(),
                preset_lookup("P720p60fps16x9").unwrap(),
            ],
            ..Default::default()
        });
        let router = test_router(&node);

        // Base case, mpegts.
        send(&router, "POST", "/live/seg/0.ts", "", &[]).await;
        assert_eq!(node.registry.len(), 1);
        let cxn = node.registry.get_internal(&ManifestId::from("seg")).unwrap();
        assert_eq!(cxn.source_profile().format, ContainerFormat::Mpegts);
        assert_eq!(cxn.profiles().len(), 2);
        for p in cxn.profiles() {
            assert_eq!(p.format, ContainerFormat::Mpegts);
        }
        for p in &node.default_profiles {
            assert_eq!(p.format, ContainerFormat::None);
        }

        // Same stream keeps its assigned profiles.
        send(&router, "POST", "/live/seg/1.ts", "", &[]).await;
        assert_eq!(node.registry.len(), 1);
        let cxn = node.registry.get_internal(&ManifestId::from("seg")).unwrap();
        assert_eq!(cxn.source_profile().format, ContainerFormat::Mpegts);

        // A new MP4 stream resolves to MP4 everywhere; the defaults stay
        // format-less.
        send(&router, "POST", "/live/new/0.mp4", "", &[]).await;
        assert_eq!(node.registry.len(), 2);
        let cxn = node.registry.get_internal(&ManifestId::from("new")).unwrap();
        assert_eq!(cxn.source_profile().format, ContainerFormat::Mp4);
        assert_eq!(cxn.profiles().len(), 2);
        for p in cxn.profiles() {
            assert_eq!(p.format, ContainerFormat::Mp4);
        }
        for p in &node.default_profiles {
            assert_eq!(p.format, ContainerFormat::None);
        }
    }

    #[tokio::test]
    async fn test_push_webhook_copies_default_profiles() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook = spawn_webhook(r#"{"manifestID": "intweb"}"#, calls.clone()).await;
        let node = memory_node(NodeConfig {
            default_profiles: vec![
                preset_lookup("P720p25fps16x9").unwrap(),
                preset_lookup("P720p60fps16x9").unwrap(),
            ],
            auth_webhook_url: Some(hook),
            ..Default::default()
        });
        let router = test_router(&node);

        send(&router, "POST", "/live/web/0.mp4", "", &[]).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(node.registry.get_internal(&ManifestId::from("web")).is_none());
        let cxn = node.registry.get_internal(&ManifestId::from("intweb")).unwrap();
        assert_eq!(cxn.source_profile().format, ContainerFormat::Mp4);
        assert_eq!(cxn.profiles().len(), 2);
        for p in cxn.profiles() {
            assert_eq!(p.format, ContainerFormat::Mp4);
        }
        for p in &node.default_profiles {
            assert_eq!(p.format, ContainerFormat::None);
        }

        // Second segment reuses the binding without another webhook call.
        send(&router, "POST", "/live/web/1.mp4", "", &[]).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_push_concurrent_first_pushes() {
        let node = memory_node(NodeConfig::default());
        let router = test_router(&node);
        let barrier = Arc::new(tokio::sync::Barrier::new(2));

        let mut handles = Vec::new();
        for uri in ["/live/streamID/0.ts", "/live/streamID/1.ts"] {
            let router = router.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                send(&router, "POST", uri, "", &[]).await
            }));
        }
        for handle in handles {
            let (status, _, body) = handle.await.unwrap();
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
            assert_eq!(&body[..], b"No sessions available");
        }
        // Exactly one registration happened.
        assert_eq!(node.registry.len(), 1);
        assert!(node.registry.get_internal(&ManifestId::from("streamID")).is_some());
    }

    #[tokio::test]
    async fn test_push_mp4_end_to_end() {
        let orch = spawn_orchestrator("transcoded binary data").await;
        let store = Arc::new(MemoryStore::new(None));
        let node = memory_node(NodeConfig {
            default_profiles: vec![preset_lookup("P720p25fps16x9").unwrap()],
            storage: Some(store.clone()),
            orchestrators: Some(Arc::new(StaticOrchestratorPool::new(vec![orch]))),
            ..Default::default()
        });
        let router = test_router(&node);

        // Default response is empty, with both source and rendition stored.
        let (status, _, body) = send(
            &router,
            "POST",
            "/live/name/1.mp4",
            "a video file goes here",
            &[],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert_eq!(
            store.get_data("name/source/1.mp4"),
            Some(Bytes::from_static(b"a video file goes here"))
        );
        assert_eq!(
            store.get_data("name/P720p25fps16x9/1.mp4"),
            Some(Bytes::from_static(b"transcoded binary data"))
        );
        // No mpegts twin.
        assert!(store.get_data("name/source/1.ts").is_none());
        assert!(store.get_data("name/P720p25fps16x9/1.ts").is_none());

        // Multipart response for MP4 renditions.
        let (status, headers, body) = send(
            &router,
            "POST",
            "/live/name/2.mp4",
            "a new video goes here",
            &[("Accept", "multipart/mixed")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let boundary = boundary_of(&headers);
        let parts = parse_multipart(&body, &boundary);
        assert_eq!(parts.len(), 1);
        assert_eq!(
            header_value(&parts[0].0, "Content-Type"),
            "video/mp4; name=\"P720p25fps16x9_2.mp4\""
        );
        assert_eq!(
            header_value(&parts[0].0, "Content-Disposition"),
            "attachment; filename=\"P720p25fps16x9_2.mp4\""
        );
        assert_eq!(header_value(&parts[0].0, "Rendition-Name"), "P720p25fps16x9");
        assert_eq!(parts[0].1, b"transcoded binary data");

        let cxn = node.registry.get_internal(&ManifestId::from("name")).unwrap();
        assert_eq!(cxn.source_profile().format, ContainerFormat::Mp4);
        for p in cxn.profiles() {
            assert_eq!(p.format, ContainerFormat::Mp4);
        }
    }

    #[tokio::test]
    async fn test_push_os_per_stream() {
        let calls = Arc::new(AtomicUsize::new(0));
        let hook = spawn_webhook(
            r#"{"manifestID": "OSTEST01", "objectStore": "memory://store1",
                "recordObjectStore": "memory://store2"}"#,
            calls.clone(),
        )
        .await;
        let orch = spawn_orchestrator("transcoded binary data").await;
        let node = memory_node(NodeConfig {
            node_id: "testNode".to_string(),
            default_profiles: vec![preset_lookup("P720p25fps16x9").unwrap()],
            auth_webhook_url: Some(hook),
            orchestrators: Some(Arc::new(StaticOrchestratorPool::new(vec![orch]))),
            ..Default::default()
        });
        let router = test_router(&node);

        let (status, _, _) = send(
            &router,
            "POST",
            "/live/sess1/1.ts",
            "segmentbody",
            &[("Accept", "multipart/mixed")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let store1 = node.mem_stores.get("store1").expect("webhook store created");
        assert_eq!(
            store1.get_data("OSTEST01/source/1.ts"),
            Some(Bytes::from_static(b"segmentbody"))
        );
        assert_eq!(
            store1.get_data("OSTEST01/P720p25fps16x9/1.ts"),
            Some(Bytes::from_static(b"transcoded binary data"))
        );

        // Record saves run off the request path.
        tokio::time::sleep(Duration::from_millis(100)).await;
        let store2 = node.mem_stores.get("store2").expect("record store created");
        assert_eq!(
            store2.get_data("sess1/testNode/source/1.ts"),
            Some(Bytes::from_static(b"segmentbody"))
        );
        assert_eq!(
            store2.get_data("sess1/testNode/P720p25fps16x9/1.ts"),
            Some(Bytes::from_static(b"transcoded binary data"))
        );
    }
}
