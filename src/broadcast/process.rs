//! Segment processing pipeline.
//!
//! One call per pushed segment: persist the source payload, hand the
//! segment to an orchestrator, collect the renditions, and report their
//! URIs in orchestrator order. May block for the full length of an
//! upstream transcode; the caller's liveness kicker keeps the connection
//! alive meanwhile.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::media::MediaSegment;
use crate::server::registry::Connection;

use super::sessions::{BroadcastSession, TranscodeResult};

/// Process one segment end-to-end. Returns the ordered rendition URI list;
/// an empty list means no broadcast session was available.
pub async fn process_segment(cxn: &Connection, seg: &MediaSegment) -> Result<Vec<String>> {
    let source_name = format!("source/{}", seg.name);
    let os = cxn.playlist().os_session().clone();
    os.save_data(&source_name, seg.data.clone()).await?;
    cxn.add_source_bytes(seg.data.len() as u64);
    save_to_record(cxn, &source_name, seg.data.clone());

    let Some(sess) = cxn.session_manager().select() else {
        return Ok(Vec::new());
    };

    let result = match submit_segment(cxn, &sess, seg).await {
        Ok(r) => r,
        Err(e) => {
            // The session failed its segment; leave it out of the pool.
            warn!(
                transcoder = %sess.transcoder,
                manifest_id = %cxn.manifest_id(),
                err = %e,
                "dropping broadcast session after submit failure"
            );
            return Err(e);
        }
    };

    let mut urls = Vec::with_capacity(result.renditions.len());
    for (i, rendition) in result.renditions.iter().enumerate() {
        let Some(profile) = cxn.profiles().get(i) else {
            warn!(
                manifest_id = %cxn.manifest_id(),
                renditions = result.renditions.len(),
                profiles = cxn.profiles().len(),
                "orchestrator returned more renditions than configured profiles"
            );
            break;
        };
        let Some(bos) = &sess.broadcaster_os else {
            urls.push(rendition.url.clone());
            continue;
        };
        match download_rendition(cxn, &rendition.url).await {
            Ok(data) => {
                let ext = profile
                    .format
                    .extension()
                    .unwrap_or_else(|| extension_of(&seg.name));
                let name = format!("{}/{}{}", profile.name, seg.seq_no, ext);
                let uri = bos.save_data(&name, data.clone()).await?;
                cxn.add_transcoded_bytes(data.len() as u64);
                save_to_record(cxn, &name, data);
                urls.push(uri);
            }
            Err(e) => {
                // Leave the rendition as a remote reference.
                warn!(url = %rendition.url, err = %e, "rendition download failed");
                urls.push(rendition.url.clone());
            }
        }
    }

    cxn.session_manager().complete(sess);
    Ok(urls)
}

/// Submit the segment payload to the session's orchestrator.
async fn submit_segment(
    cxn: &Connection,
    sess: &BroadcastSession,
    seg: &MediaSegment,
) -> Result<TranscodeResult> {
    let profile_names: Vec<&str> = cxn.profiles().iter().map(|p| p.name.as_str()).collect();
    let resp = cxn
        .session_manager()
        .client()
        .post(format!("{}/segment", sess.transcoder))
        .header("Segment-Seq", seg.seq_no)
        .header("Segment-Duration", seg.duration.as_millis() as u64)
        .header("Transcode-Profiles", serde_json::to_string(&profile_names)?)
        .body(seg.data.clone())
        .send()
        .await
        .map_err(|e| Error::transcode(e.to_string()))?;
    if resp.status().as_u16() != 200 {
        return Err(Error::transcode(format!(
            "orchestrator status={}",
            resp.status().as_u16()
        )));
    }
    let body = resp
        .bytes()
        .await
        .map_err(|e| Error::transcode(e.to_string()))?;
    serde_json::from_slice(&body).map_err(|e| Error::transcode(format!("bad transcode result: {e}")))
}

async fn download_rendition(cxn: &Connection, url: &str) -> Result<Bytes> {
    let resp = cxn
        .session_manager()
        .client()
        .get(url)
        .send()
        .await
        .map_err(|e| Error::transcode(e.to_string()))?;
    if resp.status().as_u16() != 200 {
        return Err(Error::transcode(format!(
            "rendition status={}",
            resp.status().as_u16()
        )));
    }
    resp.bytes()
        .await
        .map_err(|e| Error::transcode(e.to_string()))
}

/// Mirror an object into the recording session, off the request path.
fn save_to_record(cxn: &Connection, name: &str, data: Bytes) {
    let Some(ros) = cxn.playlist().record_session() else {
        return;
    };
    let ros = ros.clone();
    let name = name.to_string();
    let mid = cxn.manifest_id().clone();
    tokio::spawn(async move {
        debug!(manifest_id = %mid, name = %name, "saving to record store");
        if let Err(e) = ros.save_data(&name, data).await {
            warn!(manifest_id = %mid, name = %name, err = %e, "record store save failed");
        }
    });
}

fn extension_of(name: &str) -> &'static str {
    if name.ends_with(".mp4") {
        ".mp4"
    } else {
        ".ts"
    }
}
