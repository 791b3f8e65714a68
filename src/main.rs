use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use segcast::broadcast::StaticOrchestratorPool;
use segcast::config::load_transcoding_options;
use segcast::error::Result;
use segcast::node::{IngestNode, NodeConfig};
use segcast::server::{IngestServer, IngestServerConfig};
use segcast::storage::{parse_os_url, MemoryStore};

/// Live video broadcaster node: HTTP ingest and transcode dispatch.
#[derive(Debug, Parser)]
#[command(name = "segcast", version)]
struct Args {
    /// HTTP bind address.
    #[arg(long, default_value = "127.0.0.1:8935")]
    http_addr: String,

    /// Serve the HTTP push ingest endpoint.
    #[arg(long, default_value_t = true)]
    http_ingest: bool,

    /// Transcoding options: path to a JSON profile file, or a
    /// comma-separated list of preset names.
    #[arg(long, default_value = "")]
    transcoding_options: String,

    /// Auth webhook URL. Unset disables stream authentication.
    #[arg(long, env = "SEGCAST_AUTH_WEBHOOK_URL")]
    auth_webhook_url: Option<String>,

    /// Inactivity window in seconds before a stream is reaped.
    #[arg(long, default_value_t = 60)]
    push_timeout_secs: u64,

    /// Maximum concurrent streams; 0 means unlimited.
    #[arg(long, default_value_t = 0)]
    max_sessions: usize,

    /// Comma-separated orchestrator base URLs.
    #[arg(long, default_value = "")]
    orchestrators: String,

    /// Recording object store URL (e.g. memory://recordings).
    #[arg(long)]
    record_store: Option<String>,

    /// Increase log verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args).await {
        error!("node error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("segcast={default},tower_http=warn")));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

async fn run(args: Args) -> Result<()> {
    let default_profiles = load_transcoding_options(&args.transcoding_options)?;
    info!(profiles = ?default_profiles.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
          "transcode job profiles");

    let node = Arc::new(IngestNode::new(NodeConfig {
        default_profiles,
        storage: Some(Arc::new(MemoryStore::new(None))),
        record_storage: match &args.record_store {
            Some(url) => Some(parse_os_url(url)?),
            None => None,
        },
        auth_webhook_url: args.auth_webhook_url.clone(),
        orchestrators: if args.orchestrators.is_empty() {
            None
        } else {
            Some(Arc::new(StaticOrchestratorPool::new(
                args.orchestrators.split(',').map(str::to_string),
            )))
        },
        push_timeout: Duration::from_secs(args.push_timeout_secs),
        max_sessions: args.max_sessions,
        ..Default::default()
    }));

    let server = IngestServer::new(
        IngestServerConfig {
            bind_addr: args.http_addr.clone(),
            http_ingest: args.http_ingest,
        },
        node.clone(),
    );

    let cancel = node.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            cancel.cancel();
        }
    });

    server.run().await
}
