//! RelayKV DB Server Binary
//!
//! Opens the datastore and serves the HTTP façade.

use std::sync::Arc;

use clap::Parser;
use relaykv::{api, shutdown, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// RelayKV DB Server
#[derive(Parser, Debug)]
#[command(name = "relaykv-db")]
#[command(about = "Log-structured key-value store with an HTTP façade")]
#[command(version)]
struct Args {
    /// Port to serve the façade on
    #[arg(long, default_value_t = 8083)]
    port: u16,

    /// Data directory
    #[arg(long, default_value = "./data")]
    data_dir: String,

    /// Active log size in bytes before rollover (0 disables segmentation)
    #[arg(long, default_value_t = 0)]
    segment_size: u64,
}

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,relaykv=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    tracing::info!("RelayKV DB v{}", relaykv::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);

    let engine = match Engine::open(&args.data_dir, args.segment_size) {
        Ok(engine) => Arc::new(engine),
        Err(e) => {
            tracing::error!("failed to open datastore: {}", e);
            std::process::exit(1);
        }
    };

    let app = api::router(Arc::clone(&engine));
    let addr = format!("0.0.0.0:{}", args.port);

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("DB server listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::wait_for_termination())
        .await
    {
        tracing::error!("server error: {}", e);
    }

    if let Err(e) = engine.close() {
        tracing::error!("failed to close datastore: {}", e);
    }

    tracing::info!("DB server stopped");
}
