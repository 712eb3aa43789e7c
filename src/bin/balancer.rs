//! RelayKV Load Balancer Binary
//!
//! Probes the configured backends and dispatches every inbound request to
//! the least-connected healthy one.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use relaykv::balancer::{BackendPool, Dispatcher, HealthProber};
use relaykv::{shutdown, BalancerConfig};
use tracing_subscriber::{fmt, EnvFilter};

/// RelayKV Load Balancer
#[derive(Parser, Debug)]
#[command(name = "relaykv-balancer")]
#[command(about = "Least-connections HTTP load balancer")]
#[command(version)]
struct Args {
    /// Load balancer port
    #[arg(long, default_value_t = 8090)]
    port: u16,

    /// Request timeout in seconds (applies to probes and forwards)
    #[arg(long, default_value_t = 3)]
    timeout_sec: u64,

    /// Whether backends support HTTPS
    #[arg(long)]
    https: bool,

    /// Include tracing information in responses
    #[arg(long)]
    trace: bool,
}

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,relaykv=debug"));

    fmt().with_env_filter(filter).with_target(true).init();

    let args = Args::parse();

    let config = BalancerConfig::builder()
        .port(args.port)
        .timeout(Duration::from_secs(args.timeout_sec))
        .https(args.https)
        .trace(args.trace)
        .build();

    if let Err(e) = config.validate() {
        tracing::error!("invalid configuration: {}", e);
        std::process::exit(1);
    }

    tracing::info!("RelayKV Balancer v{}", relaykv::VERSION);
    tracing::info!("Backends: {:?}", config.backends);
    tracing::info!("Tracing support enabled: {}", config.trace);

    let pool = Arc::new(BackendPool::new(config.backends.clone()));
    let probers = HealthProber::new(&config).spawn(&pool);

    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&pool), &config));
    let app = dispatcher.router();

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    tracing::info!("load balancer listening on {}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::wait_for_termination())
        .await
    {
        tracing::error!("server error: {}", e);
    }

    for prober in probers {
        prober.abort();
    }

    tracing::info!("load balancer stopped");
}
