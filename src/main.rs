use std::sync::Arc;

use location_relay::config::Config;
use location_relay::connectivity::Connectivity;
use location_relay::delivery::DeliveryOrchestrator;
use location_relay::error::InitError;
use location_relay::event_loop::EventLoop;
use location_relay::store;
use location_relay::transport::HttpTransport;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Exceptional init failure: log and exit.
fn fatal(error: &InitError) -> ! {
    error!(%error, kind = error.kind(), "failed to start relay");
    std::process::exit(1);
}

fn setup_logging() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let level = std::env::var("LOCATION_RELAY_LOG_LEVEL")
        .ok()
        .and_then(|val| {
            val.parse::<LevelFilter>().ok().or_else(|| {
                eprintln!("invalid LOCATION_RELAY_LOG_LEVEL: {val:?}, defaulting to WARN");
                None
            })
        })
        .unwrap_or(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(level)
        .with(tracing_microjson::JsonLayer::new(std::io::stderr).with_target(true))
        .init();
}

fn setup_rustls() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls ring provider");
}

async fn init(cancel: CancellationToken) -> Result<EventLoop<HttpTransport>, InitError> {
    let config = Config::from_env()?;
    let store = store::open(&config.store)?;
    let transport = HttpTransport::new(&config)?;

    // Assume reachable until the platform or the probe says otherwise.
    let connectivity = Connectivity::new(true);
    let orchestrator = DeliveryOrchestrator::new(
        store,
        Arc::new(connectivity.clone()),
        transport,
    )
    .with_batch_size(config.batch_size);

    let event_loop = EventLoop::new(Arc::new(orchestrator), connectivity, &config, cancel).await?;
    Ok(event_loop)
}

#[tokio::main]
async fn main() {
    setup_logging();
    setup_rustls();

    let cancel = CancellationToken::new();
    let mut event_loop = init(cancel.clone())
        .await
        .unwrap_or_else(|e| fatal(&e));

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, shutting down"),
            Err(e) => error!(error = %e, "failed to listen for interrupt, shutting down"),
        }
        cancel.cancel();
    });

    if let Err(e) = event_loop.run().await {
        error!(%e, "runtime error");
        std::process::exit(1);
    }
}
