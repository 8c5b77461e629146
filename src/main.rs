use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::watch;
use tracing::info;
use tunelink::common::banner::{BannerInfo, print_banner};
use tunelink::common::logger;
use tunelink::common::types::{AnyResult, now_ms};
use tunelink::configs::Config;
use tunelink::relay::{RelayLoop, RelayOptions};
use tunelink::server::AppState;
use tunelink::sinks::{DiscordSink, PresenceSink};
use tunelink::sources::{MailboxSource, SampleMailbox, SampleSource};
use tunelink::transport;

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = Config::load()?;
    logger::init(&config);
    print_banner(&BannerInfo::default());

    let mailbox = Arc::new(SampleMailbox::new());
    let clear_requested = Arc::new(AtomicBool::new(false));
    let sink_healthy = Arc::new(AtomicBool::new(false));

    let source: Arc<dyn SampleSource> = Arc::new(MailboxSource::new(
        mailbox.clone(),
        config.relay.sample_freshness_ms,
    ));
    let sink: Arc<dyn PresenceSink> = Arc::new(DiscordSink::new(config.discord.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let relay = RelayLoop::new(
        source,
        sink,
        RelayOptions::from(&config.relay),
        clear_requested.clone(),
        sink_healthy.clone(),
    );
    let relay_handle = tokio::spawn(relay.run(shutdown_rx));

    let state = Arc::new(AppState {
        mailbox,
        clear_requested,
        sink_healthy,
        started_at_ms: now_ms(),
        config: config.clone(),
    });
    let app = transport::http_server::router(state);

    let address: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    // Failing to bind is the one fatal startup error: without the ingest
    // listener there is nothing to relay.
    let listener = tokio::net::TcpListener::bind(address).await?;
    info!("TuneLink listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop the relay and give it a chance to clear the presence.
    let _ = shutdown_tx.send(true);
    let _ = relay_handle.await;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
