use anyhow::Result;
use lib_eventstream::ingestors::PollerSettings;
use lib_eventstream::{ConfiguredFeed, EventsPoller, PollerNotice};
use servers::events_logic::{config, downstream, logger, state};
use tokio::signal;
use tokio::sync::broadcast;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let settings = config::load_config()?;
    logger::setup_logging(&settings.log_dir, &settings.log_level)?;

    let feed = ConfiguredFeed::from_config(&settings.engine)?;
    if !feed.is_live() {
        log::warn!("No Newscatcher API key provided. Using sample data instead of real events.");
    }

    let poller = EventsPoller::new(feed, PollerSettings::from(&settings.engine));
    let app_state = state::AppState::new(poller.clone(), settings.environment.clone());

    let (shutdown_tx, _) = broadcast::channel(1);

    let notice_handle = tokio::spawn(watch_notices(poller.subscribe_notices(), shutdown_tx.subscribe()));

    log::info!(
        "Server running in {} mode on http://localhost:{}",
        settings.environment,
        settings.port
    );
    let downstream_handle = tokio::spawn(downstream::run(
        settings.port,
        app_state,
        shutdown_tx.subscribe(),
    ));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = terminate() => {
            log::info!("SIGTERM received, initiating shutdown.");
        }
    }

    // Close every SSE stream so the graceful shutdown can complete
    poller.shutdown();
    let _ = shutdown_tx.send(());

    match downstream_handle.await {
        Ok(Err(e)) => log::error!("Downstream server error: {}", e),
        Err(e) => log::error!("Downstream task failed: {}", e),
        Ok(Ok(())) => {}
    }
    let _ = notice_handle.await;

    log::info!("Shutdown complete.");
    Ok(())
}

#[cfg(unix)]
async fn terminate() {
    match signal::unix::signal(signal::unix::SignalKind::terminate()) {
        Ok(mut term_signal) => {
            term_signal.recv().await;
        }
        Err(e) => {
            log::warn!("Cannot listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    // On non-unix platforms, just wait forever.
    std::future::pending::<()>().await;
}

/// Logs the poller's error notices until shutdown.
async fn watch_notices(
    mut notices: broadcast::Receiver<PollerNotice>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            notice = notices.recv() => match notice {
                Ok(PollerNotice::Error { consecutive_errors, message }) => {
                    log::error!("Poller stopped after {} errors: {}", consecutive_errors, message);
                }
                Ok(PollerNotice::Event(event)) => {
                    log::debug!("Announced event {} ({})", event.id, event.event_type());
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::debug!("Notice watcher lagged, {} notices skipped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
