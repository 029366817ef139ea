//! SightLine demo client.
//!
//! Connects to an analysis service, streams synthetic test-pattern frames,
//! and logs predictions plus overlay primitive counts — the same session
//! core a GUI would drive, minus the display surface.
//!
//! ```text
//! SIGHTLINE_ENDPOINT=127.0.0.1:9460 SIGHTLINE_INTERVAL_MS=250 sightline
//! ```

use std::time::Duration;

use anyhow::Result;
use sightline_core::ClientSettings;
use sightline_session::{Session, TestPatternDevice};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn settings_from_env() -> ClientSettings {
    let mut settings = ClientSettings::default();
    if let Ok(endpoint) = std::env::var("SIGHTLINE_ENDPOINT") {
        settings.endpoint = endpoint;
    }
    if let Some(interval) = std::env::var("SIGHTLINE_INTERVAL_MS")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        settings.capture_interval_ms = interval;
    }
    if let Some(delay) = std::env::var("SIGHTLINE_RETRY_MS")
        .ok()
        .and_then(|v| v.parse().ok())
    {
        settings.retry_delay_ms = delay;
    }
    settings
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("SightLine demo client v{}", env!("CARGO_PKG_VERSION"));

    let settings = settings_from_env();
    info!("Analysis service endpoint: {}", settings.endpoint);

    let (mut session, mut status_rx) =
        Session::spawn(settings, Box::new(TestPatternDevice::new(640, 480)));
    let store = session.store();
    session.start_streaming().await;

    // Stand-in for a display redraw loop: report what the overlay would draw.
    let mut redraw = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted — shutting down");
                break;
            }

            maybe_status = status_rx.recv() => {
                let Some(status) = maybe_status else { break };
                info!(
                    "[{}] {} (frames sent: {})",
                    status.phase.label(),
                    status.status_text,
                    status.frames_sent,
                );
            }

            _ = redraw.tick() => {
                if let Some(landmarks) = store.landmarks() {
                    let primitives = sightline_overlay::render(&landmarks, 1280.0, 720.0).count();
                    info!("Overlay: {} primitives for a 1280×720 viewport", primitives);
                }
            }
        }
    }

    session.shutdown().await;
    Ok(())
}
