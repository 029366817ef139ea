//! `CaptureScheduler` — periodic and on-demand capture ticks.
//!
//! Ticks travel over a capacity-1 channel: if the session task is busy when
//! a tick fires, later ticks coalesce instead of queuing. Whether a tick
//! actually captures is decided by [`gate_clear`] at the consumer side —
//! that gate is the backpressure mechanism that keeps the capture rate from
//! outrunning the service.

use std::time::Duration;

use sightline_core::LinkState;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Backpressure gate, checked on every tick. A tick proceeds only when the
/// device can capture, the link is up, and no request is awaiting its
/// result. A blocked tick is a silent no-op, not an error.
pub fn gate_clear(device_ready: bool, link: LinkState, in_flight: bool) -> bool {
    device_ready && link == LinkState::Connected && !in_flight
}

/// Periodic tick source. At most one timer runs at a time; `start` while
/// running is a no-op (stop first to change the interval).
pub struct CaptureScheduler {
    tick_tx: mpsc::Sender<()>,
    timer:   Option<JoinHandle<()>>,
}

impl CaptureScheduler {
    /// Create the scheduler plus the tick channel the session task drains.
    pub fn new() -> (Self, mpsc::Receiver<()>) {
        let (tick_tx, tick_rx) = mpsc::channel(1);
        (Self { tick_tx, timer: None }, tick_rx)
    }

    /// Begin periodic ticks. The first tick fires immediately.
    pub fn start(&mut self, interval: Duration) {
        if self.timer.is_some() {
            debug!("Scheduler already running — start is a no-op");
            return;
        }
        let tick_tx = self.tick_tx.clone();
        self.timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                // Full channel means a tick is already pending; coalesce.
                let _ = tick_tx.try_send(());
            }
        }));
    }

    /// Cancel the timer. Safe to call in any state.
    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// One manual tick (single-shot analyze). Goes through the same gate as
    /// periodic ticks.
    pub fn tick(&self) {
        let _ = self.tick_tx.try_send(());
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }
}

impl Drop for CaptureScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
