//! `ConnectionManager` — one logical link to the analysis service.
//!
//! A single owning task drives the whole lifecycle, which makes the
//! "exactly one connect attempt in flight" invariant structural: there is
//! nowhere a second dial could come from.
//!
//! ```text
//! Disconnected ──connect()──► Connecting ──dial ok──► Connected
//!      ▲                          │  dial failed           │ link lost
//!      │◄── retry after flat delay┘◄───────────────────────┘
//!      │
//!      └── close() from any state (no retry scheduled)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sightline_codec::OutboundRequest;
use sightline_core::{ClientSettings, InboundResult, SendError};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::framing::{read_frame, write_frame};

// ── Events ────────────────────────────────────────────────────────────────────

/// Delivered to the session layer, one receiver per manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// A dial attempt is starting.
    Connecting,
    /// The link is established; sends will be accepted.
    Connected,
    /// The link is down. `will_retry` is false only after an explicit close.
    Disconnected { reason: String, will_retry: bool },
    /// One decoded inbound message (faults included).
    Message(InboundResult),
}

// ── Commands ──────────────────────────────────────────────────────────────────

enum Command {
    Connect,
    Close,
}

// ── ConnectionManager ─────────────────────────────────────────────────────────

/// Handle to the connection task. Constructed with [`ConnectionManager::spawn`].
pub struct ConnectionManager {
    cmd_tx:    mpsc::Sender<Command>,
    out_tx:    mpsc::Sender<OutboundRequest>,
    connected: Arc<AtomicBool>,
    task:      Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Spawn the connection task. Returns the handle plus the event channel
    /// the session layer drains. No dial happens until [`connect`] is called.
    ///
    /// [`connect`]: ConnectionManager::connect
    pub fn spawn(settings: ClientSettings) -> (Self, mpsc::Receiver<ClientEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(8);
        let (out_tx, out_rx) = mpsc::channel::<OutboundRequest>(4);
        let (event_tx, event_rx) = mpsc::channel::<ClientEvent>(64);
        let connected = Arc::new(AtomicBool::new(false));

        let task = tokio::spawn(run_manager(
            settings,
            cmd_rx,
            out_rx,
            event_tx,
            Arc::clone(&connected),
        ));

        let manager = Self { cmd_tx, out_tx, connected, task: Some(task) };
        (manager, event_rx)
    }

    /// Request a connection. Never fails and never blocks: a failed dial
    /// surfaces as a `Disconnected { will_retry: true }` event followed by a
    /// scheduled retry. A no-op while already connecting or connected.
    pub fn connect(&self) {
        let _ = self.cmd_tx.try_send(Command::Connect);
    }

    /// Enqueue one request for transmission. Never blocks.
    pub fn send(&self, request: OutboundRequest) -> Result<(), SendError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(SendError::NotConnected);
        }
        self.out_tx.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_)   => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }

    /// Whether the link is currently established. A snapshot: the link may
    /// drop between this check and a subsequent [`send`](Self::send), which
    /// is why `send` returns a typed error instead of assuming.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Close the link and stop the task. Safe from any state; does not wait
    /// for in-flight sends. When this returns the task has exited, so no
    /// further events will be delivered (already-queued ones may still be
    /// drained by the receiver).
    pub async fn close(&mut self) {
        let _ = self.cmd_tx.send(Command::Close).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

// ── Connection task ───────────────────────────────────────────────────────────

enum LinkExit {
    /// Explicit close; no retry.
    Closed,
    /// Link-level failure; retry after the flat delay.
    Lost(String),
}

enum Delivery {
    Sent,
    /// Close was seen (or the receiver is gone) while delivering.
    Shutdown,
}

/// Deliver one event without wedging `close()`: if the event channel is full
/// because the receiver stopped draining, a pending `Close` must still
/// preempt the blocked send.
async fn emit(
    event_tx: &mpsc::Sender<ClientEvent>,
    cmd_rx: &mut mpsc::Receiver<Command>,
    event: ClientEvent,
) -> Delivery {
    loop {
        tokio::select! {
            res = event_tx.send(event.clone()) => {
                return if res.is_ok() { Delivery::Sent } else { Delivery::Shutdown };
            }
            cmd = cmd_rx.recv() => match cmd {
                // Connecting or connected either way; keep delivering.
                Some(Command::Connect) => {}
                Some(Command::Close) | None => return Delivery::Shutdown,
            },
        }
    }
}

async fn run_manager(
    settings: ClientSettings,
    mut cmd_rx: mpsc::Receiver<Command>,
    mut out_rx: mpsc::Receiver<OutboundRequest>,
    event_tx: mpsc::Sender<ClientEvent>,
    connected: Arc<AtomicBool>,
) {
    let endpoint = settings.endpoint.clone();
    let mut want_link = false;

    'lifecycle: loop {
        // Disconnected, idle: wait for a connect intent.
        while !want_link {
            match cmd_rx.recv().await {
                Some(Command::Connect) => want_link = true,
                Some(Command::Close) | None => break 'lifecycle,
            }
        }

        // Connecting: one dial attempt, interruptible only by close.
        if let Delivery::Shutdown = emit(&event_tx, &mut cmd_rx, ClientEvent::Connecting).await {
            break 'lifecycle;
        }
        let mut dial = Box::pin(tokio::time::timeout(
            settings.connect_timeout(),
            TcpStream::connect(endpoint.as_str()),
        ));
        let dialed = loop {
            tokio::select! {
                res = &mut dial => break res,
                cmd = cmd_rx.recv() => match cmd {
                    // Already connecting; a second connect is a no-op.
                    Some(Command::Connect) => {}
                    Some(Command::Close) | None => break 'lifecycle,
                },
            }
        };

        let stream = match dialed {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                let reason = format!("connect to {endpoint} failed: {e}");
                warn!("{}", reason);
                let retry = ClientEvent::Disconnected { reason, will_retry: true };
                if let Delivery::Shutdown = emit(&event_tx, &mut cmd_rx, retry).await {
                    break 'lifecycle;
                }
                if !retry_pause(&mut cmd_rx, settings.retry_delay()).await {
                    break 'lifecycle;
                }
                continue 'lifecycle;
            }
            Err(_) => {
                let reason = format!(
                    "connect to {endpoint} timed out after {}ms",
                    settings.connect_timeout_ms
                );
                warn!("{}", reason);
                let retry = ClientEvent::Disconnected { reason, will_retry: true };
                if let Delivery::Shutdown = emit(&event_tx, &mut cmd_rx, retry).await {
                    break 'lifecycle;
                }
                if !retry_pause(&mut cmd_rx, settings.retry_delay()).await {
                    break 'lifecycle;
                }
                continue 'lifecycle;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay: {}", e);
        }

        // Requests queued against a previous link are stale; drop them.
        while out_rx.try_recv().is_ok() {
            debug!("Dropping stale outbound request from previous link");
        }

        info!("Connected to analysis service at {}", endpoint);
        connected.store(true, Ordering::Release);
        if let Delivery::Shutdown = emit(&event_tx, &mut cmd_rx, ClientEvent::Connected).await {
            connected.store(false, Ordering::Release);
            break 'lifecycle;
        }

        let exit = run_link(stream, &mut cmd_rx, &mut out_rx, &event_tx).await;
        connected.store(false, Ordering::Release);

        match exit {
            LinkExit::Closed => {
                info!("Link to {} closed", endpoint);
                // Best-effort: the receiver may already be gone or full.
                let _ = event_tx.try_send(ClientEvent::Disconnected {
                    reason: "closed".to_owned(),
                    will_retry: false,
                });
                break 'lifecycle;
            }
            LinkExit::Lost(reason) => {
                warn!("Link to {} lost: {}", endpoint, reason);
                let retry = ClientEvent::Disconnected { reason, will_retry: true };
                if let Delivery::Shutdown = emit(&event_tx, &mut cmd_rx, retry).await {
                    break 'lifecycle;
                }
                if !retry_pause(&mut cmd_rx, settings.retry_delay()).await {
                    break 'lifecycle;
                }
            }
        }
    }

    connected.store(false, Ordering::Release);
    debug!("Connection task finished");
}

/// Flat-delay retry pause, interruptible by close. Returns false if the
/// manager should shut down instead of retrying.
async fn retry_pause(cmd_rx: &mut mpsc::Receiver<Command>, delay: Duration) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            cmd = cmd_rx.recv() => match cmd {
                // Retry is already scheduled; connect is a no-op.
                Some(Command::Connect) => {}
                Some(Command::Close) | None => return false,
            },
        }
    }
}

/// Established-link loop: pumps outbound requests and inbound messages until
/// close or a link fault. A dedicated reader task owns the read half because
/// `read_exact` is not cancellation-safe inside `select!`.
async fn run_link(
    stream: TcpStream,
    cmd_rx: &mut mpsc::Receiver<Command>,
    out_rx: &mut mpsc::Receiver<OutboundRequest>,
    event_tx: &mpsc::Sender<ClientEvent>,
) -> LinkExit {
    let (read_half, mut write_half) = stream.into_split();
    let (in_tx, mut in_rx) = mpsc::channel::<Vec<u8>>(16);
    let reader = tokio::spawn(read_loop(read_half, in_tx));

    let exit = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(Command::Connect) => {
                    debug!("connect() while connected — no-op");
                }
                Some(Command::Close) | None => break LinkExit::Closed,
            },

            maybe_req = out_rx.recv() => {
                // The handle keeps its sender for the manager's lifetime, so
                // this channel only closes when the whole manager is dropped.
                let Some(request) = maybe_req else { break LinkExit::Closed };
                match serde_json::to_vec(&request) {
                    Ok(body) => {
                        if let Err(e) = write_frame(&mut write_half, &body).await {
                            break LinkExit::Lost(format!("send failed: {e:#}"));
                        }
                        debug!("Sent request ({} bytes)", body.len());
                    }
                    Err(e) => warn!("Failed to serialize request: {}", e),
                }
            }

            maybe_body = in_rx.recv() => match maybe_body {
                Some(body) => {
                    let event = ClientEvent::Message(sightline_codec::decode(&body));
                    if let Delivery::Shutdown = emit(event_tx, cmd_rx, event).await {
                        break LinkExit::Closed;
                    }
                }
                None => break LinkExit::Lost("link closed by service".to_owned()),
            },
        }
    };

    reader.abort();
    exit
}

async fn read_loop(mut reader: OwnedReadHalf, in_tx: mpsc::Sender<Vec<u8>>) {
    loop {
        match read_frame(&mut reader).await {
            Ok(body) => {
                if in_tx.send(body).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!("Read loop ended: {:#}", e);
                return;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
