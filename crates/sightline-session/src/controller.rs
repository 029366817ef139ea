//! `Session` — the orchestration state machine and its owning task.
//!
//! The session task is the sole writer of session state: user intents,
//! scheduler ticks, and transport events all funnel into one
//! `tokio::select!` loop, so every mutation of `in_flight`, `streaming`, the
//! link state, and the result store is serialized by construction. The UI
//! polls the returned status channel with `try_recv`, mirroring how a
//! display layer polls a pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sightline_core::{ClientSettings, InboundResult, LinkState, SendError};
use sightline_transport_client::{ClientEvent, ConnectionManager};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::device::CaptureDevice;
use crate::scheduler::{gate_clear, CaptureScheduler};
use crate::store::ResultStore;

// ── Status ────────────────────────────────────────────────────────────────────

/// Coarse session phase shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    Connected,
    Streaming,
}

impl SessionPhase {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting   => "Connecting…",
            Self::Connected    => "Connected",
            Self::Streaming    => "Streaming",
        }
    }
}

/// Live status update pushed to the UI on every observable change.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub phase:       SessionPhase,
    /// Human-readable line: current state plus the most recent fault, if any.
    pub status_text: String,
    pub streaming:   bool,
    pub in_flight:   bool,
    /// Total frames sent since the session started.
    pub frames_sent: u64,
}

// ── Commands ──────────────────────────────────────────────────────────────────

enum Command {
    StartStreaming,
    StopStreaming,
    ToggleLandmarks,
    SwitchDevice(Box<dyn CaptureDevice>),
    CaptureOnce,
    Shutdown,
}

// ── Session handle ────────────────────────────────────────────────────────────

/// Handle to a running session task. Constructed with [`Session::spawn`].
pub struct Session {
    cmd_tx:      mpsc::Sender<Command>,
    store:       ResultStore,
    frames_sent: Arc<AtomicU64>,
    task:        Option<JoinHandle<()>>,
}

impl Session {
    /// Spawn the session task with its capture device. Returns the handle
    /// and a status channel for the UI to poll. Nothing connects until
    /// [`start_streaming`](Self::start_streaming) or
    /// [`capture_once`](Self::capture_once) is called.
    pub fn spawn(
        settings: ClientSettings,
        device: Box<dyn CaptureDevice>,
    ) -> (Self, mpsc::Receiver<SessionStatus>) {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(16);
        let (status_tx, status_rx) = mpsc::channel::<SessionStatus>(64);
        let store = ResultStore::new();
        let frames_sent = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(run_session(
            settings,
            device,
            cmd_rx,
            status_tx,
            store.clone(),
            Arc::clone(&frames_sent),
        ));

        let session = Self { cmd_tx, store, frames_sent, task: Some(task) };
        (session, status_rx)
    }

    /// Read handle for the display layer.
    pub fn store(&self) -> ResultStore {
        self.store.clone()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    /// Begin continuous streaming. Connects first if needed; the scheduler
    /// is armed only once the link is up.
    pub async fn start_streaming(&self) {
        let _ = self.cmd_tx.send(Command::StartStreaming).await;
    }

    /// Stop streaming and clear the overlay immediately.
    pub async fn stop_streaming(&self) {
        let _ = self.cmd_tx.send(Command::StopStreaming).await;
    }

    /// Flip whether outbound requests ask the service for landmarks.
    pub async fn toggle_landmarks(&self) {
        let _ = self.cmd_tx.send(Command::ToggleLandmarks).await;
    }

    /// Swap the capture device. The landmark cache is cleared in the same
    /// state-machine turn as the swap.
    pub async fn switch_device(&self, device: Box<dyn CaptureDevice>) {
        let _ = self.cmd_tx.send(Command::SwitchDevice(device)).await;
    }

    /// Single-shot analyze: one manual tick through the same capture gate.
    pub async fn capture_once(&self) {
        let _ = self.cmd_tx.send(Command::CaptureOnce).await;
    }

    /// Stop everything and wait for the session task to finish.
    pub async fn shutdown(&mut self) {
        let _ = self.cmd_tx.send(Command::Shutdown).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

// ── Session task ──────────────────────────────────────────────────────────────

async fn run_session(
    settings: ClientSettings,
    device: Box<dyn CaptureDevice>,
    mut cmd_rx: mpsc::Receiver<Command>,
    status_tx: mpsc::Sender<SessionStatus>,
    store: ResultStore,
    frames_sent: Arc<AtomicU64>,
) {
    let (manager, mut events) = ConnectionManager::spawn(settings.clone());
    let (scheduler, mut tick_rx) = CaptureScheduler::new();

    let mut worker = Worker {
        landmarks_enabled: settings.request_landmarks,
        settings,
        device,
        manager,
        scheduler,
        store,
        status_tx,
        frames_sent,
        link: LinkState::Disconnected,
        streaming: false,
        in_flight: false,
        pending_stream: false,
        discard_in_flight: false,
        status_text: String::new(),
    };
    worker.push_status("Idle");

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                Some(cmd) => {
                    if !worker.handle_command(cmd).await {
                        break;
                    }
                }
                None => break,
            },

            maybe_tick = tick_rx.recv() => {
                if maybe_tick.is_some() {
                    worker.handle_tick().await;
                }
            }

            event = events.recv() => match event {
                Some(event) => worker.handle_event(event),
                None => {
                    debug!("Connection manager ended; stopping session");
                    break;
                }
            },
        }
    }

    worker.scheduler.stop();
    worker.store.clear();
    worker.streaming = false;
    worker.in_flight = false;
    worker.link = LinkState::Closing;
    worker.push_status("Stopped");
    worker.manager.close().await;
    info!("Session task finished");
}

/// All mutable session state, owned by the session task alone.
struct Worker {
    settings:  ClientSettings,
    device:    Box<dyn CaptureDevice>,
    manager:   ConnectionManager,
    scheduler: CaptureScheduler,
    store:     ResultStore,
    status_tx: mpsc::Sender<SessionStatus>,
    frames_sent: Arc<AtomicU64>,

    link:              LinkState,
    streaming:         bool,
    in_flight:         bool,
    landmarks_enabled: bool,
    /// Start was requested before the link came up; arm on Connected.
    pending_stream:    bool,
    /// The in-flight result belongs to a swapped-out device; drop it.
    discard_in_flight: bool,
    status_text:       String,
}

impl Worker {
    /// Returns false when the session should shut down.
    async fn handle_command(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::StartStreaming => {
                if self.streaming {
                    return true;
                }
                if self.link == LinkState::Connected {
                    self.arm_streaming();
                } else {
                    self.pending_stream = true;
                    self.manager.connect();
                    self.push_status("Connecting to analysis service…");
                }
            }
            Command::StopStreaming => {
                self.scheduler.stop();
                self.streaming = false;
                self.pending_stream = false;
                // Stale overlays must not outlive streaming.
                self.store.clear();
                self.push_status("Streaming stopped");
            }
            Command::ToggleLandmarks => {
                self.landmarks_enabled = !self.landmarks_enabled;
                self.push_status(if self.landmarks_enabled {
                    "Landmarks enabled"
                } else {
                    "Landmarks disabled"
                });
            }
            Command::SwitchDevice(device) => {
                // Swap and cache-clear happen in this same turn, so a frame
                // from one device never renders against landmarks computed
                // for the other.
                self.device = device;
                self.store.clear();
                self.discard_in_flight = self.in_flight;
                self.push_status("Capture device switched");
            }
            Command::CaptureOnce => {
                if self.link == LinkState::Disconnected {
                    self.manager.connect();
                }
                self.handle_tick().await;
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn arm_streaming(&mut self) {
        self.scheduler.start(self.settings.capture_interval());
        self.streaming = true;
        self.pending_stream = false;
        self.push_status("Streaming");
    }

    async fn handle_tick(&mut self) {
        if !gate_clear(self.device.ready(), self.link, self.in_flight) {
            debug!(
                "Tick gated (link={:?}, in_flight={})",
                self.link, self.in_flight
            );
            return;
        }

        match self.device.acquire_frame().await {
            Ok(frame) => {
                let request = sightline_codec::encode(&frame, self.landmarks_enabled);
                match self.manager.send(request) {
                    Ok(()) => {
                        self.in_flight = true;
                        self.frames_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(SendError::NotConnected) => {
                        // Expected race with a link drop; the tick is a no-op.
                        debug!("Send raced a disconnect — frame dropped");
                    }
                    Err(e) => warn!("Send failed: {}", e),
                }
            }
            Err(e) => {
                // A dead device is never retried silently.
                warn!("Capture device fault: {}", e);
                self.scheduler.stop();
                self.streaming = false;
                self.pending_stream = false;
                self.push_status(format!("Capture device fault: {e}"));
            }
        }
    }

    fn handle_event(&mut self, event: ClientEvent) {
        match event {
            ClientEvent::Connecting => {
                self.link = LinkState::Connecting;
                self.push_status("Connecting…");
            }
            ClientEvent::Connected => {
                self.link = LinkState::Connected;
                if self.pending_stream {
                    self.arm_streaming();
                } else {
                    self.push_status("Connected");
                }
            }
            ClientEvent::Disconnected { reason, will_retry } => {
                self.link = LinkState::Disconnected;
                self.in_flight = false;
                self.discard_in_flight = false;
                // Overlays never outlive the link.
                self.store.clear();
                if will_retry {
                    self.push_status(format!("Disconnected — retrying: {reason}"));
                } else {
                    self.push_status("Disconnected");
                }
            }
            ClientEvent::Message(result) => {
                self.in_flight = false;
                if self.discard_in_flight {
                    self.discard_in_flight = false;
                    debug!("Dropping result for a frame from the swapped-out device");
                    return;
                }
                // Faults are results too: a reader polling the store sees
                // the last word from the service, whatever it was.
                self.store.set(result.clone());
                match &result {
                    InboundResult::Fault { message } => {
                        warn!("Service fault: {}", message);
                        self.push_status(format!("Service fault: {message}"));
                    }
                    InboundResult::Analysis { prediction, .. } => {
                        if let Some(p) = prediction {
                            self.push_status(format!(
                                "{} ({:.0}%)",
                                p.label,
                                p.confidence * 100.0
                            ));
                        }
                    }
                }
            }
        }
    }

    fn phase(&self) -> SessionPhase {
        if self.streaming && self.link == LinkState::Connected {
            return SessionPhase::Streaming;
        }
        match self.link {
            LinkState::Connected => SessionPhase::Connected,
            LinkState::Connecting => SessionPhase::Connecting,
            LinkState::Disconnected | LinkState::Closing => SessionPhase::Disconnected,
        }
    }

    fn push_status(&mut self, text: impl Into<String>) {
        self.status_text = text.into();
        let _ = self.status_tx.try_send(SessionStatus {
            phase:       self.phase(),
            status_text: self.status_text.clone(),
            streaming:   self.streaming,
            in_flight:   self.in_flight,
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
        });
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TestPatternDevice;
    use async_trait::async_trait;
    use sightline_core::{DeviceError, Frame};
    use sightline_transport_client::{read_frame, write_frame};
    use tokio::net::TcpListener;
    use tokio::time::{sleep, timeout, Duration};

    const LANDMARKS_REPLY: &[u8] = br#"{"landmarks":{
        "face":[{"x":0.5,"y":0.5},{"x":0.6,"y":0.6}],
        "face_connections":[[0,1]],
        "hands":[],
        "pose":[]
    }}"#;

    /// In-process analysis service: forwards each received request body to
    /// the test and replies with the next body fed through `release_tx`.
    async fn spawn_service() -> (String, mpsc::Receiver<Vec<u8>>, mpsc::Sender<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let endpoint = listener.local_addr().expect("addr").to_string();
        let (req_tx, req_rx) = mpsc::channel::<Vec<u8>>(32);
        let (release_tx, mut release_rx) = mpsc::channel::<Vec<u8>>(32);

        tokio::spawn(async move {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            loop {
                let Ok(body) = read_frame(&mut socket).await else { return };
                if req_tx.send(body).await.is_err() {
                    return;
                }
                let Some(reply) = release_rx.recv().await else { return };
                if write_frame(&mut socket, &reply).await.is_err() {
                    return;
                }
            }
        });

        (endpoint, req_rx, release_tx)
    }

    fn test_settings(endpoint: String) -> ClientSettings {
        ClientSettings {
            endpoint,
            retry_delay_ms: 50,
            connect_timeout_ms: 1_000,
            capture_interval_ms: 20,
            request_landmarks: true,
        }
    }

    async fn next_request(rx: &mut mpsc::Receiver<Vec<u8>>) -> Vec<u8> {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("request within deadline")
            .expect("service alive")
    }

    async fn wait_for_landmarks(store: &ResultStore) {
        timeout(Duration::from_secs(2), async {
            while store.landmarks().is_none() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("landmarks within deadline");
    }

    /// Scenario B: while a request is in flight, further ticks send nothing;
    /// the next send happens only after the result resolves the gate.
    #[tokio::test]
    async fn in_flight_gate_blocks_further_sends() {
        let (endpoint, mut requests, release) = spawn_service().await;
        let (mut session, _status) =
            Session::spawn(test_settings(endpoint), Box::new(TestPatternDevice::new(4, 4)));

        session.start_streaming().await;
        let _first = next_request(&mut requests).await;
        assert_eq!(session.frames_sent(), 1);

        // Many tick intervals pass with the result still outstanding; both
        // the timer and manual ticks must stay gated.
        session.capture_once().await;
        session.capture_once().await;
        sleep(Duration::from_millis(200)).await;
        assert!(requests.try_recv().is_err(), "send while in flight");
        assert_eq!(session.frames_sent(), 1);

        release.send(LANDMARKS_REPLY.to_vec()).await.expect("release");
        let _second = next_request(&mut requests).await;
        assert_eq!(session.frames_sent(), 2);

        session.shutdown().await;
    }

    /// Scenario D: switching devices clears the landmark cache in the same
    /// turn, and the in-flight result from the old device is discarded.
    #[tokio::test]
    async fn switch_device_clears_landmarks_with_the_swap() {
        let (endpoint, mut requests, release) = spawn_service().await;
        let (mut session, _status) =
            Session::spawn(test_settings(endpoint), Box::new(TestPatternDevice::new(4, 4)));
        let store = session.store();

        session.start_streaming().await;
        let _ = next_request(&mut requests).await;
        release.send(LANDMARKS_REPLY.to_vec()).await.expect("release");
        wait_for_landmarks(&store).await;

        // Second request goes in flight, then the device is swapped.
        let _ = next_request(&mut requests).await;
        session.switch_device(Box::new(TestPatternDevice::new(8, 8))).await;

        timeout(Duration::from_secs(2), async {
            while store.landmarks().is_some() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("cache cleared after swap");

        // The old device's result arrives late and must not repopulate the
        // store; only the next (new-device) result may.
        release.send(LANDMARKS_REPLY.to_vec()).await.expect("late release");
        sleep(Duration::from_millis(100)).await;
        let next = next_request(&mut requests).await;
        assert!(store.landmarks().is_none());

        // New-device request carries the new dimensions.
        let parsed: serde_json::Value = serde_json::from_slice(&next).expect("request json");
        assert_eq!(parsed["image_width"], 8);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn stop_streaming_clears_the_overlay_immediately() {
        let (endpoint, mut requests, release) = spawn_service().await;
        let (mut session, _status) =
            Session::spawn(test_settings(endpoint), Box::new(TestPatternDevice::new(4, 4)));
        let store = session.store();

        session.start_streaming().await;
        let _ = next_request(&mut requests).await;
        release.send(LANDMARKS_REPLY.to_vec()).await.expect("release");
        wait_for_landmarks(&store).await;

        session.stop_streaming().await;
        timeout(Duration::from_secs(2), async {
            while store.latest().is_some() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("overlay cleared on stop");

        session.shutdown().await;
    }

    #[tokio::test]
    async fn toggle_landmarks_changes_the_outbound_directive() {
        let (endpoint, mut requests, release) = spawn_service().await;
        let (mut session, _status) =
            Session::spawn(test_settings(endpoint), Box::new(TestPatternDevice::new(4, 4)));

        session.start_streaming().await;
        let first = next_request(&mut requests).await;
        let parsed: serde_json::Value = serde_json::from_slice(&first).expect("json");
        assert_eq!(parsed["return_landmarks"], true);

        session.toggle_landmarks().await;
        release.send(b"{}".to_vec()).await.expect("release");

        let second = next_request(&mut requests).await;
        let parsed: serde_json::Value = serde_json::from_slice(&second).expect("json");
        assert_eq!(parsed["return_landmarks"], false);

        session.shutdown().await;
    }

    struct DeadDevice;

    #[async_trait]
    impl CaptureDevice for DeadDevice {
        fn ready(&self) -> bool {
            true
        }

        async fn acquire_frame(&mut self) -> Result<Frame, DeviceError> {
            Err(DeviceError::Unavailable { reason: "unplugged".into() })
        }
    }

    #[tokio::test]
    async fn device_fault_stops_streaming_and_reports() {
        let (endpoint, mut requests, _release) = spawn_service().await;
        let (mut session, mut status) =
            Session::spawn(test_settings(endpoint), Box::new(DeadDevice));

        session.start_streaming().await;

        let fault = timeout(Duration::from_secs(2), async {
            loop {
                let update = status.recv().await.expect("status channel open");
                if update.status_text.contains("Capture device fault") {
                    break update;
                }
            }
        })
        .await
        .expect("device fault surfaced");
        assert!(!fault.streaming);

        // Streaming stopped: no request ever reaches the service.
        sleep(Duration::from_millis(100)).await;
        assert!(requests.try_recv().is_err());
        assert_eq!(session.frames_sent(), 0);

        session.shutdown().await;
    }

    #[tokio::test]
    async fn service_fault_surfaces_as_status_and_releases_the_gate() {
        let (endpoint, mut requests, release) = spawn_service().await;
        let (mut session, mut status) =
            Session::spawn(test_settings(endpoint), Box::new(TestPatternDevice::new(4, 4)));

        session.start_streaming().await;
        let _ = next_request(&mut requests).await;
        release
            .send(br#"{"error":"model overloaded"}"#.to_vec())
            .await
            .expect("release");

        timeout(Duration::from_secs(2), async {
            loop {
                let update = status.recv().await.expect("status channel open");
                if update.status_text.contains("model overloaded") {
                    break;
                }
            }
        })
        .await
        .expect("fault surfaced as status");

        // The fault is the latest result, not just a status line.
        let latest = session.store().latest().expect("stored result");
        assert!(latest.is_fault());

        // The fault resolved in_flight; streaming continues.
        let _ = next_request(&mut requests).await;

        session.shutdown().await;
    }
}
