//! sightline-session — orchestration of capture, transport, and results.
//!
//! ```text
//! UI intents ──► Session (commands) ──► session task ── tokio::select! ──┐
//!                                        │ ticks      CaptureScheduler   │
//!                                        │ events     ConnectionManager  │
//!                                        ▼                               │
//!                                   ResultStore ◄───────────────────────┘
//!                                        │ read-only
//!                                        ▼
//!                               display redraw path (sightline-overlay)
//! ```
//!
//! One task owns all mutable session state (single-writer discipline); the
//! scheduler timer, the transport receive path, and the display redraw path
//! stay concurrent without sharing anything but the mutex-guarded
//! [`ResultStore`].

pub mod controller;
pub mod device;
pub mod scheduler;
pub mod store;

pub use controller::{Session, SessionPhase, SessionStatus};
pub use device::{CaptureDevice, TestPatternDevice};
pub use scheduler::{gate_clear, CaptureScheduler};
pub use store::ResultStore;
