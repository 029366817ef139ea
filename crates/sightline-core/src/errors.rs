use thiserror::Error;

/// Failure to hand a request to the connection manager.
///
/// `NotConnected` is an expected race between scheduler ticks and link state
/// changes, so it is a value, never a panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("Not connected to the analysis service")]
    NotConnected,

    #[error("Connection manager is shut down")]
    Closed,

    #[error("Outbound queue full")]
    QueueFull,
}

/// Capture-device failure surfaced to the session controller.
///
/// A device fault stops streaming; it is never retried silently.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Capture device not ready")]
    NotReady,

    #[error("Capture device unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Frame acquisition failed: {reason}")]
    AcquireFailed { reason: String },
}
