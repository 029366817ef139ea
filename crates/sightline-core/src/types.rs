use std::time::Instant;

use serde::{Deserialize, Serialize};

// ── Frame ─────────────────────────────────────────────────────────────────────

/// One captured image, handed from the capture device to the codec.
///
/// Frames are not retained: each is created on a scheduler tick, encoded
/// into an [`OutboundRequest`] and dropped.
pub struct Frame {
    /// Raw pixel bytes in whatever packed format the device produces.
    pub pixels: bytes::Bytes,
    pub width:  u32,
    pub height: u32,
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(pixels: bytes::Bytes, width: u32, height: u32) -> Self {
        Self { pixels, width, height, captured_at: Instant::now() }
    }
}

// ── Point ─────────────────────────────────────────────────────────────────────

/// A landmark coordinate normalized to `[0, 1]` relative to the frame the
/// service analyzed. Resolution-independent until the renderer scales it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

// ── Landmarks ─────────────────────────────────────────────────────────────────

/// Geometric features detected in one frame, all in normalized coordinates.
///
/// `face_connections` entries index into `face`; indices are carried as the
/// service sent them and are only bounds-checked at render time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmarks {
    #[serde(default)]
    pub face: Vec<Point>,
    #[serde(default)]
    pub face_connections: Vec<(u32, u32)>,
    /// One 21-point set per detected hand.
    #[serde(default)]
    pub hands: Vec<Vec<Point>>,
    #[serde(default)]
    pub pose: Vec<Point>,
}

impl Landmarks {
    pub fn is_empty(&self) -> bool {
        self.face.is_empty() && self.hands.is_empty() && self.pose.is_empty()
    }
}

// ── Prediction ────────────────────────────────────────────────────────────────

/// Classification result for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: String,
    /// Confidence in `[0, 1]`; enforced at the codec boundary.
    pub confidence: f64,
}

// ── InboundResult ─────────────────────────────────────────────────────────────

/// One decoded service message.
///
/// A fault is mutually exclusive with analysis content; an analysis message
/// may carry a prediction, landmarks, or both. A field the service omitted
/// means "not provided this message", never an error.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundResult {
    /// Service-reported or protocol-level failure.
    Fault { message: String },
    Analysis {
        prediction: Option<Prediction>,
        landmarks:  Option<Landmarks>,
    },
}

impl InboundResult {
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault { message: message.into() }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault { .. })
    }

    /// Landmarks carried by this message, if any.
    pub fn landmarks(&self) -> Option<&Landmarks> {
        match self {
            Self::Analysis { landmarks, .. } => landmarks.as_ref(),
            Self::Fault { .. } => None,
        }
    }

    /// Prediction carried by this message, if any.
    pub fn prediction(&self) -> Option<&Prediction> {
        match self {
            Self::Analysis { prediction, .. } => prediction.as_ref(),
            Self::Fault { .. } => None,
        }
    }
}

// ── LinkState ─────────────────────────────────────────────────────────────────

/// State of the logical connection to the analysis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl LinkState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting   => "Connecting…",
            Self::Connected    => "Connected",
            Self::Closing      => "Closing",
        }
    }
}
