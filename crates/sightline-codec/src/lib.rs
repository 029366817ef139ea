//! Pure encode/decode for SightLine analysis messages.
//!
//! No I/O and no state: the connection manager owns framing and sockets,
//! this crate only maps between wire JSON and typed values.
//!
//! # Wire shapes
//!
//! ```text
//! client → service   { "image": <base64>, "return_landmarks": bool,
//!                      "image_width": uint, "image_height": uint }
//!
//! service → client   { "error": string?,
//!                      "prediction": string?, "confidence": float?,
//!                      "landmarks": { "face", "face_connections",
//!                                     "hands", "pose" }? }
//! ```
//!
//! Decoding is total: any parse failure yields [`InboundResult::Fault`],
//! never a panic or an error that crosses this boundary. Connection indices
//! in `face_connections` are deliberately not bounds-checked here — only the
//! renderer knows the face point-count it is drawing against.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sightline_core::{Frame, InboundResult, Landmarks, Prediction};

// ── Outbound ──────────────────────────────────────────────────────────────────

/// Wire representation of one frame plus analysis directives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRequest {
    /// Base64 (standard alphabet) container of the frame's pixel bytes.
    pub image: String,
    pub return_landmarks: bool,
    pub image_width:  u32,
    pub image_height: u32,
}

/// Wrap a frame for transmission. Copies dimensions and base64-wraps the
/// pixel buffer; resizing/recompression is a capture-device concern.
pub fn encode(frame: &Frame, want_landmarks: bool) -> OutboundRequest {
    OutboundRequest {
        image: BASE64.encode(&frame.pixels),
        return_landmarks: want_landmarks,
        image_width:  frame.width,
        image_height: frame.height,
    }
}

// ── Inbound ───────────────────────────────────────────────────────────────────

/// Raw inbound shape before validation. Every field optional: the service
/// sends what it has.
#[derive(Debug, Default, Serialize, Deserialize)]
struct WireResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prediction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    landmarks: Option<Landmarks>,
}

/// Decode one inbound message body.
///
/// Total over arbitrary input: malformed JSON, wrong field types, a
/// prediction without a confidence (or vice versa), or a confidence outside
/// `[0, 1]` all map to [`InboundResult::Fault`]. An `error` field
/// short-circuits interpretation of everything else.
pub fn decode(bytes: &[u8]) -> InboundResult {
    let wire: WireResult = match serde_json::from_slice(bytes) {
        Ok(w) => w,
        Err(e) => return InboundResult::fault(format!("unparseable message: {e}")),
    };

    if let Some(message) = wire.error {
        return InboundResult::Fault { message };
    }

    let prediction = match (wire.prediction, wire.confidence) {
        (Some(label), Some(confidence)) => {
            if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
                return InboundResult::fault(format!(
                    "confidence out of range: {confidence}"
                ));
            }
            Some(Prediction { label, confidence })
        }
        (Some(_), None) => return InboundResult::fault("prediction missing confidence"),
        (None, Some(_)) => return InboundResult::fault("confidence without prediction"),
        (None, None) => None,
    };

    InboundResult::Analysis { prediction, landmarks: wire.landmarks }
}
