//! sightline-transport-client — the client side of the analysis link.
//!
//! Owns one logical connection to the remote analysis service:
//!
//! ```text
//! SightLine client                        Analysis service
//! ────────────────────────────            ─────────────────────────
//! ConnectionManager ── TCP ─────────────► framed JSON listener
//!    │  4-byte BE length prefix + JSON body, both directions
//!    └─ events: Connecting / Connected / Disconnected / Message
//! ```
//!
//! Connectivity failure is the expected steady state on an unreliable link,
//! so `connect` never raises: a failed dial lands in a scheduled retry at a
//! flat delay and surfaces only as a `Disconnected { will_retry: true }`
//! event. Inbound bodies are decoded by `sightline-codec` before delivery,
//! so a malformed payload arrives as a `Fault` message and never tears the
//! connection down.

pub mod client;
pub mod framing;

pub use client::{ClientEvent, ConnectionManager};
pub use framing::{read_frame, write_frame, MAX_FRAME_BYTES};
