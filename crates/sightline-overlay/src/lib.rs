//! sightline-overlay — normalized landmarks → pixel-space draw primitives.
//!
//! Pure and non-suspending: the display layer calls [`render`] on its own
//! redraw cadence with the current viewport size, and paints whatever comes
//! out. Landmarks arrive normalized to `[0, 1]`; every primitive here is
//! already scaled (`x_px = x_norm * viewport_width`).
//!
//! Connection topologies may be sent for a different face point-count than
//! the face array in the same message (the service can reconfigure
//! mid-stream), so a segment referencing an out-of-range index is skipped,
//! never an error, and never aborts the rest of the sequence.

use sightline_core::Landmarks;

// ── Primitives ────────────────────────────────────────────────────────────────

/// Renderer output in viewport pixel space, ready for a display surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrawPrimitive {
    Point { x: f32, y: f32, radius: f32, class: ColorClass },
    Segment { x1: f32, y1: f32, x2: f32, y2: f32 },
}

/// Semantic region of a landmark point. The display surface maps each class
/// to a colour/weight; [`ColorClass::rgb`] carries the stock palette.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColorClass {
    // Face (68-point layout)
    FaceOutline,
    Brow,
    Nose,
    Eye,
    Lip,
    // Hands (21-point layout)
    Fingertip,
    Knuckle,
    // Pose
    Torso,
    Limb,
}

impl ColorClass {
    /// Stock palette. Data, not behavior — a display surface may substitute
    /// its own mapping.
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            Self::FaceOutline => (200, 200, 200),
            Self::Brow        => (230, 185, 50),
            Self::Nose        => (50, 180, 230),
            Self::Eye         => (60, 200, 80),
            Self::Lip         => (220, 60, 60),
            Self::Fingertip   => (255, 120, 40),
            Self::Knuckle     => (160, 160, 160),
            Self::Torso       => (120, 80, 220),
            Self::Limb        => (80, 160, 220),
        }
    }
}

// ── Class tables ──────────────────────────────────────────────────────────────
// Fixed index-range lookups; every valid index maps to exactly one class.

/// Face class by index in the 68-point layout. Indices past the known layout
/// (a larger mesh mid-reconfiguration) fall back to the outline class.
pub fn face_class(index: usize) -> ColorClass {
    match index {
        0..=16  => ColorClass::FaceOutline, // jaw
        17..=26 => ColorClass::Brow,
        27..=35 => ColorClass::Nose,
        36..=47 => ColorClass::Eye,
        48..=67 => ColorClass::Lip,
        _       => ColorClass::FaceOutline,
    }
}

/// Hand class by index within one 21-point hand.
pub fn hand_class(index: usize) -> ColorClass {
    match index {
        4 | 8 | 12 | 16 | 20 => ColorClass::Fingertip,
        _ => ColorClass::Knuckle,
    }
}

/// Pose class: shoulder/hip anchors are torso, everything else limb.
pub fn pose_class(index: usize) -> ColorClass {
    match index {
        11 | 12 | 23 | 24 => ColorClass::Torso,
        _ => ColorClass::Limb,
    }
}

fn radius_for(class: ColorClass) -> f32 {
    match class {
        ColorClass::Fingertip => 4.0,
        ColorClass::Torso     => 5.0,
        ColorClass::Knuckle | ColorClass::Limb => 3.0,
        _ => 2.0,
    }
}

// ── Renderer ──────────────────────────────────────────────────────────────────

/// Produce draw primitives for one landmark set, scaled to the viewport.
///
/// Lazy, finite, non-restartable. Order: face points, face connection
/// segments, hand points, pose points. Connection entries whose indices are
/// out of range for the current `face` array yield nothing.
pub fn render(
    landmarks: &Landmarks,
    viewport_width: f32,
    viewport_height: f32,
) -> impl Iterator<Item = DrawPrimitive> + '_ {
    let (vw, vh) = (viewport_width, viewport_height);
    let face_len = landmarks.face.len();

    let face_points = landmarks.face.iter().enumerate().map(move |(i, p)| {
        let class = face_class(i);
        DrawPrimitive::Point { x: p.x * vw, y: p.y * vh, radius: radius_for(class), class }
    });

    let face_segments = landmarks.face_connections.iter().filter_map(move |&(a, b)| {
        let (a, b) = (a as usize, b as usize);
        if a >= face_len || b >= face_len {
            return None;
        }
        let (pa, pb) = (landmarks.face[a], landmarks.face[b]);
        Some(DrawPrimitive::Segment {
            x1: pa.x * vw,
            y1: pa.y * vh,
            x2: pb.x * vw,
            y2: pb.y * vh,
        })
    });

    let hand_points = landmarks.hands.iter().flat_map(move |hand| {
        hand.iter().enumerate().map(move |(i, p)| {
            let class = hand_class(i);
            DrawPrimitive::Point { x: p.x * vw, y: p.y * vh, radius: radius_for(class), class }
        })
    });

    let pose_points = landmarks.pose.iter().enumerate().map(move |(i, p)| {
        let class = pose_class(i);
        DrawPrimitive::Point { x: p.x * vw, y: p.y * vh, radius: radius_for(class), class }
    });

    face_points.chain(face_segments).chain(hand_points).chain(pose_points)
}
