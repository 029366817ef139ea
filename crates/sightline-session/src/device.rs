//! Capture-device abstraction consumed by the session controller.

use async_trait::async_trait;
use sightline_core::{DeviceError, Frame};

/// A source of frames. The session task holds exactly one device at a time;
/// [`Session::switch_device`](crate::Session::switch_device) swaps it
/// together with the landmark cache.
#[async_trait]
pub trait CaptureDevice: Send {
    /// Whether the device can currently produce frames. Checked by the
    /// capture gate on every tick.
    fn ready(&self) -> bool;

    /// Acquire one frame. The only suspension point on the capture path.
    async fn acquire_frame(&mut self) -> Result<Frame, DeviceError>;
}

// ── TestPatternDevice ─────────────────────────────────────────────────────────

/// Synthetic device producing a moving gradient. Used by the demo binary and
/// tests in place of real camera hardware.
pub struct TestPatternDevice {
    width:  u32,
    height: u32,
    seq:    u8,
}

impl TestPatternDevice {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, seq: 0 }
    }
}

#[async_trait]
impl CaptureDevice for TestPatternDevice {
    fn ready(&self) -> bool {
        true
    }

    async fn acquire_frame(&mut self) -> Result<Frame, DeviceError> {
        self.seq = self.seq.wrapping_add(1);
        let mut pixels = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                pixels.push((x % 256) as u8);
                pixels.push((y % 256) as u8);
                pixels.push(self.seq);
            }
        }
        Ok(Frame::new(bytes::Bytes::from(pixels), self.width, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pattern_frames_vary_per_acquisition() {
        let mut device = TestPatternDevice::new(4, 2);
        assert!(device.ready());

        let first = device.acquire_frame().await.expect("frame");
        let second = device.acquire_frame().await.expect("frame");

        assert_eq!(first.width, 4);
        assert_eq!(first.height, 2);
        assert_eq!(first.pixels.len(), 4 * 2 * 3);
        assert_ne!(first.pixels, second.pixels);
    }
}
