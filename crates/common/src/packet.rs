//! Encoded frames handed from the encoder to the capture pipeline.

use crossbeam::channel::Sender;
use tracing::warn;

use crate::types::{EncoderId, Resolution};

/// One compressed frame produced by a successful encode call.
#[derive(Clone, Debug)]
pub struct EncodedFrame {
    /// Encoded dimensions.
    pub resolution: Resolution,
    /// Identifier of the encoder that produced the frame.
    pub encoder_id: EncoderId,
    /// Annex-B bitstream payload (may be empty).
    pub data: Vec<u8>,
    /// Encoder frame counter at submission.
    pub frame_number: u64,
    /// Whether an IDR was forced for this frame.
    pub forced_keyframe: bool,
    /// Capture timestamp translated into the media pipeline clock (microseconds).
    pub timestamp_us: i64,
    /// Wall-clock NTP time (milliseconds).
    pub ntp_time_ms: i64,
}

impl EncodedFrame {
    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Consumer of encoded frames (the outer video track / capture pipeline).
///
/// Delivery is synchronous and ordered by submission.
pub trait CaptureSink: Send {
    fn on_encoded_frame(&mut self, frame: EncodedFrame);
}

impl CaptureSink for Sender<EncodedFrame> {
    fn on_encoded_frame(&mut self, frame: EncodedFrame) {
        let frame_number = frame.frame_number;
        if self.send(frame).is_err() {
            warn!(frame = frame_number, "Capture sink receiver dropped, discarding frame");
        }
    }
}
