//! Encoder session lifecycle state and statistics.
//!
//! `SessionState` is the state machine every hardware session walks through:
//!
//! ```text
//! Uninitialized --> Initializing --> Ready <--> Reconfiguring
//!                        |             |
//!                        v             v
//!                      Failed     ShuttingDown --> Destroyed
//! ```
//!
//! A destroyed or failed session may be initialized again.

use std::time::Instant;

use tracing::debug;

/// Lifecycle state of an encoder session.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Reconfiguring,
    ShuttingDown,
    Destroyed,
    Failed,
}

impl SessionState {
    /// Whether `initialize` may be called from this state.
    pub fn can_initialize(self) -> bool {
        matches!(self, Self::Uninitialized | Self::Destroyed | Self::Failed)
    }

    /// Whether the session holds a live, initialized encoder.
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }

    /// Whether `shutdown` has anything to release.
    pub fn has_resources(self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::Ready | Self::Reconfiguring | Self::ShuttingDown
        )
    }
}

// ---------------------------------------------------------------------------
// Encoder statistics
// ---------------------------------------------------------------------------

/// Statistics from an encoder session.
#[derive(Clone, Debug, Default)]
pub struct EncoderStats {
    /// Total frames encoded.
    pub frames_encoded: u64,
    /// Frames encoded with a forced IDR.
    pub keyframes: u64,
    /// Total bytes of encoded output.
    pub bytes_written: u64,
    /// Successful live reconfigurations.
    pub reconfigurations: u64,
    /// Average bitrate (bits/sec) so far.
    pub avg_bitrate_bps: f64,
    /// Time since the first encoded frame, in seconds.
    pub encode_duration_secs: f64,
}

/// Running counters behind [`EncoderStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsTracker {
    frames_encoded: u64,
    keyframes: u64,
    total_bytes: u64,
    reconfigurations: u64,
    start_time: Option<Instant>,
}

impl StatsTracker {
    pub(crate) fn record_frame(&mut self, bytes: usize, keyframe: bool) {
        if self.start_time.is_none() {
            self.start_time = Some(Instant::now());
        }
        self.frames_encoded += 1;
        self.total_bytes += bytes as u64;
        if keyframe {
            self.keyframes += 1;
        }
        debug!(
            frame = self.frames_encoded,
            size = bytes,
            keyframe,
            "Session encoded frame"
        );
    }

    pub(crate) fn record_reconfigure(&mut self) {
        self.reconfigurations += 1;
    }

    pub(crate) fn snapshot(&self) -> EncoderStats {
        let duration = self
            .start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);

        let avg_bitrate = if duration > 0.0 {
            (self.total_bytes as f64 * 8.0) / duration
        } else {
            0.0
        };

        EncoderStats {
            frames_encoded: self.frames_encoded,
            keyframes: self.keyframes,
            bytes_written: self.total_bytes,
            reconfigurations: self.reconfigurations,
            avg_bitrate_bps: avg_bitrate,
            encode_duration_secs: duration,
        }
    }
}
