//! Capture timestamp alignment.
//!
//! Encoded frames are stamped with the capture clock, which drifts against
//! the media pipeline's monotonic system clock. [`TimestampAligner`] keeps a
//! running estimate of the offset between the two and translates capture
//! times into system time, with two guarantees:
//!
//! - a translated time is never later than the system time it was paired with
//! - consecutive translated times are at least 1 ms apart, unless the system
//!   clock itself advanced by less than that

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

/// Number of frames the offset filter averages over.
pub const WINDOW_SIZE: i64 = 100;

/// Offset error that makes the filter start over (microseconds).
pub const RESET_THRESHOLD_US: i64 = 300_000;

/// Minimum spacing between translated timestamps (microseconds).
pub const MIN_FRAME_INTERVAL_US: i64 = 1_000;

/// Time source for encoded frame timestamps.
pub trait Clock: Send {
    /// Capture clock reading, microseconds.
    fn capture_time_us(&self) -> i64;

    /// Monotonic system clock reading, microseconds.
    fn system_time_us(&self) -> i64;

    /// Time reported as the frame's NTP time, milliseconds.
    fn ntp_time_ms(&self) -> i64 {
        self.system_time_us() / 1_000
    }
}

/// Wall clock for capture times, process-relative `Instant` for system time.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn capture_time_us(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or_default()
    }

    fn system_time_us(&self) -> i64 {
        self.origin.elapsed().as_micros() as i64
    }
}

/// Translates capture timestamps onto the system clock.
#[derive(Debug, Clone)]
pub struct TimestampAligner {
    frames_seen: i64,
    offset_us: i64,
    clip_bias_us: i64,
    prev_translated_time_us: i64,
}

impl Default for TimestampAligner {
    fn default() -> Self {
        Self::new()
    }
}

impl TimestampAligner {
    pub fn new() -> Self {
        Self {
            frames_seen: 0,
            offset_us: 0,
            clip_bias_us: 0,
            prev_translated_time_us: i64::MIN,
        }
    }

    /// Translate `capture_time_us` given the current `system_time_us`.
    pub fn translate(&mut self, capture_time_us: i64, system_time_us: i64) -> i64 {
        let offset = self.update_offset(capture_time_us, system_time_us);
        self.clip(capture_time_us.saturating_add(offset), system_time_us)
    }

    /// Current filtered offset (system minus capture), microseconds.
    pub fn offset_us(&self) -> i64 {
        self.offset_us
    }

    fn update_offset(&mut self, capture_time_us: i64, system_time_us: i64) -> i64 {
        let diff_us = system_time_us - capture_time_us - self.offset_us;

        if diff_us.abs() > RESET_THRESHOLD_US {
            debug!(
                diff_us,
                frames_seen = self.frames_seen,
                "Timestamp offset jumped, resetting filter"
            );
            self.frames_seen = 0;
            self.clip_bias_us = 0;
        }

        if self.frames_seen < WINDOW_SIZE {
            self.frames_seen += 1;
        }
        self.offset_us += diff_us / self.frames_seen;
        self.offset_us
    }

    fn clip(&mut self, filtered_time_us: i64, system_time_us: i64) -> i64 {
        let mut time_us = filtered_time_us - self.clip_bias_us;
        let earliest = self.prev_translated_time_us.saturating_add(MIN_FRAME_INTERVAL_US);

        if time_us > system_time_us {
            self.clip_bias_us += time_us - system_time_us;
            time_us = system_time_us;
        } else if time_us < earliest {
            time_us = earliest;
            if time_us > system_time_us {
                warn!(
                    prev_us = self.prev_translated_time_us,
                    system_time_us, "Translated timestamp interval too short"
                );
                time_us = system_time_us;
            }
        }

        self.prev_translated_time_us = time_us;
        time_us
    }
}
