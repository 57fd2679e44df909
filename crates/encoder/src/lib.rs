//! `rtc-encoder` -- Hardware H.264 encoding for real-time capture.
//!
//! Drives an NVIDIA NVENC session that turns captured GPU frames into an
//! H.264 bitstream for a real-time media pipeline. The NVENC runtime is
//! loaded dynamically at session initialization, so hosts without supported
//! hardware get a [`CodecInitializationResult`] instead of a link failure.
//!
//! # Architecture
//!
//! - [`nvenc`] -- NVENC session controller (NVIDIA GPUs)
//!   - [`nvenc::ffi`] -- Raw FFI bindings and the versioned function table
//!   - [`nvenc::loader`] -- Runtime discovery and version check
//!   - [`nvenc::params`] -- Rate control and initialization parameter builders
//!   - [`nvenc::registrar`] -- Input resource registration, output bitstreams
//!   - [`nvenc::ring`] -- Fixed ring of in-flight frames
//!   - [`nvenc::NvEncoder`] -- Lifecycle, reconfiguration and encode pipeline
//! - [`session`] -- Session state machine and encode statistics
//! - [`timestamp`] -- Capture-to-system clock alignment
//! - [`error`] -- Capability results and encoder errors
//!
//! # Encode Pipeline
//!
//! ```text
//! Captured frame (native texture)
//!   --> copy_buffer: copy into ring slot texture
//!     --> encode_frame: apply pending bitrate / framerate (reconfigure)
//!       --> NV_ENC_PIC_PARAMS (forced IDR after a rate change)
//!         --> NVENC hardware encode
//!           --> Lock bitstream, copy payload
//!             --> EncodedFrame --> CaptureSink
//! ```

pub mod error;
#[cfg(feature = "nvenc")]
pub mod nvenc;
pub mod session;
pub mod timestamp;

pub use error::{CodecInitializationResult, EncoderError, NvencError};
#[cfg(feature = "nvenc")]
pub use nvenc::{NvEncoder, NvEncoderConfig};
pub use session::{EncoderStats, SessionState};
pub use timestamp::{Clock, SystemClock, TimestampAligner};
