//! `rtc-common` -- Shared types, collaborator traits, and errors for the hardware encoder.
//!
//! This crate defines what the encoder core needs from the outside world:
//!
//! - **Types**: `Resolution`, `EncoderId`
//! - **GPU Traits**: `GraphicsDevice`, `GpuTexture`, `NativeFrame` (device collaborator)
//! - **Packets**: `EncodedFrame`, `CaptureSink` (capture pipeline collaborator)
//! - **Config**: `HwSettings` (settings collaborator, serde/JSON)
//! - **Errors**: `GpuError`, `SettingsError` (thiserror-based)

pub mod config;
pub mod error;
pub mod gpu_traits;
pub mod packet;
pub mod types;

// Re-export commonly used items at crate root
pub use config::HwSettings;
pub use error::{GpuError, SettingsError};
pub use gpu_traits::{GpuTexture, GraphicsDevice, NativeFrame};
pub use packet::{CaptureSink, EncodedFrame};
pub use types::{EncoderId, Resolution};
