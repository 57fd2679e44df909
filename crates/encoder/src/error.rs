//! Encoder-specific error types.
//!
//! [`CodecInitializationResult`] is the outcome of probing the vendor runtime
//! and is cached per session. [`NvencError`] carries a raw driver status and
//! the API call that produced it. [`EncoderError`] is what every fallible
//! session operation returns.

use std::fmt;

use thiserror::Error;

use rtc_common::{GpuError, SettingsError};

use crate::session::SessionState;

/// Outcome of bringing up the hardware encoder.
///
/// Computed once by the capability loader plus session open, then cached
/// until explicitly reset.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Error)]
pub enum CodecInitializationResult {
    #[error("encoder not initialized")]
    NotInitialized,

    #[error("success")]
    Success,

    #[error("NVENC driver not installed")]
    DriverNotInstalled,

    #[error("installed driver does not support the required NVENC API version")]
    DriverVersionDoesNotSupportAPI,

    #[error("NVENC API entry point not found")]
    APINotFound,

    #[error("hardware encoder initialization failed")]
    EncoderInitializationFailed,
}

impl CodecInitializationResult {
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// A driver call returned something other than `NV_ENC_SUCCESS`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub struct NvencError {
    /// Raw `NVENCSTATUS` value.
    pub status: i32,
    /// Name of the API function that failed.
    pub operation: &'static str,
}

impl fmt::Display for NvencError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed: {} ({})",
            self.operation,
            self.status_name(),
            self.status
        )
    }
}

impl NvencError {
    pub fn status_name(&self) -> &'static str {
        nvenc_status_name(self.status)
    }
}

/// Errors returned by encoder session operations.
#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("Hardware encoder unavailable: {0}")]
    Unavailable(CodecInitializationResult),

    #[error(transparent)]
    Nvenc(#[from] NvencError),

    #[error("{operation} not allowed while session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Input frame is already mapped")]
    AlreadyMapped,

    #[error("Input frame is not mapped")]
    NotMapped,

    #[error("Input frame is not registered")]
    NotRegistered,

    #[error("Input frame is still mapped and cannot be unregistered")]
    StillMapped,

    #[error("Output bitstream is already locked")]
    BitstreamLocked,

    #[error("Ring slot {0} has no encoder resources")]
    SlotNotAllocated(usize),

    #[error("Unsupported buffer format: {0:#x}")]
    UnsupportedFormat(u32),

    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),
}

impl From<CodecInitializationResult> for EncoderError {
    fn from(result: CodecInitializationResult) -> Self {
        EncoderError::Unavailable(result)
    }
}

/// Get a human-readable name for an NVENC status code.
pub fn nvenc_status_name(status: i32) -> &'static str {
    match status {
        0 => "NV_ENC_SUCCESS",
        1 => "NV_ENC_ERR_NO_ENCODE_DEVICE",
        2 => "NV_ENC_ERR_UNSUPPORTED_DEVICE",
        3 => "NV_ENC_ERR_INVALID_ENCODERDEVICE",
        4 => "NV_ENC_ERR_INVALID_DEVICE",
        5 => "NV_ENC_ERR_DEVICE_NOT_EXIST",
        6 => "NV_ENC_ERR_INVALID_PTR",
        7 => "NV_ENC_ERR_INVALID_EVENT",
        8 => "NV_ENC_ERR_INVALID_PARAM",
        9 => "NV_ENC_ERR_INVALID_CALL",
        10 => "NV_ENC_ERR_OUT_OF_MEMORY",
        11 => "NV_ENC_ERR_ENCODER_NOT_INITIALIZED",
        12 => "NV_ENC_ERR_UNSUPPORTED_PARAM",
        13 => "NV_ENC_ERR_LOCK_BUSY",
        14 => "NV_ENC_ERR_NOT_ENOUGH_BUFFER",
        15 => "NV_ENC_ERR_INVALID_VERSION",
        16 => "NV_ENC_ERR_MAP_FAILED",
        17 => "NV_ENC_ERR_NEED_MORE_INPUT",
        18 => "NV_ENC_ERR_ENCODER_BUSY",
        19 => "NV_ENC_ERR_EVENT_NOT_REGISTERD",
        20 => "NV_ENC_ERR_GENERIC",
        21 => "NV_ENC_ERR_INCOMPATIBLE_CLIENT_KEY",
        22 => "NV_ENC_ERR_UNIMPLEMENTED",
        23 => "NV_ENC_ERR_RESOURCE_REGISTER_FAILED",
        24 => "NV_ENC_ERR_RESOURCE_NOT_REGISTERED",
        25 => "NV_ENC_ERR_RESOURCE_NOT_MAPPED",
        26 => "NV_ENC_ERR_NEED_MORE_OUTPUT",
        _ => "NV_ENC_ERR_UNKNOWN",
    }
}
