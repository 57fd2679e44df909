//! Central error types shared by the encoder and its collaborators (thiserror-based).

use thiserror::Error;

/// Graphics device collaborator errors.
#[derive(Error, Debug)]
pub enum GpuError {
    #[error("GPU device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Texture allocation failed: {width}x{height}")]
    TextureAllocFailed { width: u32, height: u32 },

    #[error("Copy into native texture failed: {0}")]
    CopyFailed(String),

    #[error("Texture has no registrable native resource")]
    NoNativeResource,
}

/// Settings loading errors.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Settings file not found: {path}")]
    NotFound { path: String },

    #[error("Invalid settings: {0}")]
    Invalid(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_alloc_display() {
        let err = GpuError::TextureAllocFailed {
            width: 1280,
            height: 720,
        };
        assert_eq!(err.to_string(), "Texture allocation failed: 1280x720");
    }

    #[test]
    fn settings_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked");
        let err = SettingsError::from(io_err);
        assert!(err.to_string().contains("locked"));
    }
}
