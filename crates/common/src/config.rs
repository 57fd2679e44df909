//! Hardware encoder settings.
//!
//! These are the process-wide knobs the host application exposes for the
//! hardware encoder. From the encoder's point of view they are read-only:
//! they supply the defaults and hard limits for a session, while bitrate and
//! frame-rate *targets* come from the rate controller via `set_rates`.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::SettingsError;
use crate::types::Resolution;

/// Highest quantization parameter accepted by H.264.
pub const MAX_QP: u32 = 51;

/// Hardware encoder settings, deserializable from JSON.
///
/// Zero means "unset" for every numeric limit, matching how the driver
/// treats zero-valued fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HwSettings {
    /// Rate control selector: 0 CBR, 1/10 CBR low-delay HQ, 2/20 constant QP,
    /// 3/30 CBR HQ, 4/40 VBR. Anything else falls back to CBR.
    pub rate_control_mode: u32,
    /// Average bitrate override (bits/sec). Replaces the resolution heuristic.
    pub min_bitrate: u32,
    /// Peak bitrate (bits/sec), only meaningful for VBR.
    pub max_bitrate: u32,
    pub min_qp: u32,
    pub max_qp: u32,
    /// Adaptive quantization.
    pub enable_aq: bool,
    pub intra_refresh_period: u32,
    pub intra_refresh_count: u32,
    /// Maximum reference frames (0 = driver default).
    pub max_num_ref_frames: u32,
    /// Disable periodic IDR frames.
    pub infinite_gop: bool,
    /// Frame rate used until the rate controller requests another one.
    pub default_framerate: u32,
    /// Upper frame-rate limit applied on reconfigure (0 = hardware ceiling only).
    pub max_framerate: u32,
    /// Bitrate at `reference_resolution` for the default bitrate heuristic.
    pub baseline_bitrate: u32,
    pub reference_resolution: Resolution,
}

impl Default for HwSettings {
    fn default() -> Self {
        Self {
            rate_control_mode: 0,
            min_bitrate: 0,
            max_bitrate: 0,
            min_qp: 0,
            max_qp: 0,
            enable_aq: false,
            intra_refresh_period: 0,
            intra_refresh_count: 0,
            max_num_ref_frames: 0,
            infinite_gop: false,
            default_framerate: 30,
            max_framerate: 0,
            baseline_bitrate: 500_000,
            reference_resolution: Resolution::HD_720,
        }
    }
}

impl HwSettings {
    /// Whether intra refresh is enabled (both period and count set).
    pub fn intra_refresh_enabled(&self) -> bool {
        self.intra_refresh_period > 0 && self.intra_refresh_count > 0
    }

    /// Parse settings from a JSON string. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, SettingsError> {
        let settings: HwSettings = serde_json::from_str(json)?;
        settings.validate()?;
        debug!(?settings, "Parsed hardware encoder settings");
        Ok(settings)
    }

    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Err(SettingsError::NotFound {
                path: path.display().to_string(),
            });
        }

        let json = std::fs::read_to_string(path).map_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to read settings file");
            SettingsError::Io(e)
        })?;

        let settings = Self::from_json_str(&json)?;
        info!(path = %path.display(), "Hardware encoder settings loaded");
        Ok(settings)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.min_qp > MAX_QP || self.max_qp > MAX_QP {
            return Err(SettingsError::Invalid(format!(
                "QP bounds {}..{} exceed maximum of {MAX_QP}",
                self.min_qp, self.max_qp
            )));
        }
        if self.min_qp > 0 && self.max_qp > 0 && self.min_qp > self.max_qp {
            return Err(SettingsError::Invalid(format!(
                "min QP ({}) exceeds max QP ({})",
                self.min_qp, self.max_qp
            )));
        }
        if self.min_bitrate > 0 && self.max_bitrate > 0 && self.min_bitrate > self.max_bitrate {
            return Err(SettingsError::Invalid(format!(
                "min bitrate ({}) exceeds max bitrate ({})",
                self.min_bitrate, self.max_bitrate
            )));
        }
        if self.default_framerate == 0 {
            return Err(SettingsError::Invalid(
                "default frame rate must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}
