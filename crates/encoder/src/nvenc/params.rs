//! NVENC parameter builders.
//!
//! Maps [`HwSettings`] and the session's resolution / rate targets to NVENC
//! rate control modes, initialization parameters and the H.264 config
//! overlay applied on top of the driver's P1 low-latency preset.

use rtc_common::{HwSettings, Resolution};

use super::ffi::{
    NvEncConfig, NvEncInitializeParams, NvEncMultiPass, NvEncQp, NvEncRcMode, NvGuid,
    NVENC_INFINITE_GOPLENGTH, NV_ENC_CODEC_H264_GUID, NV_ENC_H264_FLAG_ENABLE_INTRA_REFRESH,
    NV_ENC_H264_FLAG_REPEAT_SPS_PPS, NV_ENC_H264_PROFILE_BASELINE_GUID, NV_ENC_LEVEL_H264_51,
    NV_ENC_PRESET_P1_GUID, NV_ENC_RC_FLAG_ENABLE_AQ, NV_ENC_RC_FLAG_ENABLE_MAX_QP,
    NV_ENC_RC_FLAG_ENABLE_MIN_QP, NV_ENC_TUNING_INFO_LOW_LATENCY,
};

/// Preset queried for the base config. Always paired with [`SESSION_TUNING`].
pub const SESSION_PRESET: NvGuid = NV_ENC_PRESET_P1_GUID;

/// Tuning info for every session.
pub const SESSION_TUNING: u32 = NV_ENC_TUNING_INFO_LOW_LATENCY;

/// Hardware frame-rate ceiling applied on reconfigure.
pub const MAX_FRAMERATE: u32 = 240;

/// Largest resolution a session may be reconfigured to without reinitializing.
pub const MAX_ENCODE_SIZE: Resolution = Resolution::UHD;

/// Floor and granularity of the default bitrate heuristic (bits/sec).
pub const BITRATE_STEP: u32 = 100_000;

// ---------------------------------------------------------------------------
// Rate control mode mapping
// ---------------------------------------------------------------------------

/// Rate control mode plus the multi-pass setting that goes with it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RateControl {
    pub mode: NvEncRcMode,
    pub multi_pass: NvEncMultiPass,
}

impl RateControl {
    const fn single(mode: NvEncRcMode) -> Self {
        Self {
            mode,
            multi_pass: NvEncMultiPass::Disabled,
        }
    }

    const fn cbr_two_pass(multi_pass: NvEncMultiPass) -> Self {
        Self {
            mode: NvEncRcMode::Cbr,
            multi_pass,
        }
    }
}

/// Map the settings rate-control selector to NVENC rate control.
///
/// Both the short (1..4) and the legacy (10..40) selector spellings are
/// accepted; anything unrecognised falls back to CBR. The low-delay HQ and
/// HQ CBR selectors become CBR with quarter and full resolution two-pass.
pub fn rate_mode_from_selector(selector: u32) -> RateControl {
    match selector {
        1 | 10 => RateControl::cbr_two_pass(NvEncMultiPass::TwoPassQuarterResolution),
        2 | 20 => RateControl::single(NvEncRcMode::ConstQp),
        3 | 30 => RateControl::cbr_two_pass(NvEncMultiPass::TwoPassFullResolution),
        4 | 40 => RateControl::single(NvEncRcMode::Vbr),
        _ => RateControl::single(NvEncRcMode::Cbr),
    }
}

/// Settings selector index for a rate control (inverse of [`rate_mode_from_selector`]).
///
/// Multi-pass only distinguishes CBR selectors.
pub fn rate_mode_to_selector(rc: RateControl) -> u32 {
    match (rc.mode, rc.multi_pass) {
        (NvEncRcMode::Cbr, NvEncMultiPass::Disabled) => 0,
        (NvEncRcMode::Cbr, NvEncMultiPass::TwoPassQuarterResolution) => 1,
        (NvEncRcMode::Cbr, NvEncMultiPass::TwoPassFullResolution) => 3,
        (NvEncRcMode::ConstQp, _) => 2,
        (NvEncRcMode::Vbr, _) => 4,
    }
}

// ---------------------------------------------------------------------------
// Rate targets
// ---------------------------------------------------------------------------

/// Default average bitrate for `resolution`.
///
/// Scales the settings baseline by pixel area relative to the reference
/// resolution, rounded down to [`BITRATE_STEP`] and never below it.
pub fn default_bitrate(resolution: Resolution, settings: &HwSettings) -> u32 {
    let scaled = settings.baseline_bitrate as f64 * resolution.area_ratio(settings.reference_resolution);
    let step = BITRATE_STEP as u64;
    let rounded = (scaled as u64 / step) * step;
    rounded.clamp(step, u32::MAX as u64) as u32
}

/// Bitrate a session starts with: the settings override, else the heuristic.
pub fn initial_bitrate(resolution: Resolution, settings: &HwSettings) -> u32 {
    if settings.min_bitrate > 0 {
        settings.min_bitrate
    } else {
        default_bitrate(resolution, settings)
    }
}

/// Clamp a requested frame rate to the hardware ceiling and settings limit.
pub fn clamp_framerate(requested: u32, settings: &HwSettings) -> u32 {
    let mut framerate = requested.min(MAX_FRAMERATE);
    if settings.max_framerate > 0 {
        framerate = framerate.min(settings.max_framerate);
    }
    framerate.max(1)
}

// ---------------------------------------------------------------------------
// Full parameter builders
// ---------------------------------------------------------------------------

/// Build NVENC initialization parameters for an H.264 low-latency session.
///
/// Preset and tuning must match the pair the base config was queried with.
///
/// `encode_config` is left null; the caller points it at a config stored at
/// a stable address. Encoding is always synchronous.
pub fn build_init_params(resolution: Resolution, framerate: u32) -> NvEncInitializeParams {
    NvEncInitializeParams {
        encode_guid: NV_ENC_CODEC_H264_GUID,
        preset_guid: SESSION_PRESET,
        tuning_info: SESSION_TUNING,
        encode_width: resolution.width,
        encode_height: resolution.height,
        dar_width: resolution.width,
        dar_height: resolution.height,
        frame_rate_num: framerate,
        frame_rate_den: 1,
        enable_ptd: 1,
        enable_encode_async: 0,
        max_encode_width: MAX_ENCODE_SIZE.width.max(resolution.width),
        max_encode_height: MAX_ENCODE_SIZE.height.max(resolution.height),
        ..NvEncInitializeParams::default()
    }
}

/// Overlay session settings onto a preset config.
pub fn apply_session_config(
    config: &mut NvEncConfig,
    settings: &HwSettings,
    bitrate: u32,
    framerate: u32,
) {
    config.profile_guid = NV_ENC_H264_PROFILE_BASELINE_GUID;
    config.gop_length = if settings.infinite_gop {
        NVENC_INFINITE_GOPLENGTH
    } else {
        framerate
    };

    let rc = &mut config.rc_params;
    let rate_control = rate_mode_from_selector(settings.rate_control_mode);
    rc.rate_control_mode = rate_control.mode;
    rc.multi_pass = rate_control.multi_pass;
    rc.average_bitrate = bitrate;
    if settings.max_bitrate > 0 {
        rc.max_bitrate = settings.max_bitrate;
    }
    if settings.enable_aq {
        rc.flags |= NV_ENC_RC_FLAG_ENABLE_AQ;
    } else {
        rc.flags &= !NV_ENC_RC_FLAG_ENABLE_AQ;
    }
    if settings.min_qp > 0 {
        rc.flags |= NV_ENC_RC_FLAG_ENABLE_MIN_QP;
        rc.min_qp = NvEncQp::uniform(settings.min_qp);
    }
    if settings.max_qp > 0 {
        rc.flags |= NV_ENC_RC_FLAG_ENABLE_MAX_QP;
        rc.max_qp = NvEncQp::uniform(settings.max_qp);
    }

    let h264 = config.h264_mut();
    h264.idr_period = framerate;
    h264.level = NV_ENC_LEVEL_H264_51;
    h264.slice_mode = 0;
    h264.slice_mode_data = 0;
    h264.flags |= NV_ENC_H264_FLAG_REPEAT_SPS_PPS;
    if settings.intra_refresh_enabled() {
        h264.flags |= NV_ENC_H264_FLAG_ENABLE_INTRA_REFRESH;
        h264.intra_refresh_period = settings.intra_refresh_period;
        h264.intra_refresh_cnt = settings.intra_refresh_count;
    }
    if settings.max_num_ref_frames > 0 {
        h264.max_num_ref_frames = settings.max_num_ref_frames;
    }
}

/// Write new rate targets into the active parameter block.
pub fn apply_rates(
    init: &mut NvEncInitializeParams,
    config: &mut NvEncConfig,
    bitrate: u32,
    framerate: u32,
) {
    config.rc_params.average_bitrate = bitrate;
    init.frame_rate_num = framerate;
}
