//! Raw FFI bindings for NVIDIA's NVENC (nvEncodeAPI) library.
//!
//! The runtime exports two entry points: `NvEncodeAPIGetMaxSupportedVersion`
//! and `NvEncodeAPICreateInstance`. The latter fills a versioned
//! [`NvEncodeApiFunctionList`] with every other API function. The structs
//! below cover the API surface an H.264 low-latency encode session needs.
//!
//! Reference: NVIDIA Video Codec SDK -- `nvEncodeAPI.h`.

use std::ffi::c_void;
use std::sync::Arc;

use libloading::Library;

use crate::error::NvencError;

// ---------------------------------------------------------------------------
// NVENC status codes
// ---------------------------------------------------------------------------

/// NVENC API return type.
pub type NvencStatus = i32;

/// Success return code.
pub const NV_ENC_SUCCESS: NvencStatus = 0;

/// Error: no encode capable device.
pub const NV_ENC_ERR_NO_ENCODE_DEVICE: NvencStatus = 1;

/// Error: invalid parameter.
pub const NV_ENC_ERR_INVALID_PARAM: NvencStatus = 8;

/// Error: call not allowed in the current state.
pub const NV_ENC_ERR_INVALID_CALL: NvencStatus = 9;

/// Error: out of memory.
pub const NV_ENC_ERR_OUT_OF_MEMORY: NvencStatus = 10;

/// Error: encoder not initialized.
pub const NV_ENC_ERR_ENCODER_NOT_INITIALIZED: NvencStatus = 11;

/// Error: API function not provided by this driver.
pub const NV_ENC_ERR_UNIMPLEMENTED: NvencStatus = 22;

/// Error: resource registration failed.
pub const NV_ENC_ERR_RESOURCE_REGISTER_FAILED: NvencStatus = 23;

// ---------------------------------------------------------------------------
// NVENC API version
// ---------------------------------------------------------------------------

/// NVENC API major version we target (Video Codec SDK 12.x).
pub const NVENCAPI_MAJOR_VERSION: u32 = 12;

/// NVENC API minor version.
pub const NVENCAPI_MINOR_VERSION: u32 = 2;

/// Packed API version for struct versioning.
pub const NVENCAPI_VERSION: u32 = NVENCAPI_MAJOR_VERSION | (NVENCAPI_MINOR_VERSION << 24);

/// Version in the format reported by `NvEncodeAPIGetMaxSupportedVersion`:
/// `(major << 4) | minor`.
pub const NVENCAPI_SUPPORTED_VERSION: u32 = (NVENCAPI_MAJOR_VERSION << 4) | NVENCAPI_MINOR_VERSION;

/// Macro-equivalent for struct versioning: `(struct_ver) | (NVENCAPI_VERSION << 16)`.
/// This is how NVENC identifies which version of a struct is being passed.
pub const fn nvenc_struct_version(struct_ver: u32) -> u32 {
    struct_ver | (NVENCAPI_VERSION << 16)
}

// ---------------------------------------------------------------------------
// GUIDs
// ---------------------------------------------------------------------------

/// GUID structure matching NVENC's `GUID` type (Windows-compatible layout).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NvGuid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

/// Codec GUID: H.264.
pub const NV_ENC_CODEC_H264_GUID: NvGuid = NvGuid {
    data1: 0x6BC8_2762,
    data2: 0x4E63,
    data3: 0x4CA4,
    data4: [0xAA, 0x85, 0x1A, 0x4D, 0x14, 0x15, 0x26, 0xD2],
};

/// Preset GUID: P1 (fastest). SDK 12 presets are paired with a tuning info.
pub const NV_ENC_PRESET_P1_GUID: NvGuid = NvGuid {
    data1: 0xFC0E_8692,
    data2: 0x8FF1,
    data3: 0x4C3D,
    data4: [0xBA, 0xD8, 0xF5, 0x64, 0xC0, 0x1D, 0x2A, 0xB1],
};

/// Profile GUID: H.264 Baseline.
pub const NV_ENC_H264_PROFILE_BASELINE_GUID: NvGuid = NvGuid {
    data1: 0x0727_BCAA,
    data2: 0x78C4,
    data3: 0x4C83,
    data4: [0x8C, 0x2F, 0xEF, 0x3D, 0xFF, 0x26, 0x7C, 0x6A],
};

/// Profile GUID: H.264 Main.
pub const NV_ENC_H264_PROFILE_MAIN_GUID: NvGuid = NvGuid {
    data1: 0x6085_1BF2,
    data2: 0x8F35,
    data3: 0x4F4D,
    data4: [0x86, 0x88, 0x70, 0x92, 0x6D, 0xD6, 0x3B, 0xE1],
};

/// Profile GUID: H.264 High.
pub const NV_ENC_H264_PROFILE_HIGH_GUID: NvGuid = NvGuid {
    data1: 0xE7CB_C309,
    data2: 0x4F7A,
    data3: 0x4B89,
    data4: [0xAF, 0x2A, 0xD5, 0x37, 0xC9, 0x2B, 0xE3, 0x10],
};

// ---------------------------------------------------------------------------
// Misc constants
// ---------------------------------------------------------------------------

/// GOP length meaning "never insert a periodic IDR".
pub const NVENC_INFINITE_GOPLENGTH: u32 = 0xFFFF_FFFF;

/// H.264 level 5.1.
pub const NV_ENC_LEVEL_H264_51: u32 = 51;

/// Per-picture flag: encode this picture as an IDR.
pub const NV_ENC_PIC_FLAG_FORCEIDR: u32 = 0x2;

/// Picture structure: progressive frame.
pub const NV_ENC_PIC_STRUCT_FRAME: u32 = 0x1;

/// Buffer usage: encoder input image.
pub const NV_ENC_INPUT_IMAGE: u32 = 0;

/// Capability query: asynchronous encode (completion events) supported.
pub const NV_ENC_CAPS_ASYNC_ENCODE_SUPPORT: u32 = 30;

/// Tuning info: low latency (streaming, no B-frames).
pub const NV_ENC_TUNING_INFO_LOW_LATENCY: u32 = 2;

/// `NV_ENC_RC_PARAMS` bit: honour `min_qp`.
pub const NV_ENC_RC_FLAG_ENABLE_MIN_QP: u32 = 1 << 0;

/// `NV_ENC_RC_PARAMS` bit: honour `max_qp`.
pub const NV_ENC_RC_FLAG_ENABLE_MAX_QP: u32 = 1 << 1;

/// `NV_ENC_RC_PARAMS` bit: spatial adaptive quantization.
pub const NV_ENC_RC_FLAG_ENABLE_AQ: u32 = 1 << 3;

/// `NV_ENC_CONFIG_H264` bit: enable intra refresh.
pub const NV_ENC_H264_FLAG_ENABLE_INTRA_REFRESH: u32 = 1 << 10;

/// `NV_ENC_CONFIG_H264` bit: repeat SPS/PPS with every IDR.
pub const NV_ENC_H264_FLAG_REPEAT_SPS_PPS: u32 = 1 << 12;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Input buffer format. Matches `NV_ENC_BUFFER_FORMAT`.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NvEncBufferFormat {
    /// Undefined format.
    Undefined = 0x0000_0000,
    /// Semi-planar YUV 4:2:0, 8-bit (NV12).
    Nv12 = 0x0000_0001,
    /// Planar YUV 4:2:0, 8-bit (YV12).
    Yv12 = 0x0000_0010,
    /// Planar YUV 4:2:0, 8-bit (IYUV).
    Iyuv = 0x0000_0100,
    /// Planar YUV 4:4:4, 8-bit.
    Yuv444 = 0x0000_1000,
    /// Semi-planar YUV 4:2:0, 10-bit in 16-bit containers.
    Yuv420_10bit = 0x0001_0000,
    /// Planar YUV 4:4:4, 10-bit in 16-bit containers.
    Yuv444_10bit = 0x0010_0000,
    /// Interleaved ARGB, 8-bit.
    Argb = 0x0100_0000,
    /// Interleaved ARGB, 10-bit.
    Argb10 = 0x0200_0000,
    /// Interleaved AYUV, 8-bit (packed).
    Ayuv = 0x0400_0000,
    /// Interleaved ABGR, 8-bit.
    Abgr = 0x1000_0000,
    /// Interleaved ABGR, 10-bit.
    Abgr10 = 0x2000_0000,
}

impl NvEncBufferFormat {
    /// Every format with a defined memory layout.
    pub const KNOWN: [NvEncBufferFormat; 11] = [
        Self::Nv12,
        Self::Yv12,
        Self::Iyuv,
        Self::Yuv444,
        Self::Yuv420_10bit,
        Self::Yuv444_10bit,
        Self::Argb,
        Self::Argb10,
        Self::Ayuv,
        Self::Abgr,
        Self::Abgr10,
    ];
}

/// Encode picture type. Matches `NV_ENC_PIC_TYPE`.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NvEncPicType {
    /// P-frame.
    P = 0,
    /// B-frame.
    B = 1,
    /// I-frame.
    I = 2,
    /// IDR frame.
    Idr = 3,
    /// Bidirectional frame.
    Bi = 4,
    /// Skip frame.
    Skipped = 5,
    /// Intra-refresh.
    IntraRefresh = 6,
    /// Non-reference P-frame.
    NonrefP = 7,
    /// Unknown.
    Unknown = 0xFF,
}

/// Resource type for registering external resources. Matches `NV_ENC_INPUT_RESOURCE_TYPE`.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NvEncInputResourceType {
    /// DirectX 9/11/12 texture.
    Directx = 0,
    /// CUDA device pointer.
    CudaDeviceptr = 1,
    /// CUDA array.
    CudaArray = 2,
    /// OpenGL texture.
    OpenglTex = 3,
}

/// Device the encode session is opened against. Matches `NV_ENC_DEVICE_TYPE`.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NvEncDeviceType {
    /// `ID3D11Device` / `ID3D12Device`.
    Directx = 0,
    /// `CUcontext`.
    Cuda = 1,
    /// Current OpenGL context (device pointer must be null).
    Opengl = 2,
}

/// Rate control mode. Matches `NV_ENC_PARAMS_RC_MODE`.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NvEncRcMode {
    /// Constant QP.
    ConstQp = 0x0,
    /// Variable bitrate.
    Vbr = 0x1,
    /// Constant bitrate.
    Cbr = 0x2,
}

/// Multi-pass rate control. Matches `NV_ENC_MULTI_PASS`.
///
/// SDK 12 replaced the `CBR_LOWDELAY_HQ` and `CBR_HQ` modes with CBR plus
/// a two-pass setting.
#[repr(u32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NvEncMultiPass {
    /// Single pass.
    Disabled = 0x0,
    /// First pass at quarter resolution.
    TwoPassQuarterResolution = 0x1,
    /// First pass at full resolution.
    TwoPassFullResolution = 0x2,
}

// ---------------------------------------------------------------------------
// Session structs
// ---------------------------------------------------------------------------

/// Open encode session parameters. Matches `NV_ENC_OPEN_ENCODE_SESSION_EX_PARAMS`.
#[repr(C)]
pub struct NvEncOpenEncodeSessionExParams {
    /// Struct version (use `nvenc_struct_version`).
    pub version: u32,
    /// Device type.
    pub device_type: NvEncDeviceType,
    /// Device handle (ID3D11Device, CUcontext, or null for OpenGL).
    pub device: *mut c_void,
    /// Reserved.
    pub reserved: *mut c_void,
    /// API version the client is compiled against.
    pub api_version: u32,
    /// Reserved.
    pub reserved1: [u32; 253],
    /// Reserved.
    pub reserved2: [*mut c_void; 64],
}

impl Default for NvEncOpenEncodeSessionExParams {
    fn default() -> Self {
        // SAFETY: All-zeros is a valid default state for this POD struct
        // (device_type 0 is `Directx`). We set version and api_version after.
        let mut s: Self = unsafe { std::mem::zeroed() };
        s.version = nvenc_struct_version(1);
        s.api_version = NVENCAPI_VERSION;
        s
    }
}

/// Encode initialization parameters. Matches `NV_ENC_INITIALIZE_PARAMS`.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct NvEncInitializeParams {
    /// Struct version.
    pub version: u32,
    /// Codec GUID.
    pub encode_guid: NvGuid,
    /// Preset GUID.
    pub preset_guid: NvGuid,
    /// Encode width.
    pub encode_width: u32,
    /// Encode height.
    pub encode_height: u32,
    /// Display aspect ratio X.
    pub dar_width: u32,
    /// Display aspect ratio Y.
    pub dar_height: u32,
    /// Frame rate numerator.
    pub frame_rate_num: u32,
    /// Frame rate denominator.
    pub frame_rate_den: u32,
    /// Enable asynchronous encode mode.
    pub enable_encode_async: u32,
    /// Enable Picture Type Decision.
    pub enable_ptd: u32,
    /// Report slice offsets.
    pub report_slice_offsets: u32,
    /// Enable subframe readback.
    pub enable_sub_frame_write: u32,
    /// Enable external ME hints (motion estimation).
    pub enable_external_me_hints: u32,
    /// Enable ME only mode.
    pub enable_me_only_mode: u32,
    /// Enable weighted prediction.
    pub enable_weighted_prediction: u32,
    /// Enable output in video memory.
    pub enable_output_in_video_mem: u32,
    /// Reserved.
    pub reserved1: [u32; 233],
    /// Pointer to codec-specific config (NV_ENC_CONFIG).
    pub encode_config: *mut NvEncConfig,
    /// Maximum width for dynamic resolution change.
    pub max_encode_width: u32,
    /// Maximum height for dynamic resolution change.
    pub max_encode_height: u32,
    /// ME hints per block count (for external ME).
    pub max_me_hint_count_per_block: [u32; 2],
    /// Tuning info.
    pub tuning_info: u32,
    /// Reserved.
    pub reserved2: [*mut c_void; 62],
}

impl Default for NvEncInitializeParams {
    fn default() -> Self {
        // SAFETY: All-zeros is valid for this POD struct.
        let mut s: Self = unsafe { std::mem::zeroed() };
        s.version = nvenc_struct_version(5);
        s.enable_ptd = 1; // Let NVENC decide picture types
        s
    }
}

/// Per-picture-type QP values. Matches `NV_ENC_QP`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct NvEncQp {
    pub qp_inter_p: u32,
    pub qp_inter_b: u32,
    pub qp_intra: u32,
}

impl NvEncQp {
    /// Same QP for every picture type.
    pub fn uniform(qp: u32) -> Self {
        Self {
            qp_inter_p: qp,
            qp_inter_b: qp,
            qp_intra: qp,
        }
    }
}

/// Rate control parameters. Matches `NV_ENC_RC_PARAMS`.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct NvEncRcParams {
    /// Struct version.
    pub version: u32,
    /// Rate control mode.
    pub rate_control_mode: NvEncRcMode,
    /// Constant QP (QP mode only).
    pub const_qp: NvEncQp,
    /// Average bitrate (bits/sec).
    pub average_bitrate: u32,
    /// Maximum bitrate (bits/sec, for VBR).
    pub max_bitrate: u32,
    /// VBV buffer size.
    pub vbv_buffer_size: u32,
    /// VBV initial delay.
    pub vbv_initial_delay: u32,
    /// Packed single-bit flags (`NV_ENC_RC_FLAG_*`).
    pub flags: u32,
    /// Minimum QP bound.
    pub min_qp: NvEncQp,
    /// Maximum QP bound.
    pub max_qp: NvEncQp,
    /// Initial QP.
    pub initial_rc_qp: NvEncQp,
    pub temporal_layer_idx_mask: u32,
    pub temporal_layer_qp: [u8; 8],
    pub target_quality: u8,
    pub target_quality_lsb: u8,
    pub lookahead_depth: u16,
    pub low_delay_key_frame_scale: u8,
    pub y_dc_qp_index_offset: i8,
    pub u_dc_qp_index_offset: i8,
    pub v_dc_qp_index_offset: i8,
    pub qp_map_mode: u32,
    /// Multi-pass setting (zero means single pass).
    pub multi_pass: NvEncMultiPass,
    pub alpha_layer_bitrate_ratio: u32,
    pub cb_qp_index_offset: i8,
    pub cr_qp_index_offset: i8,
    /// Reserved.
    pub reserved2: u16,
    /// Reserved.
    pub reserved: [u32; 4],
}

impl Default for NvEncRcParams {
    fn default() -> Self {
        // SAFETY: All-zeros is valid for this POD struct (mode 0 is ConstQp,
        // multi-pass 0 is Disabled).
        unsafe { std::mem::zeroed() }
    }
}

/// H.264 codec configuration. Matches `NV_ENC_CONFIG_H264`.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct NvEncConfigH264 {
    /// Packed single-bit flags (`NV_ENC_H264_FLAG_*`).
    pub flags: u32,
    /// Encoding level.
    pub level: u32,
    /// IDR interval in frames.
    pub idr_period: u32,
    pub separate_colour_plane_flag: u32,
    pub disable_deblocking_filter_idc: u32,
    pub num_temporal_layers: u32,
    pub sps_id: u32,
    pub pps_id: u32,
    pub adaptive_transform_mode: u32,
    pub fmo_mode: u32,
    pub bdirect_mode: u32,
    pub entropy_coding_mode: u32,
    pub stereo_mode: u32,
    /// Frames between successive intra refresh cycles.
    pub intra_refresh_period: u32,
    /// Frames one intra refresh cycle is spread over.
    pub intra_refresh_cnt: u32,
    /// Maximum reference frames (0 = driver default).
    pub max_num_ref_frames: u32,
    /// Slice mode (0 = MB based).
    pub slice_mode: u32,
    /// Slice mode parameter.
    pub slice_mode_data: u32,
    /// Reserved.
    pub reserved: [u32; 302],
}

/// Codec-specific configuration union. Matches `NV_ENC_CODEC_CONFIG`.
#[repr(C)]
#[derive(Copy, Clone)]
pub union NvEncCodecConfig {
    pub h264: NvEncConfigH264,
    pub reserved: [u32; 320],
}

/// Encoder configuration. Matches `NV_ENC_CONFIG`.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct NvEncConfig {
    /// Struct version.
    pub version: u32,
    /// Profile GUID.
    pub profile_guid: NvGuid,
    /// GOP length (frames between IDRs, or `NVENC_INFINITE_GOPLENGTH`).
    pub gop_length: u32,
    /// Frame interval for P-frames.
    pub frame_interval_p: i32,
    /// Monochrome encoding.
    pub mono_chrome_format: u32,
    /// Frame/field mode.
    pub frame_field_mode: u32,
    /// Motion vector precision.
    pub mv_precision: u32,
    /// Rate control parameters.
    pub rc_params: NvEncRcParams,
    /// Codec-specific config.
    pub encode_codec_config: NvEncCodecConfig,
    /// Reserved.
    pub reserved: [u32; 278],
    /// Reserved.
    pub reserved2: [*mut c_void; 64],
}

impl Default for NvEncConfig {
    fn default() -> Self {
        // SAFETY: All-zeros is valid for this POD struct.
        let mut s: Self = unsafe { std::mem::zeroed() };
        s.version = nvenc_struct_version(8);
        s.rc_params.version = nvenc_struct_version(1);
        s
    }
}

impl NvEncConfig {
    /// H.264 view of the codec config union.
    pub fn h264(&self) -> &NvEncConfigH264 {
        // SAFETY: every bit pattern is a valid NvEncConfigH264 (plain u32 fields).
        unsafe { &self.encode_codec_config.h264 }
    }

    /// Mutable H.264 view of the codec config union.
    pub fn h264_mut(&mut self) -> &mut NvEncConfigH264 {
        // SAFETY: every bit pattern is a valid NvEncConfigH264 (plain u32 fields).
        unsafe { &mut self.encode_codec_config.h264 }
    }
}

/// Preset config query. Matches `NV_ENC_PRESET_CONFIG`.
#[repr(C)]
pub struct NvEncPresetConfig {
    /// Struct version.
    pub version: u32,
    /// [out] Preset config.
    pub preset_cfg: NvEncConfig,
    /// Reserved.
    pub reserved1: [u32; 255],
    /// Reserved.
    pub reserved2: [*mut c_void; 64],
}

impl Default for NvEncPresetConfig {
    fn default() -> Self {
        // SAFETY: All-zeros is valid for this POD struct.
        let mut s: Self = unsafe { std::mem::zeroed() };
        s.version = nvenc_struct_version(4);
        s.preset_cfg = NvEncConfig::default();
        s
    }
}

/// Capability query. Matches `NV_ENC_CAPS_PARAM`.
#[repr(C)]
pub struct NvEncCapsParam {
    /// Struct version.
    pub version: u32,
    /// Capability to query (`NV_ENC_CAPS_*`).
    pub caps_to_query: u32,
    /// Reserved.
    pub reserved: [u32; 62],
}

impl Default for NvEncCapsParam {
    fn default() -> Self {
        Self {
            version: nvenc_struct_version(1),
            caps_to_query: 0,
            reserved: [0; 62],
        }
    }
}

/// Reconfigure parameters. Matches `NV_ENC_RECONFIGURE_PARAMS`.
#[repr(C)]
pub struct NvEncReconfigureParams {
    /// Struct version.
    pub version: u32,
    /// Full initialization block carrying the updated encode config.
    pub re_init_encode_params: NvEncInitializeParams,
    /// Bit 0: reset encoder. Bit 1: force IDR.
    pub flags: u32,
}

impl NvEncReconfigureParams {
    pub fn new(init: NvEncInitializeParams) -> Self {
        Self {
            version: nvenc_struct_version(1) | (1 << 31),
            re_init_encode_params: init,
            flags: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Per-frame encode params
// ---------------------------------------------------------------------------

/// Picture encode parameters. Matches `NV_ENC_PIC_PARAMS`.
#[repr(C)]
pub struct NvEncPicParams {
    /// Struct version.
    pub version: u32,
    /// Input width.
    pub input_width: u32,
    /// Input height.
    pub input_height: u32,
    /// Input pitch.
    pub input_pitch: u32,
    /// Encode picture flags (`NV_ENC_PIC_FLAG_*`).
    pub encode_pic_flags: u32,
    /// Frame index.
    pub frame_idx: u32,
    /// Input timestamp.
    pub input_time_stamp: u64,
    /// Input duration.
    pub input_duration: u64,
    /// Mapped input buffer handle.
    pub input_buffer: *mut c_void,
    /// Output bitstream buffer handle.
    pub output_bitstream: *mut c_void,
    /// Completion event (async mode).
    pub completion_event: *mut c_void,
    /// Buffer format.
    pub buffer_fmt: NvEncBufferFormat,
    /// Picture struct (frame / field).
    pub picture_struct: u32,
    /// Picture type.
    pub picture_type: NvEncPicType,
    /// Codec-specific per-pic params.
    pub codec_pic_params: [u32; 256],
    /// ME hint counts per block.
    pub me_hint_count_per_block: [u32; 2],
    /// ME hints.
    pub me_external_hints: *mut c_void,
    /// Reserved.
    pub reserved1: [u32; 6],
    /// Reserved.
    pub reserved2: [*mut c_void; 2],
    /// Reserved.
    pub reserved3: [u32; 284],
    /// Reserved.
    pub reserved4: [*mut c_void; 60],
}

impl Default for NvEncPicParams {
    fn default() -> Self {
        // SAFETY: All-zeros is valid for this POD struct.
        let mut s: Self = unsafe { std::mem::zeroed() };
        s.version = nvenc_struct_version(4);
        s
    }
}

// ---------------------------------------------------------------------------
// Bitstream buffers
// ---------------------------------------------------------------------------

/// Lock bitstream parameters. Matches `NV_ENC_LOCK_BITSTREAM`.
#[repr(C)]
pub struct NvEncLockBitstream {
    /// Struct version.
    pub version: u32,
    /// Return immediately if the encode has not completed (async mode only).
    pub do_not_wait: u32,
    /// Output bitstream buffer handle to lock.
    pub output_bitstream: *mut c_void,
    /// [out] Slice offsets array.
    pub slice_offsets: *mut u32,
    /// [out] Frame index.
    pub frame_idx: u32,
    /// [out] HW encode status.
    pub hw_encode_status: u32,
    /// [out] Number of slices.
    pub num_slices: u32,
    /// [out] Bitstream size in bytes.
    pub bitstream_size_in_bytes: u32,
    /// [out] Output timestamp.
    pub output_time_stamp: u64,
    /// [out] Output duration.
    pub output_duration: u64,
    /// [out] Pointer to bitstream data.
    pub bitstream_buffer_ptr: *mut c_void,
    /// [out] Picture type.
    pub picture_type: NvEncPicType,
    /// [out] Picture struct.
    pub picture_struct: u32,
    /// [out] Frame average QP.
    pub frame_avg_qp: u32,
    /// [out] Frame satd cost.
    pub frame_satd: u32,
    /// [out] LTR frame index.
    pub ltr_frame_idx: u32,
    /// [out] LTR frame bitmap.
    pub ltr_frame_bitmap: u32,
    /// Reserved.
    pub reserved: [u32; 236],
    /// Reserved.
    pub reserved2: [*mut c_void; 64],
}

impl Default for NvEncLockBitstream {
    fn default() -> Self {
        // SAFETY: All-zeros is valid for this POD struct (picture type 0 is P).
        let mut s: Self = unsafe { std::mem::zeroed() };
        s.version = nvenc_struct_version(1);
        s
    }
}

/// Create bitstream buffer params. Matches `NV_ENC_CREATE_BITSTREAM_BUFFER`.
#[repr(C)]
pub struct NvEncCreateBitstreamBuffer {
    /// Struct version.
    pub version: u32,
    /// Reserved.
    pub size: u32,
    /// Memory heap.
    pub memory_heap: u32,
    /// Reserved.
    pub reserved: u32,
    /// [out] Bitstream buffer handle.
    pub bitstream_buffer: *mut c_void,
    /// [out] Reserved.
    pub bitstream_buffer_ptr: *mut c_void,
    /// Reserved.
    pub reserved1: [u32; 58],
    /// Reserved.
    pub reserved2: [*mut c_void; 64],
}

impl Default for NvEncCreateBitstreamBuffer {
    fn default() -> Self {
        // SAFETY: All-zeros is valid for this POD struct.
        let mut s: Self = unsafe { std::mem::zeroed() };
        s.version = nvenc_struct_version(1);
        s
    }
}

// ---------------------------------------------------------------------------
// External resources
// ---------------------------------------------------------------------------

/// Register external resource. Matches `NV_ENC_REGISTER_RESOURCE`.
#[repr(C)]
pub struct NvEncRegisterResource {
    /// Struct version.
    pub version: u32,
    /// Resource type.
    pub resource_type: NvEncInputResourceType,
    /// Width.
    pub width: u32,
    /// Height.
    pub height: u32,
    /// Pitch.
    pub pitch: u32,
    /// Sub-resource index (DX only).
    pub sub_resource_index: u32,
    /// Pointer to the external resource.
    pub resource_to_register: *mut c_void,
    /// [out] Registered resource handle.
    pub registered_resource: *mut c_void,
    /// Buffer format.
    pub buffer_format: NvEncBufferFormat,
    /// Buffer usage (`NV_ENC_INPUT_IMAGE`).
    pub buffer_usage: u32,
    /// Reserved.
    pub reserved1: [u32; 247],
    /// Reserved.
    pub reserved2: [*mut c_void; 62],
}

impl Default for NvEncRegisterResource {
    fn default() -> Self {
        // SAFETY: All-zeros is valid for this POD struct.
        let mut s: Self = unsafe { std::mem::zeroed() };
        s.version = nvenc_struct_version(3);
        s
    }
}

/// Map input resource. Matches `NV_ENC_MAP_INPUT_RESOURCE`.
#[repr(C)]
pub struct NvEncMapInputResource {
    /// Struct version.
    pub version: u32,
    /// Sub-resource index.
    pub sub_resource_index: u32,
    /// Input resource (reserved).
    pub input_resource: *mut c_void,
    /// Registered resource handle.
    pub registered_resource: *mut c_void,
    /// [out] Mapped resource handle (used as input_buffer in PicParams).
    pub mapped_resource: *mut c_void,
    /// [out] Mapped buffer format.
    pub mapped_buffer_fmt: NvEncBufferFormat,
    /// Reserved.
    pub reserved1: [u32; 251],
    /// Reserved.
    pub reserved2: [*mut c_void; 63],
}

impl Default for NvEncMapInputResource {
    fn default() -> Self {
        // SAFETY: All-zeros is valid for this POD struct.
        let mut s: Self = unsafe { std::mem::zeroed() };
        s.version = nvenc_struct_version(4);
        s
    }
}

// ---------------------------------------------------------------------------
// Function pointer table
// ---------------------------------------------------------------------------

/// Entry point: `NvEncodeAPIGetMaxSupportedVersion`.
pub type PfnGetMaxSupportedVersion = unsafe extern "C" fn(version: *mut u32) -> NvencStatus;

/// Entry point: `NvEncodeAPICreateInstance`.
pub type PfnCreateInstance =
    unsafe extern "C" fn(function_list: *mut NvEncodeApiFunctionList) -> NvencStatus;

pub type PfnOpenEncodeSessionEx = unsafe extern "C" fn(
    params: *mut NvEncOpenEncodeSessionExParams,
    encoder: *mut *mut c_void,
) -> NvencStatus;
pub type PfnGetEncodeCaps = unsafe extern "C" fn(
    encoder: *mut c_void,
    encode_guid: NvGuid,
    caps_param: *mut NvEncCapsParam,
    caps_val: *mut i32,
) -> NvencStatus;
pub type PfnGetEncodePresetConfigEx = unsafe extern "C" fn(
    encoder: *mut c_void,
    encode_guid: NvGuid,
    preset_guid: NvGuid,
    tuning_info: u32,
    preset_config: *mut NvEncPresetConfig,
) -> NvencStatus;
pub type PfnInitializeEncoder =
    unsafe extern "C" fn(encoder: *mut c_void, params: *mut NvEncInitializeParams) -> NvencStatus;
pub type PfnCreateBitstreamBuffer = unsafe extern "C" fn(
    encoder: *mut c_void,
    params: *mut NvEncCreateBitstreamBuffer,
) -> NvencStatus;
pub type PfnDestroyBitstreamBuffer =
    unsafe extern "C" fn(encoder: *mut c_void, bitstream_buffer: *mut c_void) -> NvencStatus;
pub type PfnEncodePicture =
    unsafe extern "C" fn(encoder: *mut c_void, params: *mut NvEncPicParams) -> NvencStatus;
pub type PfnLockBitstream =
    unsafe extern "C" fn(encoder: *mut c_void, params: *mut NvEncLockBitstream) -> NvencStatus;
pub type PfnUnlockBitstream =
    unsafe extern "C" fn(encoder: *mut c_void, output_bitstream: *mut c_void) -> NvencStatus;
pub type PfnMapInputResource =
    unsafe extern "C" fn(encoder: *mut c_void, params: *mut NvEncMapInputResource) -> NvencStatus;
pub type PfnUnmapInputResource =
    unsafe extern "C" fn(encoder: *mut c_void, mapped_resource: *mut c_void) -> NvencStatus;
pub type PfnDestroyEncoder = unsafe extern "C" fn(encoder: *mut c_void) -> NvencStatus;
pub type PfnRegisterResource =
    unsafe extern "C" fn(encoder: *mut c_void, params: *mut NvEncRegisterResource) -> NvencStatus;
pub type PfnUnregisterResource =
    unsafe extern "C" fn(encoder: *mut c_void, registered_resource: *mut c_void) -> NvencStatus;
pub type PfnReconfigureEncoder =
    unsafe extern "C" fn(encoder: *mut c_void, params: *mut NvEncReconfigureParams) -> NvencStatus;

/// Slot for an API function this crate never calls.
pub type UnusedFn = Option<unsafe extern "C" fn()>;

/// NVENC API function table. Matches `NV_ENCODE_API_FUNCTION_LIST`.
///
/// Filled by `NvEncodeAPICreateInstance`; field order is ABI.
#[repr(C)]
#[allow(non_snake_case)]
pub struct NvEncodeApiFunctionList {
    /// Struct version.
    pub version: u32,
    /// Reserved.
    pub reserved: u32,
    pub nvEncOpenEncodeSession: UnusedFn,
    pub nvEncGetEncodeGUIDCount: UnusedFn,
    pub nvEncGetEncodeProfileGUIDCount: UnusedFn,
    pub nvEncGetEncodeProfileGUIDs: UnusedFn,
    pub nvEncGetEncodeGUIDs: UnusedFn,
    pub nvEncGetInputFormatCount: UnusedFn,
    pub nvEncGetInputFormats: UnusedFn,
    pub nvEncGetEncodeCaps: Option<PfnGetEncodeCaps>,
    pub nvEncGetEncodePresetCount: UnusedFn,
    pub nvEncGetEncodePresetGUIDs: UnusedFn,
    pub nvEncGetEncodePresetConfig: UnusedFn,
    pub nvEncInitializeEncoder: Option<PfnInitializeEncoder>,
    pub nvEncCreateInputBuffer: UnusedFn,
    pub nvEncDestroyInputBuffer: UnusedFn,
    pub nvEncCreateBitstreamBuffer: Option<PfnCreateBitstreamBuffer>,
    pub nvEncDestroyBitstreamBuffer: Option<PfnDestroyBitstreamBuffer>,
    pub nvEncEncodePicture: Option<PfnEncodePicture>,
    pub nvEncLockBitstream: Option<PfnLockBitstream>,
    pub nvEncUnlockBitstream: Option<PfnUnlockBitstream>,
    pub nvEncLockInputBuffer: UnusedFn,
    pub nvEncUnlockInputBuffer: UnusedFn,
    pub nvEncGetEncodeStats: UnusedFn,
    pub nvEncGetSequenceParams: UnusedFn,
    pub nvEncRegisterAsyncEvent: UnusedFn,
    pub nvEncUnregisterAsyncEvent: UnusedFn,
    pub nvEncMapInputResource: Option<PfnMapInputResource>,
    pub nvEncUnmapInputResource: Option<PfnUnmapInputResource>,
    pub nvEncDestroyEncoder: Option<PfnDestroyEncoder>,
    pub nvEncInvalidateRefFrames: UnusedFn,
    pub nvEncOpenEncodeSessionEx: Option<PfnOpenEncodeSessionEx>,
    pub nvEncRegisterResource: Option<PfnRegisterResource>,
    pub nvEncUnregisterResource: Option<PfnUnregisterResource>,
    pub nvEncReconfigureEncoder: Option<PfnReconfigureEncoder>,
    pub reserved1: *mut c_void,
    pub nvEncCreateMVBuffer: UnusedFn,
    pub nvEncDestroyMVBuffer: UnusedFn,
    pub nvEncRunMotionEstimationOnly: UnusedFn,
    pub nvEncGetLastErrorString: UnusedFn,
    pub nvEncSetIOCudaStreams: UnusedFn,
    pub nvEncGetEncodePresetConfigEx: Option<PfnGetEncodePresetConfigEx>,
    pub nvEncGetSequenceParamEx: UnusedFn,
    pub nvEncRestoreEncoderState: UnusedFn,
    pub nvEncLookaheadPicture: UnusedFn,
    /// Reserved.
    pub reserved2: [*mut c_void; 275],
}

impl Default for NvEncodeApiFunctionList {
    fn default() -> Self {
        // SAFETY: All-zeros is valid: every function slot becomes `None`
        // and every reserved pointer null.
        let mut s: Self = unsafe { std::mem::zeroed() };
        s.version = nvenc_struct_version(2);
        s
    }
}

impl std::fmt::Debug for NvEncodeApiFunctionList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NvEncodeApiFunctionList")
            .field("version", &self.version)
            .field("open_session", &self.nvEncOpenEncodeSessionEx.is_some())
            .field("encode_picture", &self.nvEncEncodePicture.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Loaded API
// ---------------------------------------------------------------------------

/// A populated NVENC function table plus the module that backs it.
///
/// Shared (`Arc`) between every encoder session in the process. The module
/// reference keeps the function pointers valid for as long as any session
/// can still call them.
pub struct NvencApi {
    functions: NvEncodeApiFunctionList,
    _module: Option<Arc<Library>>,
}

// SAFETY: the table only holds code pointers into the driver (which are
// callable from any thread) and null reserved slots. The Library handle is
// Send + Sync itself.
unsafe impl Send for NvencApi {}
unsafe impl Sync for NvencApi {}

impl std::fmt::Debug for NvencApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NvencApi")
            .field("functions", &self.functions)
            .field("dynamic", &self._module.is_some())
            .finish()
    }
}

/// Unwrap a function slot, mapping a missing entry to `NV_ENC_ERR_UNIMPLEMENTED`.
fn required<F>(slot: Option<F>, operation: &'static str) -> Result<F, NvencError> {
    slot.ok_or(NvencError {
        status: NV_ENC_ERR_UNIMPLEMENTED,
        operation,
    })
}

impl NvencApi {
    /// Wrap a table filled by `NvEncodeAPICreateInstance`.
    pub fn new(functions: NvEncodeApiFunctionList, module: Option<Arc<Library>>) -> Self {
        Self {
            functions,
            _module: module,
        }
    }

    /// Borrow the raw function table.
    pub fn functions(&self) -> &NvEncodeApiFunctionList {
        &self.functions
    }

    /// Open an encode session against `params.device`.
    ///
    /// # Safety
    /// `params.device` must be a live device of `params.device_type`.
    pub unsafe fn open_encode_session_ex(
        &self,
        params: &mut NvEncOpenEncodeSessionExParams,
    ) -> Result<*mut c_void, NvencError> {
        const OP: &str = "nvEncOpenEncodeSessionEx";
        let f = required(self.functions.nvEncOpenEncodeSessionEx, OP)?;
        let mut encoder: *mut c_void = std::ptr::null_mut();
        check_nvenc_status(f(params, &mut encoder), OP)?;
        Ok(encoder)
    }

    /// Query the preset configuration for a codec/preset/tuning triple.
    ///
    /// # Safety
    /// `encoder` must be a live session handle.
    pub unsafe fn get_encode_preset_config_ex(
        &self,
        encoder: *mut c_void,
        encode_guid: NvGuid,
        preset_guid: NvGuid,
        tuning_info: u32,
        preset: &mut NvEncPresetConfig,
    ) -> Result<(), NvencError> {
        const OP: &str = "nvEncGetEncodePresetConfigEx";
        let f = required(self.functions.nvEncGetEncodePresetConfigEx, OP)?;
        check_nvenc_status(f(encoder, encode_guid, preset_guid, tuning_info, preset), OP)
    }

    /// Query a single capability value.
    ///
    /// # Safety
    /// `encoder` must be a live session handle.
    pub unsafe fn get_encode_caps(
        &self,
        encoder: *mut c_void,
        encode_guid: NvGuid,
        caps_to_query: u32,
    ) -> Result<i32, NvencError> {
        const OP: &str = "nvEncGetEncodeCaps";
        let f = required(self.functions.nvEncGetEncodeCaps, OP)?;
        let mut param = NvEncCapsParam {
            caps_to_query,
            ..NvEncCapsParam::default()
        };
        let mut value = 0i32;
        check_nvenc_status(f(encoder, encode_guid, &mut param, &mut value), OP)?;
        Ok(value)
    }

    /// # Safety
    /// `encoder` must be a live session handle and `params.encode_config`
    /// must point to a config that outlives the session.
    pub unsafe fn initialize_encoder(
        &self,
        encoder: *mut c_void,
        params: &mut NvEncInitializeParams,
    ) -> Result<(), NvencError> {
        const OP: &str = "nvEncInitializeEncoder";
        let f = required(self.functions.nvEncInitializeEncoder, OP)?;
        check_nvenc_status(f(encoder, params), OP)
    }

    /// # Safety
    /// `encoder` must be a live, initialized session handle.
    pub unsafe fn reconfigure_encoder(
        &self,
        encoder: *mut c_void,
        params: &mut NvEncReconfigureParams,
    ) -> Result<(), NvencError> {
        const OP: &str = "nvEncReconfigureEncoder";
        let f = required(self.functions.nvEncReconfigureEncoder, OP)?;
        check_nvenc_status(f(encoder, params), OP)
    }

    /// # Safety
    /// `encoder` must be a live, initialized session handle.
    pub unsafe fn create_bitstream_buffer(&self, encoder: *mut c_void) -> Result<*mut c_void, NvencError> {
        const OP: &str = "nvEncCreateBitstreamBuffer";
        let f = required(self.functions.nvEncCreateBitstreamBuffer, OP)?;
        let mut params = NvEncCreateBitstreamBuffer::default();
        check_nvenc_status(f(encoder, &mut params), OP)?;
        Ok(params.bitstream_buffer)
    }

    /// # Safety
    /// `buffer` must have been created on `encoder` and not destroyed yet.
    pub unsafe fn destroy_bitstream_buffer(
        &self,
        encoder: *mut c_void,
        buffer: *mut c_void,
    ) -> Result<(), NvencError> {
        const OP: &str = "nvEncDestroyBitstreamBuffer";
        let f = required(self.functions.nvEncDestroyBitstreamBuffer, OP)?;
        check_nvenc_status(f(encoder, buffer), OP)
    }

    /// # Safety
    /// The input and output handles in `params` must be live on `encoder`.
    pub unsafe fn encode_picture(
        &self,
        encoder: *mut c_void,
        params: &mut NvEncPicParams,
    ) -> Result<(), NvencError> {
        const OP: &str = "nvEncEncodePicture";
        let f = required(self.functions.nvEncEncodePicture, OP)?;
        check_nvenc_status(f(encoder, params), OP)
    }

    /// # Safety
    /// `params.output_bitstream` must be a live bitstream buffer on `encoder`.
    pub unsafe fn lock_bitstream(
        &self,
        encoder: *mut c_void,
        params: &mut NvEncLockBitstream,
    ) -> Result<(), NvencError> {
        const OP: &str = "nvEncLockBitstream";
        let f = required(self.functions.nvEncLockBitstream, OP)?;
        check_nvenc_status(f(encoder, params), OP)
    }

    /// # Safety
    /// `buffer` must currently be locked on `encoder`.
    pub unsafe fn unlock_bitstream(
        &self,
        encoder: *mut c_void,
        buffer: *mut c_void,
    ) -> Result<(), NvencError> {
        const OP: &str = "nvEncUnlockBitstream";
        let f = required(self.functions.nvEncUnlockBitstream, OP)?;
        check_nvenc_status(f(encoder, buffer), OP)
    }

    /// # Safety
    /// `params.resource_to_register` must be a live resource of `params.resource_type`.
    pub unsafe fn register_resource(
        &self,
        encoder: *mut c_void,
        params: &mut NvEncRegisterResource,
    ) -> Result<(), NvencError> {
        const OP: &str = "nvEncRegisterResource";
        let f = required(self.functions.nvEncRegisterResource, OP)?;
        check_nvenc_status(f(encoder, params), OP)
    }

    /// # Safety
    /// `registered` must be registered on `encoder` and not mapped.
    pub unsafe fn unregister_resource(
        &self,
        encoder: *mut c_void,
        registered: *mut c_void,
    ) -> Result<(), NvencError> {
        const OP: &str = "nvEncUnregisterResource";
        let f = required(self.functions.nvEncUnregisterResource, OP)?;
        check_nvenc_status(f(encoder, registered), OP)
    }

    /// # Safety
    /// `params.registered_resource` must be registered on `encoder`.
    pub unsafe fn map_input_resource(
        &self,
        encoder: *mut c_void,
        params: &mut NvEncMapInputResource,
    ) -> Result<(), NvencError> {
        const OP: &str = "nvEncMapInputResource";
        let f = required(self.functions.nvEncMapInputResource, OP)?;
        check_nvenc_status(f(encoder, params), OP)
    }

    /// # Safety
    /// `mapped` must be a live mapping on `encoder`.
    pub unsafe fn unmap_input_resource(
        &self,
        encoder: *mut c_void,
        mapped: *mut c_void,
    ) -> Result<(), NvencError> {
        const OP: &str = "nvEncUnmapInputResource";
        let f = required(self.functions.nvEncUnmapInputResource, OP)?;
        check_nvenc_status(f(encoder, mapped), OP)
    }

    /// # Safety
    /// `encoder` must be a live session handle; it is invalid afterwards.
    pub unsafe fn destroy_encoder(&self, encoder: *mut c_void) -> Result<(), NvencError> {
        const OP: &str = "nvEncDestroyEncoder";
        let f = required(self.functions.nvEncDestroyEncoder, OP)?;
        check_nvenc_status(f(encoder), OP)
    }
}

// ---------------------------------------------------------------------------
// Helper: Check NvencStatus and convert to Result
// ---------------------------------------------------------------------------

/// Convert an `NvencStatus` to a Result carrying the failing operation.
pub fn check_nvenc_status(status: NvencStatus, operation: &'static str) -> Result<(), NvencError> {
    if status == NV_ENC_SUCCESS {
        Ok(())
    } else {
        Err(NvencError { status, operation })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_versions_are_nonzero() {
        let session_params = NvEncOpenEncodeSessionExParams::default();
        assert_ne!(session_params.version, 0);
        assert_eq!(session_params.api_version, NVENCAPI_VERSION);

        let init_params = NvEncInitializeParams::default();
        assert_ne!(init_params.version, 0);
        assert_eq!(init_params.enable_ptd, 1);

        let config = NvEncConfig::default();
        assert_ne!(config.version, 0);
        assert_ne!(config.rc_params.version, 0);

        let pic_params = NvEncPicParams::default();
        assert_ne!(pic_params.version, 0);

        let lock = NvEncLockBitstream::default();
        assert_ne!(lock.version, 0);

        let list = NvEncodeApiFunctionList::default();
        assert_ne!(list.version, 0);
    }

    #[test]
    fn default_structs_are_zeroed_except_version() {
        let params = NvEncInitializeParams::default();
        assert_eq!(params.encode_width, 0);
        assert_eq!(params.frame_rate_num, 0);
        assert_eq!(params.enable_encode_async, 0);
        assert!(params.encode_config.is_null());

        let config = NvEncConfig::default();
        assert_eq!(config.gop_length, 0);
        assert_eq!(config.h264().idr_period, 0);
        assert_eq!(config.h264().flags, 0);
    }

    #[test]
    fn default_function_list_is_empty() {
        let list = NvEncodeApiFunctionList::default();
        assert!(list.nvEncOpenEncodeSessionEx.is_none());
        assert!(list.nvEncEncodePicture.is_none());
        assert!(list.nvEncReconfigureEncoder.is_none());
    }

    #[test]
    fn function_list_layout_matches_sdk() {
        // version + reserved, 33 slots, reserved1, 9 slots, 275 reserved pointers
        let ptr = std::mem::size_of::<*mut c_void>();
        assert_eq!(
            std::mem::size_of::<NvEncodeApiFunctionList>(),
            8 + (33 + 1 + 9 + 275) * ptr
        );
        assert_eq!(
            std::mem::offset_of!(NvEncodeApiFunctionList, nvEncGetEncodePresetConfigEx),
            8 + (33 + 1 + 5) * ptr
        );
    }

    #[test]
    fn rc_params_layout_matches_sdk() {
        assert_eq!(std::mem::size_of::<NvEncRcParams>(), 128);
        assert_eq!(std::mem::offset_of!(NvEncRcParams, flags), 36);
        assert_eq!(std::mem::offset_of!(NvEncRcParams, multi_pass), 100);
    }

    #[test]
    fn h264_view_writes_through_union() {
        let mut config = NvEncConfig::default();
        config.h264_mut().idr_period = 30;
        config.h264_mut().flags |= NV_ENC_H264_FLAG_REPEAT_SPS_PPS;
        assert_eq!(config.h264().idr_period, 30);
        assert_ne!(config.h264().flags & NV_ENC_H264_FLAG_REPEAT_SPS_PPS, 0);
    }

    #[test]
    fn nvenc_struct_version_packing() {
        let ver = nvenc_struct_version(1);
        assert_ne!(ver, 0);
        assert_ne!(ver, 1);
        assert_eq!(ver & 0xFFFF, 1);
    }

    #[test]
    fn supported_version_packing() {
        assert_eq!(NVENCAPI_SUPPORTED_VERSION, (12 << 4) | 2);
        assert!(NVENCAPI_SUPPORTED_VERSION > (11 << 4) | 1);
    }

    #[test]
    fn preset_and_profile_guids_are_distinct() {
        assert_ne!(NV_ENC_PRESET_P1_GUID, NV_ENC_CODEC_H264_GUID);
        let profiles = [
            NV_ENC_H264_PROFILE_BASELINE_GUID,
            NV_ENC_H264_PROFILE_MAIN_GUID,
            NV_ENC_H264_PROFILE_HIGH_GUID,
        ];
        for i in 0..profiles.len() {
            for j in (i + 1)..profiles.len() {
                assert_ne!(profiles[i], profiles[j], "Profile {i} and {j} have same GUID");
            }
        }
    }

    #[test]
    fn check_status_success() {
        assert!(check_nvenc_status(NV_ENC_SUCCESS, "test").is_ok());
    }

    #[test]
    fn check_status_failure_keeps_operation() {
        let err = check_nvenc_status(NV_ENC_ERR_INVALID_PARAM, "nvEncTest").unwrap_err();
        assert_eq!(err.status, NV_ENC_ERR_INVALID_PARAM);
        assert_eq!(err.operation, "nvEncTest");
    }

    #[test]
    fn missing_function_is_unimplemented() {
        let api = NvencApi::new(NvEncodeApiFunctionList::default(), None);
        // SAFETY: the slot is empty, so no driver code runs.
        let err = unsafe { api.destroy_encoder(std::ptr::null_mut()) }.unwrap_err();
        assert_eq!(err.status, NV_ENC_ERR_UNIMPLEMENTED);
        assert_eq!(err.operation, "nvEncDestroyEncoder");
    }

    #[test]
    fn buffer_format_values() {
        assert_eq!(NvEncBufferFormat::Nv12 as u32, 0x0000_0001);
        assert_eq!(NvEncBufferFormat::Argb as u32, 0x0100_0000);
        assert_eq!(NvEncBufferFormat::Abgr as u32, 0x1000_0000);
    }

    #[test]
    fn rc_mode_values() {
        assert_eq!(NvEncRcMode::ConstQp as u32, 0);
        assert_eq!(NvEncRcMode::Vbr as u32, 1);
        assert_eq!(NvEncRcMode::Cbr as u32, 2);
        assert_eq!(NvEncMultiPass::Disabled as u32, 0);
        assert_eq!(NvEncMultiPass::TwoPassQuarterResolution as u32, 1);
        assert_eq!(NvEncMultiPass::TwoPassFullResolution as u32, 2);
        assert_eq!(NvEncRcParams::default().multi_pass, NvEncMultiPass::Disabled);
    }

    #[test]
    fn force_idr_flag() {
        assert_eq!(NV_ENC_PIC_FLAG_FORCEIDR, 2);
        assert_eq!(NVENC_INFINITE_GOPLENGTH, u32::MAX);
    }
}
