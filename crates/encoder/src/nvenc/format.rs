//! Memory layout helpers for NVENC input buffer formats.
//!
//! Plane counts, chroma heights and row byte widths are needed to compute
//! the pitch an input resource is registered with.

use super::ffi::NvEncBufferFormat;

/// Number of chroma planes stored separately from luma.
///
/// Semi-planar formats carry one interleaved UV plane, planar formats two,
/// packed formats none. `None` for [`NvEncBufferFormat::Undefined`].
pub fn num_chroma_planes(format: NvEncBufferFormat) -> Option<u32> {
    use NvEncBufferFormat::*;
    match format {
        Nv12 | Yuv420_10bit => Some(1),
        Yv12 | Iyuv | Yuv444 | Yuv444_10bit => Some(2),
        Argb | Argb10 | Ayuv | Abgr | Abgr10 => Some(0),
        Undefined => None,
    }
}

/// Height in rows of each chroma plane for a frame `luma_height` rows tall.
pub fn chroma_height(format: NvEncBufferFormat, luma_height: u32) -> u32 {
    use NvEncBufferFormat::*;
    match format {
        Yv12 | Iyuv | Nv12 | Yuv420_10bit => (luma_height + 1) / 2,
        Yuv444 | Yuv444_10bit => luma_height,
        Argb | Argb10 | Ayuv | Abgr | Abgr10 | Undefined => 0,
    }
}

/// Bytes per luma row for a frame `width` pixels wide. 0 when unknown.
pub fn width_in_bytes(format: NvEncBufferFormat, width: u32) -> u32 {
    use NvEncBufferFormat::*;
    match format {
        Nv12 | Yv12 | Iyuv | Yuv444 => width,
        Yuv420_10bit | Yuv444_10bit => width * 2,
        Argb | Argb10 | Ayuv | Abgr | Abgr10 => width * 4,
        Undefined => 0,
    }
}

/// Whether the format stores all components interleaved in one plane.
pub fn is_packed(format: NvEncBufferFormat) -> bool {
    num_chroma_planes(format) == Some(0)
}
