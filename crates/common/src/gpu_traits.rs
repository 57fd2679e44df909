//! Graphics device abstraction consumed by the hardware encoder.
//!
//! The encoder never allocates or copies GPU memory itself. It programs
//! against [`GraphicsDevice`], which D3D11/D3D12/CUDA/OpenGL backends
//! implement outside this workspace.

use std::ffi::c_void;

use crate::error::GpuError;

/// Graphics device collaborator used by an encoder session.
pub trait GraphicsDevice: Send {
    /// Native device handle the encode session is opened against
    /// (`ID3D11Device*`, `CUcontext`, ...).
    fn encode_device(&self) -> *mut c_void;

    /// Allocate a texture the encoder can read from.
    fn create_default_texture(&mut self, width: u32, height: u32) -> Result<GpuTexture, GpuError>;

    /// Copy an externally owned frame into `dst`.
    fn copy_resource_from_native(
        &mut self,
        dst: &GpuTexture,
        src: NativeFrame,
    ) -> Result<(), GpuError>;

    /// Native resource handle that can be registered with the encoder for `texture`.
    fn input_resource(&mut self, texture: &GpuTexture) -> Result<*mut c_void, GpuError>;

    /// Release a texture created by [`create_default_texture`](Self::create_default_texture).
    fn release_texture(&mut self, _texture: GpuTexture) {}
}

/// Opaque GPU 2D texture handle.
#[derive(Debug)]
pub struct GpuTexture {
    /// Backend-specific handle.
    pub handle: u64,
    pub width: u32,
    pub height: u32,
    /// Row pitch in bytes as allocated by the backend (0 if unknown).
    pub pitch: u32,
}

/// Externally owned frame handed to the encoder for copying.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct NativeFrame(pub *mut c_void);

// SAFETY: NativeFrame is an opaque handle owned by the capture pipeline. It
// is only dereferenced by the GraphicsDevice implementation on the encode thread.
unsafe impl Send for NativeFrame {}

impl NativeFrame {
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}
