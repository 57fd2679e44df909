//! NVENC input resource registration and output bitstream management.
//!
//! External GPU surfaces are handed to NVENC in two steps: registration
//! (once per surface) and mapping (the mapped handle is what an encode call
//! reads from). Output goes to driver-allocated bitstream buffers that are
//! locked to read the payload back.
//!
//! # Resource Lifecycle
//!
//! ```text
//! 1. Register native surface as NVENC input resource -> RegistrationToken
//! 2. Map the registered resource -> MappedToken
//! 3. Encode: pass mapped handle + output bitstream buffer to nvEncEncodePicture
//! 4. Lock output bitstream -> copy encoded data
//! 5. Unlock output bitstream
//! 6. (Repeat 3-5 for every frame that reuses the surface)
//! 7. Unmap, then unregister
//! ```

use std::ffi::c_void;

use tracing::{debug, warn};

use crate::error::EncoderError;

use super::ffi::{
    NvEncBufferFormat, NvEncInputResourceType, NvEncLockBitstream, NvEncMapInputResource,
    NvEncRegisterResource, NvencApi, NV_ENC_INPUT_IMAGE,
};
use super::format::width_in_bytes;

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

/// Handle returned by `nvEncRegisterResource`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegistrationToken(pub *mut c_void);

/// Handle returned by `nvEncMapInputResource`; used as the encode input.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MappedToken(pub *mut c_void);

// ---------------------------------------------------------------------------
// Input frame
// ---------------------------------------------------------------------------

/// One GPU-resident encoder input surface.
///
/// Holds a registration token while registered and a mapped token while
/// mapped. A frame is never mapped twice without an intervening unmap.
#[derive(Debug)]
pub struct InputFrame {
    /// Native resource that was registered (texture, device pointer, ...).
    pub native: *mut c_void,
    pub resource_type: NvEncInputResourceType,
    pub registered: Option<RegistrationToken>,
    pub mapped: Option<MappedToken>,
    /// Format the surface was registered with.
    pub format: NvEncBufferFormat,
    /// Format reported by the driver when mapped.
    pub mapped_format: NvEncBufferFormat,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
}

// SAFETY: InputFrame contains opaque NVENC handles and a native resource
// pointer. These are only accessed through the NVENC API on the encode thread.
unsafe impl Send for InputFrame {}

impl InputFrame {
    pub fn is_registered(&self) -> bool {
        self.registered.is_some()
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }
}

// ---------------------------------------------------------------------------
// Output bitstream
// ---------------------------------------------------------------------------

/// An NVENC output bitstream buffer.
///
/// Created once per ring slot during initialization and reused across frames.
#[derive(Debug)]
pub struct OutputBitstream {
    /// NVENC bitstream buffer handle (null once destroyed).
    pub handle: *mut c_void,
    /// Whether a lock is outstanding (set if an unlock failed).
    pub locked: bool,
}

// SAFETY: OutputBitstream contains an opaque NVENC handle that is only accessed
// through the NVENC API. The handle is valid for the encoder session lifetime.
unsafe impl Send for OutputBitstream {}

impl OutputBitstream {
    pub fn is_allocated(&self) -> bool {
        !self.handle.is_null()
    }
}

// ---------------------------------------------------------------------------
// Registrar
// ---------------------------------------------------------------------------

/// Issues resource calls against one live encode session.
///
/// Borrowed per operation from the owning session, so it can never outlive
/// the session handle.
pub struct Registrar<'a> {
    api: &'a NvencApi,
    encoder: *mut c_void,
}

impl std::fmt::Debug for Registrar<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registrar")
            .field("encoder", &self.encoder)
            .finish()
    }
}

impl<'a> Registrar<'a> {
    /// # Safety
    /// `encoder` must be a live session handle opened through `api`, and must
    /// stay live for the lifetime of the registrar.
    pub unsafe fn new(api: &'a NvencApi, encoder: *mut c_void) -> Self {
        Self { api, encoder }
    }

    /// Register a native surface as an encoder input image.
    ///
    /// CUDA arrays are registered with pitch = width; every other resource
    /// type with the row byte width of `format`.
    ///
    /// # Errors
    /// `UnsupportedFormat` if the format has no defined row width, or the
    /// driver error if registration fails.
    pub fn register(
        &self,
        resource_type: NvEncInputResourceType,
        native: *mut c_void,
        width: u32,
        height: u32,
        format: NvEncBufferFormat,
    ) -> Result<InputFrame, EncoderError> {
        if native.is_null() {
            warn!(width, height, ?format, "Registering null input resource");
        }

        let pitch = match resource_type {
            NvEncInputResourceType::CudaArray => width,
            _ => width_in_bytes(format, width),
        };
        if pitch == 0 {
            return Err(EncoderError::UnsupportedFormat(format as u32));
        }

        let mut params = NvEncRegisterResource {
            resource_type,
            width,
            height,
            pitch,
            resource_to_register: native,
            buffer_format: format,
            buffer_usage: NV_ENC_INPUT_IMAGE,
            ..NvEncRegisterResource::default()
        };

        // SAFETY: encoder is a live session (guaranteed at construction).
        // params is properly initialized; NVENC writes the registered handle
        // to params.registered_resource.
        unsafe { self.api.register_resource(self.encoder, &mut params) }?;

        debug!(width, height, pitch, ?format, "Registered NVENC input resource");

        Ok(InputFrame {
            native,
            resource_type,
            registered: Some(RegistrationToken(params.registered_resource)),
            mapped: None,
            format,
            mapped_format: NvEncBufferFormat::Undefined,
            width,
            height,
            pitch,
        })
    }

    /// Map a registered frame for use as encoder input.
    ///
    /// # Errors
    /// `AlreadyMapped` or `NotRegistered` without touching the driver, or
    /// the driver error if mapping fails.
    pub fn map(&self, frame: &mut InputFrame) -> Result<(), EncoderError> {
        if frame.mapped.is_some() {
            return Err(EncoderError::AlreadyMapped);
        }
        let registered = frame.registered.ok_or(EncoderError::NotRegistered)?;

        let mut params = NvEncMapInputResource {
            registered_resource: registered.0,
            ..NvEncMapInputResource::default()
        };

        // SAFETY: encoder is live and registered_resource came from a
        // successful nvEncRegisterResource call on it. NVENC writes the
        // mapped handle and format to the output fields.
        unsafe { self.api.map_input_resource(self.encoder, &mut params) }?;

        frame.mapped = Some(MappedToken(params.mapped_resource));
        frame.mapped_format = params.mapped_buffer_fmt;
        Ok(())
    }

    /// Unmap a frame. No-op if it is not mapped.
    pub fn unmap(&self, frame: &mut InputFrame) -> Result<(), EncoderError> {
        let Some(mapped) = frame.mapped else {
            return Ok(());
        };

        // SAFETY: encoder is live and the mapped handle came from a
        // successful nvEncMapInputResource call on it.
        unsafe { self.api.unmap_input_resource(self.encoder, mapped.0) }?;

        frame.mapped = None;
        Ok(())
    }

    /// Unregister a frame. No-op if it is not registered.
    ///
    /// # Errors
    /// `StillMapped` if the frame has not been unmapped first.
    pub fn unregister(&self, frame: &mut InputFrame) -> Result<(), EncoderError> {
        let Some(registered) = frame.registered else {
            return Ok(());
        };
        if frame.mapped.is_some() {
            return Err(EncoderError::StillMapped);
        }

        // SAFETY: encoder is live, the handle came from nvEncRegisterResource
        // and the resource is not mapped.
        unsafe { self.api.unregister_resource(self.encoder, registered.0) }?;

        frame.registered = None;
        Ok(())
    }

    /// Unmap then unregister.
    pub fn release(&self, frame: &mut InputFrame) -> Result<(), EncoderError> {
        self.unmap(frame)?;
        self.unregister(frame)
    }

    /// Unmap and unregister during teardown.
    ///
    /// A failed unmap does not stop the unregister. Both handles are dropped
    /// either way and the first error is returned.
    pub fn discard(&self, frame: &mut InputFrame) -> Result<(), EncoderError> {
        let unmapped = self.unmap(frame);
        if unmapped.is_err() {
            frame.mapped = None;
        }
        let unregistered = self.unregister(frame);
        if unregistered.is_err() {
            frame.registered = None;
        }
        unmapped.and(unregistered)
    }

    /// Allocate an output bitstream buffer.
    pub fn create_bitstream(&self) -> Result<OutputBitstream, EncoderError> {
        // SAFETY: encoder is a live, initialized session. NVENC writes the
        // buffer handle into the create params it is passed.
        let handle = unsafe { self.api.create_bitstream_buffer(self.encoder) }?;
        Ok(OutputBitstream {
            handle,
            locked: false,
        })
    }

    /// Destroy an output bitstream buffer. No-op if already destroyed.
    ///
    /// An outstanding lock is released first.
    pub fn destroy_bitstream(&self, output: &mut OutputBitstream) -> Result<(), EncoderError> {
        if !output.is_allocated() {
            return Ok(());
        }
        if output.locked {
            warn!("Destroying locked output bitstream, unlocking first");
            self.unlock_bitstream(output)?;
        }

        // SAFETY: encoder and buffer handles are valid and the buffer is not locked.
        unsafe { self.api.destroy_bitstream_buffer(self.encoder, output.handle) }?;

        output.handle = std::ptr::null_mut();
        Ok(())
    }

    /// Lock `output`, copy the encoded payload into `dst` and unlock.
    ///
    /// `dst` is resized to exactly the reported size (cleared for an empty
    /// payload). The lock always waits for the encode to finish.
    ///
    /// # Errors
    /// `BitstreamLocked` if a previous lock on this buffer was never released.
    pub fn read_bitstream(
        &self,
        output: &mut OutputBitstream,
        dst: &mut Vec<u8>,
    ) -> Result<usize, EncoderError> {
        if output.locked {
            return Err(EncoderError::BitstreamLocked);
        }

        let mut lock = NvEncLockBitstream {
            output_bitstream: output.handle,
            do_not_wait: 0,
            ..NvEncLockBitstream::default()
        };

        // SAFETY: encoder and output handles are valid. NVENC writes the
        // bitstream pointer and size to the lock struct.
        unsafe { self.api.lock_bitstream(self.encoder, &mut lock) }?;
        output.locked = true;

        let size = lock.bitstream_size_in_bytes as usize;
        if size == 0 || lock.bitstream_buffer_ptr.is_null() {
            dst.clear();
        } else {
            // SAFETY: NVENC guarantees bitstream_buffer_ptr points to at
            // least bitstream_size_in_bytes valid bytes while locked.
            let data = unsafe {
                std::slice::from_raw_parts(lock.bitstream_buffer_ptr as *const u8, size)
            };
            dst.clear();
            dst.extend_from_slice(data);
        }

        self.unlock_bitstream(output)?;
        Ok(dst.len())
    }

    /// Release an outstanding lock on `output`.
    pub fn unlock_bitstream(&self, output: &mut OutputBitstream) -> Result<(), EncoderError> {
        // SAFETY: the buffer is valid and currently locked on this encoder.
        unsafe { self.api.unlock_bitstream(self.encoder, output.handle) }?;
        output.locked = false;
        Ok(())
    }
}
