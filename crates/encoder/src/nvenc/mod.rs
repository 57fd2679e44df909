//! NVENC hardware video encoder module.
//!
//! Provides hardware-accelerated H.264 encoding on NVIDIA GPUs through the
//! NVENC API. The runtime is discovered at session initialization, so the
//! application can degrade gracefully if no NVIDIA hardware is present.
//!
//! # Module Structure
//!
//! - [`ffi`] -- Raw FFI bindings and the versioned function table.
//! - [`loader`] -- Runtime discovery and API version check.
//! - [`params`] -- Rate control and initialization parameter builders.
//! - [`registrar`] -- Input resource registration and output bitstreams.
//! - [`ring`] -- Fixed ring of in-flight frames.
//! - [`format`] -- Buffer format layout helpers.
//! - [`NvEncoder`] -- Session controller and encode pipeline.
//!
//! # Architecture
//!
//! 1. Construct an [`NvEncoder`] with the device, capture sink and settings.
//! 2. [`NvEncoder::initialize`] loads the runtime, opens and configures the
//!    session and allocates the frame ring (texture, registered + mapped
//!    input, output bitstream per slot).
//! 3. For each frame:
//!    a. [`NvEncoder::copy_buffer`] copies the captured frame into the
//!       current slot's texture.
//!    b. [`NvEncoder::encode_frame`] applies pending rate changes, encodes
//!       the slot, locks and copies the bitstream, and hands the result to
//!       the capture sink.
//! 4. [`NvEncoder::shutdown`] (or drop) releases the ring and the session.
//!
//! # Usage
//!
//! ```ignore
//! use rtc_encoder::nvenc::{NvEncoder, NvEncoderConfig};
//!
//! let config = NvEncoderConfig::new(Resolution::HD_720, settings);
//! let mut encoder = NvEncoder::new(config, Box::new(device), Box::new(frame_tx));
//! encoder.initialize()?;
//!
//! for frame in captured_frames {
//!     if encoder.copy_buffer(frame)? {
//!         encoder.encode_frame()?;
//!     }
//! }
//! ```

pub mod ffi;
pub mod format;
pub mod loader;
pub mod params;
pub mod registrar;
pub mod ring;

// Re-export primary public types
pub use ffi::{NvEncBufferFormat, NvEncDeviceType, NvEncInputResourceType, NvencApi};
pub use loader::{load_codec, unload_runtime, EntryPoints, ModuleSource};
pub use registrar::{InputFrame, OutputBitstream, Registrar};
pub use ring::{FrameRing, RING_CAPACITY};

use std::ffi::c_void;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use rtc_common::{
    CaptureSink, EncodedFrame, EncoderId, GraphicsDevice, HwSettings, NativeFrame, Resolution,
};

use crate::error::{CodecInitializationResult, EncoderError};
use crate::session::{EncoderStats, SessionState, StatsTracker};
use crate::timestamp::{Clock, SystemClock, TimestampAligner};

use ffi::{
    NvEncConfig, NvEncInitializeParams, NvEncOpenEncodeSessionExParams, NvEncPicParams,
    NvEncPresetConfig, NvEncReconfigureParams, NV_ENC_CAPS_ASYNC_ENCODE_SUPPORT,
    NV_ENC_CODEC_H264_GUID, NV_ENC_PIC_FLAG_FORCEIDR, NV_ENC_PIC_STRUCT_FRAME,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Fixed properties of an encoder session.
#[derive(Clone, Debug)]
pub struct NvEncoderConfig {
    /// Device API the session is opened against.
    pub device_type: NvEncDeviceType,
    /// Kind of native resource the device hands out for registration.
    pub input_resource_type: NvEncInputResourceType,
    /// Layout of the input textures.
    pub buffer_format: NvEncBufferFormat,
    /// Encode resolution.
    pub resolution: Resolution,
    pub settings: HwSettings,
    /// Where to find the NVENC runtime.
    pub source: ModuleSource,
}

impl NvEncoderConfig {
    /// D3D11-style defaults: DirectX device and textures, ARGB input, system runtime.
    pub fn new(resolution: Resolution, settings: HwSettings) -> Self {
        Self {
            device_type: NvEncDeviceType::Directx,
            input_resource_type: NvEncInputResourceType::Directx,
            buffer_format: NvEncBufferFormat::Argb,
            resolution,
            settings,
            source: ModuleSource::System,
        }
    }

    /// Defaults as in [`new`](Self::new) with settings loaded from a JSON file.
    pub fn from_settings_file(resolution: Resolution, path: &Path) -> Result<Self, EncoderError> {
        let settings = HwSettings::load(path)?;
        Ok(Self::new(resolution, settings))
    }
}

// ---------------------------------------------------------------------------
// NvEncoder
// ---------------------------------------------------------------------------

/// NVENC encoder session: lifecycle, live reconfiguration and the encode
/// pipeline over a fixed ring of GPU frames.
///
/// # Resource Management (RAII)
///
/// The ring and the encoder session are released by [`shutdown`](Self::shutdown),
/// which also runs on drop. The function table is shared with the loader and
/// outlives the session.
pub struct NvEncoder {
    config: NvEncoderConfig,
    device: Box<dyn GraphicsDevice>,
    sink: Box<dyn CaptureSink>,
    clock: Box<dyn Clock>,
    /// Function table, kept across shutdown so the session can be reinitialized.
    api: Option<Arc<NvencApi>>,
    /// NVENC encoder handle (null outside initialize..shutdown).
    encoder: *mut c_void,
    state: SessionState,
    init_result: CodecInitializationResult,
    init_params: NvEncInitializeParams,
    /// Boxed for a stable address: `init_params.encode_config` points into it.
    enc_config: Box<NvEncConfig>,
    ring: FrameRing,
    encoder_id: EncoderId,
    target_bitrate: u32,
    target_framerate: u32,
    idr_pending: bool,
    aligner: TimestampAligner,
    stats: StatsTracker,
}

// SAFETY: NvEncoder contains raw pointers to NVENC handles and to its own
// boxed config. The encoder handle is only accessed through the NVENC API
// from whichever single thread owns the NvEncoder. NvEncoder is Send but
// NOT Sync.
unsafe impl Send for NvEncoder {}

impl std::fmt::Debug for NvEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NvEncoder")
            .field("encoder_id", &self.encoder_id)
            .field("resolution", &self.config.resolution)
            .field("state", &self.state)
            .field("init_result", &self.init_result)
            .field("frame_count", &self.ring.frame_count())
            .field("target_bitrate", &self.target_bitrate)
            .field("target_framerate", &self.target_framerate)
            .finish()
    }
}

impl NvEncoder {
    /// Create an encoder in the `Uninitialized` state. No driver work happens
    /// until [`initialize`](Self::initialize).
    ///
    /// # Panics
    /// If the configured width or height is zero.
    pub fn new(
        config: NvEncoderConfig,
        device: Box<dyn GraphicsDevice>,
        sink: Box<dyn CaptureSink>,
    ) -> Self {
        assert!(
            config.resolution.width > 0 && config.resolution.height > 0,
            "Encoder resolution must be non-zero, got {}",
            config.resolution
        );

        let target_bitrate = params::initial_bitrate(config.resolution, &config.settings);
        let target_framerate = config.settings.default_framerate;

        Self {
            config,
            device,
            sink,
            clock: Box::new(SystemClock::default()),
            api: None,
            encoder: std::ptr::null_mut(),
            state: SessionState::Uninitialized,
            init_result: CodecInitializationResult::NotInitialized,
            init_params: NvEncInitializeParams::default(),
            enc_config: Box::default(),
            ring: FrameRing::new(),
            encoder_id: EncoderId::default(),
            target_bitrate,
            target_framerate,
            idr_pending: false,
            aligner: TimestampAligner::new(),
            stats: StatsTracker::default(),
        }
    }

    /// Replace the clock used to timestamp encoded frames.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Cached outcome of the last initialization attempt.
    pub fn initialization_result(&self) -> CodecInitializationResult {
        self.init_result
    }

    /// Forget the cached initialization outcome so the next `initialize`
    /// probes the runtime again.
    pub fn reset_initialization_result(&mut self) {
        self.init_result = CodecInitializationResult::NotInitialized;
        if !self.state.has_resources() {
            self.api = None;
        }
    }

    /// Frames successfully encoded by this session.
    pub fn frame_count(&self) -> u64 {
        self.ring.frame_count()
    }

    pub fn encoder_id(&self) -> EncoderId {
        self.encoder_id
    }

    pub fn set_encoder_id(&mut self, id: EncoderId) {
        self.encoder_id = id;
    }

    pub fn resolution(&self) -> Resolution {
        self.config.resolution
    }

    pub fn config(&self) -> &NvEncoderConfig {
        &self.config
    }

    /// Average bitrate the hardware is currently configured with.
    pub fn active_bitrate(&self) -> u32 {
        self.enc_config.rc_params.average_bitrate
    }

    /// Frame rate the hardware is currently configured with.
    pub fn active_framerate(&self) -> u32 {
        self.init_params.frame_rate_num
    }

    /// Most recently requested `(bitrate, framerate)`.
    pub fn target_rates(&self) -> (u32, u32) {
        (self.target_bitrate, self.target_framerate)
    }

    /// Whether the next encoded frame will be a forced IDR.
    pub fn is_idr_pending(&self) -> bool {
        self.idr_pending
    }

    pub fn ring(&self) -> &FrameRing {
        &self.ring
    }

    pub fn stats(&self) -> EncoderStats {
        self.stats.snapshot()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Bring up the hardware session.
    ///
    /// Loads the runtime (unless a previous attempt already failed), opens a
    /// session on the graphics device, applies the H.264 low-latency config
    /// and allocates the frame ring.
    ///
    /// # Errors
    /// `Unavailable` with the cached result if the runtime cannot be used,
    /// the driver error if the session cannot be opened or initialized, or
    /// the device / registration error if ring allocation fails. On any
    /// error the session ends up `Failed` with nothing left allocated.
    pub fn initialize(&mut self) -> Result<(), EncoderError> {
        if !self.state.can_initialize() {
            return Err(EncoderError::InvalidState {
                operation: "initialize",
                state: self.state,
            });
        }
        self.state = SessionState::Initializing;

        let api = match self.load_api() {
            Ok(api) => api,
            Err(result) => {
                self.state = SessionState::Failed;
                return Err(EncoderError::Unavailable(result));
            }
        };

        let mut open_params = NvEncOpenEncodeSessionExParams {
            device_type: self.config.device_type,
            device: self.device.encode_device(),
            ..NvEncOpenEncodeSessionExParams::default()
        };

        // SAFETY: the graphics device collaborator guarantees its encode
        // device handle is live for the device type it was configured with.
        match unsafe { api.open_encode_session_ex(&mut open_params) } {
            Ok(encoder) => self.encoder = encoder,
            Err(e) => {
                error!(error = %e, "Failed to open NVENC session");
                self.init_result = CodecInitializationResult::EncoderInitializationFailed;
                self.state = SessionState::Failed;
                return Err(e.into());
            }
        }

        if let Err(e) = self.configure_session(&api) {
            error!(error = %e, "Failed to initialize NVENC encoder");
            self.abort_initialization(&api);
            return Err(e);
        }

        if let Err(e) = self.allocate_ring(&api) {
            error!(error = %e, "Failed to allocate encoder frame ring");
            self.abort_initialization(&api);
            return Err(e);
        }

        self.init_result = CodecInitializationResult::Success;
        self.state = SessionState::Ready;

        info!(
            encoder_id = %self.encoder_id,
            resolution = %self.config.resolution,
            bitrate = self.active_bitrate(),
            framerate = self.active_framerate(),
            format = ?self.config.buffer_format,
            "NVENC encoder initialized"
        );
        Ok(())
    }

    /// Release the frame ring and destroy the session.
    ///
    /// Idempotent: a no-op if the session was never initialized or is
    /// already destroyed. Driver failures are logged.
    pub fn shutdown(&mut self) {
        if !self.state.has_resources() {
            return;
        }
        self.state = SessionState::ShuttingDown;

        if let Some(api) = self.api.clone() {
            self.release_session(&api);
        }
        self.state = SessionState::Destroyed;

        info!(
            encoder_id = %self.encoder_id,
            frames_encoded = self.ring.frame_count(),
            "NVENC encoder destroyed"
        );
    }

    /// Record new rate-control targets. Applied lazily before the next
    /// encode, which is also forced to be an IDR.
    pub fn set_rates(&mut self, bitrate: u32, framerate: u32) {
        debug!(bitrate, framerate, "Rate targets updated");
        self.target_bitrate = bitrate;
        self.target_framerate = framerate;
        self.idr_pending = true;
    }

    /// Push changed rate targets to the hardware.
    ///
    /// Returns whether a reconfigure call was issued. On failure the active
    /// configuration is left untouched and the request stays pending.
    pub fn reconfigure(&mut self) -> Result<bool, EncoderError> {
        let api = self.live_api("reconfigure")?;

        let bitrate = self.target_bitrate;
        let framerate = params::clamp_framerate(self.target_framerate, &self.config.settings);
        let previous_bitrate = self.active_bitrate();
        let previous_framerate = self.active_framerate();
        if bitrate == previous_bitrate && framerate == previous_framerate {
            return Ok(false);
        }

        self.state = SessionState::Reconfiguring;
        params::apply_rates(&mut self.init_params, &mut self.enc_config, bitrate, framerate);
        let mut reconfigure_params = NvEncReconfigureParams::new(self.init_params);

        // SAFETY: encoder is live and initialized; the reconfigure block
        // carries init params whose encode_config points at our boxed config.
        let result = unsafe { api.reconfigure_encoder(self.encoder, &mut reconfigure_params) };
        self.state = SessionState::Ready;

        match result {
            Ok(()) => {
                self.stats.record_reconfigure();
                debug!(
                    bitrate,
                    framerate,
                    previous_bitrate,
                    previous_framerate,
                    "NVENC encoder reconfigured"
                );
                Ok(true)
            }
            Err(e) => {
                params::apply_rates(
                    &mut self.init_params,
                    &mut self.enc_config,
                    previous_bitrate,
                    previous_framerate,
                );
                Err(e.into())
            }
        }
    }

    // -----------------------------------------------------------------------
    // Encode pipeline
    // -----------------------------------------------------------------------

    /// Copy a captured frame into the current ring slot's texture.
    ///
    /// Returns `Ok(false)` without copying if the slot has no texture (the
    /// session is not initialized).
    pub fn copy_buffer(&mut self, source: NativeFrame) -> Result<bool, EncoderError> {
        let Some(texture) = self.ring.current().texture.as_ref() else {
            return Ok(false);
        };
        self.device.copy_resource_from_native(texture, source)?;
        Ok(true)
    }

    /// Encode the current ring slot and deliver the result to the sink.
    ///
    /// Pending rate changes are applied first; if that fails the frame is
    /// still encoded with the previous rates. The frame counter only
    /// advances once the frame has been delivered.
    pub fn encode_frame(&mut self) -> Result<(), EncoderError> {
        let api = self.live_api("encode_frame")?;

        if let Err(e) = self.reconfigure() {
            warn!(error = %e, "Reconfigure failed, encoding with previous rates");
        }

        let frame_number = self.ring.frame_count();
        let index = self.ring.current_index();
        let forced_keyframe = self.idr_pending;

        self.unlock_pending_output(&api, index)?;

        let slot = self.ring.current();
        let input = slot
            .input
            .as_ref()
            .ok_or(EncoderError::SlotNotAllocated(index))?;
        let mapped = input.mapped.ok_or(EncoderError::NotMapped)?;
        let output = slot
            .output
            .as_ref()
            .filter(|output| output.is_allocated())
            .ok_or(EncoderError::SlotNotAllocated(index))?;

        let mut pic_params = NvEncPicParams {
            input_width: self.config.resolution.width,
            input_height: self.config.resolution.height,
            input_pitch: input.pitch,
            input_buffer: mapped.0,
            output_bitstream: output.handle,
            buffer_fmt: self.config.buffer_format,
            picture_struct: NV_ENC_PIC_STRUCT_FRAME,
            input_time_stamp: frame_number,
            frame_idx: frame_index(frame_number),
            encode_pic_flags: if forced_keyframe {
                NV_ENC_PIC_FLAG_FORCEIDR
            } else {
                0
            },
            ..NvEncPicParams::default()
        };

        // SAFETY: encoder is live. pic_params references the slot's mapped
        // input and allocated output bitstream, both owned by this session.
        unsafe { api.encode_picture(self.encoder, &mut pic_params) }?;
        self.idr_pending = false;

        let frame = self.retrieve(&api, index, frame_number, forced_keyframe)?;
        self.stats.record_frame(frame.data.len(), forced_keyframe);
        self.sink.on_encoded_frame(frame);
        self.ring.advance();
        Ok(())
    }

    /// Retry the unlock of a bitstream left locked by an earlier failed read.
    ///
    /// Nothing is submitted into a slot whose output is still locked.
    fn unlock_pending_output(&mut self, api: &NvencApi, index: usize) -> Result<(), EncoderError> {
        // SAFETY: encoder is live for as long as this borrow of self.
        let registrar = unsafe { Registrar::new(api, self.encoder) };
        let Some(output) = self.ring.current_mut().output.as_mut() else {
            return Ok(());
        };
        if !output.locked {
            return Ok(());
        }

        warn!(index, "Output bitstream still locked, retrying unlock");
        registrar.unlock_bitstream(output).map_err(|e| {
            error!(index, error = %e, "Failed to unlock output bitstream");
            EncoderError::BitstreamLocked
        })
    }

    /// Lock the slot's bitstream, copy the payload out and wrap it for the sink.
    fn retrieve(
        &mut self,
        api: &NvencApi,
        index: usize,
        frame_number: u64,
        forced_keyframe: bool,
    ) -> Result<EncodedFrame, EncoderError> {
        // SAFETY: encoder is live for as long as this borrow of self.
        let registrar = unsafe { Registrar::new(api, self.encoder) };
        let slot = self.ring.current_mut();
        let output = slot
            .output
            .as_mut()
            .ok_or(EncoderError::SlotNotAllocated(index))?;
        registrar.read_bitstream(output, &mut slot.encoded)?;
        let data = slot.encoded.clone();

        let capture_time_us = self.clock.capture_time_us();
        let timestamp_us = self
            .aligner
            .translate(capture_time_us, self.clock.system_time_us());

        Ok(EncodedFrame {
            resolution: self.config.resolution,
            encoder_id: self.encoder_id,
            data,
            frame_number,
            forced_keyframe,
            timestamp_us,
            ntp_time_ms: self.clock.ntp_time_ms(),
        })
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Reuse the cached function table or run the loader.
    fn load_api(&mut self) -> Result<Arc<NvencApi>, CodecInitializationResult> {
        match self.init_result {
            CodecInitializationResult::NotInitialized | CodecInitializationResult::Success => {}
            cached => return Err(cached),
        }
        if let Some(api) = &self.api {
            return Ok(api.clone());
        }

        match loader::load_codec(&self.config.source) {
            Ok(api) => {
                self.api = Some(api.clone());
                Ok(api)
            }
            Err(result) => {
                self.init_result = result;
                Err(result)
            }
        }
    }

    /// The function table, if the session is ready for `operation`.
    fn live_api(&self, operation: &'static str) -> Result<Arc<NvencApi>, EncoderError> {
        match (&self.api, self.state) {
            (Some(api), SessionState::Ready) if !self.encoder.is_null() => Ok(api.clone()),
            _ => Err(EncoderError::InvalidState {
                operation,
                state: self.state,
            }),
        }
    }

    /// Preset config + session overlay, async capability probe, initialize.
    fn configure_session(&mut self, api: &NvencApi) -> Result<(), EncoderError> {
        let resolution = self.config.resolution;
        let bitrate = self.target_bitrate;
        let framerate = params::clamp_framerate(self.target_framerate, &self.config.settings);

        let mut preset = NvEncPresetConfig::default();
        // SAFETY: encoder is a freshly opened session handle.
        unsafe {
            api.get_encode_preset_config_ex(
                self.encoder,
                NV_ENC_CODEC_H264_GUID,
                params::SESSION_PRESET,
                params::SESSION_TUNING,
                &mut preset,
            )
        }?;

        *self.enc_config = preset.preset_cfg;
        params::apply_session_config(&mut self.enc_config, &self.config.settings, bitrate, framerate);

        self.init_params = params::build_init_params(resolution, framerate);
        self.init_params.encode_config = &mut *self.enc_config;

        // SAFETY: encoder is a live session handle.
        match unsafe {
            api.get_encode_caps(self.encoder, NV_ENC_CODEC_H264_GUID, NV_ENC_CAPS_ASYNC_ENCODE_SUPPORT)
        } {
            Ok(value) => debug!(async_supported = value != 0, "Queried NVENC async encode support"),
            Err(e) => debug!(error = %e, "NVENC async encode query failed"),
        }
        self.init_params.enable_encode_async = 0;

        // SAFETY: encoder is live and init_params.encode_config points at
        // the boxed config, which lives as long as the session.
        unsafe { api.initialize_encoder(self.encoder, &mut self.init_params) }?;
        Ok(())
    }

    fn allocate_ring(&mut self, api: &NvencApi) -> Result<(), EncoderError> {
        // SAFETY: encoder is live until release_session.
        let registrar = unsafe { Registrar::new(api, self.encoder) };
        self.ring.allocate(
            &registrar,
            self.device.as_mut(),
            self.config.input_resource_type,
            self.config.buffer_format,
            self.config.resolution.width,
            self.config.resolution.height,
        )
    }

    /// Release the ring and destroy the session handle.
    fn release_session(&mut self, api: &NvencApi) {
        if self.encoder.is_null() {
            return;
        }
        {
            // SAFETY: encoder is live until destroyed below.
            let registrar = unsafe { Registrar::new(api, self.encoder) };
            self.ring.teardown(&registrar, self.device.as_mut());
        }

        debug!("Destroying NVENC encoder session");
        // SAFETY: encoder is a valid handle from nvEncOpenEncodeSessionEx and
        // every resource created on it has been released.
        if let Err(e) = unsafe { api.destroy_encoder(self.encoder) } {
            error!(error = %e, "Failed to destroy NVENC encoder session");
        }
        self.encoder = std::ptr::null_mut();
    }

    fn abort_initialization(&mut self, api: &NvencApi) {
        self.release_session(api);
        self.init_result = CodecInitializationResult::EncoderInitializationFailed;
        self.state = SessionState::Failed;
    }
}

/// NVENC frame index for a frame counter. Wraps at `u32::MAX`.
fn frame_index(frame_number: u64) -> u32 {
    (frame_number & u64::from(u32::MAX)) as u32
}

impl Drop for NvEncoder {
    fn drop(&mut self) {
        self.shutdown();
    }
}
