//! In-process fake NVENC runtime and collaborators for integration tests.
//!
//! The fake driver lives in a thread-local, so every test (each runs on its
//! own thread) gets an isolated driver. Entry points are handed to the
//! encoder through `ModuleSource::Static`; no library is ever loaded.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::ffi::c_void;
use std::sync::Arc;

use crossbeam::channel::{self, Receiver};
use parking_lot::Mutex;

use rtc_common::{
    EncodedFrame, GpuError, GpuTexture, GraphicsDevice, HwSettings, NativeFrame, Resolution,
};
use rtc_encoder::nvenc::ffi::{
    NvEncBufferFormat, NvEncCapsParam, NvEncCreateBitstreamBuffer, NvEncInitializeParams,
    NvEncLockBitstream, NvEncMapInputResource, NvEncOpenEncodeSessionExParams, NvEncPicParams,
    NvEncPresetConfig, NvEncReconfigureParams, NvEncRegisterResource, NvEncodeApiFunctionList,
    NvGuid, NvencStatus, NVENCAPI_SUPPORTED_VERSION, NV_ENC_ERR_INVALID_CALL,
    NV_ENC_ERR_INVALID_PARAM, NV_ENC_PRESET_P1_GUID, NV_ENC_SUCCESS,
};
use rtc_encoder::nvenc::{EntryPoints, ModuleSource, NvEncoder, NvEncoderConfig};
use rtc_encoder::Clock;

// ---------------------------------------------------------------------------
// Fake driver state
// ---------------------------------------------------------------------------

/// One `nvEncEncodePicture` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodeRecord {
    pub flags: u32,
    pub frame_idx: u32,
    pub timestamp: u64,
    pub input: usize,
    pub output: usize,
    pub pitch: u32,
}

/// Parameters seen by `nvEncInitializeEncoder`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InitRecord {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub enable_async: u32,
    pub enable_ptd: u32,
    pub max_width: u32,
    pub max_height: u32,
    pub bitrate: u32,
    pub idr_period: u32,
    pub preset_guid: NvGuid,
    pub tuning_info: u32,
    pub rate_control_mode: u32,
    pub multi_pass: u32,
}

#[derive(Debug)]
pub struct FakeDriver {
    /// Reported by `NvEncodeAPIGetMaxSupportedVersion`.
    pub max_version: u32,
    /// Every API call in order.
    pub calls: Vec<&'static str>,
    /// Operations that fail with `NV_ENC_ERR_INVALID_CALL`.
    pub fail: HashSet<&'static str>,
    /// Bytes returned by every bitstream lock.
    pub payload: Vec<u8>,
    pub async_caps: i32,

    pub open_sessions: HashSet<usize>,
    pub registered: HashSet<usize>,
    pub mapped: HashSet<usize>,
    pub bitstreams: HashSet<usize>,
    pub locked: HashSet<usize>,

    /// `(preset, tuning)` of the last preset config query.
    pub preset_query: Option<(NvGuid, u32)>,
    pub init: Option<InitRecord>,
    pub encodes: Vec<EncodeRecord>,
    /// Successful reconfigures as `(bitrate, framerate)`.
    pub reconfigures: Vec<(u32, u32)>,

    next_handle: usize,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self {
            max_version: NVENCAPI_SUPPORTED_VERSION,
            calls: Vec::new(),
            fail: HashSet::new(),
            payload: vec![0, 0, 0, 1, 0x65, 0x88, 0x84],
            async_caps: 1,
            open_sessions: HashSet::new(),
            registered: HashSet::new(),
            mapped: HashSet::new(),
            bitstreams: HashSet::new(),
            locked: HashSet::new(),
            preset_query: None,
            init: None,
            encodes: Vec::new(),
            reconfigures: Vec::new(),
            next_handle: 0,
        }
    }
}

impl FakeDriver {
    pub fn failing(ops: &[&'static str]) -> Self {
        Self {
            fail: ops.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// Driver reporting `version` as its highest supported API.
    pub fn with_max_version(version: u32) -> Self {
        Self {
            max_version: version,
            ..Self::default()
        }
    }

    /// Number of calls to `op`.
    pub fn count(&self, op: &str) -> usize {
        self.calls.iter().filter(|call| **call == op).count()
    }

    /// Whether every driver resource has been released.
    pub fn is_idle(&self) -> bool {
        self.open_sessions.is_empty()
            && self.registered.is_empty()
            && self.mapped.is_empty()
            && self.bitstreams.is_empty()
            && self.locked.is_empty()
    }

    fn handle(&mut self) -> usize {
        self.next_handle += 1;
        0x1000 + self.next_handle * 0x10
    }

    /// Log `op` and report whether it should fail.
    fn enter(&mut self, op: &'static str) -> NvencStatus {
        self.calls.push(op);
        if self.fail.contains(op) {
            NV_ENC_ERR_INVALID_CALL
        } else {
            NV_ENC_SUCCESS
        }
    }
}

thread_local! {
    static DRIVER: RefCell<FakeDriver> = RefCell::new(FakeDriver::default());
}

/// Replace this thread's fake driver.
pub fn install(driver: FakeDriver) {
    init_tracing();
    DRIVER.with(|d| *d.borrow_mut() = driver);
}

/// Inspect or modify this thread's fake driver.
pub fn with_driver<R>(f: impl FnOnce(&mut FakeDriver) -> R) -> R {
    DRIVER.with(|d| f(&mut d.borrow_mut()))
}

pub fn fake_source() -> ModuleSource {
    ModuleSource::Static(EntryPoints {
        get_max_supported_version: Some(get_max_supported_version),
        create_instance: Some(create_instance),
    })
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Entry points and API doubles
// ---------------------------------------------------------------------------

unsafe extern "C" fn get_max_supported_version(version: *mut u32) -> NvencStatus {
    let (status, max) = with_driver(|d| (d.enter("NvEncodeAPIGetMaxSupportedVersion"), d.max_version));
    if status == NV_ENC_SUCCESS {
        *version = max;
    }
    status
}

unsafe extern "C" fn create_instance(list: *mut NvEncodeApiFunctionList) -> NvencStatus {
    let status = with_driver(|d| d.enter("NvEncodeAPICreateInstance"));
    if status != NV_ENC_SUCCESS {
        return status;
    }
    let list = &mut *list;
    list.nvEncOpenEncodeSessionEx = Some(open_encode_session_ex);
    list.nvEncGetEncodePresetConfigEx = Some(get_encode_preset_config_ex);
    list.nvEncGetEncodeCaps = Some(get_encode_caps);
    list.nvEncInitializeEncoder = Some(initialize_encoder);
    list.nvEncReconfigureEncoder = Some(reconfigure_encoder);
    list.nvEncCreateBitstreamBuffer = Some(create_bitstream_buffer);
    list.nvEncDestroyBitstreamBuffer = Some(destroy_bitstream_buffer);
    list.nvEncEncodePicture = Some(encode_picture);
    list.nvEncLockBitstream = Some(lock_bitstream);
    list.nvEncUnlockBitstream = Some(unlock_bitstream);
    list.nvEncRegisterResource = Some(register_resource);
    list.nvEncUnregisterResource = Some(unregister_resource);
    list.nvEncMapInputResource = Some(map_input_resource);
    list.nvEncUnmapInputResource = Some(unmap_input_resource);
    list.nvEncDestroyEncoder = Some(destroy_encoder);
    NV_ENC_SUCCESS
}

unsafe extern "C" fn open_encode_session_ex(
    params: *mut NvEncOpenEncodeSessionExParams,
    encoder: *mut *mut c_void,
) -> NvencStatus {
    let params = &*params;
    with_driver(|d| {
        let status = d.enter("nvEncOpenEncodeSessionEx");
        if status != NV_ENC_SUCCESS {
            return status;
        }
        if params.device.is_null() {
            return NV_ENC_ERR_INVALID_PARAM;
        }
        let handle = d.handle();
        d.open_sessions.insert(handle);
        *encoder = handle as *mut c_void;
        NV_ENC_SUCCESS
    })
}

/// SDK 12 drivers only know the P1..P7 presets, and need a tuning info.
unsafe extern "C" fn get_encode_preset_config_ex(
    encoder: *mut c_void,
    _encode_guid: NvGuid,
    preset_guid: NvGuid,
    tuning_info: u32,
    preset: *mut NvEncPresetConfig,
) -> NvencStatus {
    with_driver(|d| {
        let status = d.enter("nvEncGetEncodePresetConfigEx");
        if status != NV_ENC_SUCCESS {
            return status;
        }
        d.preset_query = Some((preset_guid, tuning_info));
        if !d.open_sessions.contains(&(encoder as usize))
            || preset_guid != NV_ENC_PRESET_P1_GUID
            || tuning_info == 0
        {
            return NV_ENC_ERR_INVALID_PARAM;
        }
        let preset = &mut *preset;
        preset.preset_cfg.gop_length = 250;
        preset.preset_cfg.frame_interval_p = 1;
        NV_ENC_SUCCESS
    })
}

unsafe extern "C" fn get_encode_caps(
    _encoder: *mut c_void,
    _encode_guid: NvGuid,
    _caps_param: *mut NvEncCapsParam,
    caps_val: *mut i32,
) -> NvencStatus {
    with_driver(|d| {
        let status = d.enter("nvEncGetEncodeCaps");
        if status == NV_ENC_SUCCESS {
            *caps_val = d.async_caps;
        }
        status
    })
}

unsafe extern "C" fn initialize_encoder(
    encoder: *mut c_void,
    params: *mut NvEncInitializeParams,
) -> NvencStatus {
    let params = &*params;
    with_driver(|d| {
        let status = d.enter("nvEncInitializeEncoder");
        if status != NV_ENC_SUCCESS {
            return status;
        }
        if !d.open_sessions.contains(&(encoder as usize)) || params.encode_config.is_null() {
            return NV_ENC_ERR_INVALID_PARAM;
        }
        let config = &*params.encode_config;
        // Pre-SDK-12 rate control modes are gone.
        if config.rc_params.rate_control_mode as u32 > 2 {
            return NV_ENC_ERR_INVALID_PARAM;
        }
        d.init = Some(InitRecord {
            width: params.encode_width,
            height: params.encode_height,
            framerate: params.frame_rate_num,
            enable_async: params.enable_encode_async,
            enable_ptd: params.enable_ptd,
            max_width: params.max_encode_width,
            max_height: params.max_encode_height,
            bitrate: config.rc_params.average_bitrate,
            idr_period: config.h264().idr_period,
            preset_guid: params.preset_guid,
            tuning_info: params.tuning_info,
            rate_control_mode: config.rc_params.rate_control_mode as u32,
            multi_pass: config.rc_params.multi_pass as u32,
        });
        NV_ENC_SUCCESS
    })
}

unsafe extern "C" fn reconfigure_encoder(
    _encoder: *mut c_void,
    params: *mut NvEncReconfigureParams,
) -> NvencStatus {
    let init = &(*params).re_init_encode_params;
    with_driver(|d| {
        let status = d.enter("nvEncReconfigureEncoder");
        if status != NV_ENC_SUCCESS {
            return status;
        }
        if init.encode_config.is_null() {
            return NV_ENC_ERR_INVALID_PARAM;
        }
        let bitrate = (*init.encode_config).rc_params.average_bitrate;
        d.reconfigures.push((bitrate, init.frame_rate_num));
        NV_ENC_SUCCESS
    })
}

unsafe extern "C" fn create_bitstream_buffer(
    _encoder: *mut c_void,
    params: *mut NvEncCreateBitstreamBuffer,
) -> NvencStatus {
    with_driver(|d| {
        let status = d.enter("nvEncCreateBitstreamBuffer");
        if status != NV_ENC_SUCCESS {
            return status;
        }
        let handle = d.handle();
        d.bitstreams.insert(handle);
        (*params).bitstream_buffer = handle as *mut c_void;
        NV_ENC_SUCCESS
    })
}

unsafe extern "C" fn destroy_bitstream_buffer(
    _encoder: *mut c_void,
    bitstream: *mut c_void,
) -> NvencStatus {
    with_driver(|d| {
        let status = d.enter("nvEncDestroyBitstreamBuffer");
        if status != NV_ENC_SUCCESS {
            return status;
        }
        if d.locked.contains(&(bitstream as usize)) || !d.bitstreams.remove(&(bitstream as usize)) {
            return NV_ENC_ERR_INVALID_PARAM;
        }
        NV_ENC_SUCCESS
    })
}

unsafe extern "C" fn encode_picture(_encoder: *mut c_void, params: *mut NvEncPicParams) -> NvencStatus {
    let params = &*params;
    with_driver(|d| {
        let status = d.enter("nvEncEncodePicture");
        if status != NV_ENC_SUCCESS {
            return status;
        }
        let input = params.input_buffer as usize;
        let output = params.output_bitstream as usize;
        if !d.mapped.contains(&input) || !d.bitstreams.contains(&output) {
            return NV_ENC_ERR_INVALID_PARAM;
        }
        d.encodes.push(EncodeRecord {
            flags: params.encode_pic_flags,
            frame_idx: params.frame_idx,
            timestamp: params.input_time_stamp,
            input,
            output,
            pitch: params.input_pitch,
        });
        NV_ENC_SUCCESS
    })
}

unsafe extern "C" fn lock_bitstream(_encoder: *mut c_void, params: *mut NvEncLockBitstream) -> NvencStatus {
    let params = &mut *params;
    with_driver(|d| {
        let status = d.enter("nvEncLockBitstream");
        if status != NV_ENC_SUCCESS {
            return status;
        }
        let output = params.output_bitstream as usize;
        if !d.bitstreams.contains(&output) || !d.locked.insert(output) {
            return NV_ENC_ERR_INVALID_PARAM;
        }
        params.bitstream_size_in_bytes = d.payload.len() as u32;
        params.bitstream_buffer_ptr = d.payload.as_ptr() as *mut c_void;
        NV_ENC_SUCCESS
    })
}

unsafe extern "C" fn unlock_bitstream(_encoder: *mut c_void, bitstream: *mut c_void) -> NvencStatus {
    with_driver(|d| {
        let status = d.enter("nvEncUnlockBitstream");
        if status != NV_ENC_SUCCESS {
            return status;
        }
        if !d.locked.remove(&(bitstream as usize)) {
            return NV_ENC_ERR_INVALID_PARAM;
        }
        NV_ENC_SUCCESS
    })
}

unsafe extern "C" fn register_resource(
    _encoder: *mut c_void,
    params: *mut NvEncRegisterResource,
) -> NvencStatus {
    with_driver(|d| {
        let status = d.enter("nvEncRegisterResource");
        if status != NV_ENC_SUCCESS {
            return status;
        }
        let handle = d.handle();
        d.registered.insert(handle);
        (*params).registered_resource = handle as *mut c_void;
        NV_ENC_SUCCESS
    })
}

unsafe extern "C" fn unregister_resource(_encoder: *mut c_void, registered: *mut c_void) -> NvencStatus {
    with_driver(|d| {
        let status = d.enter("nvEncUnregisterResource");
        if status != NV_ENC_SUCCESS {
            return status;
        }
        if !d.registered.remove(&(registered as usize)) {
            return NV_ENC_ERR_INVALID_PARAM;
        }
        NV_ENC_SUCCESS
    })
}

unsafe extern "C" fn map_input_resource(
    _encoder: *mut c_void,
    params: *mut NvEncMapInputResource,
) -> NvencStatus {
    let params = &mut *params;
    with_driver(|d| {
        let status = d.enter("nvEncMapInputResource");
        if status != NV_ENC_SUCCESS {
            return status;
        }
        if !d.registered.contains(&(params.registered_resource as usize)) {
            return NV_ENC_ERR_INVALID_PARAM;
        }
        let handle = d.handle();
        d.mapped.insert(handle);
        params.mapped_resource = handle as *mut c_void;
        params.mapped_buffer_fmt = NvEncBufferFormat::Argb;
        NV_ENC_SUCCESS
    })
}

unsafe extern "C" fn unmap_input_resource(_encoder: *mut c_void, mapped: *mut c_void) -> NvencStatus {
    with_driver(|d| {
        let status = d.enter("nvEncUnmapInputResource");
        if status != NV_ENC_SUCCESS {
            return status;
        }
        if !d.mapped.remove(&(mapped as usize)) {
            return NV_ENC_ERR_INVALID_PARAM;
        }
        NV_ENC_SUCCESS
    })
}

unsafe extern "C" fn destroy_encoder(encoder: *mut c_void) -> NvencStatus {
    with_driver(|d| {
        let status = d.enter("nvEncDestroyEncoder");
        if status != NV_ENC_SUCCESS {
            return status;
        }
        if !d.open_sessions.remove(&(encoder as usize)) {
            return NV_ENC_ERR_INVALID_PARAM;
        }
        NV_ENC_SUCCESS
    })
}

// ---------------------------------------------------------------------------
// Graphics device
// ---------------------------------------------------------------------------

/// Everything the fake device was asked to do.
#[derive(Debug, Default)]
pub struct DeviceLog {
    pub textures_created: u32,
    pub textures_released: u32,
    /// `(texture handle, source frame)` per copy.
    pub copies: Vec<(u64, usize)>,
    /// Texture allocations beyond this many fail.
    pub texture_limit: Option<u32>,
}

pub struct FakeDevice {
    log: Arc<Mutex<DeviceLog>>,
}

impl FakeDevice {
    pub fn new() -> (Self, Arc<Mutex<DeviceLog>>) {
        let log = Arc::new(Mutex::new(DeviceLog::default()));
        (Self { log: log.clone() }, log)
    }
}

impl GraphicsDevice for FakeDevice {
    fn encode_device(&self) -> *mut c_void {
        0xD3D1_1000usize as *mut c_void
    }

    fn create_default_texture(&mut self, width: u32, height: u32) -> Result<GpuTexture, GpuError> {
        let mut log = self.log.lock();
        if log.texture_limit.is_some_and(|limit| log.textures_created >= limit) {
            return Err(GpuError::TextureAllocFailed { width, height });
        }
        log.textures_created += 1;
        Ok(GpuTexture {
            handle: u64::from(log.textures_created),
            width,
            height,
            pitch: width * 4,
        })
    }

    fn copy_resource_from_native(&mut self, dst: &GpuTexture, src: NativeFrame) -> Result<(), GpuError> {
        if src.is_null() {
            return Err(GpuError::CopyFailed("null source frame".into()));
        }
        self.log.lock().copies.push((dst.handle, src.0 as usize));
        Ok(())
    }

    fn input_resource(&mut self, texture: &GpuTexture) -> Result<*mut c_void, GpuError> {
        Ok((0x10_0000 + texture.handle as usize) as *mut c_void)
    }

    fn release_texture(&mut self, _texture: GpuTexture) {
        self.log.lock().textures_released += 1;
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Capture clock advancing one 30 fps frame per reading, with the system
/// clock a fixed offset ahead.
pub struct StepClock {
    now_us: Cell<i64>,
}

impl StepClock {
    pub const STEP_US: i64 = 33_333;
    pub const OFFSET_US: i64 = 2_000_000;

    pub fn new() -> Self {
        Self { now_us: Cell::new(0) }
    }
}

impl Clock for StepClock {
    fn capture_time_us(&self) -> i64 {
        let now = self.now_us.get() + Self::STEP_US;
        self.now_us.set(now);
        now
    }

    fn system_time_us(&self) -> i64 {
        self.now_us.get() + Self::OFFSET_US
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub encoder: NvEncoder,
    pub frames: Receiver<EncodedFrame>,
    pub device: Arc<Mutex<DeviceLog>>,
}

impl Harness {
    pub fn new(resolution: Resolution, settings: HwSettings) -> Self {
        let mut config = NvEncoderConfig::new(resolution, settings);
        config.source = fake_source();
        let (device, log) = FakeDevice::new();
        let (tx, rx) = channel::unbounded();
        let encoder = NvEncoder::new(config, Box::new(device), Box::new(tx))
            .with_clock(Box::new(StepClock::new()));
        Self {
            encoder,
            frames: rx,
            device: log,
        }
    }

    pub fn hd720() -> Self {
        Self::new(Resolution::HD_720, HwSettings::default())
    }

    /// Copy a fake captured frame into the current slot and encode it.
    pub fn capture_and_encode(&mut self) -> EncodedFrame {
        let source = NativeFrame(0xCAFE_0000usize as *mut c_void);
        assert!(self.encoder.copy_buffer(source).unwrap());
        self.encoder.encode_frame().unwrap();
        self.frames.try_recv().unwrap()
    }
}
