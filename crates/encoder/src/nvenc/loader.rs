//! Runtime discovery for the NVENC API.
//!
//! [`load_codec`] resolves the vendor module, checks the driver's API version
//! against the one this crate is compiled for, and asks the driver to fill
//! the function table. Each step short-circuits with the matching
//! [`CodecInitializationResult`].
//!
//! Dynamically loaded modules are held in a process-wide slot so the library
//! is opened at most once; [`unload_runtime`] drops that reference. Sessions
//! keep their own `Arc` to the function table (and through it, the module),
//! so unloading never invalidates a live session.

use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;

use libloading::Library;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::ffi::{
    NvEncodeApiFunctionList, NvencApi, PfnCreateInstance, PfnGetMaxSupportedVersion,
    NVENCAPI_SUPPORTED_VERSION, NV_ENC_SUCCESS,
};
use crate::error::CodecInitializationResult;

/// The two exported entry points of the NVENC runtime.
#[derive(Copy, Clone, Debug, Default)]
pub struct EntryPoints {
    /// `NvEncodeAPIGetMaxSupportedVersion`
    pub get_max_supported_version: Option<PfnGetMaxSupportedVersion>,
    /// `NvEncodeAPICreateInstance`
    pub create_instance: Option<PfnCreateInstance>,
}

/// Where the NVENC runtime comes from.
#[derive(Clone, Debug, Default)]
pub enum ModuleSource {
    /// The platform's driver library, found through the loader search path.
    #[default]
    System,
    /// A library at an explicit path (non-standard installs).
    Path(PathBuf),
    /// Entry points already linked into the process.
    Static(EntryPoints),
}

struct LoadedModule {
    name: std::ffi::OsString,
    library: Arc<Library>,
}

static RUNTIME: Mutex<Option<LoadedModule>> = parking_lot::const_mutex(None);

/// Platform library name of the NVENC runtime.
pub fn library_name() -> &'static str {
    if cfg!(all(target_os = "windows", target_pointer_width = "64")) {
        "nvEncodeAPI64.dll"
    } else if cfg!(target_os = "windows") {
        "nvEncodeAPI.dll"
    } else {
        "libnvidia-encode.so.1"
    }
}

/// Resolve the runtime and build its function table.
pub fn load_codec(source: &ModuleSource) -> Result<Arc<NvencApi>, CodecInitializationResult> {
    let (entry, module) = match source {
        ModuleSource::System => load_module(OsStr::new(library_name()))?,
        ModuleSource::Path(path) => load_module(path.as_os_str())?,
        ModuleSource::Static(entry) => (*entry, None),
    };

    let driver_version = max_supported_version(&entry);
    if driver_version < NVENCAPI_SUPPORTED_VERSION {
        warn!(
            driver_version,
            required = NVENCAPI_SUPPORTED_VERSION,
            "NVENC driver too old"
        );
        return Err(CodecInitializationResult::DriverVersionDoesNotSupportAPI);
    }

    let create_instance = entry.create_instance.ok_or_else(|| {
        warn!("NvEncodeAPICreateInstance not exported by NVENC runtime");
        CodecInitializationResult::APINotFound
    })?;

    let mut functions = NvEncodeApiFunctionList::default();
    // SAFETY: `functions` is a zeroed, versioned table of the exact layout
    // the driver fills; it stays alive for the duration of the call.
    let status = unsafe { create_instance(&mut functions) };
    if status != NV_ENC_SUCCESS {
        warn!(status, "NvEncodeAPICreateInstance failed");
        return Err(CodecInitializationResult::APINotFound);
    }

    debug!(?functions, "NVENC function table populated");
    Ok(Arc::new(NvencApi::new(functions, module)))
}

/// Drop the process-wide module reference. Returns whether one was held.
///
/// Sessions that already hold the function table keep the module alive
/// until they are dropped.
pub fn unload_runtime() -> bool {
    match RUNTIME.lock().take() {
        Some(module) => {
            info!(library = ?module.name, "NVENC runtime released");
            true
        }
        None => false,
    }
}

/// Whether a dynamically loaded runtime is currently held.
pub fn is_runtime_loaded() -> bool {
    RUNTIME.lock().is_some()
}

/// Open (or reuse) the runtime library and resolve its entry points.
fn load_module(
    name: &OsStr,
) -> Result<(EntryPoints, Option<Arc<Library>>), CodecInitializationResult> {
    let mut slot = RUNTIME.lock();

    let library = match slot.as_ref() {
        Some(module) if module.name == name => module.library.clone(),
        _ => {
            info!(library = ?name, "Loading NVENC library");
            // SAFETY: We are loading the NVIDIA encode runtime, whose
            // initializers only register driver entry points.
            let library = unsafe { Library::new(name) }.map_err(|e| {
                warn!(library = ?name, error = %e, "NVENC library not found. Is the NVIDIA driver installed?");
                CodecInitializationResult::DriverNotInstalled
            })?;
            let library = Arc::new(library);
            if let Some(previous) = slot.replace(LoadedModule {
                name: name.to_os_string(),
                library: library.clone(),
            }) {
                debug!(library = ?previous.name, "Replaced previously loaded NVENC library");
            }
            library
        }
    };

    // SAFETY: Both symbols are well-known NVENC exports and the function
    // signatures match the official C headers. We copy the raw pointers;
    // `library` keeps them valid.
    let entry = unsafe {
        EntryPoints {
            get_max_supported_version: library
                .get::<PfnGetMaxSupportedVersion>(b"NvEncodeAPIGetMaxSupportedVersion\0")
                .ok()
                .map(|symbol| *symbol),
            create_instance: library
                .get::<PfnCreateInstance>(b"NvEncodeAPICreateInstance\0")
                .ok()
                .map(|symbol| *symbol),
        }
    };

    Ok((entry, Some(library)))
}

/// Driver API version as `(major << 4) | minor`; 0 if it cannot be queried.
fn max_supported_version(entry: &EntryPoints) -> u32 {
    let Some(query) = entry.get_max_supported_version else {
        return 0;
    };
    let mut version = 0u32;
    // SAFETY: `version` is a valid out pointer for the duration of the call.
    let status = unsafe { query(&mut version) };
    if status != NV_ENC_SUCCESS {
        warn!(status, "NvEncodeAPIGetMaxSupportedVersion failed");
        return 0;
    }
    version
}
