//! Runtime binding to `libnvidia-opticalflow.so`.
//!
//! The optical flow library ships with the display driver, not the CUDA
//! toolkit, so there is nothing to link against at build time.  `load()`
//! opens the library, negotiates the API version against the driver, and
//! populates the function table.  The binding must outlive every session
//! created from it; sessions hold an `Arc` to enforce that.

use std::sync::Arc;

use tracing::{debug, info};

use crate::sys::{self, NV_OF_CUDA_API_FUNCTION_LIST};
use flowviz_core::error::{FlowError, Result};

#[cfg(target_os = "linux")]
const OF_LIBRARY_CANDIDATES: [&str; 2] = ["libnvidia-opticalflow.so.1", "libnvidia-opticalflow.so"];

/// Loaded optical flow interface: dlopen handle + populated function table.
pub struct OfBinding {
    funcs: NV_OF_CUDA_API_FUNCTION_LIST,
    /// Driver-reported maximum API version (packed).
    driver_version: u32,
    /// dlopen handle, held for the lifetime of the binding.  Never
    /// dlclose'd: driver libraries register global state that does not
    /// survive unloading.
    #[cfg(target_os = "linux")]
    _lib: *mut std::ffi::c_void,
}

// SAFETY: the function table and dlopen handle are immutable after load;
// the driver entry points are callable from any thread holding the right
// CUDA context.
unsafe impl Send for OfBinding {}
unsafe impl Sync for OfBinding {}

impl OfBinding {
    /// Open the driver library and negotiate the API version.
    ///
    /// Fails with `EngineUnavailable` when the library or its entry points
    /// are missing, `UnsupportedVersion` when the driver predates the API
    /// version this crate is built against.
    #[cfg(target_os = "linux")]
    pub fn load() -> Result<Arc<Self>> {
        let lib = sys::open_first(&OF_LIBRARY_CANDIDATES).map_err(|err| {
            FlowError::EngineUnavailable(format!(
                "optical flow library not found ({err}); \
                 requires an NVIDIA driver with Turing-or-newer support"
            ))
        })?;

        let create_instance: sys::PFNNvOFAPICreateInstanceCuda =
            sys::load_symbol(lib, "NvOFAPICreateInstanceCuda")
                .map_err(FlowError::EngineUnavailable)?;
        let max_version: sys::PFNNvOFGetMaxSupportedApiVersion =
            sys::load_symbol(lib, "NvOFGetMaxSupportedApiVersion")
                .map_err(FlowError::EngineUnavailable)?;

        let mut driver_version = 0u32;
        // SAFETY: symbol resolved from the driver library with matching signature.
        sys::check_of(
            unsafe { max_version(&mut driver_version) },
            "NvOFGetMaxSupportedApiVersion",
        )?;
        let (driver_major, driver_minor) = sys::version_parts(driver_version);
        debug!(driver_major, driver_minor, "driver optical flow API version");

        if driver_version < sys::NV_OF_API_VERSION {
            let (compiled_major, compiled_minor) = sys::version_parts(sys::NV_OF_API_VERSION);
            return Err(FlowError::UnsupportedVersion {
                driver_major,
                driver_minor,
                compiled_major,
                compiled_minor,
            });
        }

        let mut funcs = NV_OF_CUDA_API_FUNCTION_LIST::zeroed();
        // SAFETY: funcs is a properly laid out function list; the driver
        // fills the entries for the requested API version.
        sys::check_of(
            unsafe { create_instance(sys::NV_OF_API_VERSION, &mut funcs) },
            "NvOFAPICreateInstanceCuda",
        )?;

        let missing = funcs.missing_entries();
        if !missing.is_empty() {
            return Err(FlowError::EngineUnavailable(format!(
                "driver function table is missing entry points: {}",
                missing.join(", ")
            )));
        }

        info!(driver_major, driver_minor, "optical flow interface loaded");
        Ok(Arc::new(Self {
            funcs,
            driver_version,
            _lib: lib,
        }))
    }

    /// The optical flow library is only distributed with Linux and Windows
    /// drivers; this crate supports the Linux path.
    #[cfg(not(target_os = "linux"))]
    pub fn load() -> Result<Arc<Self>> {
        Err(FlowError::EngineUnavailable(
            "optical flow driver loading is only supported on Linux".to_string(),
        ))
    }

    /// The populated driver function table.
    pub(crate) fn funcs(&self) -> &NV_OF_CUDA_API_FUNCTION_LIST {
        &self.funcs
    }

    /// Driver-reported maximum API version, packed.
    pub fn driver_version(&self) -> u32 {
        self.driver_version
    }
}
