//! Raw FFI bindings to the NVIDIA Optical Flow interface (CUDA flavor).
//!
//! Covers the subset of `nvOpticalFlowCommon.h` / `nvOpticalFlowCuda.h`
//! needed by [`FlowSession`](super::session) and
//! [`DeviceBuffer`](super::buffer).  Matches Optical Flow SDK 5.x headers.
//!
//! The library carries no import stub: `libnvidia-opticalflow.so` ships
//! with the display driver and is resolved with `dlopen` in `binding.rs`.
//! The two CUDA driver entry points we need beyond what `cudarc` exposes
//! (`cuMemcpy2DAsync_v2`, `cuStreamSynchronize`) are resolved the same way
//! from `libcuda.so`.
//!
//! # Safety
//!
//! Everything here is `unsafe extern "C"` surface.  The safe wrappers in
//! `session.rs` and `buffer.rs` enforce the invariants documented there.
//! Driver status codes cross into the [`FlowError`] taxonomy only through
//! [`check_of`]; nothing above this module sees a raw status integer.

#![allow(non_camel_case_types, non_snake_case, dead_code)]

use std::ffi::c_void;
use std::os::raw::c_int;

use flowviz_core::error::{FlowError, Result};
use flowviz_core::types::{
    BufferFormat, BufferUsage, FlowMode, HintGridSize, OutputGridSize, PerfLevel, PredDirection,
};

// ═══════════════════════════════════════════════════════════════════════════
//  COMMON TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// CUDA result code.
pub type CUresult = c_int;
pub const CUDA_SUCCESS: CUresult = 0;

/// CUDA device pointer (64-bit).
pub type CUdeviceptr = u64;

/// CUDA stream handle.
pub type CUstream = *mut c_void;

/// CUDA context handle.
pub type CUcontext = *mut c_void;

/// Opaque optical flow session handle.
pub type NvOFHandle = *mut c_void;

/// Opaque GPU buffer handle.
pub type NvOFGPUBufferHandle = *mut c_void;

/// Reserved private-data handle, always null.
pub type NvOFPrivDataHandle = *mut c_void;

// ═══════════════════════════════════════════════════════════════════════════
//  VERSION
// ═══════════════════════════════════════════════════════════════════════════

/// Matches `NV_OF_API_MAJOR_VERSION` in `nvOpticalFlowCommon.h`.
pub const NV_OF_API_MAJOR_VERSION: u32 = 5;
/// Matches `NV_OF_API_MINOR_VERSION` in `nvOpticalFlowCommon.h`.
pub const NV_OF_API_MINOR_VERSION: u32 = 0;
/// Packed version: minor in the low 4 bits, major above.
pub const NV_OF_API_VERSION: u32 = (NV_OF_API_MAJOR_VERSION << 4) | NV_OF_API_MINOR_VERSION;

/// Minimum buffer size accepted by `nvOFGetLastError`.
pub const MIN_ERROR_STRING_SIZE: usize = 80;

/// Split a packed version into `(major, minor)`.
#[inline]
pub const fn version_parts(version: u32) -> (u32, u32) {
    (version >> 4, version & 0xF)
}

// ═══════════════════════════════════════════════════════════════════════════
//  STATUS CODES
// ═══════════════════════════════════════════════════════════════════════════

pub type NV_OF_STATUS = c_int;
pub const NV_OF_SUCCESS: NV_OF_STATUS = 0;
pub const NV_OF_ERR_OF_NOT_AVAILABLE: NV_OF_STATUS = 1;
pub const NV_OF_ERR_UNSUPPORTED_DEVICE: NV_OF_STATUS = 2;
pub const NV_OF_ERR_DEVICE_DOES_NOT_EXIST: NV_OF_STATUS = 3;
pub const NV_OF_ERR_INVALID_PTR: NV_OF_STATUS = 4;
pub const NV_OF_ERR_INVALID_PARAM: NV_OF_STATUS = 5;
pub const NV_OF_ERR_INVALID_CALL: NV_OF_STATUS = 6;
pub const NV_OF_ERR_INVALID_VERSION: NV_OF_STATUS = 7;
pub const NV_OF_ERR_OUT_OF_MEMORY: NV_OF_STATUS = 8;
pub const NV_OF_ERR_NOT_INITIALIZED: NV_OF_STATUS = 9;
pub const NV_OF_ERR_UNSUPPORTED_FEATURE: NV_OF_STATUS = 10;
pub const NV_OF_ERR_GENERIC: NV_OF_STATUS = 11;

// ═══════════════════════════════════════════════════════════════════════════
//  ENUMS — nvOpticalFlowCommon.h
// ═══════════════════════════════════════════════════════════════════════════

/// NV_OF_BOOL is a 32-bit enum on the wire.
pub type NV_OF_BOOL = u32;
pub const NV_OF_FALSE: NV_OF_BOOL = 0;
pub const NV_OF_TRUE: NV_OF_BOOL = 1;

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NV_OF_CAPS {
    SUPPORTED_OUTPUT_GRID_SIZES = 0,
    SUPPORTED_HINT_GRID_SIZES = 1,
    SUPPORT_HINT_WITH_OF_MODE = 2,
    SUPPORT_HINT_WITH_ST_MODE = 3,
    WIDTH_MIN = 4,
    HEIGHT_MIN = 5,
    WIDTH_MAX = 6,
    HEIGHT_MAX = 7,
    SUPPORT_ROI = 8,
    SUPPORT_ROI_MAX_NUM = 9,
    SUPPORT_STEREO = 10,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NV_OF_PERF_LEVEL {
    UNDEFINED = 0,
    SLOW = 5,
    MEDIUM = 10,
    FAST = 20,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NV_OF_OUTPUT_VECTOR_GRID_SIZE {
    UNDEFINED = 0,
    SIZE_1 = 1,
    SIZE_2 = 2,
    SIZE_4 = 4,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NV_OF_HINT_VECTOR_GRID_SIZE {
    UNDEFINED = 0,
    SIZE_1 = 1,
    SIZE_2 = 2,
    SIZE_4 = 4,
    SIZE_8 = 8,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NV_OF_MODE {
    UNDEFINED = 0,
    OPTICALFLOW = 1,
    STEREODISPARITY = 2,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NV_OF_BUFFER_USAGE {
    UNDEFINED = 0,
    INPUT = 1,
    OUTPUT = 2,
    HINT = 3,
    COST = 4,
    GLOBAL_FLOW = 5,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NV_OF_BUFFER_FORMAT {
    UNDEFINED = 0,
    GRAYSCALE8 = 1,
    NV12 = 2,
    ABGR8 = 3,
    SHORT = 4,
    SHORT2 = 5,
    UINT = 6,
    UINT8 = 7,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NV_OF_STEREO_DISPARITY_RANGE {
    UNDEFINED = 0,
    RANGE_128 = 128,
    RANGE_256 = 256,
}

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NV_OF_PRED_DIRECTION {
    FORWARD = 0,
    BOTH = 2,
}

// ═══════════════════════════════════════════════════════════════════════════
//  STRUCTS — nvOpticalFlowCommon.h
// ═══════════════════════════════════════════════════════════════════════════

/// Motion vector in S10.5 fixed point.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct NV_OF_FLOW_VECTOR {
    pub flowx: i16,
    pub flowy: i16,
}

/// Disparity sample in 11.5 unsigned fixed point.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct NV_OF_STEREO_DISPARITY {
    pub disparity: u16,
}

/// Session initialization parameters.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NV_OF_INIT_PARAMS {
    pub width: u32,
    pub height: u32,
    pub outGridSize: NV_OF_OUTPUT_VECTOR_GRID_SIZE,
    pub hintGridSize: NV_OF_HINT_VECTOR_GRID_SIZE,
    pub mode: NV_OF_MODE,
    pub perfLevel: NV_OF_PERF_LEVEL,
    pub enableExternalHints: NV_OF_BOOL,
    pub enableOutputCost: NV_OF_BOOL,
    pub hPrivData: NvOFPrivDataHandle,
    pub disparityRange: NV_OF_STEREO_DISPARITY_RANGE,
    pub enableRoi: NV_OF_BOOL,
    pub predDirection: NV_OF_PRED_DIRECTION,
    pub enableGlobalFlow: NV_OF_BOOL,
    pub inputBufferFormat: NV_OF_BUFFER_FORMAT,
}

/// Buffer creation parameters.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct NV_OF_BUFFER_DESCRIPTOR {
    pub width: u32,
    pub height: u32,
    pub bufferUsage: NV_OF_BUFFER_USAGE,
    pub bufferFormat: NV_OF_BUFFER_FORMAT,
}

/// Region-of-interest rectangle, aligned per driver requirements.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct NV_OF_ROI_RECT {
    pub start_x: u32,
    pub start_y: u32,
    pub width: u32,
    pub height: u32,
}

/// Per-frame execute inputs.
#[repr(C)]
pub struct NV_OF_EXECUTE_INPUT_PARAMS {
    pub inputFrame: NvOFGPUBufferHandle,
    pub referenceFrame: NvOFGPUBufferHandle,
    pub externalHints: NvOFGPUBufferHandle,
    pub disableTemporalHints: NV_OF_BOOL,
    pub padding: u32,
    pub hPrivData: NvOFPrivDataHandle,
    pub padding2: u32,
    pub numRois: u32,
    pub roiData: *const NV_OF_ROI_RECT,
}

/// Per-frame execute outputs.
#[repr(C)]
pub struct NV_OF_EXECUTE_OUTPUT_PARAMS {
    pub outputBuffer: NvOFGPUBufferHandle,
    pub outputCostBuffer: NvOFGPUBufferHandle,
    pub hPrivData: NvOFPrivDataHandle,
    pub bwdOutputBuffer: NvOFGPUBufferHandle,
    pub bwdOutputCostBuffer: NvOFGPUBufferHandle,
    pub globalFlowBuffer: NvOFGPUBufferHandle,
}

// ═══════════════════════════════════════════════════════════════════════════
//  CUDA FLAVOR — nvOpticalFlowCuda.h
// ═══════════════════════════════════════════════════════════════════════════

#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NV_OF_CUDA_BUFFER_TYPE {
    UNDEFINED = 0,
    /// Buffer is a `CUdeviceptr`.
    CUDEVICEPTR = 1,
    /// Buffer is a `CUarray`.
    CUARRAY = 2,
}

pub const NV_OF_MAX_NUM_PLANES: usize = 2;

/// Per-plane stride in bytes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct NV_OF_STRIDE {
    pub strideXInBytes: u32,
    pub strideYInBytes: u32,
}

/// Stride layout of an allocated GPU buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct NV_OF_CUDA_BUFFER_STRIDE_INFO {
    pub strideInfo: [NV_OF_STRIDE; NV_OF_MAX_NUM_PLANES],
    pub numPlanes: u32,
}

/// Entry-point table returned by `NvOFAPICreateInstanceCuda`.
#[repr(C)]
pub struct NV_OF_CUDA_API_FUNCTION_LIST {
    pub nvCreateOpticalFlowCuda:
        Option<unsafe extern "C" fn(CUcontext, *mut NvOFHandle) -> NV_OF_STATUS>,
    pub nvOFInit:
        Option<unsafe extern "C" fn(NvOFHandle, *const NV_OF_INIT_PARAMS) -> NV_OF_STATUS>,
    pub nvOFCreateGPUBufferCuda: Option<
        unsafe extern "C" fn(
            NvOFHandle,
            *const NV_OF_BUFFER_DESCRIPTOR,
            NV_OF_CUDA_BUFFER_TYPE,
            *mut NvOFGPUBufferHandle,
        ) -> NV_OF_STATUS,
    >,
    pub nvOFGPUBufferGetCUdeviceptr:
        Option<unsafe extern "C" fn(NvOFGPUBufferHandle) -> CUdeviceptr>,
    pub nvOFGPUBufferGetStrideInfo: Option<
        unsafe extern "C" fn(
            NvOFGPUBufferHandle,
            *mut NV_OF_CUDA_BUFFER_STRIDE_INFO,
        ) -> NV_OF_STATUS,
    >,
    pub nvOFSetIOCudaStreams:
        Option<unsafe extern "C" fn(NvOFHandle, CUstream, CUstream) -> NV_OF_STATUS>,
    pub nvOFExecute: Option<
        unsafe extern "C" fn(
            NvOFHandle,
            *const NV_OF_EXECUTE_INPUT_PARAMS,
            *mut NV_OF_EXECUTE_OUTPUT_PARAMS,
        ) -> NV_OF_STATUS,
    >,
    pub nvOFDestroyGPUBufferCuda:
        Option<unsafe extern "C" fn(NvOFGPUBufferHandle) -> NV_OF_STATUS>,
    pub nvOFDestroy: Option<unsafe extern "C" fn(NvOFHandle) -> NV_OF_STATUS>,
    pub nvOFGetLastError:
        Option<unsafe extern "C" fn(NvOFHandle, *mut u8, *mut u32) -> NV_OF_STATUS>,
    pub nvOFGetCaps:
        Option<unsafe extern "C" fn(NvOFHandle, NV_OF_CAPS, *mut u32, *mut u32) -> NV_OF_STATUS>,
}

impl NV_OF_CUDA_API_FUNCTION_LIST {
    pub const fn zeroed() -> Self {
        Self {
            nvCreateOpticalFlowCuda: None,
            nvOFInit: None,
            nvOFCreateGPUBufferCuda: None,
            nvOFGPUBufferGetCUdeviceptr: None,
            nvOFGPUBufferGetStrideInfo: None,
            nvOFSetIOCudaStreams: None,
            nvOFExecute: None,
            nvOFDestroyGPUBufferCuda: None,
            nvOFDestroy: None,
            nvOFGetLastError: None,
            nvOFGetCaps: None,
        }
    }

    /// Names of entry points the table is missing.
    pub fn missing_entries(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        macro_rules! require {
            ($field:ident) => {
                if self.$field.is_none() {
                    missing.push(stringify!($field));
                }
            };
        }
        require!(nvCreateOpticalFlowCuda);
        require!(nvOFInit);
        require!(nvOFCreateGPUBufferCuda);
        require!(nvOFGPUBufferGetCUdeviceptr);
        require!(nvOFGPUBufferGetStrideInfo);
        require!(nvOFSetIOCudaStreams);
        require!(nvOFExecute);
        require!(nvOFDestroyGPUBufferCuda);
        require!(nvOFDestroy);
        require!(nvOFGetLastError);
        require!(nvOFGetCaps);
        missing
    }
}

/// `NvOFAPICreateInstanceCuda` signature.
pub type PFNNvOFAPICreateInstanceCuda =
    unsafe extern "C" fn(u32, *mut NV_OF_CUDA_API_FUNCTION_LIST) -> NV_OF_STATUS;

/// `NvOFGetMaxSupportedApiVersion` signature.
pub type PFNNvOFGetMaxSupportedApiVersion = unsafe extern "C" fn(*mut u32) -> NV_OF_STATUS;

// ═══════════════════════════════════════════════════════════════════════════
//  CUDA DRIVER — strided async memcpy + stream sync (not in cudarc)
// ═══════════════════════════════════════════════════════════════════════════

/// 2D memory copy descriptor.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct CUDA_MEMCPY2D {
    pub srcXInBytes: usize,
    pub srcY: usize,
    pub srcMemoryType: CUmemorytype,
    pub srcHost: *const c_void,
    pub srcDevice: CUdeviceptr,
    pub srcArray: *const c_void,
    pub srcPitch: usize,
    pub dstXInBytes: usize,
    pub dstY: usize,
    pub dstMemoryType: CUmemorytype,
    pub dstHost: *mut c_void,
    pub dstDevice: CUdeviceptr,
    pub dstArray: *mut c_void,
    pub dstPitch: usize,
    pub WidthInBytes: usize,
    pub Height: usize,
}

impl CUDA_MEMCPY2D {
    pub const fn zeroed() -> Self {
        Self {
            srcXInBytes: 0,
            srcY: 0,
            srcMemoryType: CUmemorytype::Host,
            srcHost: std::ptr::null(),
            srcDevice: 0,
            srcArray: std::ptr::null(),
            srcPitch: 0,
            dstXInBytes: 0,
            dstY: 0,
            dstMemoryType: CUmemorytype::Host,
            dstHost: std::ptr::null_mut(),
            dstDevice: 0,
            dstArray: std::ptr::null_mut(),
            dstPitch: 0,
            WidthInBytes: 0,
            Height: 0,
        }
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CUmemorytype {
    Host = 0x01,
    Device = 0x02,
    Array = 0x03,
    Unified = 0x04,
}

#[cfg(not(target_os = "linux"))]
unsafe extern "C" {
    fn cuMemcpy2DAsync_v2(pCopy: *const CUDA_MEMCPY2D, hStream: CUstream) -> CUresult;
    fn cuStreamSynchronize(hStream: CUstream) -> CUresult;
}

#[cfg(target_os = "linux")]
mod dl {
    use super::*;
    use std::ffi::{CStr, CString, c_char};
    use std::sync::OnceLock;

    unsafe extern "C" {
        fn dlopen(filename: *const c_char, flags: i32) -> *mut c_void;
        fn dlerror() -> *const c_char;
        fn dlsym(handle: *mut c_void, symbol: *const c_char) -> *mut c_void;
    }

    const RTLD_NOW: i32 = 2;
    const RTLD_GLOBAL: i32 = 0x100;

    pub(crate) struct CudaDriverApi {
        pub cu_memcpy2d_async_v2:
            unsafe extern "C" fn(*const CUDA_MEMCPY2D, CUstream) -> CUresult,
        pub cu_stream_synchronize: unsafe extern "C" fn(CUstream) -> CUresult,
    }

    static CUDA_DRIVER_API: OnceLock<std::result::Result<CudaDriverApi, String>> = OnceLock::new();

    fn dl_error() -> String {
        // SAFETY: dlerror returns a thread-local C string or null.
        unsafe {
            let p = dlerror();
            if p.is_null() {
                "unknown dl error".to_string()
            } else {
                CStr::from_ptr(p).to_string_lossy().to_string()
            }
        }
    }

    pub(crate) fn load_symbol<T>(
        handle: *mut c_void,
        name: &'static str,
    ) -> std::result::Result<T, String> {
        let cname = CString::new(name).map_err(|_| format!("invalid symbol name: {name}"))?;
        // SAFETY: handle is a valid dlopen handle and cname is a valid C symbol name.
        let ptr = unsafe { dlsym(handle, cname.as_ptr()) };
        if ptr.is_null() {
            Err(format!("dlsym({name}) failed: {}", dl_error()))
        } else {
            // SAFETY: ptr points to a function with signature T.
            Ok(unsafe { std::mem::transmute_copy(&ptr) })
        }
    }

    pub(crate) fn open_first(candidates: &[&str]) -> std::result::Result<*mut c_void, String> {
        let mut last_err = "unknown dlopen error".to_string();
        for candidate in candidates {
            let soname =
                CString::new(*candidate).map_err(|_| format!("invalid soname: {candidate}"))?;
            // SAFETY: static soname and valid dlopen flags.
            let handle = unsafe { dlopen(soname.as_ptr(), RTLD_NOW | RTLD_GLOBAL) };
            if !handle.is_null() {
                return Ok(handle);
            }
            last_err = dl_error();
        }
        Err(format!("dlopen({}) failed: {last_err}", candidates.join("|")))
    }

    fn init_cuda_driver_api() -> std::result::Result<CudaDriverApi, String> {
        let handle = open_first(&["libcuda.so.1", "libcuda.so"])?;
        Ok(CudaDriverApi {
            cu_memcpy2d_async_v2: load_symbol(handle, "cuMemcpy2DAsync_v2")?,
            cu_stream_synchronize: load_symbol(handle, "cuStreamSynchronize")?,
        })
    }

    pub(crate) fn cuda_driver_api() -> Result<&'static CudaDriverApi> {
        let api = CUDA_DRIVER_API.get_or_init(init_cuda_driver_api);
        api.as_ref().map_err(|err| {
            FlowError::EngineUnavailable(format!(
                "failed to load CUDA driver API: {err}. \
Ensure NVIDIA driver libraries are installed and visible via LD_LIBRARY_PATH \
(on WSL, prepend /usr/lib/wsl/lib)."
            ))
        })
    }
}

/// Call `cuMemcpy2DAsync_v2`.
///
/// # Safety
/// `copy` must describe valid, live source and destination memory and
/// `stream` must be a valid CUDA stream from the active context.
pub unsafe fn cu_memcpy2d_async(copy: *const CUDA_MEMCPY2D, stream: CUstream) -> Result<CUresult> {
    #[cfg(target_os = "linux")]
    {
        let api = dl::cuda_driver_api()?;
        // SAFETY: function pointer was resolved from CUDA driver with matching signature.
        Ok(unsafe { (api.cu_memcpy2d_async_v2)(copy, stream) })
    }
    #[cfg(not(target_os = "linux"))]
    {
        // SAFETY: FFI call into CUDA driver API.
        Ok(unsafe { cuMemcpy2DAsync_v2(copy, stream) })
    }
}

/// Call `cuStreamSynchronize`.
///
/// # Safety
/// `stream` must be a valid CUDA stream from the active context.
pub unsafe fn cu_stream_synchronize(stream: CUstream) -> Result<CUresult> {
    #[cfg(target_os = "linux")]
    {
        let api = dl::cuda_driver_api()?;
        // SAFETY: function pointer was resolved from CUDA driver with matching signature.
        Ok(unsafe { (api.cu_stream_synchronize)(stream) })
    }
    #[cfg(not(target_os = "linux"))]
    {
        // SAFETY: FFI call into CUDA driver API.
        Ok(unsafe { cuStreamSynchronize(stream) })
    }
}

#[cfg(target_os = "linux")]
pub(crate) use dl::{load_symbol, open_first};

// ═══════════════════════════════════════════════════════════════════════════
//  HELPERS
// ═══════════════════════════════════════════════════════════════════════════

/// Convert a CUDA result to an engine Result.
#[inline]
pub fn check_cu(result: CUresult, call: &'static str) -> Result<()> {
    if result == CUDA_SUCCESS {
        Ok(())
    } else {
        Err(FlowError::CudaCall { call, code: result })
    }
}

/// Convert an optical flow status to an engine Result.  The single point
/// where driver status codes enter the error taxonomy.
pub fn check_of(status: NV_OF_STATUS, context: &str) -> Result<()> {
    if status == NV_OF_SUCCESS {
        return Ok(());
    }
    let msg = format!("{context}: {} (code {status})", of_status_name(status));
    Err(match status {
        NV_OF_ERR_OF_NOT_AVAILABLE => FlowError::EngineUnavailable(msg),
        NV_OF_ERR_UNSUPPORTED_DEVICE => FlowError::UnsupportedDevice(msg),
        NV_OF_ERR_DEVICE_DOES_NOT_EXIST => FlowError::DeviceNotFound(msg),
        NV_OF_ERR_INVALID_PTR | NV_OF_ERR_INVALID_PARAM | NV_OF_ERR_UNSUPPORTED_FEATURE => {
            FlowError::InvalidParam(msg)
        }
        NV_OF_ERR_INVALID_VERSION => FlowError::InvalidVersion(msg),
        NV_OF_ERR_OUT_OF_MEMORY => FlowError::OutOfMemory(msg),
        NV_OF_ERR_NOT_INITIALIZED => FlowError::NotInitialized(msg),
        _ => FlowError::Generic(msg),
    })
}

/// Human-readable status names for diagnostics.
#[inline]
pub const fn of_status_name(status: NV_OF_STATUS) -> &'static str {
    match status {
        NV_OF_SUCCESS => "NV_OF_SUCCESS",
        NV_OF_ERR_OF_NOT_AVAILABLE => "NV_OF_ERR_OF_NOT_AVAILABLE",
        NV_OF_ERR_UNSUPPORTED_DEVICE => "NV_OF_ERR_UNSUPPORTED_DEVICE",
        NV_OF_ERR_DEVICE_DOES_NOT_EXIST => "NV_OF_ERR_DEVICE_DOES_NOT_EXIST",
        NV_OF_ERR_INVALID_PTR => "NV_OF_ERR_INVALID_PTR",
        NV_OF_ERR_INVALID_PARAM => "NV_OF_ERR_INVALID_PARAM",
        NV_OF_ERR_INVALID_CALL => "NV_OF_ERR_INVALID_CALL",
        NV_OF_ERR_INVALID_VERSION => "NV_OF_ERR_INVALID_VERSION",
        NV_OF_ERR_OUT_OF_MEMORY => "NV_OF_ERR_OUT_OF_MEMORY",
        NV_OF_ERR_NOT_INITIALIZED => "NV_OF_ERR_NOT_INITIALIZED",
        NV_OF_ERR_UNSUPPORTED_FEATURE => "NV_OF_ERR_UNSUPPORTED_FEATURE",
        NV_OF_ERR_GENERIC => "NV_OF_ERR_GENERIC",
        _ => "NV_OF_ERR_UNKNOWN",
    }
}

// ─── Conversions from the shared data model ──────────────────────────────

impl From<BufferUsage> for NV_OF_BUFFER_USAGE {
    fn from(usage: BufferUsage) -> Self {
        match usage {
            BufferUsage::Input => Self::INPUT,
            BufferUsage::Output => Self::OUTPUT,
            BufferUsage::Hint => Self::HINT,
            BufferUsage::Cost => Self::COST,
            BufferUsage::GlobalFlow => Self::GLOBAL_FLOW,
        }
    }
}

impl From<BufferFormat> for NV_OF_BUFFER_FORMAT {
    fn from(format: BufferFormat) -> Self {
        match format {
            BufferFormat::Grayscale8 => Self::GRAYSCALE8,
            BufferFormat::Nv12 => Self::NV12,
            BufferFormat::Abgr8 => Self::ABGR8,
            BufferFormat::Short => Self::SHORT,
            BufferFormat::Short2 => Self::SHORT2,
            BufferFormat::CostU8 => Self::UINT8,
        }
    }
}

impl From<FlowMode> for NV_OF_MODE {
    fn from(mode: FlowMode) -> Self {
        match mode {
            FlowMode::OpticalFlow => Self::OPTICALFLOW,
            FlowMode::StereoDisparity => Self::STEREODISPARITY,
        }
    }
}

impl From<OutputGridSize> for NV_OF_OUTPUT_VECTOR_GRID_SIZE {
    fn from(grid: OutputGridSize) -> Self {
        match grid {
            OutputGridSize::Grid1 => Self::SIZE_1,
            OutputGridSize::Grid2 => Self::SIZE_2,
            OutputGridSize::Grid4 => Self::SIZE_4,
        }
    }
}

impl From<HintGridSize> for NV_OF_HINT_VECTOR_GRID_SIZE {
    fn from(grid: HintGridSize) -> Self {
        match grid {
            HintGridSize::Grid1 => Self::SIZE_1,
            HintGridSize::Grid2 => Self::SIZE_2,
            HintGridSize::Grid4 => Self::SIZE_4,
            HintGridSize::Grid8 => Self::SIZE_8,
        }
    }
}

impl From<PerfLevel> for NV_OF_PERF_LEVEL {
    fn from(level: PerfLevel) -> Self {
        match level {
            PerfLevel::Slow => Self::SLOW,
            PerfLevel::Medium => Self::MEDIUM,
            PerfLevel::Fast => Self::FAST,
        }
    }
}

impl From<PredDirection> for NV_OF_PRED_DIRECTION {
    fn from(dir: PredDirection) -> Self {
        match dir {
            PredDirection::Forward => Self::FORWARD,
            PredDirection::Both => Self::BOTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowviz_core::FlowError;

    #[test]
    fn api_version_packs_minor_into_low_nibble() {
        assert_eq!(NV_OF_API_VERSION, 0x50);
        assert_eq!(version_parts(NV_OF_API_VERSION), (5, 0));
        assert_eq!(version_parts(0x41), (4, 1));
    }

    #[test]
    fn status_mapping_covers_taxonomy() {
        assert!(check_of(NV_OF_SUCCESS, "ok").is_ok());
        assert!(matches!(
            check_of(NV_OF_ERR_OF_NOT_AVAILABLE, "t"),
            Err(FlowError::EngineUnavailable(_))
        ));
        assert!(matches!(
            check_of(NV_OF_ERR_UNSUPPORTED_DEVICE, "t"),
            Err(FlowError::UnsupportedDevice(_))
        ));
        assert!(matches!(
            check_of(NV_OF_ERR_DEVICE_DOES_NOT_EXIST, "t"),
            Err(FlowError::DeviceNotFound(_))
        ));
        assert!(matches!(
            check_of(NV_OF_ERR_INVALID_PARAM, "t"),
            Err(FlowError::InvalidParam(_))
        ));
        assert!(matches!(
            check_of(NV_OF_ERR_INVALID_VERSION, "t"),
            Err(FlowError::InvalidVersion(_))
        ));
        assert!(matches!(
            check_of(NV_OF_ERR_OUT_OF_MEMORY, "t"),
            Err(FlowError::OutOfMemory(_))
        ));
        assert!(matches!(
            check_of(NV_OF_ERR_NOT_INITIALIZED, "t"),
            Err(FlowError::NotInitialized(_))
        ));
        assert!(matches!(
            check_of(NV_OF_ERR_GENERIC, "t"),
            Err(FlowError::Generic(_))
        ));
        // Unknown codes fall through to Generic.
        assert!(matches!(check_of(99, "t"), Err(FlowError::Generic(_))));
    }

    #[test]
    fn status_messages_name_the_call_site() {
        let err = check_of(NV_OF_ERR_INVALID_PARAM, "nvOFInit").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("nvOFInit"), "{msg}");
        assert!(msg.contains("NV_OF_ERR_INVALID_PARAM"), "{msg}");
    }

    #[test]
    fn empty_function_table_reports_all_entries_missing() {
        let table = NV_OF_CUDA_API_FUNCTION_LIST::zeroed();
        let missing = table.missing_entries();
        assert_eq!(missing.len(), 11);
        assert!(missing.contains(&"nvOFExecute"));
    }
}
