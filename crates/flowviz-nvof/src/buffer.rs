//! GPU buffers allocated through the optical flow interface.
//!
//! The engine allocates its own pitched memory; host copies must honor the
//! reported row stride.  `upload` is fire-and-forget on the buffer's
//! stream; `download` issues the mirrored copy and then synchronizes the
//! stream — it is the pipeline's one completion barrier.

use std::ffi::c_void;
use std::sync::Arc;

use tracing::warn;

use crate::context::GpuContext;
use crate::session::FlowSession;
use crate::sys::{self, CUmemorytype, NvOFGPUBufferHandle};
use flowviz_core::error::{FlowError, Result};
use flowviz_core::types::{BufferDescriptor, BufferFormat, BufferUsage};

/// One engine-allocated GPU buffer, tied to its session by `Arc`.
pub struct DeviceBuffer {
    session: Arc<FlowSession>,
    desc: BufferDescriptor,
    handle: NvOFGPUBufferHandle,
    device_ptr: sys::CUdeviceptr,
    stride: sys::NV_OF_CUDA_BUFFER_STRIDE_INFO,
}

// SAFETY: handle and device pointer are only passed to driver calls under
// the single-controlling-thread model.
unsafe impl Send for DeviceBuffer {}
unsafe impl Sync for DeviceBuffer {}

impl DeviceBuffer {
    /// Allocate a buffer in the session's context and fetch its device
    /// pointer and stride layout.
    pub fn create(session: Arc<FlowSession>, desc: BufferDescriptor) -> Result<Self> {
        let create = session.funcs().nvOFCreateGPUBufferCuda.ok_or_else(|| {
            FlowError::EngineUnavailable("nvOFCreateGPUBufferCuda not found".into())
        })?;
        let get_ptr = session.funcs().nvOFGPUBufferGetCUdeviceptr.ok_or_else(|| {
            FlowError::EngineUnavailable("nvOFGPUBufferGetCUdeviceptr not found".into())
        })?;
        let get_stride = session.funcs().nvOFGPUBufferGetStrideInfo.ok_or_else(|| {
            FlowError::EngineUnavailable("nvOFGPUBufferGetStrideInfo not found".into())
        })?;

        let sys_desc = sys::NV_OF_BUFFER_DESCRIPTOR {
            width: desc.width,
            height: desc.height,
            bufferUsage: desc.usage.into(),
            bufferFormat: desc.format.into(),
        };
        let mut handle: NvOFGPUBufferHandle = std::ptr::null_mut();
        // SAFETY: session handle is live; sys_desc is fully initialized.
        sys::check_of(
            unsafe {
                create(
                    session.handle(),
                    &sys_desc,
                    sys::NV_OF_CUDA_BUFFER_TYPE::CUDEVICEPTR,
                    &mut handle,
                )
            },
            "nvOFCreateGPUBufferCuda",
        )?;

        // SAFETY: handle was just created and is live.
        let device_ptr = unsafe { get_ptr(handle) };
        let mut stride = sys::NV_OF_CUDA_BUFFER_STRIDE_INFO::default();
        // SAFETY: handle is live; stride receives the layout.
        let stride_status = unsafe { get_stride(handle, &mut stride) };
        if let Err(err) = sys::check_of(stride_status, "nvOFGPUBufferGetStrideInfo") {
            // Don't leak the freshly created buffer on a stride failure.
            if let Some(destroy) = session.funcs().nvOFDestroyGPUBufferCuda {
                // SAFETY: handle is live and not yet owned by a DeviceBuffer.
                unsafe {
                    destroy(handle);
                }
            }
            return Err(err);
        }

        Ok(Self {
            session,
            desc,
            handle,
            device_ptr,
            stride,
        })
    }

    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn usage(&self) -> BufferUsage {
        self.desc.usage
    }

    pub fn format(&self) -> BufferFormat {
        self.desc.format
    }

    /// Bytes of tightly packed host memory this buffer maps to.
    pub fn required_host_bytes(&self) -> usize {
        self.desc.host_bytes()
    }

    pub(crate) fn of_handle(&self) -> NvOFGPUBufferHandle {
        self.handle
    }

    fn row_bytes(&self) -> usize {
        self.desc.width as usize * self.desc.format.element_size() as usize
    }

    fn check_host_len(&self, len: usize) -> Result<()> {
        let required = self.required_host_bytes();
        if len < required {
            return Err(FlowError::InvalidParam(format!(
                "host slice of {len} bytes too small for {}x{} {:?} buffer (need {required})",
                self.desc.width, self.desc.height, self.desc.format
            )));
        }
        Ok(())
    }

    /// Queue a host→device copy of a tightly packed frame.  Returns at
    /// submission; ordering against a following `execute` on the same
    /// stream is FIFO.
    pub fn upload(&self, data: &[u8]) -> Result<()> {
        self.check_host_len(data.len())?;
        let stream = self.session.gpu().stream_for(self.desc.usage);
        let row_bytes = self.row_bytes();

        let mut copy = sys::CUDA_MEMCPY2D::zeroed();
        copy.WidthInBytes = row_bytes;
        copy.srcMemoryType = CUmemorytype::Host;
        copy.srcHost = data.as_ptr() as *const c_void;
        copy.srcPitch = row_bytes;
        copy.dstMemoryType = CUmemorytype::Device;
        copy.dstDevice = self.device_ptr;
        copy.dstPitch = self.stride.strideInfo[0].strideXInBytes as usize;
        copy.Height = self.desc.height as usize;
        // SAFETY: data outlives the submission per the crate's ordering
        // model (the caller downloads or drains before dropping it); the
        // destination is this buffer's live allocation.
        let rc = unsafe { sys::cu_memcpy2d_async(&copy, stream) }?;
        sys::check_cu(rc, "cuMemcpy2DAsync (upload)")?;

        if self.desc.format.has_chroma_plane() {
            // Chroma plane: half height, sourced right after the packed
            // luma plane, landing at the reported plane row offset.
            copy.Height = (self.desc.height as usize).div_ceil(2);
            // SAFETY: offset stays within data, checked against host_bytes.
            copy.srcHost =
                unsafe { data.as_ptr().add(row_bytes * self.desc.height as usize) } as *const c_void;
            copy.dstY = self.stride.strideInfo[0].strideYInBytes as usize;
            // SAFETY: same allocation, chroma rows live below the luma rows.
            let rc = unsafe { sys::cu_memcpy2d_async(&copy, stream) }?;
            sys::check_cu(rc, "cuMemcpy2DAsync (upload chroma)")?;
        }
        Ok(())
    }

    /// Copy the buffer to host memory and block until the copy (and all
    /// work queued before it on this stream) has completed.
    pub fn download(&self, data: &mut [u8]) -> Result<()> {
        self.check_host_len(data.len())?;
        let stream = self.session.gpu().stream_for(self.desc.usage);
        let row_bytes = self.row_bytes();

        let mut copy = sys::CUDA_MEMCPY2D::zeroed();
        copy.WidthInBytes = row_bytes;
        copy.dstMemoryType = CUmemorytype::Host;
        copy.dstHost = data.as_mut_ptr() as *mut c_void;
        copy.dstPitch = row_bytes;
        copy.srcMemoryType = CUmemorytype::Device;
        copy.srcDevice = self.device_ptr;
        copy.srcPitch = self.stride.strideInfo[0].strideXInBytes as usize;
        copy.Height = self.desc.height as usize;
        // SAFETY: data is a live writable slice large enough for the copy.
        let rc = unsafe { sys::cu_memcpy2d_async(&copy, stream) }?;
        sys::check_cu(rc, "cuMemcpy2DAsync (download)")?;

        if self.desc.format.has_chroma_plane() {
            copy.Height = (self.desc.height as usize).div_ceil(2);
            // SAFETY: offset stays within data, checked against host_bytes.
            copy.dstHost =
                unsafe { data.as_mut_ptr().add(row_bytes * self.desc.height as usize) }
                    as *mut c_void;
            copy.srcY = self.stride.strideInfo[0].strideYInBytes as usize;
            // SAFETY: same allocation, chroma rows live below the luma rows.
            let rc = unsafe { sys::cu_memcpy2d_async(&copy, stream) }?;
            sys::check_cu(rc, "cuMemcpy2DAsync (download chroma)")?;
        }

        // The one blocking point: everything queued on this stream before
        // the copy (uploads, execute) is complete when this returns.
        GpuContext::sync_stream(stream)
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if self.handle.is_null() {
            return;
        }
        if let Some(destroy) = self.session.funcs().nvOFDestroyGPUBufferCuda {
            // SAFETY: handle is live and destroyed exactly once; the Arc on
            // the session guarantees the session outlives this buffer.
            let status = unsafe { destroy(self.handle) };
            if status != sys::NV_OF_SUCCESS {
                warn!(
                    status = sys::of_status_name(status),
                    "nvOFDestroyGPUBufferCuda failed during buffer drop"
                );
            }
        }
        self.handle = std::ptr::null_mut();
        self.device_ptr = 0;
    }
}
