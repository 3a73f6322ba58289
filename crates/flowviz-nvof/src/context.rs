//! CUDA device context with the two execution streams the flow engine
//! expects: one for input-frame DMA, one for output readback.
//!
//! Stream routing follows buffer usage — Input-usage buffers move on the
//! input stream, everything else on the output stream.  Work on one stream
//! executes FIFO; ordering across the two streams is only established by
//! the download barrier in `buffer.rs`.

use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaStream};
use tracing::info;

use crate::sys::{self, CUcontext, CUstream};
use flowviz_core::error::Result;
use flowviz_core::types::BufferUsage;

/// One CUDA device plus the input/output stream pair shared by every
/// session and buffer on it.
pub struct GpuContext {
    device: Arc<CudaDevice>,
    input_stream: CudaStream,
    output_stream: CudaStream,
}

impl GpuContext {
    /// Initialize the device at `device_ordinal` and fork the two streams.
    pub fn new(device_ordinal: usize) -> Result<Arc<Self>> {
        let device = CudaDevice::new(device_ordinal)?;
        let input_stream = device.fork_default_stream()?;
        let output_stream = device.fork_default_stream()?;
        info!(device_ordinal, name = %device.name().unwrap_or_default(), "GPU context ready");
        Ok(Arc::new(Self {
            device,
            input_stream,
            output_stream,
        }))
    }

    /// Access the underlying `CudaDevice`.
    #[inline]
    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }

    /// Raw primary context handle for the driver API.
    pub fn raw_context(&self) -> CUcontext {
        *self.device.cu_primary_ctx() as CUcontext
    }

    pub fn input_stream(&self) -> CUstream {
        self.input_stream.stream as CUstream
    }

    pub fn output_stream(&self) -> CUstream {
        self.output_stream.stream as CUstream
    }

    /// Stream a copy for a buffer of the given usage should ride on.
    pub fn stream_for(&self, usage: BufferUsage) -> CUstream {
        match usage {
            BufferUsage::Input => self.input_stream(),
            _ => self.output_stream(),
        }
    }

    /// Block until all work enqueued on `stream` completes.
    pub fn sync_stream(stream: CUstream) -> Result<()> {
        // SAFETY: stream is a live handle forked from this device.
        let rc = unsafe { sys::cu_stream_synchronize(stream) }?;
        sys::check_cu(rc, "cuStreamSynchronize")
    }
}

// SAFETY: CudaDevice is Arc-shared and the raw stream handles are only
// handed to driver calls; the crate's single-controlling-thread model does
// the rest.
unsafe impl Send for GpuContext {}
unsafe impl Sync for GpuContext {}
