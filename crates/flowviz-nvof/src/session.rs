//! Optical flow session lifecycle.
//!
//! One `FlowSession` wraps one driver session handle.  The lifecycle is
//! strict: `open` → `initialize` → any number of `execute` submissions →
//! drop.  `execute` returns at submission; completion is observed by
//! downloading the output buffer (`buffer.rs`).  Buffers hold an
//! `Arc<FlowSession>` so the session handle always outlives every buffer
//! created from it.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::binding::OfBinding;
use crate::buffer::DeviceBuffer;
use crate::context::GpuContext;
use crate::sys::{self, NV_OF_BOOL, NV_OF_FALSE, NV_OF_TRUE, NvOFHandle};
use flowviz_core::error::{FlowError, Result};
use flowviz_core::types::{
    BufferFormat, BufferUsage, FlowMode, HintGridSize, OutputGridSize, PerfLevel, PredDirection,
};

#[inline]
fn of_bool(value: bool) -> NV_OF_BOOL {
    if value { NV_OF_TRUE } else { NV_OF_FALSE }
}

// ─── Configuration ───────────────────────────────────────────────────────

/// Session initialization parameters.  Defaults mirror the common
/// video-visualization setup: full-HD ABGR8 input, forward optical flow at
/// best quality, every optional feature off.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowSessionConfig {
    pub width: u32,
    pub height: u32,
    pub input_format: BufferFormat,
    pub mode: FlowMode,
    pub output_grid: OutputGridSize,
    pub hint_grid: HintGridSize,
    pub perf_level: PerfLevel,
    pub pred_direction: PredDirection,
    pub enable_external_hints: bool,
    pub enable_output_cost: bool,
    pub enable_roi: bool,
    pub enable_global_flow: bool,
}

impl Default for FlowSessionConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            input_format: BufferFormat::Abgr8,
            mode: FlowMode::OpticalFlow,
            output_grid: OutputGridSize::Grid4,
            hint_grid: HintGridSize::Grid4,
            perf_level: PerfLevel::Slow,
            pred_direction: PredDirection::Forward,
            enable_external_hints: false,
            enable_output_cost: false,
            enable_roi: false,
            enable_global_flow: false,
        }
    }
}

/// Per-submission options.
#[derive(Clone, Debug, Default)]
pub struct ExecuteOptions {
    /// Suppress reuse of the previous call's vectors as hints.  Set when
    /// the frame pair is not temporally adjacent.
    pub disable_temporal_hints: bool,
    /// Restrict estimation to these rectangles.  Requires `enable_roi` at
    /// initialization.
    pub rois: Vec<RoiRect>,
}

/// Region of interest, in pixels, subject to driver alignment rules.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RoiRect {
    pub start_x: u32,
    pub start_y: u32,
    pub width: u32,
    pub height: u32,
}

// ─── Capabilities ────────────────────────────────────────────────────────

/// Device capabilities gathered once per session.
#[derive(Clone, Debug, Default)]
pub struct CapsSummary {
    pub output_grids: Vec<u32>,
    pub hint_grids: Vec<u32>,
    pub width_min: u32,
    pub height_min: u32,
    pub width_max: u32,
    pub height_max: u32,
    pub supports_hints_with_flow: bool,
    pub supports_roi: bool,
    pub roi_max: u32,
    pub supports_stereo: bool,
}

/// Check a configuration against device capabilities.  Pure, so callers
/// without a GPU can exercise every rejection path.
pub fn validate_config(caps: &CapsSummary, config: &FlowSessionConfig) -> Result<()> {
    let grid = config.output_grid.as_u32();
    if !caps.output_grids.contains(&grid) {
        return Err(FlowError::InvalidParam(format!(
            "output grid size {grid} not supported by this device (supported: {:?})",
            caps.output_grids
        )));
    }
    if config.width < caps.width_min
        || config.width > caps.width_max
        || config.height < caps.height_min
        || config.height > caps.height_max
    {
        return Err(FlowError::InvalidParam(format!(
            "input {}x{} outside supported range {}x{}..{}x{}",
            config.width,
            config.height,
            caps.width_min,
            caps.height_min,
            caps.width_max,
            caps.height_max
        )));
    }
    if config.enable_external_hints {
        if !caps.supports_hints_with_flow {
            return Err(FlowError::InvalidParam(
                "external hints not supported by this device".to_string(),
            ));
        }
        let hint = config.hint_grid.as_u32();
        if !caps.hint_grids.contains(&hint) {
            return Err(FlowError::InvalidParam(format!(
                "hint grid size {hint} not supported (supported: {:?})",
                caps.hint_grids
            )));
        }
        if hint < grid {
            return Err(FlowError::InvalidParam(format!(
                "hint grid size {hint} must be >= output grid size {grid}"
            )));
        }
    }
    if config.mode == FlowMode::StereoDisparity {
        if !caps.supports_stereo {
            return Err(FlowError::InvalidParam(
                "stereo disparity mode not supported by this device".to_string(),
            ));
        }
        if config.pred_direction == PredDirection::Both {
            return Err(FlowError::InvalidParam(
                "bidirectional prediction is not valid in stereo disparity mode".to_string(),
            ));
        }
        if config.enable_global_flow {
            return Err(FlowError::InvalidParam(
                "global flow is not valid in stereo disparity mode".to_string(),
            ));
        }
    }
    if config.enable_roi && !caps.supports_roi {
        return Err(FlowError::InvalidParam(
            "ROI estimation not supported by this device".to_string(),
        ));
    }
    Ok(())
}

// ─── Session ─────────────────────────────────────────────────────────────

/// One optical flow engine session bound to a GPU context.
pub struct FlowSession {
    binding: Arc<OfBinding>,
    gpu: Arc<GpuContext>,
    handle: NvOFHandle,
    config: Option<FlowSessionConfig>,
}

// SAFETY: the handle is only passed to driver entry points; callers follow
// the single-controlling-thread model documented on the crate.
unsafe impl Send for FlowSession {}
unsafe impl Sync for FlowSession {}

impl FlowSession {
    /// Create a session on the context's device and attach the two
    /// execution streams.
    pub fn open(binding: Arc<OfBinding>, gpu: Arc<GpuContext>) -> Result<Self> {
        let create = binding.funcs().nvCreateOpticalFlowCuda.ok_or_else(|| {
            FlowError::EngineUnavailable("nvCreateOpticalFlowCuda not found".into())
        })?;
        let set_streams = binding
            .funcs()
            .nvOFSetIOCudaStreams
            .ok_or_else(|| FlowError::EngineUnavailable("nvOFSetIOCudaStreams not found".into()))?;

        let mut handle: NvOFHandle = std::ptr::null_mut();
        // SAFETY: raw_context is the device's live primary context; handle
        // receives the session pointer.
        sys::check_of(
            unsafe { create(gpu.raw_context(), &mut handle) },
            "nvCreateOpticalFlowCuda",
        )?;

        let session = Self {
            binding,
            gpu,
            handle,
            config: None,
        };
        // SAFETY: handle is live; streams are owned by the context for at
        // least as long as this session.
        sys::check_of(
            unsafe {
                set_streams(
                    session.handle,
                    session.gpu.input_stream(),
                    session.gpu.output_stream(),
                )
            },
            "nvOFSetIOCudaStreams",
        )?;
        debug!("optical flow session opened");
        Ok(session)
    }

    /// Two-phase capability query: fetch the value count, then the values.
    pub fn capabilities(&self, cap: sys::NV_OF_CAPS) -> Result<Vec<u32>> {
        let get_caps = self
            .binding
            .funcs()
            .nvOFGetCaps
            .ok_or_else(|| FlowError::EngineUnavailable("nvOFGetCaps not found".into()))?;

        let mut count = 0u32;
        // SAFETY: null capsVal requests the count, per the interface contract.
        sys::check_of(
            unsafe { get_caps(self.handle, cap, std::ptr::null_mut(), &mut count) },
            "nvOFGetCaps (count)",
        )?;
        let mut values = vec![0u32; count as usize];
        if count > 0 {
            // SAFETY: values has exactly `count` writable slots.
            sys::check_of(
                unsafe { get_caps(self.handle, cap, values.as_mut_ptr(), &mut count) },
                "nvOFGetCaps (values)",
            )?;
            values.truncate(count as usize);
        }
        Ok(values)
    }

    /// Gather the capability values used for configuration validation.
    pub fn caps_summary(&self) -> Result<CapsSummary> {
        use sys::NV_OF_CAPS as C;
        let first = |values: Vec<u32>| values.first().copied().unwrap_or(0);
        Ok(CapsSummary {
            output_grids: self.capabilities(C::SUPPORTED_OUTPUT_GRID_SIZES)?,
            hint_grids: self.capabilities(C::SUPPORTED_HINT_GRID_SIZES)?,
            width_min: first(self.capabilities(C::WIDTH_MIN)?),
            height_min: first(self.capabilities(C::HEIGHT_MIN)?),
            width_max: first(self.capabilities(C::WIDTH_MAX)?),
            height_max: first(self.capabilities(C::HEIGHT_MAX)?),
            supports_hints_with_flow: first(self.capabilities(C::SUPPORT_HINT_WITH_OF_MODE)?) != 0,
            supports_roi: first(self.capabilities(C::SUPPORT_ROI)?) != 0,
            roi_max: first(self.capabilities(C::SUPPORT_ROI_MAX_NUM)?),
            supports_stereo: first(self.capabilities(C::SUPPORT_STEREO)?) != 0,
        })
    }

    /// Validate `config` against device capabilities and initialize the
    /// engine with it.
    pub fn initialize(&mut self, config: &FlowSessionConfig) -> Result<()> {
        let init = self
            .binding
            .funcs()
            .nvOFInit
            .ok_or_else(|| FlowError::EngineUnavailable("nvOFInit not found".into()))?;

        let caps = self.caps_summary()?;
        validate_config(&caps, config)?;

        let params = sys::NV_OF_INIT_PARAMS {
            width: config.width,
            height: config.height,
            outGridSize: config.output_grid.into(),
            hintGridSize: if config.enable_external_hints {
                config.hint_grid.into()
            } else {
                sys::NV_OF_HINT_VECTOR_GRID_SIZE::UNDEFINED
            },
            mode: config.mode.into(),
            perfLevel: config.perf_level.into(),
            enableExternalHints: of_bool(config.enable_external_hints),
            enableOutputCost: of_bool(config.enable_output_cost),
            hPrivData: std::ptr::null_mut(),
            disparityRange: sys::NV_OF_STEREO_DISPARITY_RANGE::UNDEFINED,
            enableRoi: of_bool(config.enable_roi),
            predDirection: config.pred_direction.into(),
            enableGlobalFlow: of_bool(config.enable_global_flow),
            inputBufferFormat: config.input_format.into(),
        };

        // SAFETY: handle is live and params is fully initialized.
        let status = unsafe { init(self.handle, &params) };
        sys::check_of(status, "nvOFInit").map_err(|err| self.attach_last_error(err))?;

        info!(
            width = config.width,
            height = config.height,
            grid = config.output_grid.as_u32(),
            perf = ?config.perf_level,
            "optical flow session initialized"
        );
        self.config = Some(config.clone());
        Ok(())
    }

    /// The configuration this session was initialized with, if any.
    pub fn config(&self) -> Option<&FlowSessionConfig> {
        self.config.as_ref()
    }

    /// Submit a flow computation between `input` and `reference` into
    /// `output`.  Returns once the request is queued on the engine; the
    /// result is observed by downloading `output`.
    pub fn execute(
        &self,
        input: &DeviceBuffer,
        reference: &DeviceBuffer,
        output: &DeviceBuffer,
        options: &ExecuteOptions,
    ) -> Result<()> {
        if self.config.is_none() {
            return Err(FlowError::NotInitialized(
                "execute called before initialize".to_string(),
            ));
        }
        if input.usage() != BufferUsage::Input || reference.usage() != BufferUsage::Input {
            return Err(FlowError::InvalidParam(
                "input and reference must be Input-usage buffers".to_string(),
            ));
        }
        if output.usage() != BufferUsage::Output {
            return Err(FlowError::InvalidParam(
                "output must be an Output-usage buffer".to_string(),
            ));
        }
        let execute = self
            .binding
            .funcs()
            .nvOFExecute
            .ok_or_else(|| FlowError::EngineUnavailable("nvOFExecute not found".into()))?;

        let rois: Vec<sys::NV_OF_ROI_RECT> = options
            .rois
            .iter()
            .map(|r| sys::NV_OF_ROI_RECT {
                start_x: r.start_x,
                start_y: r.start_y,
                width: r.width,
                height: r.height,
            })
            .collect();

        let in_params = sys::NV_OF_EXECUTE_INPUT_PARAMS {
            inputFrame: input.of_handle(),
            referenceFrame: reference.of_handle(),
            externalHints: std::ptr::null_mut(),
            disableTemporalHints: of_bool(options.disable_temporal_hints),
            padding: 0,
            hPrivData: std::ptr::null_mut(),
            padding2: 0,
            numRois: rois.len() as u32,
            roiData: if rois.is_empty() {
                std::ptr::null()
            } else {
                rois.as_ptr()
            },
        };
        let mut out_params = sys::NV_OF_EXECUTE_OUTPUT_PARAMS {
            outputBuffer: output.of_handle(),
            outputCostBuffer: std::ptr::null_mut(),
            hPrivData: std::ptr::null_mut(),
            bwdOutputBuffer: std::ptr::null_mut(),
            bwdOutputCostBuffer: std::ptr::null_mut(),
            globalFlowBuffer: std::ptr::null_mut(),
        };

        // SAFETY: all buffer handles are live (borrowed for this call) and
        // rois outlives the call.
        let status = unsafe { execute(self.handle, &in_params, &mut out_params) };
        sys::check_of(status, "nvOFExecute").map_err(|err| self.attach_last_error(err))
    }

    /// Fetch the driver's description of the most recent failure.
    pub fn last_error(&self) -> Option<String> {
        let get_last_error = self.binding.funcs().nvOFGetLastError?;
        let mut buf = [0u8; sys::MIN_ERROR_STRING_SIZE];
        let mut size = buf.len() as u32;
        // SAFETY: buf meets the minimum size contract; size is in/out.
        let status = unsafe { get_last_error(self.handle, buf.as_mut_ptr(), &mut size) };
        if status != sys::NV_OF_SUCCESS {
            return None;
        }
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        let text = String::from_utf8_lossy(&buf[..len]).trim().to_string();
        (!text.is_empty()).then_some(text)
    }

    /// Append the driver's last-error text to a failure, when available.
    /// The variant (and error code) of `err` is preserved.
    fn attach_last_error(&self, err: FlowError) -> FlowError {
        match self.last_error() {
            Some(detail) => err.with_detail(&detail),
            None => err,
        }
    }

    pub(crate) fn funcs(&self) -> &sys::NV_OF_CUDA_API_FUNCTION_LIST {
        self.binding.funcs()
    }

    pub(crate) fn handle(&self) -> NvOFHandle {
        self.handle
    }

    pub(crate) fn gpu(&self) -> &GpuContext {
        &self.gpu
    }
}

impl Drop for FlowSession {
    fn drop(&mut self) {
        if self.handle.is_null() {
            return;
        }
        if let Some(destroy) = self.binding.funcs().nvOFDestroy {
            // SAFETY: handle is live and destroyed exactly once; the driver
            // drains in-flight work before returning.
            let status = unsafe { destroy(self.handle) };
            if status != sys::NV_OF_SUCCESS {
                warn!(
                    status = sys::of_status_name(status),
                    "nvOFDestroy failed during session drop"
                );
            }
        }
        self.handle = std::ptr::null_mut();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turing_caps() -> CapsSummary {
        CapsSummary {
            output_grids: vec![1, 2, 4],
            hint_grids: vec![1, 2, 4, 8],
            width_min: 32,
            height_min: 32,
            width_max: 8192,
            height_max: 8192,
            supports_hints_with_flow: true,
            supports_roi: false,
            roi_max: 0,
            supports_stereo: true,
        }
    }

    #[test]
    fn default_config_passes_validation() {
        assert!(validate_config(&turing_caps(), &FlowSessionConfig::default()).is_ok());
    }

    #[test]
    fn rejects_unsupported_output_grid() {
        let caps = CapsSummary {
            output_grids: vec![4],
            ..turing_caps()
        };
        let config = FlowSessionConfig {
            output_grid: OutputGridSize::Grid1,
            ..Default::default()
        };
        assert!(matches!(
            validate_config(&caps, &config),
            Err(FlowError::InvalidParam(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_dimensions() {
        let config = FlowSessionConfig {
            width: 16,
            height: 16,
            ..Default::default()
        };
        assert!(validate_config(&turing_caps(), &config).is_err());

        let config = FlowSessionConfig {
            width: 16384,
            height: 1080,
            ..Default::default()
        };
        assert!(validate_config(&turing_caps(), &config).is_err());
    }

    #[test]
    fn rejects_hint_grid_finer_than_output_grid() {
        let config = FlowSessionConfig {
            enable_external_hints: true,
            output_grid: OutputGridSize::Grid4,
            hint_grid: HintGridSize::Grid1,
            ..Default::default()
        };
        assert!(validate_config(&turing_caps(), &config).is_err());

        let config = FlowSessionConfig {
            enable_external_hints: true,
            output_grid: OutputGridSize::Grid4,
            hint_grid: HintGridSize::Grid8,
            ..Default::default()
        };
        assert!(validate_config(&turing_caps(), &config).is_ok());
    }

    #[test]
    fn rejects_bidirectional_stereo() {
        let config = FlowSessionConfig {
            mode: FlowMode::StereoDisparity,
            pred_direction: PredDirection::Both,
            ..Default::default()
        };
        assert!(validate_config(&turing_caps(), &config).is_err());
    }

    #[test]
    fn rejects_roi_when_unsupported() {
        let config = FlowSessionConfig {
            enable_roi: true,
            ..Default::default()
        };
        assert!(validate_config(&turing_caps(), &config).is_err());
    }
}
