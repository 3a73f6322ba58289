//! Flow computation pipeline: one call per frame pair.
//!
//! `compute_vectors` runs the fixed sequence — session (cached), buffer
//! set (cached), upload both frames, submit execute, download — and hands
//! back the parsed vector field.  `compute_flow` adds the color mapping.
//! The session and buffers are torn down and rebuilt whenever the
//! configuration changes; buffers always drop before their session by Arc
//! ownership.

use std::sync::Arc;

use tracing::{debug, info};

use flowviz_core::color::ColorWheel;
use flowviz_core::error::Result;
use flowviz_core::types::{
    BufferDescriptor, BufferFormat, BufferUsage, FlowMode, HintGridSize, OutputGridSize, PerfLevel,
    PredDirection, RgbImage, VectorField,
};
use flowviz_nvof::{
    DeviceBuffer, ExecuteOptions, FlowSession, FlowSessionConfig, GpuContext, OfBinding,
};

/// User-facing flow parameters for one stream of frame pairs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowConfig {
    pub width: u32,
    pub height: u32,
    pub grid_size: OutputGridSize,
    pub perf_level: PerfLevel,
    pub input_format: BufferFormat,
    /// Set when frame pairs are independent images rather than successive
    /// video frames.
    pub disable_temporal_hints: bool,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            grid_size: OutputGridSize::Grid4,
            perf_level: PerfLevel::Slow,
            input_format: BufferFormat::Abgr8,
            disable_temporal_hints: false,
        }
    }
}

impl FlowConfig {
    /// Vector grid dimensions for this configuration.
    pub const fn output_dims(&self) -> (u32, u32) {
        VectorField::output_dims(self.width, self.height, self.grid_size)
    }

    fn session_config(&self) -> FlowSessionConfig {
        FlowSessionConfig {
            width: self.width,
            height: self.height,
            input_format: self.input_format,
            mode: FlowMode::OpticalFlow,
            output_grid: self.grid_size,
            hint_grid: HintGridSize::Grid4,
            perf_level: self.perf_level,
            pred_direction: PredDirection::Forward,
            ..Default::default()
        }
    }
}

/// Session plus buffer set kept alive between calls with the same config.
struct CachedState {
    config: FlowConfig,
    session: Arc<FlowSession>,
    input: DeviceBuffer,
    reference: DeviceBuffer,
    output: DeviceBuffer,
}

/// Drives the optical flow engine for a stream of frame pairs.
pub struct FlowPipeline {
    binding: Arc<OfBinding>,
    gpu: Arc<GpuContext>,
    wheel: ColorWheel,
    cached: Option<CachedState>,
    frame_index: u64,
}

impl FlowPipeline {
    pub fn new(binding: Arc<OfBinding>, gpu: Arc<GpuContext>) -> Self {
        Self {
            binding,
            gpu,
            wheel: ColorWheel::new(),
            cached: None,
            frame_index: 0,
        }
    }

    /// Compute motion vectors from `frame_a` to `frame_b`.
    ///
    /// Both frames must be tightly packed in `config.input_format` at
    /// `config.width × config.height`.
    pub fn compute_vectors(
        &mut self,
        frame_a: &[u8],
        frame_b: &[u8],
        config: &FlowConfig,
    ) -> Result<VectorField> {
        let state = self.ensure_state(config)?;
        let (out_w, out_h) = config.output_dims();

        state.input.upload(frame_a)?;
        state.reference.upload(frame_b)?;
        state.session.execute(
            &state.input,
            &state.reference,
            &state.output,
            &ExecuteOptions {
                disable_temporal_hints: config.disable_temporal_hints,
                rois: Vec::new(),
            },
        )?;

        // Blocks until the execute above has drained.
        let mut raw = vec![0u8; state.output.required_host_bytes()];
        state.output.download(&mut raw)?;

        self.frame_index += 1;
        debug!(frame = self.frame_index, out_w, out_h, "flow pair computed");
        VectorField::from_raw(out_w, out_h, &raw)
    }

    /// Compute and color-map one frame pair.  `None` means the field
    /// contained invalid vectors and the frame is suppressed.
    pub fn compute_flow(
        &mut self,
        frame_a: &[u8],
        frame_b: &[u8],
        config: &FlowConfig,
    ) -> Result<Option<RgbImage>> {
        let field = self.compute_vectors(frame_a, frame_b, config)?;
        Ok(self.wheel.visualize(&field))
    }

    fn ensure_state(&mut self, config: &FlowConfig) -> Result<&CachedState> {
        let rebuild = match &self.cached {
            Some(state) => state.config != *config,
            None => true,
        };
        if rebuild {
            // Old buffers drop before their session finally goes away;
            // the session drop drains in-flight work.
            self.cached = None;

            let mut session = FlowSession::open(self.binding.clone(), self.gpu.clone())?;
            session.initialize(&config.session_config())?;
            let session = Arc::new(session);

            let frame_desc = BufferDescriptor {
                width: config.width,
                height: config.height,
                usage: BufferUsage::Input,
                format: config.input_format,
            };
            let (out_w, out_h) = config.output_dims();
            let output_desc = BufferDescriptor {
                width: out_w,
                height: out_h,
                usage: BufferUsage::Output,
                format: BufferFormat::Short2,
            };

            info!(
                width = config.width,
                height = config.height,
                grid = config.grid_size.as_u32(),
                "building flow session and buffers"
            );
            self.cached = Some(CachedState {
                config: config.clone(),
                input: DeviceBuffer::create(session.clone(), frame_desc)?,
                reference: DeviceBuffer::create(session.clone(), frame_desc)?,
                output: DeviceBuffer::create(session.clone(), output_desc)?,
                session,
            });
        }
        Ok(self.cached.as_ref().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_dims_follow_grid_size() {
        let config = FlowConfig::default();
        assert_eq!(config.output_dims(), (480, 270));

        let config = FlowConfig {
            grid_size: OutputGridSize::Grid1,
            ..Default::default()
        };
        assert_eq!(config.output_dims(), (1920, 1080));
    }

    #[test]
    fn session_config_carries_flow_parameters() {
        let config = FlowConfig {
            width: 1280,
            height: 720,
            grid_size: OutputGridSize::Grid2,
            perf_level: PerfLevel::Fast,
            input_format: BufferFormat::Nv12,
            disable_temporal_hints: true,
        };
        let sc = config.session_config();
        assert_eq!((sc.width, sc.height), (1280, 720));
        assert_eq!(sc.output_grid, OutputGridSize::Grid2);
        assert_eq!(sc.perf_level, PerfLevel::Fast);
        assert_eq!(sc.input_format, BufferFormat::Nv12);
        assert_eq!(sc.mode, FlowMode::OpticalFlow);
        assert_eq!(sc.pred_direction, PredDirection::Forward);
        assert!(!sc.enable_external_hints);
    }

    #[test]
    fn config_equality_drives_cache_reuse() {
        let a = FlowConfig::default();
        let b = FlowConfig::default();
        assert_eq!(a, b);
        let c = FlowConfig {
            grid_size: OutputGridSize::Grid2,
            ..Default::default()
        };
        assert_ne!(a, c);
    }
}
