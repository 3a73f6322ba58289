//! flowviz CLI entrypoint.
//!
//! ```bash
//! flowviz --input clip.mp4 --grid-size 4 --output flow.rgb
//! flowviz --input clip.mp4 --output - | ffplay -f rawvideo -pixel_format rgb24 -video_size 480x270 -
//! ```
//!
//! Logs go to stderr; stdout is reserved for raw video when `--output -`.

mod sink;
mod source;
mod stream;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::info;

use flowviz_core::types::{BufferFormat, OutputGridSize, PerfLevel};
use flowviz_nvof::{GpuContext, OfBinding};
use flowviz_pipeline::{FlowConfig, FlowPipeline};

use sink::RawImageSink;
use source::FfmpegFrameSource;
use stream::stream_frames;

#[derive(Parser, Debug)]
#[command(
    name = "flowviz",
    version,
    about = "Hardware optical flow visualizer",
    after_help = "Examples:\n  flowviz --input clip.mp4 --output flow.rgb\n  flowviz --input clip.mp4 --grid-size 1 --perf-level fast --output -"
)]
struct Cli {
    /// Input video file (anything ffmpeg can decode).
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output path for raw RGB24 frames, `-` for stdout.
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: PathBuf,

    /// CUDA device ordinal.
    #[arg(short = 'd', long = "device", default_value_t = 0)]
    device: usize,

    /// Output vector grid size (1, 2, or 4 pixels per vector).
    #[arg(short = 'g', long = "grid-size", default_value_t = 4)]
    grid_size: u32,

    /// Frame width fed to the engine.
    #[arg(long = "width", default_value_t = 1920, value_parser = clap::value_parser!(u32).range(32..=8192))]
    width: u32,

    /// Frame height fed to the engine.
    #[arg(long = "height", default_value_t = 1080, value_parser = clap::value_parser!(u32).range(32..=8192))]
    height: u32,

    /// Engine quality/speed tradeoff.
    #[arg(long = "perf-level", value_enum, default_value_t = PerfArg::Slow)]
    perf_level: PerfArg,

    /// Stop after this many frame pairs.
    #[arg(long = "max-frames")]
    max_frames: Option<u64>,

    /// Treat frame pairs as independent images (no temporal hints).
    #[arg(long = "no-temporal-hints")]
    no_temporal_hints: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PerfArg {
    Slow,
    Medium,
    Fast,
}

impl From<PerfArg> for PerfLevel {
    fn from(arg: PerfArg) -> Self {
        match arg {
            PerfArg::Slow => Self::Slow,
            PerfArg::Medium => Self::Medium,
            PerfArg::Fast => Self::Fast,
        }
    }
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        tracing::error!(error = format!("{err:#}"), "flowviz failed");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let grid_size = OutputGridSize::from_u32(cli.grid_size)?;
    let config = FlowConfig {
        width: cli.width,
        height: cli.height,
        grid_size,
        perf_level: cli.perf_level.into(),
        input_format: BufferFormat::Abgr8,
        disable_temporal_hints: cli.no_temporal_hints,
    };

    // No software fallback: without the driver library there is nothing
    // useful this tool can do.
    let binding = OfBinding::load().context("loading optical flow driver")?;
    let gpu = GpuContext::new(cli.device).context("initializing CUDA device")?;
    let mut pipeline = FlowPipeline::new(binding, gpu);

    let mut source = FfmpegFrameSource::spawn(&cli.input, cli.width, cli.height)
        .context("starting ffmpeg decoder")?;
    let mut sink = RawImageSink::open(&cli.output).context("opening output")?;

    let frame_bytes = abgr_frame_bytes(cli.width, cli.height);
    let (out_w, out_h) = config.output_dims();
    info!(
        input = %cli.input.display(),
        width = cli.width,
        height = cli.height,
        grid = cli.grid_size,
        out_w,
        out_h,
        "streaming optical flow"
    );

    let started = Instant::now();
    let stats = stream_frames(
        &mut source,
        &mut sink,
        frame_bytes,
        cli.max_frames,
        |a, b| pipeline.compute_flow(a, b, &config),
    )?;
    let elapsed = started.elapsed();

    info!(
        pairs = stats.pairs,
        written = stats.written,
        suppressed = stats.suppressed,
        elapsed_s = format!("{:.2}", elapsed.as_secs_f64()),
        fps = format!("{:.1}", stats.pairs as f64 / elapsed.as_secs_f64().max(1e-6)),
        "done"
    );
    Ok(())
}

/// Size of one packed ABGR frame, computed in `usize` so it cannot wrap.
const fn abgr_frame_bytes(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

fn init_tracing() {
    let ansi_enabled = std::env::var_os("NO_COLOR").is_none() && std::io::stderr().is_terminal();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_ansi(ansi_enabled)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_dimensions() {
        assert!(Cli::try_parse_from(["flowviz", "-i", "in.mp4", "--width", "100000"]).is_err());
        assert!(Cli::try_parse_from(["flowviz", "-i", "in.mp4", "--width", "0"]).is_err());
        assert!(Cli::try_parse_from(["flowviz", "-i", "in.mp4", "--height", "16"]).is_err());
        assert!(Cli::try_parse_from(["flowviz", "-i", "in.mp4"]).is_ok());
    }

    #[test]
    fn frame_size_fits_at_the_dimension_bounds() {
        assert_eq!(abgr_frame_bytes(1920, 1080), 1920 * 1080 * 4);
        assert_eq!(abgr_frame_bytes(8192, 8192), 8192 * 8192 * 4);
    }
}
