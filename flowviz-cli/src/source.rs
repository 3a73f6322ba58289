//! Frame input: an external `ffmpeg` process decoding to a raw pixel pipe.
//!
//! Demuxing and decoding stay out of process; this binary only consumes
//! fixed-size packed frames from ffmpeg's stdout.  A short read means the
//! stream ended.

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};

use tracing::debug;

use flowviz_core::error::{FlowError, Result};
use flowviz_core::io::FrameSource;

/// Reads packed ABGR frames from a spawned `ffmpeg` decoder.
pub struct FfmpegFrameSource {
    child: Child,
    width: u32,
    height: u32,
}

impl FfmpegFrameSource {
    /// Spawn `ffmpeg -i <input> -f rawvideo -pix_fmt abgr -` scaled to the
    /// session dimensions.
    pub fn spawn(input: &Path, width: u32, height: u32) -> Result<Self> {
        let child = Command::new("ffmpeg")
            .arg("-hide_banner")
            .args(["-loglevel", "error"])
            .arg("-i")
            .arg(input)
            .args(["-f", "rawvideo"])
            .args(["-pix_fmt", "abgr"])
            .args(["-vf", &format!("scale={width}:{height}")])
            .arg("pipe:1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| FlowError::Source(format!("failed to spawn ffmpeg: {err}")))?;
        debug!(input = %input.display(), width, height, "ffmpeg decoder spawned");
        Ok(Self {
            child,
            width,
            height,
        })
    }
}

impl FrameSource for FfmpegFrameSource {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn read_frame(&mut self, frame: &mut [u8]) -> Result<bool> {
        let stdout = self
            .child
            .stdout
            .as_mut()
            .ok_or_else(|| FlowError::Source("ffmpeg stdout not captured".to_string()))?;
        match stdout.read_exact(frame) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
            Err(err) => Err(FlowError::Source(format!("ffmpeg pipe read: {err}"))),
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        // The child may already have exited at end of stream.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
