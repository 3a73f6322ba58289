//! I/O trait seams between the GPU pipeline and the outside world.
//!
//! The pipeline pulls packed frames from a [`FrameSource`] and pushes
//! rendered images into an [`ImageSink`].  Keeping both behind traits lets
//! the sliding-window logic run in tests without a decoder or a display.

use crate::error::Result;
use crate::types::RgbImage;

/// Produces packed host frames in the pixel format the session was
/// initialized with (no row padding).
pub trait FrameSource {
    /// Frame width in pixels.
    fn width(&self) -> u32;

    /// Frame height in pixels.
    fn height(&self) -> u32;

    /// Fill `frame` with the next frame.  Returns `Ok(false)` at end of
    /// stream (including a short read on a byte pipe).
    fn read_frame(&mut self, frame: &mut [u8]) -> Result<bool>;
}

/// Consumes rendered flow images.
pub trait ImageSink {
    fn write_image(&mut self, image: &RgbImage) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}
