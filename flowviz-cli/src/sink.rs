//! Frame output: raw RGB24 frames on a byte stream (file or stdout).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use flowviz_core::error::{FlowError, Result};
use flowviz_core::io::ImageSink;
use flowviz_core::types::RgbImage;

/// Writes each image as its raw RGB24 bytes, suitable for piping into
/// `ffplay -f rawvideo -pixel_format rgb24`.
pub struct RawImageSink<W: Write> {
    writer: W,
}

impl<W: Write> RawImageSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl RawImageSink<Box<dyn Write>> {
    /// `-` selects stdout, anything else is created as a file.
    pub fn open(output: &Path) -> Result<Self> {
        let writer: Box<dyn Write> = if output.as_os_str() == "-" {
            Box::new(std::io::stdout().lock())
        } else {
            let file = File::create(output)
                .map_err(|err| FlowError::Sink(format!("create {}: {err}", output.display())))?;
            Box::new(BufWriter::new(file))
        };
        Ok(Self::new(writer))
    }
}

impl<W: Write> ImageSink for RawImageSink<W> {
    fn write_image(&mut self, image: &RgbImage) -> Result<()> {
        self.writer
            .write_all(image.data())
            .map_err(|err| FlowError::Sink(format!("write frame: {err}")))
    }

    fn flush(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|err| FlowError::Sink(format!("flush: {err}")))
    }
}
