//! Sliding-window frame loop, generic over source, sink, and the flow
//! computation so it can run in tests without a GPU or an ffmpeg binary.

use tracing::{debug, warn};

use flowviz_core::error::Result;
use flowviz_core::io::{FrameSource, ImageSink};
use flowviz_core::types::RgbImage;

/// Counters reported after a streaming run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Frame pairs submitted to the engine.
    pub pairs: u64,
    /// Images written to the sink.
    pub written: u64,
    /// Frames suppressed by the visualizer (invalid vectors).
    pub suppressed: u64,
}

/// Pull frames from `source`, compute flow for each consecutive pair, and
/// push the visualizations into `sink`.
///
/// The window slides by one: each decoded frame is first the input, then
/// the reference of the next pair.  `max_pairs` bounds the run (`None` =
/// until end of stream).
pub fn stream_frames<S, K, F>(
    source: &mut S,
    sink: &mut K,
    frame_bytes: usize,
    max_pairs: Option<u64>,
    mut compute: F,
) -> Result<StreamStats>
where
    S: FrameSource + ?Sized,
    K: ImageSink + ?Sized,
    F: FnMut(&[u8], &[u8]) -> Result<Option<RgbImage>>,
{
    let mut stats = StreamStats::default();
    let mut current = vec![0u8; frame_bytes];
    let mut next = vec![0u8; frame_bytes];

    if !source.read_frame(&mut current)? {
        warn!("stream ended before the first frame");
        return Ok(stats);
    }

    while max_pairs.is_none_or(|max| stats.pairs < max) {
        if !source.read_frame(&mut next)? {
            break;
        }
        match compute(&current, &next)? {
            Some(image) => {
                sink.write_image(&image)?;
                stats.written += 1;
            }
            None => {
                stats.suppressed += 1;
                debug!(pair = stats.pairs, "frame suppressed (invalid vectors)");
            }
        }
        stats.pairs += 1;
        std::mem::swap(&mut current, &mut next);
    }

    sink.flush()?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowviz_core::error::Result;

    /// Fixed list of 2x1 single-byte-per-pixel frames.
    struct VecSource {
        frames: Vec<Vec<u8>>,
        pos: usize,
    }

    impl FrameSource for VecSource {
        fn width(&self) -> u32 {
            2
        }

        fn height(&self) -> u32 {
            1
        }

        fn read_frame(&mut self, frame: &mut [u8]) -> Result<bool> {
            match self.frames.get(self.pos) {
                Some(data) => {
                    frame.copy_from_slice(data);
                    self.pos += 1;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    struct VecSink {
        images: Vec<RgbImage>,
        flushed: bool,
    }

    impl ImageSink for VecSink {
        fn write_image(&mut self, image: &RgbImage) -> Result<()> {
            self.images.push(image.clone());
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            self.flushed = true;
            Ok(())
        }
    }

    fn image_of(byte: u8) -> RgbImage {
        RgbImage::new(1, 1, vec![byte, byte, byte]).unwrap()
    }

    #[test]
    fn window_slides_by_one_frame() {
        let mut source = VecSource {
            frames: vec![vec![0, 0], vec![1, 1], vec![2, 2], vec![3, 3]],
            pos: 0,
        };
        let mut sink = VecSink {
            images: Vec::new(),
            flushed: false,
        };
        let mut seen = Vec::new();
        let stats = stream_frames(&mut source, &mut sink, 2, None, |a, b| {
            seen.push((a[0], b[0]));
            Ok(Some(image_of(b[0])))
        })
        .unwrap();

        // 4 frames -> 3 pairs, each previous reference becoming next input.
        assert_eq!(seen, vec![(0, 1), (1, 2), (2, 3)]);
        assert_eq!(stats.pairs, 3);
        assert_eq!(stats.written, 3);
        assert_eq!(stats.suppressed, 0);
        assert!(sink.flushed);
    }

    #[test]
    fn suppressed_frames_are_counted_not_written() {
        let mut source = VecSource {
            frames: vec![vec![0, 0], vec![1, 1], vec![2, 2]],
            pos: 0,
        };
        let mut sink = VecSink {
            images: Vec::new(),
            flushed: false,
        };
        let stats = stream_frames(&mut source, &mut sink, 2, None, |_, b| {
            Ok((b[0] != 1).then(|| image_of(b[0])))
        })
        .unwrap();
        assert_eq!(stats.pairs, 2);
        assert_eq!(stats.written, 1);
        assert_eq!(stats.suppressed, 1);
        assert_eq!(sink.images.len(), 1);
    }

    #[test]
    fn max_pairs_bounds_the_run() {
        let mut source = VecSource {
            frames: vec![vec![0, 0]; 10],
            pos: 0,
        };
        let mut sink = VecSink {
            images: Vec::new(),
            flushed: false,
        };
        let stats = stream_frames(&mut source, &mut sink, 2, Some(4), |_, b| {
            Ok(Some(image_of(b[0])))
        })
        .unwrap();
        assert_eq!(stats.pairs, 4);
    }

    #[test]
    fn empty_stream_yields_no_pairs() {
        let mut source = VecSource {
            frames: vec![],
            pos: 0,
        };
        let mut sink = VecSink {
            images: Vec::new(),
            flushed: false,
        };
        let stats =
            stream_frames(&mut source, &mut sink, 2, None, |_, _| Ok(None)).unwrap();
        assert_eq!(stats, StreamStats::default());
    }
}
