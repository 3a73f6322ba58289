//! Shared data model: buffer descriptors, fixed-point flow vectors, vector
//! fields, and RGB images.
//!
//! The flow engine reports one motion vector per `grid × grid` block of
//! input pixels.  Each component is a 16-bit signed S10.5 fixed-point value:
//! 5 fractional bits, so the decoded displacement is `raw / 32.0` pixels.

use crate::error::{FlowError, Result};

/// Fixed-point scale shared by flow vectors (S10.5) and disparity (11.5).
pub const FLOW_FIXED_POINT_SCALE: f32 = 32.0;

// ─── Buffer metadata ─────────────────────────────────────────────────────

/// What a device buffer is used for.  Determines which execution stream
/// its copies are issued on (Input → input stream, everything else →
/// output stream).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Input or reference frame.
    Input,
    /// Flow vector / disparity output.
    Output,
    /// External hint vectors.
    Hint,
    /// Per-vector confidence cost output.
    Cost,
    /// Single global flow vector output.
    GlobalFlow,
}

/// Pixel layout of a device buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferFormat {
    /// 8-bit single-plane grayscale.
    Grayscale8,
    /// 8-bit luma plane + half-height interleaved chroma plane.
    Nv12,
    /// Packed 8-bit A8B8G8R8.
    Abgr8,
    /// 16-bit disparity output (deprecated stereo mode).
    Short,
    /// 2 × 16-bit flow vector output.
    Short2,
    /// 8-bit confidence cost output.
    CostU8,
}

impl BufferFormat {
    /// Bytes per element for host/device copy sizing.
    pub const fn element_size(self) -> u32 {
        match self {
            Self::Grayscale8 | Self::Nv12 | Self::CostU8 => 1,
            Self::Short => 2,
            Self::Abgr8 | Self::Short2 => 4,
        }
    }

    /// Whether this format carries a second, half-height chroma plane.
    pub const fn has_chroma_plane(self) -> bool {
        matches!(self, Self::Nv12)
    }
}

/// Creation parameters for one device buffer.  Immutable once the buffer
/// exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub width: u32,
    pub height: u32,
    pub usage: BufferUsage,
    pub format: BufferFormat,
}

impl BufferDescriptor {
    /// Bytes of tightly-packed host memory covered by this buffer
    /// (all planes, no row padding).
    pub const fn host_bytes(&self) -> usize {
        let plane = (self.width * self.format.element_size() * self.height) as usize;
        if self.format.has_chroma_plane() {
            plane + (self.width as usize * ((self.height as usize).div_ceil(2)))
        } else {
            plane
        }
    }
}

// ─── Session parameter enums ─────────────────────────────────────────────

/// Flow estimation mode.  Stereo disparity is deprecated by the vendor;
/// carried for interface completeness only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlowMode {
    OpticalFlow,
    StereoDisparity,
}

/// Output vector grid size — block edge length in input pixels per
/// reported vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputGridSize {
    Grid1 = 1,
    Grid2 = 2,
    Grid4 = 4,
}

impl OutputGridSize {
    pub const fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            1 => Ok(Self::Grid1),
            2 => Ok(Self::Grid2),
            4 => Ok(Self::Grid4),
            other => Err(FlowError::InvalidParam(format!(
                "unsupported output grid size {other} (expected 1, 2, or 4)"
            ))),
        }
    }
}

/// Grid size of externally supplied hint vectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HintGridSize {
    Grid1 = 1,
    Grid2 = 2,
    Grid4 = 4,
    Grid8 = 8,
}

impl HintGridSize {
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Quality/speed tradeoff of the hardware engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PerfLevel {
    /// Lowest throughput, best quality.
    Slow,
    Medium,
    /// Highest throughput, lowest quality.
    Fast,
}

/// Flow prediction direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PredDirection {
    /// Input → reference only.
    Forward,
    /// Forward plus reference → input into a second output buffer.
    Both,
}

// ─── Flow vectors ────────────────────────────────────────────────────────

/// One motion vector in S10.5 fixed point, exactly as the engine writes it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct FlowVector {
    pub flow_x: i16,
    pub flow_y: i16,
}

impl FlowVector {
    /// Decode to floating-point pixel displacement.
    #[inline]
    pub fn decode(self) -> (f32, f32) {
        (
            f32::from(self.flow_x) / FLOW_FIXED_POINT_SCALE,
            f32::from(self.flow_y) / FLOW_FIXED_POINT_SCALE,
        )
    }
}

/// One disparity sample in 11.5 unsigned fixed point (deprecated stereo
/// mode; kept for interface completeness).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(C)]
pub struct StereoDisparity {
    pub disparity: u16,
}

impl StereoDisparity {
    #[inline]
    pub fn decode(self) -> f32 {
        f32::from(self.disparity) / FLOW_FIXED_POINT_SCALE
    }
}

// ─── Vector field ────────────────────────────────────────────────────────

/// Row-major grid of motion vectors, one per output-grid block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VectorField {
    width: u32,
    height: u32,
    vectors: Vec<FlowVector>,
}

impl VectorField {
    /// Output grid dimensions for a given input size (floor division —
    /// callers are responsible for grid sizes that evenly divide).
    pub const fn output_dims(input_width: u32, input_height: u32, grid: OutputGridSize) -> (u32, u32) {
        (input_width / grid.as_u32(), input_height / grid.as_u32())
    }

    pub fn new(width: u32, height: u32, vectors: Vec<FlowVector>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if vectors.len() != expected {
            return Err(FlowError::InvalidParam(format!(
                "vector field {width}x{height} expects {expected} vectors, got {}",
                vectors.len()
            )));
        }
        Ok(Self {
            width,
            height,
            vectors,
        })
    }

    /// Parse a raw device download (little-endian interleaved x/y int16
    /// pairs) into a vector field.
    pub fn from_raw(width: u32, height: u32, bytes: &[u8]) -> Result<Self> {
        let expected = width as usize * height as usize * 4;
        if bytes.len() < expected {
            return Err(FlowError::InvalidParam(format!(
                "vector field {width}x{height} expects {expected} bytes, got {}",
                bytes.len()
            )));
        }
        let vectors = bytes[..expected]
            .chunks_exact(4)
            .map(|c| FlowVector {
                flow_x: i16::from_le_bytes([c[0], c[1]]),
                flow_y: i16::from_le_bytes([c[2], c[3]]),
            })
            .collect();
        Self::new(width, height, vectors)
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    pub fn vectors(&self) -> &[FlowVector] {
        &self.vectors
    }
}

// ─── RGB image ───────────────────────────────────────────────────────────

/// Packed 24-bit RGB image, 3 bytes per pixel, row-major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgbImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RgbImage {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(FlowError::InvalidParam(format!(
                "RGB image {width}x{height} expects {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Build from parts whose length is already known to match.  For
    /// producers that size `data` by construction.
    pub(crate) fn from_parts(width: u32, height: u32, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), width as usize * height as usize * 3);
        Self {
            width,
            height,
            data,
        }
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_sizes_match_formats() {
        assert_eq!(BufferFormat::Grayscale8.element_size(), 1);
        assert_eq!(BufferFormat::Nv12.element_size(), 1);
        assert_eq!(BufferFormat::Abgr8.element_size(), 4);
        assert_eq!(BufferFormat::Short.element_size(), 2);
        assert_eq!(BufferFormat::Short2.element_size(), 4);
        assert_eq!(BufferFormat::CostU8.element_size(), 1);
    }

    #[test]
    fn host_bytes_includes_chroma_plane_for_nv12() {
        let packed = BufferDescriptor {
            width: 64,
            height: 32,
            usage: BufferUsage::Input,
            format: BufferFormat::Abgr8,
        };
        assert_eq!(packed.host_bytes(), 64 * 32 * 4);

        let nv12 = BufferDescriptor {
            width: 64,
            height: 33,
            usage: BufferUsage::Input,
            format: BufferFormat::Nv12,
        };
        // Luma 64x33 plus 17 half-height chroma rows.
        assert_eq!(nv12.host_bytes(), 64 * 33 + 64 * 17);
    }

    #[test]
    fn flow_vector_decode_scaling() {
        let v = FlowVector {
            flow_x: 32,
            flow_y: -64,
        };
        assert_eq!(v.decode(), (1.0, -2.0));
    }

    #[test]
    fn disparity_decode_scaling() {
        assert_eq!(StereoDisparity { disparity: 48 }.decode(), 1.5);
    }

    #[test]
    fn output_dims_floor_division() {
        assert_eq!(
            VectorField::output_dims(1920, 1080, OutputGridSize::Grid4),
            (480, 270)
        );
        assert_eq!(
            VectorField::output_dims(1920, 1080, OutputGridSize::Grid1),
            (1920, 1080)
        );
        // Non-dividing sizes truncate.
        assert_eq!(
            VectorField::output_dims(1919, 1079, OutputGridSize::Grid2),
            (959, 539)
        );
    }

    #[test]
    fn vector_field_from_raw_little_endian() {
        // Two vectors: (32, -64) and (1, 2).
        let bytes = [32u8, 0, 192, 255, 1, 0, 2, 0];
        let field = VectorField::from_raw(2, 1, &bytes).unwrap();
        assert_eq!(
            field.vectors()[0],
            FlowVector {
                flow_x: 32,
                flow_y: -64
            }
        );
        assert_eq!(
            field.vectors()[1],
            FlowVector {
                flow_x: 1,
                flow_y: 2
            }
        );
    }

    #[test]
    fn vector_field_rejects_short_input() {
        assert!(VectorField::from_raw(2, 2, &[0u8; 8]).is_err());
        assert!(VectorField::new(2, 2, vec![FlowVector::default(); 3]).is_err());
    }

    #[test]
    fn grid_size_round_trip() {
        for g in [1u32, 2, 4] {
            assert_eq!(OutputGridSize::from_u32(g).unwrap().as_u32(), g);
        }
        assert!(OutputGridSize::from_u32(3).is_err());
        assert!(OutputGridSize::from_u32(8).is_err());
    }
}
