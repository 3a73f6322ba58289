#![doc = include_str!("../README.md")]

pub mod color;
pub mod error;
pub mod io;
pub mod types;

pub use color::ColorWheel;
pub use error::{FlowError, Result};
pub use types::{
    BufferDescriptor, BufferFormat, BufferUsage, FlowMode, FlowVector, HintGridSize,
    OutputGridSize, PerfLevel, PredDirection, RgbImage, VectorField,
};
