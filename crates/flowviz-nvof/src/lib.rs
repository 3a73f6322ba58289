#![doc = include_str!("../README.md")]

pub mod binding;
pub mod buffer;
pub mod context;
pub mod session;
pub mod sys;

pub use binding::OfBinding;
pub use buffer::DeviceBuffer;
pub use context::GpuContext;
pub use session::{CapsSummary, ExecuteOptions, FlowSession, FlowSessionConfig, RoiRect};
