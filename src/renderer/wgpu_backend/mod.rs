//! wgpu implementation of the device and encoder traits.

pub mod device;
pub mod encoder;
pub mod preprocess;

pub use device::{WgpuBuffer, WgpuDevice, WgpuPipelineState, WgpuProgram};
pub use encoder::WgpuEncoder;
pub use preprocess::{preprocess, PreprocessError};
