//! Drawable execution and GPU resource caching for tiled vector-map rendering.
//!
//! [`DrawableRenderer`](renderer::DrawableRenderer) compiles shader variants,
//! caches pipeline states and buffers, resolves vertex attribute bindings and
//! encodes per-segment draws through a [`GraphicsDevice`](renderer::GraphicsDevice)
//! backend. [`renderer::wgpu_backend`] provides the wgpu one.

pub mod asset;
pub mod error;
pub mod renderer;
pub mod settings;

pub use asset::{Handle, ShaderManifest, ShaderSource};
pub use error::{BuildError, DeviceError, ManifestError, PipelineError, ResolveError, ShaderError};
pub use renderer::{DrawableDescriptor, DrawableRenderer, GraphicsDevice, UniformMask};
pub use settings::CoreSettings;

/// Initializes `env_logger` once, honouring `RUST_LOG` and defaulting to info.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
