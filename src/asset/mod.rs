pub mod cache;
pub mod handle;
pub mod manifest;

pub use cache::AssetCache;
pub use handle::Handle;
pub use manifest::{AttributeSpec, ShaderManifest, ShaderSource};
