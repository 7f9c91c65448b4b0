pub mod bindings;
pub mod buffer_cache;
pub mod device;
pub mod diagnostics;
pub mod drawable;
pub mod format;
pub mod pipeline;
pub mod pipeline_builder;
pub mod renderer;
pub mod shader;
pub mod uniforms;
pub mod vertex;
pub mod wgpu_backend;

pub use bindings::{
    resolve_attribute_bindings, AttributeBinding, ConstantBuffers, ResolveRequest, ResolvedBindings,
};
pub use buffer_cache::{
    BufferCache, BufferId, BufferRequest, BufferResource, BufferSource, BufferStats, SharedBuffer,
};
pub use device::{CommandEncoder, GraphicsDevice, PipelineStateDescriptor, ProgramDescriptor};
pub use diagnostics::{Diagnostic, DiagnosticKind, Diagnostics};
pub use drawable::{
    DirtyFlags, DrawSegment, DrawSummary, Drawable, DrawableDescriptor, DrawableId, DrawableState,
    UploadStatus,
};
pub use format::{AttributeFormat, BlendPreset, BufferKind, BufferUsage, ComponentType, RenderTargetFormats};
pub use pipeline::{PipelineCache, PipelineStateKey, PipelineStats, VertexBufferLayout, VertexLayout};
pub use pipeline_builder::PipelineBuilder;
pub use renderer::{DrawableRenderer, RendererStats};
pub use shader::{
    CompiledShaderProgram, ProgramId, ShaderRegistry, ShaderVariantKey, UniformMask,
};
pub use uniforms::{UniformBlockDescriptor, UniformBufferArray};
pub use vertex::{
    AttributeDescriptor, AttributeValue, IndexVector, SharedVertexVector, VertexAttribute,
    VertexAttributeArray, VertexVector,
};
