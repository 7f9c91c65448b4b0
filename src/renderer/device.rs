// renderer/device.rs
//! Capability traits the caching layer drives.
//!
//! A backend implements [`GraphicsDevice`] for resource creation and
//! [`CommandEncoder`] for recording. One backend is chosen at startup and
//! every cache is generic over it, so backends are never mixed within a frame.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::error::DeviceError;
use crate::renderer::{BufferKind, BufferUsage, RenderTargetFormats, UniformBlockDescriptor, VertexLayout};

pub struct ProgramDescriptor<'a> {
    pub label: &'a str,
    pub source: &'a str,
    pub vertex_entry: &'a str,
    pub fragment_entry: &'a str,
    pub defines: &'a BTreeMap<String, String>,
    pub buffer_names: &'a [String],
    pub uniform_blocks: &'a [UniformBlockDescriptor],
}

pub struct PipelineStateDescriptor<'a, P> {
    pub label: &'a str,
    pub program: &'a P,
    pub layout: &'a VertexLayout,
    pub targets: &'a RenderTargetFormats,
    pub blend: wgpu::BlendState,
}

pub trait GraphicsDevice {
    type Buffer;
    type Program;
    type PipelineState;

    /// Allocates a buffer holding exactly `contents`.
    fn create_buffer(
        &self,
        label: &str,
        kind: BufferKind,
        usage: BufferUsage,
        contents: &[u8],
    ) -> Result<Self::Buffer, DeviceError>;

    /// Overwrites `contents.len()` bytes of `buffer` starting at `offset`.
    fn update_buffer(&self, buffer: &Self::Buffer, offset: u64, contents: &[u8]);

    fn compile_program(&self, desc: &ProgramDescriptor<'_>) -> Result<Self::Program, DeviceError>;

    fn create_pipeline_state(
        &self,
        desc: &PipelineStateDescriptor<'_, Self::Program>,
    ) -> Result<Self::PipelineState, DeviceError>;
}

pub trait CommandEncoder<D: GraphicsDevice + ?Sized> {
    fn set_pipeline_state(&mut self, state: &D::PipelineState);

    fn set_vertex_buffer(&mut self, index: u32, buffer: &D::Buffer, offset: u64);

    fn set_index_buffer(&mut self, buffer: &D::Buffer, format: wgpu::IndexFormat);

    fn set_uniform_buffer(&mut self, index: u32, buffer: &D::Buffer);

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32);
}
