// renderer/wgpu_backend/encoder.rs
use std::ops::Range;

use super::device::{WgpuBuffer, WgpuDevice, WgpuPipelineState};
use crate::renderer::CommandEncoder;

/// Records drawable commands into an open render pass.
pub struct WgpuEncoder<'a, 'pass> {
    pass: &'a mut wgpu::RenderPass<'pass>,
    device: &'a WgpuDevice,
}

impl<'a, 'pass> WgpuEncoder<'a, 'pass> {
    pub fn new(device: &'a WgpuDevice, pass: &'a mut wgpu::RenderPass<'pass>) -> Self {
        Self { pass, device }
    }
}

impl CommandEncoder<WgpuDevice> for WgpuEncoder<'_, '_> {
    fn set_pipeline_state(&mut self, state: &WgpuPipelineState) {
        self.pass.set_pipeline(state.raw());
    }

    fn set_vertex_buffer(&mut self, index: u32, buffer: &WgpuBuffer, offset: u64) {
        self.pass.set_vertex_buffer(index, buffer.raw().slice(offset..));
    }

    fn set_index_buffer(&mut self, buffer: &WgpuBuffer, format: wgpu::IndexFormat) {
        self.pass.set_index_buffer(buffer.raw().slice(..), format);
    }

    fn set_uniform_buffer(&mut self, index: u32, buffer: &WgpuBuffer) {
        let group = self.device.uniform_bind_group(buffer);
        self.pass.set_bind_group(index, group, &[]);
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32) {
        self.pass.draw_indexed(indices, base_vertex, 0..1);
    }
}
