//! Recording device and encoder shared by the integration tests.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashSet};
use std::ops::Range;

use wgpu_drawables::renderer::{
    AttributeFormat, BufferKind, BufferUsage, CommandEncoder, GraphicsDevice, PipelineStateDescriptor,
    ProgramDescriptor, RenderTargetFormats, VertexLayout,
};
use wgpu_drawables::{DeviceError, ShaderManifest, ShaderSource};

#[derive(Debug)]
pub struct MockBuffer {
    pub id: u32,
    pub kind: BufferKind,
    pub contents: RefCell<Vec<u8>>,
}

#[derive(Debug)]
pub struct MockProgram {
    pub label: String,
    pub defines: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct MockPipeline {
    pub label: String,
    pub layout: VertexLayout,
    pub targets: RenderTargetFormats,
}

#[derive(Default)]
pub struct MockDevice {
    next_buffer: Cell<u32>,
    pub buffers_created: Cell<u32>,
    pub buffer_updates: Cell<u32>,
    pub compile_calls: Cell<u32>,
    pub pipeline_calls: Cell<u32>,
    /// Base shader names whose compilation fails.
    pub failing_shaders: RefCell<HashSet<String>>,
    /// (attribute format, color target) pairs pipeline creation rejects.
    pub unsupported: RefCell<Vec<(AttributeFormat, wgpu::TextureFormat)>>,
    pub fail_allocations: Cell<bool>,
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_shader(&self, base: &str) {
        self.failing_shaders.borrow_mut().insert(base.to_string());
    }

    pub fn reject(&self, format: AttributeFormat, color: wgpu::TextureFormat) {
        self.unsupported.borrow_mut().push((format, color));
    }
}

impl GraphicsDevice for MockDevice {
    type Buffer = MockBuffer;
    type Program = MockProgram;
    type PipelineState = MockPipeline;

    fn create_buffer(
        &self,
        label: &str,
        kind: BufferKind,
        _usage: BufferUsage,
        contents: &[u8],
    ) -> Result<MockBuffer, DeviceError> {
        if self.fail_allocations.get() {
            return Err(DeviceError::BufferAllocation(format!("'{}' out of memory", label)));
        }
        let id = self.next_buffer.get() + 1;
        self.next_buffer.set(id);
        self.buffers_created.set(self.buffers_created.get() + 1);
        Ok(MockBuffer {
            id,
            kind,
            contents: RefCell::new(contents.to_vec()),
        })
    }

    fn update_buffer(&self, buffer: &MockBuffer, offset: u64, contents: &[u8]) {
        let start = offset as usize;
        buffer.contents.borrow_mut()[start..start + contents.len()].copy_from_slice(contents);
        self.buffer_updates.set(self.buffer_updates.get() + 1);
    }

    fn compile_program(&self, desc: &ProgramDescriptor<'_>) -> Result<MockProgram, DeviceError> {
        self.compile_calls.set(self.compile_calls.get() + 1);
        let base = desc.label.split('#').next().unwrap_or_default();
        if self.failing_shaders.borrow().contains(base) {
            return Err(DeviceError::Compilation(format!("{}: syntax error", desc.label)));
        }
        Ok(MockProgram {
            label: desc.label.to_string(),
            defines: desc.defines.clone(),
        })
    }

    fn create_pipeline_state(
        &self,
        desc: &PipelineStateDescriptor<'_, MockProgram>,
    ) -> Result<MockPipeline, DeviceError> {
        self.pipeline_calls.set(self.pipeline_calls.get() + 1);
        let rejected = self.unsupported.borrow().iter().any(|(format, color)| {
            *color == desc.targets.color && desc.layout.buffers().iter().any(|b| b.format == *format)
        });
        if rejected {
            return Err(DeviceError::PipelineCreation(format!(
                "{} unsupported for {:?}",
                desc.label, desc.targets.color
            )));
        }
        Ok(MockPipeline {
            label: desc.label.to_string(),
            layout: desc.layout.clone(),
            targets: *desc.targets,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetPipeline(String),
    SetVertexBuffer { index: u32, buffer: u32, offset: u64 },
    SetIndexBuffer { buffer: u32, format: wgpu::IndexFormat },
    SetUniformBuffer { index: u32, buffer: u32 },
    DrawIndexed { indices: Range<u32>, base_vertex: i32 },
}

#[derive(Default)]
pub struct RecordingEncoder {
    pub commands: Vec<Command>,
}

impl RecordingEncoder {
    pub fn draws(&self) -> Vec<(Range<u32>, i32)> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawIndexed { indices, base_vertex } => Some((indices.clone(), *base_vertex)),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, matches: impl Fn(&Command) -> bool) -> usize {
        self.commands.iter().filter(|c| matches(c)).count()
    }
}

impl CommandEncoder<MockDevice> for RecordingEncoder {
    fn set_pipeline_state(&mut self, state: &MockPipeline) {
        self.commands.push(Command::SetPipeline(state.label.clone()));
    }

    fn set_vertex_buffer(&mut self, index: u32, buffer: &MockBuffer, offset: u64) {
        self.commands.push(Command::SetVertexBuffer {
            index,
            buffer: buffer.id,
            offset,
        });
    }

    fn set_index_buffer(&mut self, buffer: &MockBuffer, format: wgpu::IndexFormat) {
        self.commands.push(Command::SetIndexBuffer {
            buffer: buffer.id,
            format,
        });
    }

    fn set_uniform_buffer(&mut self, index: u32, buffer: &MockBuffer) {
        self.commands.push(Command::SetUniformBuffer {
            index,
            buffer: buffer.id,
        });
    }

    fn draw_indexed(&mut self, indices: Range<u32>, base_vertex: i32) {
        self.commands.push(Command::DrawIndexed { indices, base_vertex });
    }
}

/// Fill shader with two paint properties (color, opacity) and one uniform block.
pub fn fill_shader() -> ShaderSource {
    ShaderSource::new("fill", "// fill")
        .with_properties(["color", "opacity"])
        .with_buffer_names(["a_pos", "a_color", "a_opacity"])
        .with_attribute("a_pos", AttributeFormat::Short2, None)
        .with_attribute("a_color", AttributeFormat::Float4, Some(vec![0.0, 0.0, 0.0, 1.0]))
        .with_attribute("a_opacity", AttributeFormat::Float, Some(vec![1.0]))
        .with_uniform_block("FillDrawableUBO", 0, 16)
}

/// Shader with a single float3 position and no default.
pub fn position_shader() -> ShaderSource {
    ShaderSource::new("position", "// position")
        .with_properties(["color", "blur", "opacity"])
        .with_buffer_names(["position"])
        .with_attribute("position", AttributeFormat::Float3, None)
}

pub fn manifest() -> ShaderManifest {
    let mut manifest = ShaderManifest::new();
    manifest.insert(fill_shader()).unwrap();
    manifest.insert(position_shader()).unwrap();
    manifest
}
