// renderer/wgpu_backend/device.rs
use std::borrow::Cow;
use std::cell::OnceCell;

use wgpu::util::DeviceExt;

use super::preprocess::preprocess;
use crate::error::DeviceError;
use crate::renderer::{
    AttributeFormat, BufferKind, BufferUsage, GraphicsDevice, PipelineBuilder, PipelineStateDescriptor,
    ProgramDescriptor, RenderTargetFormats,
};

pub struct WgpuBuffer {
    raw: wgpu::Buffer,
    uniform_group: OnceCell<wgpu::BindGroup>,
}

impl WgpuBuffer {
    pub fn raw(&self) -> &wgpu::Buffer {
        &self.raw
    }
}

pub struct WgpuProgram {
    module: wgpu::ShaderModule,
    layout: wgpu::PipelineLayout,
    vertex_entry: String,
    fragment_entry: String,
}

pub struct WgpuPipelineState {
    pipeline: wgpu::RenderPipeline,
}

impl WgpuPipelineState {
    pub fn raw(&self) -> &wgpu::RenderPipeline {
        &self.pipeline
    }
}

/// [`GraphicsDevice`] over a wgpu device and queue.
///
/// Every uniform block is bound as its own bind group holding one uniform
/// buffer at binding 0, so block index `n` is bind group `n`.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    uniform_layout: wgpu::BindGroupLayout,
}

impl WgpuDevice {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("DrawableUniformBindGroupLayout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        Self {
            device,
            queue,
            uniform_layout,
        }
    }

    /// Opens a device without a surface, for offscreen rendering and tests.
    pub fn headless() -> Result<Self, DeviceError> {
        pollster::block_on(Self::request_headless())
    }

    async fn request_headless() -> Result<Self, DeviceError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| DeviceError::Unavailable(err.to_string()))?;

        log::info!("Using adapter: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|err| DeviceError::Unavailable(err.to_string()))?;

        Ok(Self::new(device, queue))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub(crate) fn uniform_bind_group<'b>(&self, buffer: &'b WgpuBuffer) -> &'b wgpu::BindGroup {
        buffer.uniform_group.get_or_init(|| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("DrawableUniformBindGroup"),
                layout: &self.uniform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.raw.as_entire_binding(),
                }],
            })
        })
    }

    fn scoped<T>(&self, filter: wgpu::ErrorFilter, create: impl FnOnce() -> T) -> Result<T, String> {
        self.device.push_error_scope(filter);
        let value = create();
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(err) => Err(err.to_string()),
            None => Ok(value),
        }
    }
}

fn buffer_usages(kind: BufferKind) -> wgpu::BufferUsages {
    let usage = match kind {
        BufferKind::Vertex => wgpu::BufferUsages::VERTEX,
        BufferKind::Index => wgpu::BufferUsages::INDEX,
        BufferKind::Uniform => wgpu::BufferUsages::UNIFORM,
    };
    usage | wgpu::BufferUsages::COPY_DST
}

pub(crate) fn vertex_format(format: AttributeFormat) -> Option<wgpu::VertexFormat> {
    use wgpu::VertexFormat as V;
    use AttributeFormat::*;
    Some(match format {
        Byte => V::Sint8,
        Byte2 => V::Sint8x2,
        Byte4 => V::Sint8x4,
        UByte => V::Uint8,
        UByte2 => V::Uint8x2,
        UByte4 => V::Uint8x4,
        Short => V::Sint16,
        Short2 => V::Sint16x2,
        Short4 => V::Sint16x4,
        UShort => V::Uint16,
        UShort2 => V::Uint16x2,
        UShort4 => V::Uint16x4,
        Int => V::Sint32,
        Int2 => V::Sint32x2,
        Int3 => V::Sint32x3,
        Int4 => V::Sint32x4,
        UInt => V::Uint32,
        UInt2 => V::Uint32x2,
        UInt3 => V::Uint32x3,
        UInt4 => V::Uint32x4,
        Float => V::Float32,
        Float2 => V::Float32x2,
        Float3 => V::Float32x3,
        Float4 => V::Float32x4,
        Byte3 | UByte3 | Short3 | UShort3 => return None,
    })
}

/// The single depth-stencil attachment format for `targets`, if any.
pub(crate) fn depth_stencil_format(
    targets: &RenderTargetFormats,
) -> Result<Option<wgpu::TextureFormat>, DeviceError> {
    let format = match (targets.depth, targets.stencil) {
        (None, None) => return Ok(None),
        (Some(format), None) | (None, Some(format)) => format,
        (Some(depth), Some(stencil)) if depth == stencil => depth,
        (Some(depth), Some(stencil)) => {
            return Err(DeviceError::PipelineCreation(format!(
                "depth {:?} and stencil {:?} must share one attachment",
                depth, stencil
            )))
        }
    };
    if !format.has_depth_aspect() && !format.has_stencil_aspect() {
        return Err(DeviceError::PipelineCreation(format!(
            "{:?} is not a depth or stencil format",
            format
        )));
    }
    Ok(Some(format))
}

impl GraphicsDevice for WgpuDevice {
    type Buffer = WgpuBuffer;
    type Program = WgpuProgram;
    type PipelineState = WgpuPipelineState;

    fn create_buffer(
        &self,
        label: &str,
        kind: BufferKind,
        usage: BufferUsage,
        contents: &[u8],
    ) -> Result<WgpuBuffer, DeviceError> {
        log::trace!("Creating {:?} buffer '{}' with {:?} hint", kind, label, usage);
        let raw = self
            .scoped(wgpu::ErrorFilter::OutOfMemory, || {
                self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents,
                    usage: buffer_usages(kind),
                })
            })
            .map_err(DeviceError::BufferAllocation)?;
        Ok(WgpuBuffer {
            raw,
            uniform_group: OnceCell::new(),
        })
    }

    fn update_buffer(&self, buffer: &WgpuBuffer, offset: u64, contents: &[u8]) {
        let align = wgpu::COPY_BUFFER_ALIGNMENT as usize;
        if contents.len() % align == 0 {
            self.queue.write_buffer(&buffer.raw, offset, contents);
        } else {
            let mut padded = contents.to_vec();
            padded.resize(contents.len().next_multiple_of(align), 0);
            self.queue.write_buffer(&buffer.raw, offset, &padded);
        }
    }

    fn compile_program(&self, desc: &ProgramDescriptor<'_>) -> Result<WgpuProgram, DeviceError> {
        let source =
            preprocess(desc.source, desc.defines).map_err(|err| DeviceError::Compilation(err.to_string()))?;

        let group_count = desc
            .uniform_blocks
            .iter()
            .map(|block| block.index as usize + 1)
            .max()
            .unwrap_or(0);
        let group_layouts: Vec<&wgpu::BindGroupLayout> = vec![&self.uniform_layout; group_count];

        let (module, layout) = self
            .scoped(wgpu::ErrorFilter::Validation, || {
                let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(desc.label),
                    source: wgpu::ShaderSource::Wgsl(Cow::Owned(source)),
                });
                let layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                    label: Some(desc.label),
                    bind_group_layouts: &group_layouts,
                    push_constant_ranges: &[],
                });
                (module, layout)
            })
            .map_err(DeviceError::Compilation)?;

        Ok(WgpuProgram {
            module,
            layout,
            vertex_entry: desc.vertex_entry.to_string(),
            fragment_entry: desc.fragment_entry.to_string(),
        })
    }

    fn create_pipeline_state(
        &self,
        desc: &PipelineStateDescriptor<'_, WgpuProgram>,
    ) -> Result<WgpuPipelineState, DeviceError> {
        let depth_stencil = depth_stencil_format(desc.targets)?;

        let slot_count = desc
            .layout
            .buffers()
            .iter()
            .map(|b| b.index as usize + 1)
            .max()
            .unwrap_or(0);
        let mut attributes: Vec<Option<(u64, [wgpu::VertexAttribute; 1])>> = vec![None; slot_count];
        for buffer in desc.layout.buffers() {
            let format = vertex_format(buffer.format).ok_or_else(|| {
                DeviceError::PipelineCreation(format!("{:?} has no wgpu vertex format", buffer.format))
            })?;
            attributes[buffer.index as usize] = Some((
                u64::from(buffer.stride),
                [wgpu::VertexAttribute {
                    format,
                    offset: 0,
                    shader_location: buffer.index,
                }],
            ));
        }

        let program = desc.program;
        let mut builder = PipelineBuilder::new(&self.device, &program.layout, &program.module)
            .with_label(desc.label)
            .with_vertex_entry(&program.vertex_entry)
            .with_fragment_entry(&program.fragment_entry)
            .with_color_target(desc.targets.color, Some(desc.blend));
        for slot in &attributes {
            let layout = match slot {
                Some((stride, attribute)) => wgpu::VertexBufferLayout {
                    array_stride: *stride,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: attribute,
                },
                None => wgpu::VertexBufferLayout {
                    array_stride: 0,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[],
                },
            };
            builder = builder.with_vertex_buffer(layout);
        }
        if let Some(format) = depth_stencil {
            builder = builder.with_depth_stencil(format);
        }

        let pipeline = self
            .scoped(wgpu::ErrorFilter::Validation, || builder.build())
            .map_err(DeviceError::PipelineCreation)?;
        Ok(WgpuPipelineState { pipeline })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_component_small_formats_are_unsupported() {
        assert_eq!(vertex_format(AttributeFormat::Short2), Some(wgpu::VertexFormat::Sint16x2));
        assert_eq!(vertex_format(AttributeFormat::Float3), Some(wgpu::VertexFormat::Float32x3));
        assert!(vertex_format(AttributeFormat::UByte3).is_none());
        assert!(vertex_format(AttributeFormat::Short3).is_none());
    }

    #[test]
    fn vertex_format_sizes_match_attribute_sizes() {
        let formats = [
            AttributeFormat::Byte2,
            AttributeFormat::UShort4,
            AttributeFormat::Int3,
            AttributeFormat::Float4,
        ];
        for format in formats {
            let wgpu_format = vertex_format(format).unwrap();
            assert_eq!(wgpu_format.size(), u64::from(format.size()), "{:?}", format);
        }
    }

    #[test]
    fn depth_and_stencil_must_share_a_format() {
        let color = wgpu::TextureFormat::Bgra8Unorm;
        let shared = RenderTargetFormats::color_only(color)
            .with_depth(wgpu::TextureFormat::Depth24PlusStencil8)
            .with_stencil(wgpu::TextureFormat::Depth24PlusStencil8);
        assert_eq!(
            depth_stencil_format(&shared).unwrap(),
            Some(wgpu::TextureFormat::Depth24PlusStencil8)
        );

        let split = RenderTargetFormats::color_only(color)
            .with_depth(wgpu::TextureFormat::Depth32Float)
            .with_stencil(wgpu::TextureFormat::Stencil8);
        assert!(depth_stencil_format(&split).is_err());

        let not_depth = RenderTargetFormats::color_only(color).with_depth(wgpu::TextureFormat::Rgba8Unorm);
        assert!(depth_stencil_format(&not_depth).is_err());
        assert_eq!(depth_stencil_format(&RenderTargetFormats::color_only(color)).unwrap(), None);
    }
}
