// renderer/pipeline.rs
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::error::PipelineError;
use crate::renderer::{
    AttributeBinding, AttributeFormat, CompiledShaderProgram, GraphicsDevice, PipelineStateDescriptor,
    ProgramId, RenderTargetFormats,
};

/// One vertex buffer slot as the pipeline sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    pub index: u32,
    pub stride: u32,
    pub format: AttributeFormat,
}

/// Vertex buffer slots sorted by index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    buffers: Vec<VertexBufferLayout>,
}

impl VertexLayout {
    pub fn new(mut buffers: Vec<VertexBufferLayout>) -> Self {
        buffers.sort_by_key(|b| b.index);
        Self { buffers }
    }

    pub fn from_bindings<B>(bindings: &[Option<AttributeBinding<B>>]) -> Self {
        Self::new(
            bindings
                .iter()
                .flatten()
                .map(|binding| VertexBufferLayout {
                    index: binding.index,
                    stride: binding.stride,
                    format: binding.format,
                })
                .collect(),
        )
    }

    pub fn buffers(&self) -> &[VertexBufferLayout] {
        &self.buffers
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineStateKey {
    pub program: ProgramId,
    pub targets: RenderTargetFormats,
    pub layout: VertexLayout,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub created: u64,
    pub hits: u64,
    pub failures: u64,
}

/// Pipeline states keyed by program, render target formats and vertex layout.
pub struct PipelineCache<D: GraphicsDevice> {
    pipelines: HashMap<PipelineStateKey, Rc<D::PipelineState>>,
    failed: HashSet<PipelineStateKey>,
    stats: PipelineStats,
}

impl<D: GraphicsDevice> Default for PipelineCache<D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D: GraphicsDevice> PipelineCache<D> {
    pub fn new() -> Self {
        Self {
            pipelines: HashMap::new(),
            failed: HashSet::new(),
            stats: PipelineStats::default(),
        }
    }

    pub fn get_or_create(
        &mut self,
        device: &D,
        program: &CompiledShaderProgram<D>,
        targets: &RenderTargetFormats,
        layout: &VertexLayout,
    ) -> Result<Rc<D::PipelineState>, PipelineError> {
        let key = PipelineStateKey {
            program: program.id(),
            targets: *targets,
            layout: layout.clone(),
        };
        if let Some(pipeline) = self.pipelines.get(&key) {
            self.stats.hits += 1;
            return Ok(Rc::clone(pipeline));
        }

        let label = format!("{} pipeline {:?}", program.name(), targets.color);
        if self.failed.contains(&key) {
            return Err(PipelineError::PreviouslyFailed(label));
        }

        match device.create_pipeline_state(&PipelineStateDescriptor {
            label: &label,
            program: program.program(),
            layout,
            targets,
            blend: program.blend(),
        }) {
            Ok(state) => {
                let state = Rc::new(state);
                self.stats.created += 1;
                log::debug!("Created {} ({} cached)", label, self.pipelines.len() + 1);
                self.pipelines.insert(key, Rc::clone(&state));
                Ok(state)
            }
            Err(err) => {
                self.stats.failures += 1;
                self.failed.insert(key);
                Err(PipelineError::Creation {
                    label,
                    message: err.to_string(),
                })
            }
        }
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn clear(&mut self) {
        self.pipelines.clear();
        self.failed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_sorts_by_index() {
        let layout = VertexLayout::new(vec![
            VertexBufferLayout {
                index: 2,
                stride: 4,
                format: AttributeFormat::Float,
            },
            VertexBufferLayout {
                index: 0,
                stride: 4,
                format: AttributeFormat::Short2,
            },
        ]);
        let indices: Vec<u32> = layout.buffers().iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    #[test]
    fn keys_differ_by_target_format() {
        let layout = VertexLayout::default();
        let a = PipelineStateKey {
            program: ProgramId::for_tests(1),
            targets: RenderTargetFormats::default(),
            layout: layout.clone(),
        };
        let b = PipelineStateKey {
            targets: RenderTargetFormats::color_only(wgpu::TextureFormat::Rgba8Unorm),
            ..a.clone()
        };
        assert_ne!(a, b);
    }
}
