// renderer/drawable.rs
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::error::{BuildError, DeviceError, PipelineError, ResolveError};
use crate::renderer::bindings::upload_tracked;
use crate::renderer::{
    resolve_attribute_bindings, AttributeBinding, AttributeFormat, AttributeValue, BufferCache,
    BufferKind, BufferRequest, BufferUsage, CommandEncoder, CompiledShaderProgram, ConstantBuffers,
    DiagnosticKind, Diagnostics, GraphicsDevice, IndexVector, PipelineCache,
    RenderTargetFormats, ResolveRequest, ShaderVariantKey, SharedBuffer, UniformBufferArray,
    UniformMask, VertexAttributeArray, VertexBufferLayout, VertexLayout,
};

bitflags! {
    /// What must be rebuilt on the next upload.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DirtyFlags: u8 {
        const ATTRIBUTES = 1 << 0;
        const INDEXES = 1 << 1;
        const LAYOUTS = 1 << 2;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawableState {
    Unbuilt,
    Built,
    Dirty,
    /// Configuration error during resolve; waits for `mark_dirty` or new attributes.
    Failed,
    /// No usable shader. Never drawn.
    Unusable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DrawableId(u64);

impl DrawableId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DrawableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A contiguous index range drawn with its own vertex layout.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawSegment {
    pub index_offset: u32,
    pub index_length: u32,
    pub vertex_offset: u32,
    pub vertex_length: u32,
    /// Reinterprets named attributes with another format for this segment only.
    pub attribute_formats: BTreeMap<String, AttributeFormat>,
    layout: Option<Rc<VertexLayout>>,
}

impl DrawSegment {
    pub fn new(index_offset: u32, index_length: u32, vertex_offset: u32, vertex_length: u32) -> Self {
        Self {
            index_offset,
            index_length,
            vertex_offset,
            vertex_length,
            attribute_formats: BTreeMap::new(),
            layout: None,
        }
    }

    pub fn with_attribute_format(mut self, name: impl Into<String>, format: AttributeFormat) -> Self {
        self.attribute_formats.insert(name.into(), format);
        self
    }

    pub fn layout(&self) -> Option<&Rc<VertexLayout>> {
        self.layout.as_ref()
    }

    pub fn invalidate_layout(&mut self) {
        self.layout = None;
    }

    fn index_end(&self) -> u64 {
        u64::from(self.index_offset) + u64::from(self.index_length)
    }

    fn build_layout<B>(
        &self,
        shared: &Rc<VertexLayout>,
        bindings: &[Option<AttributeBinding<B>>],
        buffer_names: &[String],
    ) -> Rc<VertexLayout> {
        if self.attribute_formats.is_empty() {
            return Rc::clone(shared);
        }
        let buffers = bindings
            .iter()
            .flatten()
            .map(|binding| {
                let format = buffer_names
                    .get(binding.index as usize)
                    .and_then(|name| self.attribute_formats.get(name))
                    .copied()
                    .unwrap_or(binding.format);
                VertexBufferLayout {
                    index: binding.index,
                    stride: binding.stride,
                    format,
                }
            })
            .collect();
        Rc::new(VertexLayout::new(buffers))
    }
}

/// Everything needed to build a drawable.
pub struct DrawableDescriptor<B> {
    pub name: String,
    pub shader: String,
    pub mask: UniformMask,
    pub vertex_count: usize,
    pub attributes: VertexAttributeArray<B>,
    pub indices: IndexVector<B>,
    /// Empty means one segment covering every index.
    pub segments: Vec<DrawSegment>,
    pub uniforms: UniformBufferArray<B>,
}

impl<B> DrawableDescriptor<B> {
    pub fn new(name: impl Into<String>, shader: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shader: shader.into(),
            mask: UniformMask::NONE,
            vertex_count: 0,
            attributes: VertexAttributeArray::new(),
            indices: IndexVector::empty(),
            segments: Vec::new(),
            uniforms: UniformBufferArray::new(),
        }
    }

    pub fn with_mask(mut self, mask: UniformMask) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_vertex_count(mut self, vertex_count: usize) -> Self {
        self.vertex_count = vertex_count;
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue<B>) -> Self {
        self.attributes.set(name, value);
        self
    }

    pub fn with_attributes(mut self, attributes: VertexAttributeArray<B>) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_indices(mut self, indices: IndexVector<B>) -> Self {
        self.indices = indices;
        self
    }

    pub fn with_segment(mut self, segment: DrawSegment) -> Self {
        self.segments.push(segment);
        self
    }

    pub fn with_uniforms(mut self, uniforms: UniformBufferArray<B>) -> Self {
        self.uniforms = uniforms;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// Cached bindings were still valid.
    Unchanged,
    Rebuilt { created: usize },
    /// A buffer could not be allocated; the next upload tries again.
    Retry,
    Failed,
    Unusable,
    /// The handle does not name a live drawable.
    Missing,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawSummary {
    pub draw_calls: u32,
    pub skipped_segments: u32,
}

pub(crate) struct UploadContext<'a, D: GraphicsDevice> {
    pub device: &'a D,
    pub buffers: &'a mut BufferCache<D>,
    pub diagnostics: &'a mut Diagnostics,
    pub usage: BufferUsage,
}

pub(crate) struct DrawContext<'a, D: GraphicsDevice> {
    pub device: &'a D,
    pub pipelines: &'a mut PipelineCache<D>,
    pub diagnostics: &'a mut Diagnostics,
}

pub struct Drawable<D: GraphicsDevice> {
    id: DrawableId,
    name: String,
    shader_key: ShaderVariantKey,
    shader: Option<Rc<CompiledShaderProgram<D>>>,
    vertex_count: usize,
    attributes: VertexAttributeArray<D::Buffer>,
    constants: ConstantBuffers<D::Buffer>,
    indices: IndexVector<D::Buffer>,
    segments: Vec<DrawSegment>,
    uniforms: UniformBufferArray<D::Buffer>,
    bindings: Vec<Option<AttributeBinding<D::Buffer>>>,
    index_buffer: Option<SharedBuffer<D::Buffer>>,
    state: DrawableState,
    dirty: DirtyFlags,
    reported_blocks: HashSet<String>,
}

impl<D: GraphicsDevice> Drawable<D> {
    /// Validates `desc` against `shader`; `None` yields an unusable drawable.
    pub(crate) fn new(
        id: u64,
        desc: DrawableDescriptor<D::Buffer>,
        shader: Option<Rc<CompiledShaderProgram<D>>>,
    ) -> Result<Self, BuildError> {
        let DrawableDescriptor {
            name,
            shader: base,
            mask,
            vertex_count,
            attributes,
            indices,
            segments,
            uniforms,
        } = desc;

        if let Some(shader) = &shader {
            let declared = |attribute: &str| shader.attribute(attribute).is_some();
            let unknown = attributes
                .iter()
                .map(|(attribute, _)| attribute)
                .chain(segments.iter().flat_map(|s| s.attribute_formats.keys().map(String::as_str)))
                .find(|attribute| !declared(*attribute));
            if let Some(attribute) = unknown {
                return Err(BuildError::UnknownAttribute {
                    drawable: name,
                    attribute: attribute.to_string(),
                });
            }
        }

        let segments = checked_segments(&name, segments, indices.len(), vertex_count)?;

        let state = if shader.is_some() {
            DrawableState::Unbuilt
        } else {
            DrawableState::Unusable
        };
        Ok(Self {
            id: DrawableId(id),
            name,
            shader_key: ShaderVariantKey::new(base, mask),
            shader,
            vertex_count,
            attributes,
            constants: ConstantBuffers::new(),
            indices,
            segments,
            uniforms,
            bindings: Vec::new(),
            index_buffer: None,
            state,
            dirty: DirtyFlags::all(),
            reported_blocks: HashSet::new(),
        })
    }

    pub fn id(&self) -> DrawableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> DrawableState {
        self.state
    }

    pub fn dirty_flags(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn shader_key(&self) -> &ShaderVariantKey {
        &self.shader_key
    }

    pub fn shader(&self) -> Option<&Rc<CompiledShaderProgram<D>>> {
        self.shader.as_ref()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn set_vertex_count(&mut self, vertex_count: usize) {
        if self.vertex_count != vertex_count {
            self.vertex_count = vertex_count;
            self.invalidate(DirtyFlags::ATTRIBUTES);
        }
    }

    pub fn attributes(&self) -> &VertexAttributeArray<D::Buffer> {
        &self.attributes
    }

    /// Mutable overrides; the next upload re-resolves bindings.
    pub fn attributes_mut(&mut self) -> &mut VertexAttributeArray<D::Buffer> {
        self.invalidate(DirtyFlags::ATTRIBUTES);
        self.attributes.mark_dirty();
        &mut self.attributes
    }

    pub fn indices(&self) -> &IndexVector<D::Buffer> {
        &self.indices
    }

    /// Replaces the indices and the segments drawn from them.
    ///
    /// Empty `segments` means one segment covering every index. On error the
    /// drawable keeps its previous indices and segments.
    pub fn set_indices(
        &mut self,
        mut indices: IndexVector<D::Buffer>,
        segments: Vec<DrawSegment>,
    ) -> Result<(), BuildError> {
        let segments = checked_segments(&self.name, segments, indices.len(), self.vertex_count)?;
        indices.source_mut().inherit_buffer(self.indices.source_mut());
        self.indices = indices;
        self.segments = segments;
        self.invalidate(DirtyFlags::INDEXES | DirtyFlags::LAYOUTS);
        Ok(())
    }

    pub fn segments(&self) -> &[DrawSegment] {
        &self.segments
    }

    pub fn uniforms(&self) -> &UniformBufferArray<D::Buffer> {
        &self.uniforms
    }

    pub fn uniforms_mut(&mut self) -> &mut UniformBufferArray<D::Buffer> {
        &mut self.uniforms
    }

    pub fn bindings(&self) -> &[Option<AttributeBinding<D::Buffer>>] {
        &self.bindings
    }

    pub fn index_buffer(&self) -> Option<&SharedBuffer<D::Buffer>> {
        self.index_buffer.as_ref()
    }

    /// Forces bindings and layouts to be rebuilt on the next upload.
    pub fn mark_dirty(&mut self) {
        self.invalidate(DirtyFlags::all());
        for segment in &mut self.segments {
            segment.invalidate_layout();
        }
    }

    fn invalidate(&mut self, flags: DirtyFlags) {
        self.dirty |= flags;
        if matches!(self.state, DrawableState::Built | DrawableState::Failed) {
            self.state = DrawableState::Dirty;
        }
    }

    fn subject(&self) -> String {
        format!("drawable {} '{}' shader {}", self.id, self.name, self.shader_key)
    }

    fn needs_rebuild(&self) -> bool {
        matches!(self.state, DrawableState::Unbuilt | DrawableState::Dirty)
            || !self.dirty.is_empty()
            || self.attributes.is_dirty()
            || self.indices.is_dirty()
            || self
                .segments
                .iter()
                .any(|s| s.index_length > 0 && s.layout.is_none())
            || self.bindings_stale()
    }

    /// True when a shared per-vertex vector now lives in a different buffer
    /// than the one bound, e.g. after another drawable grew it.
    fn bindings_stale(&self) -> bool {
        let Some(shader) = &self.shader else {
            return false;
        };
        self.bindings.iter().flatten().any(|binding| {
            let Some(name) = shader.buffer_names().get(binding.index as usize) else {
                return true;
            };
            match self.attributes.get(name).map(|a| &a.value) {
                Some(AttributeValue::PerVertex(vector)) => {
                    let vector = vector.borrow();
                    vector.len() == self.vertex_count
                        && !vector
                            .source()
                            .buffer()
                            .is_some_and(|current| Rc::ptr_eq(current, &binding.buffer))
                }
                _ => false,
            }
        })
    }

    pub(crate) fn upload(&mut self, ctx: &mut UploadContext<'_, D>) -> UploadStatus {
        let shader = match (self.state, &self.shader) {
            (DrawableState::Unusable, _) | (_, None) => return UploadStatus::Unusable,
            (DrawableState::Failed, _) => return UploadStatus::Failed,
            (_, Some(shader)) => Rc::clone(shader),
        };

        let mut status = UploadStatus::Unchanged;
        if self.needs_rebuild() {
            status = match self.rebuild(ctx, &shader) {
                Ok(created) => UploadStatus::Rebuilt { created },
                Err(ResolveError::Device(err)) => {
                    ctx.diagnostics.report(
                        DiagnosticKind::BufferAllocationFailure,
                        self.subject(),
                        err.to_string(),
                    );
                    self.state = DrawableState::Dirty;
                    return UploadStatus::Retry;
                }
                Err(err) => {
                    ctx.diagnostics.report(resolve_diagnostic(&err), self.subject(), err.to_string());
                    self.state = DrawableState::Failed;
                    self.bindings.clear();
                    return UploadStatus::Failed;
                }
            };
        }

        if let Err(err) = self.upload_uniforms(ctx) {
            ctx.diagnostics.report(
                DiagnosticKind::BufferAllocationFailure,
                self.subject(),
                err.to_string(),
            );
            return UploadStatus::Retry;
        }
        status
    }

    fn rebuild(
        &mut self,
        ctx: &mut UploadContext<'_, D>,
        shader: &CompiledShaderProgram<D>,
    ) -> Result<usize, ResolveError> {
        let mut created = Vec::new();
        let label = format!("{} indices", self.name);
        self.index_buffer = upload_tracked(
            ctx.device,
            ctx.buffers,
            self.indices.source_mut(),
            BufferRequest {
                label: &label,
                kind: BufferKind::Index,
                usage: ctx.usage,
            },
            &mut created,
        )?;

        let resolved = resolve_attribute_bindings(
            ctx.device,
            ctx.buffers,
            &mut self.constants,
            ResolveRequest {
                label: &self.name,
                defaults: shader.attributes(),
                binding_count: shader.buffer_names().len(),
                overrides: &self.attributes,
                vertex_count: self.vertex_count,
                usage: ctx.usage,
            },
        )?;
        created.extend(resolved.created);
        self.bindings = resolved.bindings;

        let shared = Rc::new(VertexLayout::from_bindings(&self.bindings));
        for segment in &mut self.segments {
            segment.layout = Some(segment.build_layout(&shared, &self.bindings, shader.buffer_names()));
        }

        self.attributes.clear_dirty();
        self.dirty = DirtyFlags::empty();
        self.state = DrawableState::Built;
        log::debug!(
            "Rebuilt drawable {} '{}' ({} new buffers)",
            self.id,
            self.name,
            created.len()
        );
        Ok(created.len())
    }

    fn upload_uniforms(&mut self, ctx: &mut UploadContext<'_, D>) -> Result<(), DeviceError> {
        for (name, source) in self.uniforms.iter_mut() {
            if !source.is_dirty() {
                continue;
            }
            let label = format!("{} {}", self.name, name);
            source.upload(
                ctx.buffers,
                ctx.device,
                BufferRequest {
                    label: &label,
                    kind: BufferKind::Uniform,
                    usage: ctx.usage,
                },
            )?;
        }
        Ok(())
    }

    pub(crate) fn encode<E>(
        &mut self,
        ctx: &mut DrawContext<'_, D>,
        encoder: &mut E,
        targets: &RenderTargetFormats,
    ) -> DrawSummary
    where
        E: CommandEncoder<D> + ?Sized,
    {
        let mut summary = DrawSummary::default();
        if self.state != DrawableState::Built {
            return summary;
        }
        let (Some(shader), Some(index_buffer)) = (self.shader.clone(), self.index_buffer.clone()) else {
            return summary;
        };

        let drawn = self.segments.iter().filter(|s| s.index_length > 0);
        let complete = shader
            .attributes()
            .iter()
            .all(|a| matches!(self.bindings.get(a.index as usize), Some(Some(_))));
        if !complete {
            summary.skipped_segments = u32::try_from(drawn.count()).unwrap_or(u32::MAX);
            log::debug!("Drawable {} '{}' has unbound attributes, nothing drawn", self.id, self.name);
            return summary;
        }

        let index_count = self.indices.len() as u64;
        let mut bound = false;
        for segment in drawn {
            let Some(layout) = &segment.layout else {
                summary.skipped_segments += 1;
                continue;
            };
            let Ok(base_vertex) = i32::try_from(segment.vertex_offset) else {
                summary.skipped_segments += 1;
                continue;
            };
            if segment.index_end() > index_count {
                summary.skipped_segments += 1;
                continue;
            }

            let pipeline = match ctx.pipelines.get_or_create(ctx.device, &shader, targets, layout) {
                Ok(pipeline) => pipeline,
                Err(err) => {
                    if let PipelineError::Creation { .. } = err {
                        ctx.diagnostics.report(
                            DiagnosticKind::PipelineStateCreationFailure,
                            self.subject(),
                            err.to_string(),
                        );
                    }
                    summary.skipped_segments += 1;
                    continue;
                }
            };

            if !bound {
                encoder.set_index_buffer(index_buffer.raw(), self.indices.format());
                for binding in self.bindings.iter().flatten() {
                    encoder.set_vertex_buffer(binding.index, binding.buffer.raw(), u64::from(binding.offset));
                }
                for block in shader.uniform_blocks() {
                    match self.uniforms.get(&block.name).and_then(|s| s.buffer()) {
                        Some(buffer) => encoder.set_uniform_buffer(block.index, buffer.raw()),
                        None => {
                            if self.reported_blocks.insert(block.name.clone()) {
                                ctx.diagnostics.report(
                                    DiagnosticKind::MissingUniformBlock,
                                    self.subject(),
                                    format!("uniform block '{}' at index {} is not supplied", block.name, block.index),
                                );
                            }
                        }
                    }
                }
                bound = true;
            }

            encoder.set_pipeline_state(&pipeline);
            let start = segment.index_offset;
            encoder.draw_indexed(start..start + segment.index_length, base_vertex);
            summary.draw_calls += 1;
        }
        summary
    }
}

/// Fills in the default full segment and checks every segment against the index count.
fn checked_segments(
    name: &str,
    mut segments: Vec<DrawSegment>,
    index_count: usize,
    vertex_count: usize,
) -> Result<Vec<DrawSegment>, BuildError> {
    let overflow = |what, count| BuildError::CountOverflow {
        drawable: name.to_string(),
        what,
        count,
    };
    if segments.is_empty() && index_count > 0 {
        let index_length = u32::try_from(index_count).map_err(|_| overflow("indices", index_count))?;
        let vertex_length = u32::try_from(vertex_count).map_err(|_| overflow("vertices", vertex_count))?;
        segments.push(DrawSegment::new(0, index_length, 0, vertex_length));
    }
    for (i, segment) in segments.iter().enumerate() {
        if segment.index_end() > index_count as u64 {
            return Err(BuildError::SegmentOutOfRange {
                drawable: name.to_string(),
                segment: i,
                end: segment.index_end(),
                count: index_count,
            });
        }
        if i32::try_from(segment.vertex_offset).is_err() {
            return Err(BuildError::VertexOffsetOverflow {
                drawable: name.to_string(),
                segment: i,
                offset: segment.vertex_offset,
            });
        }
    }
    Ok(segments)
}

fn resolve_diagnostic(err: &ResolveError) -> DiagnosticKind {
    match err {
        ResolveError::MissingAttributeData(_) => DiagnosticKind::MissingAttributeData,
        ResolveError::Device(_) => DiagnosticKind::BufferAllocationFailure,
        ResolveError::VertexCountMismatch { .. }
        | ResolveError::ConstantSizeMismatch { .. }
        | ResolveError::IndexOutOfRange { .. } => DiagnosticKind::InvalidAttributeData,
    }
}

impl<D: GraphicsDevice> fmt::Debug for Drawable<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drawable")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("shader", &self.shader_key.name())
            .field("state", &self.state)
            .field("vertex_count", &self.vertex_count)
            .field("segments", &self.segments.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_layout_applies_format_overrides() {
        let shared = Rc::new(VertexLayout::new(vec![VertexBufferLayout {
            index: 0,
            stride: 4,
            format: AttributeFormat::Short2,
        }]));
        let plain = DrawSegment::new(0, 6, 0, 4);
        let bindings: Vec<Option<AttributeBinding<()>>> = Vec::new();
        assert!(Rc::ptr_eq(&plain.build_layout(&shared, &bindings, &[]), &shared));

        let reinterpreted = DrawSegment::new(6, 6, 4, 4).with_attribute_format("a_pos", AttributeFormat::UShort2);
        assert_eq!(reinterpreted.index_end(), 12);
        assert_eq!(reinterpreted.attribute_formats.len(), 1);
    }

    #[test]
    fn default_segment_covers_all_indices() {
        let segments = checked_segments("tile", Vec::new(), 12, 8).unwrap();
        assert_eq!(segments, vec![DrawSegment::new(0, 12, 0, 8)]);
        assert!(checked_segments("tile", Vec::new(), 0, 0).unwrap().is_empty());
    }

    #[test]
    fn segments_must_fit_indices_and_base_vertex() {
        let err = checked_segments("tile", vec![DrawSegment::new(0, 6, 0, 4)], 3, 4).unwrap_err();
        assert!(matches!(err, BuildError::SegmentOutOfRange { segment: 0, end: 6, count: 3, .. }));

        let far = DrawSegment::new(0, 3, u32::MAX, 4);
        let err = checked_segments("tile", vec![far], 3, 4).unwrap_err();
        assert!(matches!(err, BuildError::VertexOffsetOverflow { offset: u32::MAX, .. }));
    }

    #[test]
    fn resolve_errors_map_to_their_own_kind() {
        assert_eq!(
            resolve_diagnostic(&ResolveError::MissingAttributeData("a_pos".into())),
            DiagnosticKind::MissingAttributeData
        );
        let mismatch = ResolveError::VertexCountMismatch {
            name: "a_pos".into(),
            expected: 4,
            actual: 3,
        };
        assert_eq!(resolve_diagnostic(&mismatch), DiagnosticKind::InvalidAttributeData);
        let size = ResolveError::ConstantSizeMismatch {
            name: "a_color".into(),
            format: AttributeFormat::Float4,
            expected: 16,
            actual: 12,
        };
        assert_eq!(resolve_diagnostic(&size), DiagnosticKind::InvalidAttributeData);
    }

    #[test]
    fn dirty_flags_compose() {
        let mut flags = DirtyFlags::empty();
        flags |= DirtyFlags::ATTRIBUTES;
        assert!(flags.contains(DirtyFlags::ATTRIBUTES));
        assert!(!flags.contains(DirtyFlags::LAYOUTS));
        assert_eq!(DirtyFlags::all().bits(), 0b111);
    }
}
