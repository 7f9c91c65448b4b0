// renderer/bindings.rs
//! Turns a shader's declared attributes plus a drawable's overrides into
//! buffer-backed vertex bindings.
//!
//! Constant values, whether overridden or taken from the shader default, are
//! expanded into a per-drawable buffer with one copy per vertex. An attribute
//! with no value at all is a configuration error.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::error::{DeviceError, ResolveError};
use crate::renderer::{
    AttributeDescriptor, AttributeFormat, AttributeValue, BufferCache, BufferKind, BufferRequest,
    BufferSource, BufferUsage, GraphicsDevice, SharedBuffer, VertexAttributeArray,
};

/// A vertex buffer bound at `index`.
pub struct AttributeBinding<B> {
    pub buffer: SharedBuffer<B>,
    pub format: AttributeFormat,
    pub stride: u32,
    /// Byte offset into `buffer` where the first element starts.
    pub offset: u32,
    pub index: u32,
}

impl<B> Clone for AttributeBinding<B> {
    fn clone(&self) -> Self {
        Self {
            buffer: Rc::clone(&self.buffer),
            format: self.format,
            stride: self.stride,
            offset: self.offset,
            index: self.index,
        }
    }
}

/// Bindings compare equal when they point at the same buffer resource.
impl<B> PartialEq for AttributeBinding<B> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.buffer, &other.buffer)
            && self.format == other.format
            && self.stride == other.stride
            && self.offset == other.offset
            && self.index == other.index
    }
}

impl<B> fmt::Debug for AttributeBinding<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeBinding")
            .field("buffer", &self.buffer.id())
            .field("format", &self.format)
            .field("stride", &self.stride)
            .field("offset", &self.offset)
            .field("index", &self.index)
            .finish()
    }
}

#[derive(Debug)]
pub struct ResolvedBindings<B> {
    /// One slot per declared buffer name.
    pub bindings: Vec<Option<AttributeBinding<B>>>,
    /// Buffers allocated by this resolve.
    pub created: Vec<SharedBuffer<B>>,
}

impl<B> ResolvedBindings<B> {
    fn empty(count: usize) -> Self {
        Self {
            bindings: (0..count).map(|_| None).collect(),
            created: Vec::new(),
        }
    }
}

/// Per-vertex copies of constant attribute values, owned by one drawable.
pub struct ConstantBuffers<B> {
    sources: BTreeMap<String, BufferSource<B>>,
}

impl<B> Default for ConstantBuffers<B> {
    fn default() -> Self {
        Self {
            sources: BTreeMap::new(),
        }
    }
}

impl<B> ConstantBuffers<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn expand(&mut self, name: &str, element: &[u8], vertex_count: usize) -> &mut BufferSource<B> {
        let bytes = element.repeat(vertex_count);
        let source = self
            .sources
            .entry(name.to_string())
            .or_insert_with(|| BufferSource::new(Vec::new()));
        source.replace_if_changed(&bytes);
        source
    }

    fn retain(&mut self, used: &[&str]) {
        self.sources.retain(|name, _| used.contains(&name.as_str()));
    }
}

/// Uploads `source` and records the buffer in `created` when it is new.
pub(crate) fn upload_tracked<D: GraphicsDevice>(
    device: &D,
    cache: &mut BufferCache<D>,
    source: &mut BufferSource<D::Buffer>,
    request: BufferRequest<'_>,
    created: &mut Vec<SharedBuffer<D::Buffer>>,
) -> Result<Option<SharedBuffer<D::Buffer>>, DeviceError> {
    let previous = source.buffer().map(|b| b.id());
    let buffer = source.upload(cache, device, request)?;
    if let Some(buffer) = &buffer {
        if previous != Some(buffer.id()) {
            created.push(Rc::clone(buffer));
        }
    }
    Ok(buffer)
}

/// Borrowed inputs for one resolve.
pub struct ResolveRequest<'a, B> {
    pub label: &'a str,
    pub defaults: &'a [AttributeDescriptor],
    /// Number of buffer slots the shader declares.
    pub binding_count: usize,
    pub overrides: &'a VertexAttributeArray<B>,
    pub vertex_count: usize,
    pub usage: BufferUsage,
}

pub fn resolve_attribute_bindings<D: GraphicsDevice>(
    device: &D,
    cache: &mut BufferCache<D>,
    constants: &mut ConstantBuffers<D::Buffer>,
    request: ResolveRequest<'_, D::Buffer>,
) -> Result<ResolvedBindings<D::Buffer>, ResolveError> {
    let mut resolved = ResolvedBindings::empty(request.binding_count);
    if request.vertex_count == 0 {
        return Ok(resolved);
    }

    let mut used_constants = Vec::new();
    for desc in request.defaults {
        let slot = desc.index as usize;
        if slot >= request.binding_count {
            return Err(ResolveError::IndexOutOfRange {
                name: desc.name.clone(),
                index: desc.index,
                count: request.binding_count,
            });
        }

        let attribute = request.overrides.get(&desc.name);
        let format = attribute.and_then(|a| a.format).unwrap_or(desc.format);
        let offset = attribute.map_or(0, |a| a.offset);
        let label = format!("{} {}", request.label, desc.name);
        let buffer_request = BufferRequest {
            label: &label,
            kind: BufferKind::Vertex,
            usage: request.usage,
        };

        let (buffer, stride, offset) = match attribute.map(|a| &a.value) {
            Some(AttributeValue::PerVertex(vector)) => {
                let mut vector = vector.borrow_mut();
                let count = vector.len();
                let element_size = vector.element_size();
                if count == request.vertex_count {
                    let buffer = upload_tracked(
                        device,
                        cache,
                        vector.source_mut(),
                        buffer_request,
                        &mut resolved.created,
                    )?;
                    (buffer, element_size, offset)
                } else if count == 1 {
                    let element = vector.bytes()[..element_size as usize].to_vec();
                    drop(vector);
                    used_constants.push(desc.name.as_str());
                    let source = constants.expand(&desc.name, &element, request.vertex_count);
                    let buffer =
                        upload_tracked(device, cache, source, buffer_request, &mut resolved.created)?;
                    (buffer, element_size, offset)
                } else {
                    return Err(ResolveError::VertexCountMismatch {
                        name: desc.name.clone(),
                        expected: request.vertex_count,
                        actual: count,
                    });
                }
            }
            constant => {
                let element = match constant {
                    Some(AttributeValue::Constant(bytes)) => bytes.as_slice(),
                    _ => desc
                        .default
                        .as_deref()
                        .ok_or_else(|| ResolveError::MissingAttributeData(desc.name.clone()))?,
                };
                if element.len() != format.size() as usize {
                    return Err(ResolveError::ConstantSizeMismatch {
                        name: desc.name.clone(),
                        format,
                        expected: format.size() as usize,
                        actual: element.len(),
                    });
                }
                used_constants.push(desc.name.as_str());
                let source = constants.expand(&desc.name, element, request.vertex_count);
                let buffer =
                    upload_tracked(device, cache, source, buffer_request, &mut resolved.created)?;
                (buffer, format.size(), 0)
            }
        };

        let buffer = buffer.ok_or_else(|| ResolveError::MissingAttributeData(desc.name.clone()))?;
        resolved.bindings[slot] = Some(AttributeBinding {
            buffer,
            format,
            stride,
            offset,
            index: desc.index,
        });
    }

    constants.retain(&used_constants);
    Ok(resolved)
}
