// renderer/vertex.rs
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use bytemuck::Pod;

use crate::renderer::{AttributeFormat, BufferSource};

/// Per-vertex attribute data with its device buffer slot.
#[derive(Debug)]
pub struct VertexVector<B> {
    source: BufferSource<B>,
    element_size: u32,
}

pub type SharedVertexVector<B> = Rc<RefCell<VertexVector<B>>>;

impl<B> VertexVector<B> {
    pub fn new(bytes: Vec<u8>, element_size: u32) -> Self {
        Self {
            source: BufferSource::new(bytes),
            element_size,
        }
    }

    pub fn from_pod<T: Pod>(values: &[T]) -> Self {
        Self::new(
            bytemuck::cast_slice(values).to_vec(),
            std::mem::size_of::<T>() as u32,
        )
    }

    pub fn shared(self) -> SharedVertexVector<B> {
        Rc::new(RefCell::new(self))
    }

    pub fn element_size(&self) -> u32 {
        self.element_size
    }

    /// Number of whole elements held.
    pub fn len(&self) -> usize {
        match self.element_size {
            0 => 0,
            size => self.source.bytes().len() / size as usize,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> &[u8] {
        self.source.bytes()
    }

    pub fn set_pod<T: Pod>(&mut self, values: &[T]) {
        self.element_size = std::mem::size_of::<T>() as u32;
        self.source.set_bytes(bytemuck::cast_slice(values).to_vec());
    }

    pub fn is_dirty(&self) -> bool {
        self.source.is_dirty()
    }

    pub fn source(&self) -> &BufferSource<B> {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut BufferSource<B> {
        &mut self.source
    }
}

pub(crate) const fn index_size(format: wgpu::IndexFormat) -> usize {
    match format {
        wgpu::IndexFormat::Uint16 => 2,
        wgpu::IndexFormat::Uint32 => 4,
    }
}

/// Triangle indices for a drawable.
#[derive(Debug)]
pub struct IndexVector<B> {
    source: BufferSource<B>,
    format: wgpu::IndexFormat,
}

impl<B> IndexVector<B> {
    pub fn from_u16(indices: &[u16]) -> Self {
        Self {
            source: BufferSource::new(bytemuck::cast_slice(indices).to_vec()),
            format: wgpu::IndexFormat::Uint16,
        }
    }

    pub fn from_u32(indices: &[u32]) -> Self {
        Self {
            source: BufferSource::new(bytemuck::cast_slice(indices).to_vec()),
            format: wgpu::IndexFormat::Uint32,
        }
    }

    pub fn empty() -> Self {
        Self::from_u16(&[])
    }

    pub fn format(&self) -> wgpu::IndexFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.source.bytes().len() / index_size(self.format)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.source.is_dirty()
    }

    pub fn source_mut(&mut self) -> &mut BufferSource<B> {
        &mut self.source
    }
}

/// Value an attribute takes for every vertex of a drawable.
#[derive(Debug)]
pub enum AttributeValue<B> {
    /// One element applied to every vertex.
    Constant(Vec<u8>),
    PerVertex(SharedVertexVector<B>),
}

impl<B> Clone for AttributeValue<B> {
    fn clone(&self) -> Self {
        match self {
            Self::Constant(bytes) => Self::Constant(bytes.clone()),
            Self::PerVertex(vector) => Self::PerVertex(Rc::clone(vector)),
        }
    }
}

impl<B> AttributeValue<B> {
    pub fn constant<T: Pod>(value: T) -> Self {
        Self::Constant(bytemuck::bytes_of(&value).to_vec())
    }

    pub fn per_vertex(vector: VertexVector<B>) -> Self {
        Self::PerVertex(vector.shared())
    }

    fn is_dirty(&self) -> bool {
        match self {
            Self::Constant(_) => false,
            Self::PerVertex(vector) => vector.borrow().is_dirty(),
        }
    }
}

/// A drawable's value for one named attribute.
#[derive(Debug)]
pub struct VertexAttribute<B> {
    pub value: AttributeValue<B>,
    /// Overrides the shader's declared format.
    pub format: Option<AttributeFormat>,
    /// Byte offset of the attribute within each element.
    pub offset: u32,
}

impl<B> Clone for VertexAttribute<B> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            format: self.format,
            offset: self.offset,
        }
    }
}

impl<B> VertexAttribute<B> {
    pub fn new(value: AttributeValue<B>) -> Self {
        Self {
            value,
            format: None,
            offset: 0,
        }
    }

    pub fn with_format(mut self, format: AttributeFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }
}

/// Named attribute overrides; any mutation marks the set dirty.
#[derive(Debug)]
pub struct VertexAttributeArray<B> {
    attributes: BTreeMap<String, VertexAttribute<B>>,
    dirty: bool,
}

impl<B> Default for VertexAttributeArray<B> {
    fn default() -> Self {
        Self {
            attributes: BTreeMap::new(),
            dirty: true,
        }
    }
}

impl<B> VertexAttributeArray<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: AttributeValue<B>) {
        self.insert(name, VertexAttribute::new(value));
    }

    pub fn insert(&mut self, name: impl Into<String>, attribute: VertexAttribute<B>) {
        self.attributes.insert(name.into(), attribute);
        self.dirty = true;
    }

    pub fn remove(&mut self, name: &str) -> Option<VertexAttribute<B>> {
        let removed = self.attributes.remove(name);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn get(&self, name: &str) -> Option<&VertexAttribute<B>> {
        self.attributes.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &VertexAttribute<B>)> {
        self.attributes.iter().map(|(name, attr)| (name.as_str(), attr))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// True when the set changed or any per-vertex data it references changed.
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.attributes.values().any(|a| a.value.is_dirty())
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

/// A vertex attribute a shader consumes, with its optional default value.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDescriptor {
    pub name: String,
    pub format: AttributeFormat,
    pub stride: u32,
    /// Position of `name` in the shader's declared buffer names.
    pub index: u32,
    pub default: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_len_counts_whole_elements() {
        let vector: VertexVector<()> = VertexVector::from_pod(&[[0.0f32; 3]; 4]);
        assert_eq!(vector.element_size(), 12);
        assert_eq!(vector.len(), 4);
        assert!(vector.is_dirty());
    }

    #[test]
    fn attribute_array_tracks_shared_data() {
        let vector: SharedVertexVector<()> = VertexVector::from_pod(&[1u32, 2, 3]).shared();
        let mut array = VertexAttributeArray::new();
        array.set("a_pos", AttributeValue::PerVertex(Rc::clone(&vector)));
        array.clear_dirty();

        // The vector itself has not been uploaded, so it is still dirty.
        assert!(array.is_dirty());

        vector.borrow_mut().source_mut().set_bytes(vec![0; 12]);
        assert!(array.is_dirty());
    }

    #[test]
    fn removing_unknown_attribute_keeps_clean() {
        let mut array: VertexAttributeArray<()> = VertexAttributeArray::new();
        array.set("a_color", AttributeValue::constant([1.0f32; 4]));
        array.clear_dirty();
        assert!(array.remove("a_missing").is_none());
        assert!(!array.is_dirty());
    }

    #[test]
    fn index_vector_len_depends_on_format() {
        let indices: IndexVector<()> = IndexVector::from_u32(&[0, 1, 2, 2, 1, 3]);
        assert_eq!(indices.len(), 6);
        assert_eq!(indices.format(), wgpu::IndexFormat::Uint32);
    }
}
