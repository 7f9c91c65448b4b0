// renderer/uniforms.rs
use std::collections::BTreeMap;

use bytemuck::Pod;
use serde::{Deserialize, Serialize};

use crate::renderer::BufferSource;

/// A uniform block a shader declares, bound at `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniformBlockDescriptor {
    pub name: String,
    pub index: u32,
    #[serde(default)]
    pub size: u32,
}

/// Uniform buffers a drawable supplies, by block name.
#[derive(Debug)]
pub struct UniformBufferArray<B> {
    buffers: BTreeMap<String, BufferSource<B>>,
}

impl<B> Default for UniformBufferArray<B> {
    fn default() -> Self {
        Self {
            buffers: BTreeMap::new(),
        }
    }
}

impl<B> UniformBufferArray<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_bytes(&mut self, name: impl Into<String>, bytes: Vec<u8>) {
        let name = name.into();
        match self.buffers.get_mut(&name) {
            Some(source) => source.replace_if_changed(&bytes),
            None => {
                self.buffers.insert(name, BufferSource::new(bytes));
            }
        }
    }

    pub fn set<T: Pod>(&mut self, name: impl Into<String>, value: &T) {
        self.set_bytes(name, bytemuck::bytes_of(value).to_vec());
    }

    pub fn get(&self, name: &str) -> Option<&BufferSource<B>> {
        self.buffers.get(name)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        self.buffers.remove(name).is_some()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut BufferSource<B>)> {
        self.buffers.iter_mut().map(|(name, source)| (name.as_str(), source))
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct FillPaint {
        color: [f32; 4],
        opacity: f32,
        _pad: [f32; 3],
    }

    #[test]
    fn identical_values_do_not_dirty() {
        let paint = FillPaint {
            color: [1.0, 0.0, 0.0, 1.0],
            opacity: 0.5,
            _pad: [0.0; 3],
        };
        let mut uniforms: UniformBufferArray<()> = UniformBufferArray::new();
        uniforms.set("FillPaintUBO", &paint);
        assert_eq!(uniforms.get("FillPaintUBO").map(|s| s.bytes().len()), Some(32));

        for (_, source) in uniforms.iter_mut() {
            source.mark_clean();
        }
        uniforms.set("FillPaintUBO", &paint);
        assert!(!uniforms.get("FillPaintUBO").unwrap().is_dirty());

        uniforms.set("FillPaintUBO", &FillPaint { opacity: 1.0, ..paint });
        assert!(uniforms.get("FillPaintUBO").unwrap().is_dirty());
    }
}
