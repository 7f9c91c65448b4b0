// asset/manifest.rs
use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;
use crate::renderer::{AttributeFormat, BlendPreset, UniformBlockDescriptor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub name: String,
    pub format: AttributeFormat,
    /// Defaults to the format size.
    #[serde(default)]
    pub stride: Option<u32>,
    /// Constant used when a drawable does not override the attribute.
    #[serde(default)]
    pub default: Option<Vec<f64>>,
}

/// Program text and interface for one base shader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderSource {
    pub name: String,
    pub source: String,
    #[serde(default = "ShaderSource::default_vertex_entry")]
    pub vertex_entry: String,
    #[serde(default = "ShaderSource::default_fragment_entry")]
    pub fragment_entry: String,
    /// Paint properties in declaration order; bit `i` of a uniform mask refers to `properties[i]`.
    #[serde(default)]
    pub properties: Vec<String>,
    /// Buffer slots the program reads, in index order.
    pub buffer_names: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeSpec>,
    #[serde(default)]
    pub uniform_blocks: Vec<UniformBlockDescriptor>,
    #[serde(default)]
    pub blend: BlendPreset,
}

impl ShaderSource {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            vertex_entry: Self::default_vertex_entry(),
            fragment_entry: Self::default_fragment_entry(),
            properties: Vec::new(),
            buffer_names: Vec::new(),
            attributes: Vec::new(),
            uniform_blocks: Vec::new(),
            blend: BlendPreset::default(),
        }
    }

    pub fn with_properties<S: Into<String>>(mut self, properties: impl IntoIterator<Item = S>) -> Self {
        self.properties = properties.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_buffer_names<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.buffer_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        format: AttributeFormat,
        default: Option<Vec<f64>>,
    ) -> Self {
        self.attributes.push(AttributeSpec {
            name: name.into(),
            format,
            stride: None,
            default,
        });
        self
    }

    pub fn with_uniform_block(mut self, name: impl Into<String>, index: u32, size: u32) -> Self {
        self.uniform_blocks.push(UniformBlockDescriptor {
            name: name.into(),
            index,
            size,
        });
        self
    }

    fn default_vertex_entry() -> String {
        "vs_main".to_string()
    }

    fn default_fragment_entry() -> String {
        "fs_main".to_string()
    }
}

#[derive(Deserialize)]
struct ManifestFile {
    shaders: Vec<ShaderSource>,
}

/// Shader sources keyed by base shader id.
#[derive(Debug, Clone, Default)]
pub struct ShaderManifest {
    shaders: HashMap<String, ShaderSource>,
}

impl ShaderManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let file: ManifestFile = serde_json::from_str(json)?;
        let mut manifest = Self::new();
        for shader in file.shaders {
            manifest.insert(shader)?;
        }
        Ok(manifest)
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let manifest = Self::from_json(&contents)?;
        log::info!("Loaded {} shaders from {:?}", manifest.len(), path);
        Ok(manifest)
    }

    pub fn insert(&mut self, shader: ShaderSource) -> Result<(), ManifestError> {
        if self.shaders.contains_key(&shader.name) {
            return Err(ManifestError::Duplicate(shader.name));
        }
        self.shaders.insert(shader.name.clone(), shader);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ShaderSource> {
        self.shaders.get(name)
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }
}
