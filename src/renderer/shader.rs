// renderer/shader.rs
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use crate::asset::{ShaderManifest, ShaderSource};
use crate::error::ShaderError;
use crate::renderer::{AttributeDescriptor, GraphicsDevice, ProgramDescriptor, UniformBlockDescriptor};

/// Which paint properties a variant reads from uniforms instead of vertex attributes.
///
/// Bit `i` refers to the shader's `i`-th declared property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UniformMask(u32);

impl UniformMask {
    pub const NONE: Self = Self(0);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Packs one "is uniform" flag per property; flags past bit 31 are ignored.
    pub fn from_properties(uniform: &[bool]) -> Self {
        let bits = uniform
            .iter()
            .take(32)
            .enumerate()
            .filter(|(_, is_uniform)| **is_uniform)
            .fold(0u32, |bits, (i, _)| bits | (1 << i));
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, property: usize) -> bool {
        property < 32 && self.0 & (1 << property) != 0
    }

    /// True when no bit at or past `count` is set.
    pub fn fits(self, count: usize) -> bool {
        count >= 32 || self.0 >> count == 0
    }
}

impl fmt::Display for UniformMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderVariantKey {
    pub base: String,
    pub mask: UniformMask,
}

impl ShaderVariantKey {
    pub fn new(base: impl Into<String>, mask: UniformMask) -> Self {
        Self {
            base: base.into(),
            mask,
        }
    }

    /// `"<base>#<mask>"`, the name programs and diagnostics use.
    pub fn name(&self) -> String {
        format!("{}#{}", self.base, self.mask)
    }
}

impl fmt::Display for ShaderVariantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.base, self.mask)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgramId(u64);

impl ProgramId {
    pub fn get(self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn for_tests(id: u64) -> Self {
        Self(id)
    }
}

/// A compiled variant and the vertex/uniform interface it expects.
pub struct CompiledShaderProgram<D: GraphicsDevice> {
    id: ProgramId,
    key: ShaderVariantKey,
    name: String,
    program: D::Program,
    buffer_names: Vec<String>,
    buffer_indices: HashMap<String, u32>,
    attributes: Vec<AttributeDescriptor>,
    uniform_blocks: Vec<UniformBlockDescriptor>,
    blend: wgpu::BlendState,
}

impl<D: GraphicsDevice> CompiledShaderProgram<D> {
    pub fn id(&self) -> ProgramId {
        self.id
    }

    pub fn key(&self) -> &ShaderVariantKey {
        &self.key
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn program(&self) -> &D::Program {
        &self.program
    }

    pub fn buffer_names(&self) -> &[String] {
        &self.buffer_names
    }

    pub fn buffer_index(&self, name: &str) -> Option<u32> {
        self.buffer_indices.get(name).copied()
    }

    pub fn attributes(&self) -> &[AttributeDescriptor] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn uniform_blocks(&self) -> &[UniformBlockDescriptor] {
        &self.uniform_blocks
    }

    pub fn blend(&self) -> wgpu::BlendState {
        self.blend
    }
}

impl<D: GraphicsDevice> fmt::Debug for CompiledShaderProgram<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledShaderProgram")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("buffer_names", &self.buffer_names)
            .field("attributes", &self.attributes.len())
            .field("uniform_blocks", &self.uniform_blocks.len())
            .finish()
    }
}

/// Compiles each shader variant at most once and remembers the ones that failed.
pub struct ShaderRegistry<D: GraphicsDevice> {
    programs: HashMap<ShaderVariantKey, Rc<CompiledShaderProgram<D>>>,
    failed: HashMap<ShaderVariantKey, ShaderError>,
    global_defines: BTreeMap<String, String>,
    next_id: u64,
    compiled: u64,
}

impl<D: GraphicsDevice> ShaderRegistry<D> {
    pub fn new(global_defines: BTreeMap<String, String>) -> Self {
        Self {
            programs: HashMap::new(),
            failed: HashMap::new(),
            global_defines,
            next_id: 1,
            compiled: 0,
        }
    }

    /// Returns the cached variant or compiles it.
    ///
    /// The first failure for a key is returned as is; every later request
    /// for that key gets [`ShaderError::Unusable`].
    pub fn get_or_create(
        &mut self,
        device: &D,
        manifest: &ShaderManifest,
        base: &str,
        mask: UniformMask,
    ) -> Result<Rc<CompiledShaderProgram<D>>, ShaderError> {
        let key = ShaderVariantKey::new(base, mask);
        if let Some(program) = self.programs.get(&key) {
            return Ok(Rc::clone(program));
        }
        if self.failed.contains_key(&key) {
            return Err(ShaderError::Unusable(key.name()));
        }

        match self.create(device, manifest, &key) {
            Ok(program) => {
                let program = Rc::new(program);
                self.programs.insert(key, Rc::clone(&program));
                Ok(program)
            }
            Err(err) => {
                log::debug!("Shader variant {} failed: {}", key, err);
                self.failed.insert(key, err.clone());
                Err(err)
            }
        }
    }

    pub fn get(&self, base: &str, mask: UniformMask) -> Option<Rc<CompiledShaderProgram<D>>> {
        self.programs
            .get(&ShaderVariantKey::new(base, mask))
            .map(Rc::clone)
    }

    pub fn failure(&self, key: &ShaderVariantKey) -> Option<&ShaderError> {
        self.failed.get(key)
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Number of successful compilations since construction.
    pub fn compiled_count(&self) -> u64 {
        self.compiled
    }

    /// Drops every program and failure record.
    pub fn teardown(&mut self) {
        log::info!(
            "Releasing {} shader variants ({} failed)",
            self.programs.len(),
            self.failed.len()
        );
        self.programs.clear();
        self.failed.clear();
    }

    fn create(
        &mut self,
        device: &D,
        manifest: &ShaderManifest,
        key: &ShaderVariantKey,
    ) -> Result<CompiledShaderProgram<D>, ShaderError> {
        let source = manifest
            .get(&key.base)
            .ok_or_else(|| ShaderError::UnknownShader(key.base.clone()))?;

        if !key.mask.fits(source.properties.len()) {
            return Err(ShaderError::InvalidMask {
                shader: key.base.clone(),
                mask: key.mask.bits(),
                properties: source.properties.len(),
            });
        }

        let buffer_indices: HashMap<String, u32> = source
            .buffer_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i as u32))
            .collect();
        let attributes = Self::attribute_descriptors(key, source, &buffer_indices)?;

        let mut defines = self.global_defines.clone();
        for (i, property) in source.properties.iter().enumerate() {
            if key.mask.contains(i) {
                defines.insert(format!("HAS_UNIFORM_u_{}", property), "1".to_string());
            }
        }

        let name = key.name();
        let program = device
            .compile_program(&ProgramDescriptor {
                label: &name,
                source: &source.source,
                vertex_entry: &source.vertex_entry,
                fragment_entry: &source.fragment_entry,
                defines: &defines,
                buffer_names: &source.buffer_names,
                uniform_blocks: &source.uniform_blocks,
            })
            .map_err(|err| ShaderError::Compilation {
                shader: name.clone(),
                message: err.to_string(),
            })?;

        self.compiled += 1;
        let id = ProgramId(self.next_id);
        self.next_id += 1;
        log::info!("Compiled shader variant {} ({} defines)", name, defines.len());

        Ok(CompiledShaderProgram {
            id,
            key: key.clone(),
            name,
            program,
            buffer_names: source.buffer_names.clone(),
            buffer_indices,
            attributes,
            uniform_blocks: source.uniform_blocks.clone(),
            blend: source.blend.state(),
        })
    }

    fn attribute_descriptors(
        key: &ShaderVariantKey,
        source: &ShaderSource,
        buffer_indices: &HashMap<String, u32>,
    ) -> Result<Vec<AttributeDescriptor>, ShaderError> {
        source
            .attributes
            .iter()
            .map(|spec| {
                let index = *buffer_indices.get(&spec.name).ok_or_else(|| {
                    ShaderError::UndeclaredAttribute {
                        shader: key.name(),
                        attribute: spec.name.clone(),
                    }
                })?;
                let default = match &spec.default {
                    Some(values) => Some(spec.format.encode(values).ok_or_else(|| {
                        ShaderError::InvalidDefault {
                            shader: key.name(),
                            attribute: spec.name.clone(),
                            format: spec.format,
                        }
                    })?),
                    None => None,
                };
                Ok(AttributeDescriptor {
                    name: spec.name.clone(),
                    format: spec.format,
                    stride: spec.stride.unwrap_or(spec.format.size()),
                    index,
                    default,
                })
            })
            .collect()
    }
}
