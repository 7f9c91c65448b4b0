// renderer/format.rs
use serde::{Deserialize, Serialize};

/// Numeric format of one vertex attribute element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeFormat {
    Byte,
    Byte2,
    Byte3,
    Byte4,
    UByte,
    UByte2,
    UByte3,
    UByte4,
    Short,
    Short2,
    Short3,
    Short4,
    UShort,
    UShort2,
    UShort3,
    UShort4,
    Int,
    Int2,
    Int3,
    Int4,
    UInt,
    UInt2,
    UInt3,
    UInt4,
    Float,
    Float2,
    Float3,
    Float4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
}

impl ComponentType {
    pub const fn size(self) -> u32 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
        }
    }
}

impl AttributeFormat {
    pub const fn component_type(self) -> ComponentType {
        use AttributeFormat::*;
        match self {
            Byte | Byte2 | Byte3 | Byte4 => ComponentType::I8,
            UByte | UByte2 | UByte3 | UByte4 => ComponentType::U8,
            Short | Short2 | Short3 | Short4 => ComponentType::I16,
            UShort | UShort2 | UShort3 | UShort4 => ComponentType::U16,
            Int | Int2 | Int3 | Int4 => ComponentType::I32,
            UInt | UInt2 | UInt3 | UInt4 => ComponentType::U32,
            Float | Float2 | Float3 | Float4 => ComponentType::F32,
        }
    }

    pub const fn components(self) -> u32 {
        use AttributeFormat::*;
        match self {
            Byte | UByte | Short | UShort | Int | UInt | Float => 1,
            Byte2 | UByte2 | Short2 | UShort2 | Int2 | UInt2 | Float2 => 2,
            Byte3 | UByte3 | Short3 | UShort3 | Int3 | UInt3 | Float3 => 3,
            Byte4 | UByte4 | Short4 | UShort4 | Int4 | UInt4 | Float4 => 4,
        }
    }

    /// Size of one element in bytes.
    pub const fn size(self) -> u32 {
        self.component_type().size() * self.components()
    }

    /// Encodes `values` as one element of this format in native byte order.
    ///
    /// Returns `None` when the value count does not match the component count.
    pub fn encode(self, values: &[f64]) -> Option<Vec<u8>> {
        if values.len() != self.components() as usize {
            return None;
        }
        let mut out = Vec::with_capacity(self.size() as usize);
        for &value in values {
            match self.component_type() {
                ComponentType::I8 => out.extend_from_slice(bytemuck::bytes_of(&(value as i8))),
                ComponentType::U8 => out.extend_from_slice(bytemuck::bytes_of(&(value as u8))),
                ComponentType::I16 => out.extend_from_slice(bytemuck::bytes_of(&(value as i16))),
                ComponentType::U16 => out.extend_from_slice(bytemuck::bytes_of(&(value as u16))),
                ComponentType::I32 => out.extend_from_slice(bytemuck::bytes_of(&(value as i32))),
                ComponentType::U32 => out.extend_from_slice(bytemuck::bytes_of(&(value as u32))),
                ComponentType::F32 => out.extend_from_slice(bytemuck::bytes_of(&(value as f32))),
            }
        }
        Some(out)
    }
}

/// Upload frequency hint passed through to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferUsage {
    #[default]
    StaticDraw,
    DynamicDraw,
    StreamDraw,
}

/// What a buffer is bound as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferKind {
    Vertex,
    Index,
    Uniform,
}

/// Color/depth/stencil pixel formats of the active render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetFormats {
    pub color: wgpu::TextureFormat,
    pub depth: Option<wgpu::TextureFormat>,
    pub stencil: Option<wgpu::TextureFormat>,
}

impl RenderTargetFormats {
    pub fn color_only(color: wgpu::TextureFormat) -> Self {
        Self {
            color,
            depth: None,
            stencil: None,
        }
    }

    pub fn with_depth(mut self, depth: wgpu::TextureFormat) -> Self {
        self.depth = Some(depth);
        self
    }

    pub fn with_stencil(mut self, stencil: wgpu::TextureFormat) -> Self {
        self.stencil = Some(stencil);
        self
    }
}

impl Default for RenderTargetFormats {
    fn default() -> Self {
        Self::color_only(wgpu::TextureFormat::Bgra8UnormSrgb)
    }
}

/// Named blend presets a shader can declare as its default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendPreset {
    #[default]
    AlphaBlend,
    PremultipliedAlpha,
    Replace,
}

impl BlendPreset {
    pub fn state(self) -> wgpu::BlendState {
        match self {
            Self::AlphaBlend => alpha_blend(),
            Self::PremultipliedAlpha => wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING,
            Self::Replace => wgpu::BlendState::REPLACE,
        }
    }
}

fn alpha_blend() -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_follow_component_width() {
        assert_eq!(AttributeFormat::Float3.size(), 12);
        assert_eq!(AttributeFormat::UShort2.size(), 4);
        assert_eq!(AttributeFormat::Byte3.size(), 3);
        assert_eq!(AttributeFormat::Int4.size(), 16);
    }

    #[test]
    fn encode_checks_component_count() {
        assert!(AttributeFormat::Float2.encode(&[1.0]).is_none());
        let bytes = AttributeFormat::Float2.encode(&[1.0, 2.0]).unwrap();
        let expected: Vec<u8> = [1.0f32, 2.0].iter().flat_map(|f| f.to_ne_bytes()).collect();
        assert_eq!(bytes, expected);
    }

    #[test]
    fn formats_parse_from_lowercase_names() {
        let format: AttributeFormat = serde_json::from_str("\"ushort2\"").unwrap();
        assert_eq!(format, AttributeFormat::UShort2);
    }

    #[test]
    fn alpha_blend_is_source_over() {
        let blend = BlendPreset::AlphaBlend.state();
        assert_eq!(blend.color.src_factor, wgpu::BlendFactor::SrcAlpha);
        assert_eq!(blend.alpha.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
    }
}
