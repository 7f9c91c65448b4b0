// error.rs
use crate::renderer::AttributeFormat;

/// Failures reported by a [`GraphicsDevice`](crate::renderer::GraphicsDevice) implementation.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("buffer allocation failed: {0}")]
    BufferAllocation(String),

    #[error("program compilation failed: {0}")]
    Compilation(String),

    #[error("pipeline state creation failed: {0}")]
    PipelineCreation(String),

    #[error("no usable graphics device: {0}")]
    Unavailable(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShaderError {
    #[error("shader '{0}' is not in the manifest")]
    UnknownShader(String),

    #[error("shader '{shader}' has {properties} paint properties, mask {mask:#b} is out of range")]
    InvalidMask {
        shader: String,
        mask: u32,
        properties: usize,
    },

    #[error("shader '{shader}' attribute '{attribute}' is not a declared buffer name")]
    UndeclaredAttribute { shader: String, attribute: String },

    #[error("shader '{shader}' attribute '{attribute}' default value does not fit {format:?}")]
    InvalidDefault {
        shader: String,
        attribute: String,
        format: AttributeFormat,
    },

    #[error("shader '{shader}' failed to compile: {message}")]
    Compilation { shader: String, message: String },

    #[error("shader '{0}' failed earlier and is unusable")]
    Unusable(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("pipeline '{label}' could not be created: {message}")]
    Creation { label: String, message: String },

    #[error("pipeline '{0}' failed earlier for this format and layout")]
    PreviouslyFailed(String),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("attribute '{0}' has neither an override nor a default value")]
    MissingAttributeData(String),

    #[error("attribute '{name}' supplies {actual} vertices, expected {expected}")]
    VertexCountMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("attribute '{name}' constant is {actual} bytes, {format:?} needs {expected}")]
    ConstantSizeMismatch {
        name: String,
        format: AttributeFormat,
        expected: usize,
        actual: usize,
    },

    #[error("attribute '{name}' index {index} is outside the {count} declared buffers")]
    IndexOutOfRange { name: String, index: u32, count: usize },

    #[error(transparent)]
    Device(#[from] DeviceError),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error(transparent)]
    Shader(#[from] ShaderError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("drawable '{drawable}' overrides '{attribute}', which the shader does not declare")]
    UnknownAttribute { drawable: String, attribute: String },

    #[error("drawable '{drawable}' segment {segment} reads indices {end} past the {count} supplied")]
    SegmentOutOfRange {
        drawable: String,
        segment: usize,
        end: u64,
        count: usize,
    },

    #[error("drawable '{drawable}' has {count} {what}, more than a draw can address")]
    CountOverflow {
        drawable: String,
        what: &'static str,
        count: usize,
    },

    #[error("drawable '{drawable}' segment {segment} vertex offset {offset} does not fit a base vertex")]
    VertexOffsetOverflow {
        drawable: String,
        segment: usize,
        offset: u32,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum ManifestError {
    #[error("failed to read shader manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse shader manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("shader '{0}' is declared twice")]
    Duplicate(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_errors_name_the_attribute() {
        let err = ResolveError::MissingAttributeData("a_color".into());
        assert!(err.to_string().contains("a_color"));

        let err = BuildError::from(ResolveError::VertexCountMismatch {
            name: "a_pos".into(),
            expected: 4,
            actual: 3,
        });
        assert!(err.to_string().contains("a_pos"));
        assert!(err.to_string().contains("expected 4"));
    }

    #[test]
    fn invalid_mask_prints_binary() {
        let err = ShaderError::InvalidMask {
            shader: "fill".into(),
            mask: 0b101,
            properties: 2,
        };
        assert!(err.to_string().contains("0b101"));
    }
}
