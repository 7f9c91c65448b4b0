// renderer/diagnostics.rs
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    ShaderCompilationFailure,
    PipelineStateCreationFailure,
    MissingAttributeData,
    /// Attribute data present but unusable: wrong vertex count, constant size or slot.
    InvalidAttributeData,
    MissingUniformBlock,
    BufferAllocationFailure,
    MissingShader,
}

impl DiagnosticKind {
    fn level(self) -> log::Level {
        match self {
            Self::MissingUniformBlock | Self::BufferAllocationFailure => log::Level::Warn,
            _ => log::Level::Error,
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ShaderCompilationFailure => "shader compilation failure",
            Self::PipelineStateCreationFailure => "pipeline state creation failure",
            Self::MissingAttributeData => "missing attribute data",
            Self::InvalidAttributeData => "invalid attribute data",
            Self::MissingUniformBlock => "missing uniform block",
            Self::BufferAllocationFailure => "buffer allocation failure",
            Self::MissingShader => "missing shader",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Drawable and shader the failure belongs to.
    pub subject: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.kind, self.subject, self.message)
    }
}

/// Failure log with suppression of exact repeats.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
    seen: HashSet<Diagnostic>,
    suppress_repeats: bool,
    suppressed: u64,
}

impl Diagnostics {
    pub fn new(suppress_repeats: bool) -> Self {
        Self {
            suppress_repeats,
            ..Self::default()
        }
    }

    /// Records and logs a failure. Returns `false` when it was suppressed.
    pub fn report(
        &mut self,
        kind: DiagnosticKind,
        subject: impl Into<String>,
        message: impl Into<String>,
    ) -> bool {
        let diagnostic = Diagnostic {
            kind,
            subject: subject.into(),
            message: message.into(),
        };
        if self.suppress_repeats && !self.seen.insert(diagnostic.clone()) {
            self.suppressed += 1;
            return false;
        }
        log::log!(kind.level(), "{}", diagnostic);
        self.entries.push(diagnostic);
        true
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.entries.iter().filter(|d| d.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.seen.clear();
        self.suppressed = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_are_suppressed() {
        let mut diagnostics = Diagnostics::new(true);
        assert!(diagnostics.report(DiagnosticKind::MissingUniformBlock, "tile 3", "no FillUBO"));
        assert!(!diagnostics.report(DiagnosticKind::MissingUniformBlock, "tile 3", "no FillUBO"));
        assert!(diagnostics.report(DiagnosticKind::MissingUniformBlock, "tile 4", "no FillUBO"));
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.suppressed(), 1);
        assert_eq!(diagnostics.count(DiagnosticKind::MissingUniformBlock), 2);
    }

    #[test]
    fn repeats_kept_when_suppression_is_off() {
        let mut diagnostics = Diagnostics::new(false);
        diagnostics.report(DiagnosticKind::MissingShader, "a", "gone");
        diagnostics.report(DiagnosticKind::MissingShader, "a", "gone");
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics.entries()[0].to_string(), "missing shader [a]: gone");
    }
}
