// renderer/wgpu_backend/preprocess.rs
//! `#ifdef`/`#ifndef`/`#else`/`#endif` handling for WGSL sources.
//!
//! Disabled lines are blanked rather than removed so compiler messages keep
//! their line numbers.

use std::collections::BTreeMap;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PreprocessError {
    #[error("line {line}: '{directive}' needs a define name")]
    MissingName { line: usize, directive: String },

    #[error("line {line}: #else without #ifdef")]
    UnmatchedElse { line: usize },

    #[error("line {line}: second #else in one block")]
    DuplicateElse { line: usize },

    #[error("line {line}: #endif without #ifdef")]
    UnmatchedEndif { line: usize },

    #[error("line {line}: block is never closed")]
    Unterminated { line: usize },
}

struct Block {
    line: usize,
    parent_active: bool,
    condition: bool,
    in_else: bool,
}

impl Block {
    fn active(&self) -> bool {
        self.parent_active && (self.condition != self.in_else)
    }
}

pub fn preprocess(source: &str, defines: &BTreeMap<String, String>) -> Result<String, PreprocessError> {
    let mut out = String::with_capacity(source.len());
    let mut stack: Vec<Block> = Vec::new();

    for (i, raw) in source.lines().enumerate() {
        let line = i + 1;
        let active = stack.last().map_or(true, Block::active);
        let trimmed = raw.trim_start();

        let mut words = trimmed.split_whitespace();
        let directive = words.next().unwrap_or("");
        match directive {
            "#ifdef" | "#ifndef" => {
                let name = words.next().ok_or_else(|| PreprocessError::MissingName {
                    line,
                    directive: directive.to_string(),
                })?;
                let defined = defines.contains_key(name);
                stack.push(Block {
                    line,
                    parent_active: active,
                    condition: if directive == "#ifdef" { defined } else { !defined },
                    in_else: false,
                });
            }
            "#else" => {
                let block = stack
                    .last_mut()
                    .ok_or(PreprocessError::UnmatchedElse { line })?;
                if block.in_else {
                    return Err(PreprocessError::DuplicateElse { line });
                }
                block.in_else = true;
            }
            "#endif" => {
                stack.pop().ok_or(PreprocessError::UnmatchedEndif { line })?;
            }
            _ => {
                if active {
                    out.push_str(raw);
                }
            }
        }
        out.push('\n');
    }

    if let Some(block) = stack.last() {
        return Err(PreprocessError::Unterminated { line: block.line });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defines(names: &[&str]) -> BTreeMap<String, String> {
        names.iter().map(|n| (n.to_string(), "1".to_string())).collect()
    }

    const FILL: &str = "\
#ifdef HAS_UNIFORM_u_color
let color = paint.color;
#else
let color = in.color;
#endif
#ifndef HAS_UNIFORM_u_opacity
let opacity = in.opacity;
#endif";

    #[test]
    fn selects_uniform_branch() {
        let out = preprocess(FILL, &defines(&["HAS_UNIFORM_u_color"])).unwrap();
        assert!(out.contains("paint.color"));
        assert!(!out.contains("in.color"));
        assert!(out.contains("in.opacity"));
        assert_eq!(out.lines().count(), FILL.lines().count());
    }

    #[test]
    fn nested_blocks_respect_parent() {
        let source = "#ifdef A\n#ifdef B\nab\n#else\na\n#endif\n#else\n#ifdef B\nb\n#endif\n#endif";
        let out = preprocess(source, &defines(&["B"])).unwrap();
        assert_eq!(out.split_whitespace().collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn unbalanced_directives_are_errors() {
        let none = BTreeMap::new();
        assert_eq!(
            preprocess("#endif", &none),
            Err(PreprocessError::UnmatchedEndif { line: 1 })
        );
        assert_eq!(
            preprocess("x\n#ifdef A\ny", &none),
            Err(PreprocessError::Unterminated { line: 2 })
        );
        assert!(matches!(
            preprocess("#ifdef\n#endif", &none),
            Err(PreprocessError::MissingName { line: 1, .. })
        ));
        assert_eq!(
            preprocess("#ifdef A\n#else\n#else\n#endif", &none),
            Err(PreprocessError::DuplicateElse { line: 3 })
        );
    }
}
