//! Shared screen source code.
//!
//! Closures created by the evaluator keep their AST alive, while traces and
//! diagnostics need the text the AST came from. `SourceCode` wraps it in an
//! `Arc<String>` so both can hold it cheaply.

use std::fmt;
use std::sync::Arc;

/// Wrapper around source code that can be cheaply cloned.
#[derive(Clone)]
pub struct SourceCode(Arc<String>);

impl SourceCode {
    pub fn new(code: String) -> Self {
        SourceCode(Arc::new(code))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// One-based line and column of a byte offset.
    ///
    /// Offsets past the end clamp to the last position.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.0.len());
        let mut line = 1;
        let mut column = 1;
        for (index, character) in self.0.char_indices() {
            if index >= offset {
                break;
            }
            if character == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        (line, column)
    }
}

impl fmt::Debug for SourceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SourceCode({} bytes)", self.0.len())
    }
}

impl From<&str> for SourceCode {
    fn from(code: &str) -> Self {
        Self::new(code.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_col() {
        let source = SourceCode::from("let a = 1\nrender(a)");
        assert_eq!(source.line_col(0), (1, 1));
        assert_eq!(source.line_col(4), (1, 5));
        assert_eq!(source.line_col(10), (2, 1));
        assert_eq!(source.line_col(16), (2, 7));
    }

    #[test]
    fn test_line_col_clamps() {
        let source = SourceCode::from("ab");
        assert_eq!(source.line_col(100), (1, 3));
    }
}
