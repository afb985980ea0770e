//! Source code handle and offset → line/column mapping.
//!
//! The scanner reports positions directly; everything produced after it
//! (parse and link errors) only carries byte spans, which are resolved here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Wrapper around source code that can be cheaply cloned.
#[derive(Clone)]
pub struct SourceCode {
    code: Arc<str>,
    line_starts: Arc<[usize]>,
}

impl SourceCode {
    pub fn new(code: impl Into<Arc<str>>) -> Self {
        let code = code.into();
        let line_starts = std::iter::once(0)
            .chain(code.match_indices('\n').map(|(index, _)| index + 1))
            .collect();
        SourceCode { code, line_starts }
    }

    pub fn as_str(&self) -> &str {
        &self.code
    }

    pub fn len(&self) -> usize {
        self.code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Resolves a byte offset to a 1-based line and column (columns count chars).
    pub fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.code.len());
        let line_index = match self.line_starts.binary_search(&offset) {
            Ok(index) => index,
            Err(index) => index - 1,
        };
        let line_start = self.line_starts[line_index];
        let column = self.code[line_start..offset].chars().count() + 1;
        Position {
            offset,
            line: line_index + 1,
            column,
        }
    }
}

impl fmt::Debug for SourceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceCode")
            .field("len", &self.code.len())
            .field("lines", &self.line_starts.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub const START: Position = Position {
        offset: 0,
        line: 1,
        column: 1,
    };
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_are_one_based() {
        let source = SourceCode::new("ab\ncd\n\nxyz");
        assert_eq!(source.position(0), Position { offset: 0, line: 1, column: 1 });
        assert_eq!(source.position(4).line, 2);
        assert_eq!(source.position(4).column, 2);
        assert_eq!(source.position(6), Position { offset: 6, line: 3, column: 1 });
        assert_eq!(source.position(9).column, 3);
    }

    #[test]
    fn offsets_past_the_end_clamp() {
        let source = SourceCode::new("a");
        assert_eq!(source.position(100).offset, 1);
    }
}
