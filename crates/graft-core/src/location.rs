#![forbid(unsafe_code)]

//! Source positions for diagnostics.
//!
//! Every fragment, binding, and expression carries a [`SourceLocation`] so
//! that parse and evaluation failures can point back at the markup that
//! produced them. A line or column of `0` means "unknown" and renders as
//! `?`; a missing file renders as `<unknown>`.

use std::fmt;
use std::rc::Rc;

/// A position in a source document: file name plus 1-based line and column.
///
/// Cheap to clone; the file name is shared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    file: Option<Rc<str>>,
    line: u32,
    column: u32,
}

impl SourceLocation {
    /// Create a location. `line`/`column` of `0` mean "unknown".
    #[must_use]
    pub fn new(file: Option<&str>, line: u32, column: u32) -> Self {
        Self {
            file: file.map(Rc::from),
            line,
            column,
        }
    }

    /// The file name, if known.
    #[must_use]
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    /// The 1-based line, or `0` if unknown.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// The 1-based column, or `0` if unknown.
    #[must_use]
    pub fn column(&self) -> u32 {
        self.column
    }

    /// A location `delta_lines`/`delta_columns` past this one, for positions
    /// inside embedded text (an expression within a binding string).
    ///
    /// Crossing a line resets the column to the delta alone; staying on the
    /// same line adds to it. Unknown (`0`) components stay unknown.
    #[must_use]
    pub fn offset(&self, delta_lines: u32, delta_columns: u32) -> Self {
        let line = if self.line == 0 {
            0
        } else {
            self.line + delta_lines
        };
        let column = if self.column == 0 {
            0
        } else if delta_lines > 0 {
            delta_columns + 1
        } else {
            self.column + delta_columns
        };
        Self {
            file: self.file.clone(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.file.as_deref() {
            Some(file) => write!(f, "{file}:")?,
            None => write!(f, "<unknown>:")?,
        }
        match self.line {
            0 => write!(f, "?:")?,
            line => write!(f, "{line}:")?,
        }
        match self.column {
            0 => write!(f, "?"),
            column => write!(f, "{column}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes() {
        let location = SourceLocation::new(Some("test"), 1, 5);
        assert_eq!(location.file(), Some("test"));
        assert_eq!(location.line(), 1);
        assert_eq!(location.column(), 5);
    }

    #[test]
    fn missing_file() {
        let location = SourceLocation::new(None, 1, 5);
        assert_eq!(location.file(), None);
    }

    #[test]
    fn formatting() {
        let location = SourceLocation::new(Some("test"), 1, 5);
        assert_eq!(location.to_string(), "test:1:5");
    }

    #[test]
    fn formatting_with_missing_file() {
        let location = SourceLocation::new(None, 1, 5);
        assert_eq!(location.to_string(), "<unknown>:1:5");
    }

    #[test]
    fn formatting_with_zero_line_column() {
        assert_eq!(
            SourceLocation::new(Some("file"), 0, 5).to_string(),
            "file:?:5"
        );
        assert_eq!(
            SourceLocation::new(Some("file"), 1, 0).to_string(),
            "file:1:?"
        );
        assert_eq!(
            SourceLocation::new(Some("file"), 0, 0).to_string(),
            "file:?:?"
        );
    }

    #[test]
    fn offset_same_line() {
        let base = SourceLocation::new(Some("f"), 3, 10);
        let moved = base.offset(0, 4);
        assert_eq!(moved, SourceLocation::new(Some("f"), 3, 14));
    }

    #[test]
    fn offset_across_lines() {
        let base = SourceLocation::new(Some("f"), 3, 10);
        let moved = base.offset(2, 4);
        assert_eq!(moved, SourceLocation::new(Some("f"), 5, 5));
    }

    #[test]
    fn offset_preserves_unknown_components() {
        let base = SourceLocation::new(Some("f"), 0, 0);
        let moved = base.offset(2, 4);
        assert_eq!(moved.line(), 0);
        assert_eq!(moved.column(), 0);
    }

    #[test]
    fn default_is_fully_unknown() {
        let location = SourceLocation::default();
        assert_eq!(location.to_string(), "<unknown>:?:?");
    }
}
