//! Source coordinates

use serde::{Deserialize, Serialize};

/// A location in some stage's source text.
///
/// `file` is only known for coordinates that have been resolved all the way
/// back to the original input; intermediate stages track lines only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coord {
    /// Line number (1-indexed)
    pub line: u32,
    /// Originating file, when known
    pub file: Option<String>,
}

impl Coord {
    /// Coordinate with a line but no file attribution
    #[must_use]
    pub fn line(line: u32) -> Self {
        Self { line, file: None }
    }

    /// Fully resolved coordinate
    #[must_use]
    pub fn new(line: u32, file: impl Into<String>) -> Self {
        Self {
            line,
            file: Some(file.into()),
        }
    }
}

impl std::fmt::Display for Coord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) => write!(f, "{}:{}", file, self.line),
            None => write!(f, "line {}", self.line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coord_display() {
        assert_eq!(Coord::line(12).to_string(), "line 12");
        assert_eq!(Coord::new(12, "input.c").to_string(), "input.c:12");
    }
}
