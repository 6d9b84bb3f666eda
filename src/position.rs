//! Source positions
//!
//! Rows and columns are zero-based and follow whatever tokenizer the external
//! indexer uses. The store never checks them against file contents.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A zero-based (row, column) position in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub row: u32,
    pub column: u32,
}

impl Point {
    pub fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// Whether a token of `length` starting at `self` covers `point`.
    ///
    /// Tokens never span rows, so only the start row can match.
    pub fn token_covers(&self, length: u32, point: Point) -> bool {
        self.row == point.row
            && self.column <= point.column
            && point.column < self.column.saturating_add(length)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.row, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_ordering() {
        assert!(Point::new(1, 9) < Point::new(2, 0));
        assert!(Point::new(2, 3) < Point::new(2, 4));
    }

    #[test]
    fn test_token_covers() {
        let start = Point::new(4, 10);
        assert!(start.token_covers(3, Point::new(4, 10)));
        assert!(start.token_covers(3, Point::new(4, 12)));
        assert!(!start.token_covers(3, Point::new(4, 13)));
        assert!(!start.token_covers(3, Point::new(4, 9)));
        assert!(!start.token_covers(3, Point::new(5, 11)));
        assert!(!start.token_covers(0, Point::new(4, 10)));
    }

    #[test]
    fn test_display() {
        assert_eq!(Point::new(7, 2).to_string(), "7:2");
    }
}
