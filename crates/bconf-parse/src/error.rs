//! The parse error type.
//!
//! All failures — lexical, syntactic, numeric, variable, resolver, and I/O —
//! surface as a single [`ParseError`] carrying a message and the one-indexed
//! row/column of the offending token. The parser stops at the first error;
//! no partial results are returned.

use bconf_lexer::Pos;

/// A parse error with its source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// Human-readable description of the failure.
    pub message: String,
    /// One-indexed row, or 0 when the error has not been positioned yet.
    pub row: u32,
    /// One-indexed column, or 0 when the error has not been positioned yet.
    pub column: u32,
}

impl ParseError {
    /// Create an error at a known position.
    pub fn new(message: impl Into<String>, pos: Pos) -> Self {
        Self {
            message: message.into(),
            row: pos.row,
            column: pos.column,
        }
    }

    /// Create an error with no position.
    ///
    /// Resolvers use this; the parser re-positions such errors at the token
    /// it was looking at when the resolver failed.
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            row: 0,
            column: 0,
        }
    }

    /// Whether this error has been positioned.
    pub fn has_position(&self) -> bool {
        self.row != 0
    }

    /// Attach a position, unless one is already set.
    pub fn at(mut self, pos: Pos) -> Self {
        if !self.has_position() {
            self.row = pos.row;
            self.column = pos.column;
        }
        self
    }

    /// The position of this error.
    pub fn pos(&self) -> Pos {
        Pos::new(self.row, self.column)
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_position() {
            write!(f, "{} at {}:{}", self.message, self.row, self.column)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_position() {
        let err = ParseError::new("unexpected token '}'", Pos::new(3, 7));
        assert_eq!(err.to_string(), "unexpected token '}' at 3:7");
    }

    #[test]
    fn test_reposition_only_once() {
        let err = ParseError::message("boom").at(Pos::new(2, 2));
        assert_eq!(err.pos(), Pos::new(2, 2));
        let err = err.at(Pos::new(9, 9));
        assert_eq!(err.pos(), Pos::new(2, 2));
    }
}
