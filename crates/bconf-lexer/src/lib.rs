//! Lexer for the bconf configuration language.
//!
//! This crate turns source text into a linear token stream. The lexer is
//! stateful: strings, embedded `${…}` expressions, and tag argument lists
//! require a context stack to disambiguate tokens such as `}` (which may
//! close an embedded expression or be an ordinary brace depending on what
//! is open).

mod lexer;
mod span;
mod token;

pub use lexer::Lexer;
pub use span::{Pos, Span};
pub use token::{Token, TokenKind};
