//! Context-stack lexer for the bconf configuration language.

use crate::{Pos, Span, Token, TokenKind};
use tracing::trace;

/// String flavor, tracked on the context stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StrKind {
    Double,
    Triple,
}

/// A frame on the lexing context stack.
///
/// `}` closes an embedded expression only when `Embedded` is on top, and
/// `TagArgs` exists so that braces inside a tag argument list do not pop the
/// embedded frame around them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Str(StrKind),
    Embedded,
    TagArgs,
}

/// A lexer that produces tokens from bconf source text.
pub struct Lexer<'src> {
    /// The source text being lexed.
    source: &'src str,
    /// The remaining source text (suffix of `source`).
    remaining: &'src str,
    /// Current byte position in `source`.
    pos: u32,
    /// Current one-indexed row/column.
    at: Pos,

    /// Context stack; empty means default context.
    stack: Vec<Frame>,
    /// Kind of the previously emitted token, trivia included.
    prev: Option<TokenKind>,
}

impl<'src> Lexer<'src> {
    /// Create a new lexer for the given source text.
    pub fn new(source: &'src str) -> Self {
        Self {
            source,
            remaining: source,
            pos: 0,
            at: Pos::start(),
            stack: Vec::new(),
            prev: None,
        }
    }

    /// Get the current byte position.
    #[inline]
    pub fn position(&self) -> u32 {
        self.pos
    }

    /// Check if we're at the end of input.
    #[inline]
    pub fn is_eof(&self) -> bool {
        self.remaining.is_empty()
    }

    /// Peek at the next character without consuming it.
    #[inline]
    fn peek(&self) -> Option<char> {
        self.remaining.chars().next()
    }

    /// Peek at the nth character (0-indexed) without consuming.
    #[inline]
    fn peek_nth(&self, n: usize) -> Option<char> {
        self.remaining.chars().nth(n)
    }

    /// Advance by one character and return it.
    #[inline]
    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8() as u32;
        self.remaining = &self.remaining[c.len_utf8()..];
        if c == '\n' {
            self.at.row += 1;
            self.at.column = 1;
        } else {
            self.at.column += 1;
        }
        Some(c)
    }

    /// Check if the remaining text starts with the given prefix.
    #[inline]
    fn starts_with(&self, prefix: &str) -> bool {
        self.remaining.starts_with(prefix)
    }

    /// Create a token from the given start offset/position to the current one.
    fn token(&mut self, kind: TokenKind, start: u32, pos: Pos) -> Token<'src> {
        let span = Span::new(start, self.pos);
        let text = &self.source[start as usize..self.pos as usize];
        trace!("token {:?} at {}: {:?}", kind, pos, text);
        self.prev = Some(kind);
        Token::new(kind, text, span, pos)
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> Token<'src> {
        let start = self.pos;
        let pos = self.at;

        if let Some(Frame::Str(kind)) = self.stack.last().copied() {
            if self.is_eof() {
                return self.token(TokenKind::Eof, start, pos);
            }
            return self.lex_string_content(kind, start, pos);
        }

        if self.is_eof() {
            return self.token(TokenKind::Eof, start, pos);
        }

        let c = self.peek().unwrap();
        match c {
            '{' => {
                self.advance();
                self.token(TokenKind::LBrace, start, pos)
            }
            '}' => {
                self.advance();
                if self.stack.last() == Some(&Frame::Embedded) {
                    self.stack.pop();
                }
                self.token(TokenKind::RBrace, start, pos)
            }
            '[' => {
                self.advance();
                // An index bracket must sit directly on its base; any trivia
                // in between was emitted as a token and breaks the chain.
                let kind = match self.prev {
                    Some(TokenKind::Identifier)
                    | Some(TokenKind::Variable)
                    | Some(TokenKind::RBracket) => TokenKind::IndexLBracket,
                    _ => TokenKind::LBracket,
                };
                self.token(kind, start, pos)
            }
            ']' => {
                self.advance();
                self.token(TokenKind::RBracket, start, pos)
            }
            '(' => {
                self.advance();
                if self.prev == Some(TokenKind::Identifier) {
                    self.stack.push(Frame::TagArgs);
                }
                self.token(TokenKind::LParen, start, pos)
            }
            ')' => {
                self.advance();
                if self.stack.last() == Some(&Frame::TagArgs) {
                    self.stack.pop();
                }
                self.token(TokenKind::RParen, start, pos)
            }
            '=' => {
                self.advance();
                self.token(TokenKind::Assign, start, pos)
            }
            '<' if self.starts_with("<<") => {
                self.advance();
                self.advance();
                self.token(TokenKind::Append, start, pos)
            }
            '<' => {
                self.advance();
                self.token(TokenKind::Illegal, start, pos)
            }
            '.' => {
                self.advance();
                self.token(TokenKind::Dot, start, pos)
            }
            ',' => {
                self.advance();
                self.token(TokenKind::Comma, start, pos)
            }

            '#' => self.lex_comment(start, pos),

            '"' if self.starts_with("\"\"\"") => {
                self.advance();
                self.advance();
                self.advance();
                self.stack.push(Frame::Str(StrKind::Triple));
                self.token(TokenKind::TripleQuote, start, pos)
            }
            '"' => {
                self.advance();
                self.stack.push(Frame::Str(StrKind::Double));
                self.token(TokenKind::DoubleQuote, start, pos)
            }

            '$' => self.lex_variable(start, pos),

            ' ' | '\t' => self.lex_whitespace(start, pos),
            '\r' if self.peek_nth(1) == Some('\n') => {
                self.advance();
                self.advance();
                self.token(TokenKind::Newline, start, pos)
            }
            '\r' => self.lex_whitespace(start, pos),
            '\n' => {
                self.advance();
                self.token(TokenKind::Newline, start, pos)
            }

            _ if is_identifier_char(c) => self.lex_identifier(start, pos),

            _ => {
                self.advance();
                self.token(TokenKind::Illegal, start, pos)
            }
        }
    }

    /// Lex horizontal whitespace (spaces, tabs, and lone `\r`).
    fn lex_whitespace(&mut self, start: u32, pos: Pos) -> Token<'src> {
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' => {
                    self.advance();
                }
                '\r' if self.peek_nth(1) != Some('\n') => {
                    self.advance();
                }
                _ => break,
            }
        }
        self.token(TokenKind::Whitespace, start, pos)
    }

    /// Lex a `#` comment to end of line.
    fn lex_comment(&mut self, start: u32, pos: Pos) -> Token<'src> {
        self.advance();
        while let Some(c) = self.peek() {
            if c == '\n' || (c == '\r' && self.peek_nth(1) == Some('\n')) {
                break;
            }
            self.advance();
        }
        self.token(TokenKind::Comment, start, pos)
    }

    /// Lex a bare identifier, promoting `true`/`false`/`null`.
    fn lex_identifier(&mut self, start: u32, pos: Pos) -> Token<'src> {
        while let Some(c) = self.peek() {
            if is_identifier_char(c) {
                self.advance();
            } else {
                break;
            }
        }
        let kind = match &self.source[start as usize..self.pos as usize] {
            "true" | "false" => TokenKind::Boolean,
            "null" => TokenKind::Null,
            _ => TokenKind::Identifier,
        };
        self.token(kind, start, pos)
    }

    /// Lex `$name`. A bare `$` is illegal.
    fn lex_variable(&mut self, start: u32, pos: Pos) -> Token<'src> {
        self.advance(); // consume `$`
        let name_start = self.pos;
        while let Some(c) = self.peek() {
            if is_variable_char(c) {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos == name_start {
            return self.token(TokenKind::Illegal, start, pos);
        }
        self.token(TokenKind::Variable, start, pos)
    }

    /// Lex inside a string: content runs, escapes, embedded starts, and the
    /// closing quote.
    fn lex_string_content(&mut self, kind: StrKind, start: u32, pos: Pos) -> Token<'src> {
        let c = self.peek().unwrap();
        match c {
            '"' => match kind {
                StrKind::Double => {
                    self.advance();
                    self.stack.pop();
                    self.token(TokenKind::DoubleQuote, start, pos)
                }
                StrKind::Triple if self.starts_with("\"\"\"") => {
                    self.advance();
                    self.advance();
                    self.advance();
                    self.stack.pop();
                    self.token(TokenKind::TripleQuote, start, pos)
                }
                StrKind::Triple => {
                    // A stray quote inside a triple string must be escaped.
                    self.advance();
                    self.token(TokenKind::Illegal, start, pos)
                }
            },
            '\\' => self.lex_escape(start, pos),
            '$' if self.peek_nth(1) == Some('{') => {
                self.advance();
                self.advance();
                self.stack.push(Frame::Embedded);
                self.token(TokenKind::EmbeddedValueStart, start, pos)
            }
            '$' => {
                self.advance();
                self.token(TokenKind::Illegal, start, pos)
            }
            _ if is_disallowed_in_string(c, kind) => {
                self.advance();
                self.token(TokenKind::Illegal, start, pos)
            }
            _ => {
                while let Some(c) = self.peek() {
                    if c == '"' || c == '\\' || c == '$' || is_disallowed_in_string(c, kind) {
                        break;
                    }
                    self.advance();
                }
                self.token(TokenKind::StringContent, start, pos)
            }
        }
    }

    /// Lex a `\…` escape sequence.
    ///
    /// The raw text is emitted as-is (decoding happens in the parser). At EOF
    /// the partial escape is still emitted so the parser can point at it.
    fn lex_escape(&mut self, start: u32, pos: Pos) -> Token<'src> {
        self.advance(); // consume `\`
        match self.advance() {
            Some('u') => self.consume_hex(4),
            Some('U') => self.consume_hex(8),
            _ => {}
        }
        self.token(TokenKind::EscapeSequence, start, pos)
    }

    /// Consume up to `n` ASCII hex digits.
    fn consume_hex(&mut self, n: usize) {
        for _ in 0..n {
            match self.peek() {
                Some(c) if c.is_ascii_hexdigit() => {
                    self.advance();
                }
                _ => break,
            }
        }
    }
}

impl<'src> Iterator for Lexer<'src> {
    type Item = Token<'src>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = self.next_token();
        if token.kind == TokenKind::Eof {
            None
        } else {
            Some(token)
        }
    }
}

/// Check if a character can appear in a bare identifier.
///
/// `+` and `-` are included so signed numbers and exponents lex as a single
/// identifier; the parser classifies identifiers by shape.
fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-')
}

/// Check if a character can appear in a variable name (after `$`).
fn is_variable_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-')
}

/// Control characters are disallowed as raw string content; triple strings
/// additionally permit raw newlines and tabs.
fn is_disallowed_in_string(c: char, kind: StrKind) -> bool {
    if kind == StrKind::Triple && (c == '\n' || c == '\t') {
        return false;
    }
    matches!(c, '\u{0000}'..='\u{001F}' | '\u{007F}'..='\u{009F}')
}
