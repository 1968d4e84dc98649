//! Key paths: the addressing model for positions in the result tree.
//!
//! A key path is a non-empty sequence of parts such as `server.hosts[0].name`.
//! Variable parts (`$x`) may only appear in the first position; the `$` is
//! kept as part of the stored name, matching the lexer's token text.

/// One segment of a key path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyPart {
    /// A bare identifier segment: `server`.
    Ident(String),
    /// A quoted segment: `"weird key"`.
    Quoted(String),
    /// A variable segment: `$port` (first position only, `$` included).
    Variable(String),
    /// An array index segment: `[3]`.
    Index(usize),
}

impl KeyPart {
    /// The textual name of a named segment (`None` for indexes).
    pub fn name(&self) -> Option<&str> {
        match self {
            KeyPart::Ident(s) | KeyPart::Quoted(s) | KeyPart::Variable(s) => Some(s),
            KeyPart::Index(_) => None,
        }
    }
}

/// An ordered, non-empty sequence of key parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    parts: Vec<KeyPart>,
}

impl KeyPath {
    /// Create a key path from parts.
    ///
    /// Invariant: `parts` is non-empty and variable segments only appear at
    /// index 0. The parser upholds this; programmatic construction should too.
    pub fn new(parts: Vec<KeyPart>) -> Self {
        debug_assert!(!parts.is_empty());
        debug_assert!(
            !parts[1..]
                .iter()
                .any(|p| matches!(p, KeyPart::Variable(_)))
        );
        Self { parts }
    }

    /// A single-segment path from a bare identifier.
    pub fn ident(name: impl Into<String>) -> Self {
        Self::new(vec![KeyPart::Ident(name.into())])
    }

    /// A single-segment path from a variable name (`$` included).
    pub fn variable(name: impl Into<String>) -> Self {
        Self::new(vec![KeyPart::Variable(name.into())])
    }

    /// The segments of this path.
    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }

    /// The first segment.
    pub fn head(&self) -> &KeyPart {
        &self.parts[0]
    }

    /// The last segment.
    pub fn last(&self) -> &KeyPart {
        self.parts.last().expect("key paths are non-empty")
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Always false; key paths are non-empty.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Whether this path starts with a variable segment.
    pub fn is_variable(&self) -> bool {
        matches!(self.head(), KeyPart::Variable(_))
    }

    /// The name of the sole segment, if this is a single named segment.
    pub fn single_name(&self) -> Option<&str> {
        if self.parts.len() == 1 {
            self.head().name()
        } else {
            None
        }
    }
}

impl std::fmt::Display for KeyPath {
    /// Serialize: named parts joined by `.`, index parts as `[N]` glued to
    /// the preceding part.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            match part {
                KeyPart::Ident(s) | KeyPart::Quoted(s) | KeyPart::Variable(s) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{s}")?;
                }
                KeyPart::Index(n) => write!(f, "[{n}]")?,
            }
        }
        Ok(())
    }
}
