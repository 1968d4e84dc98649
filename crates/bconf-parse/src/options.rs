//! Parse-time options and the shared configuration for a parse.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::resolver::{StatementResolver, TagResolver};
use crate::Value;

/// How bare identifiers read in value position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentifierMode {
    /// Identifiers are not values; error. The default in assignment position.
    #[default]
    Disallow,
    /// An identifier heads a key path (tag argument position).
    KeyPath,
    /// An identifier is its own literal text, with no dotted or indexed
    /// continuation (statement argument position).
    Literal,
}

/// Options applied to a single value parse; the `next_args` of a resolver
/// context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValueArgs {
    /// How bare identifiers read.
    pub identifiers: IdentifierMode,
    /// When set, variables come back as key paths instead of resolving
    /// through the scope chain.
    pub var_as_keypath: bool,
}

impl ValueArgs {
    /// Assignment position: identifiers are not values.
    pub fn disallow() -> Self {
        Self {
            identifiers: IdentifierMode::Disallow,
            var_as_keypath: false,
        }
    }

    /// Tag argument position: identifiers head key paths.
    pub fn keypath() -> Self {
        Self {
            identifiers: IdentifierMode::KeyPath,
            var_as_keypath: false,
        }
    }

    /// Statement argument position: identifiers are literal strings.
    pub fn literal() -> Self {
        Self {
            identifiers: IdentifierMode::Literal,
            var_as_keypath: false,
        }
    }

    /// Return variables as key paths instead of resolving them.
    pub fn with_var_as_keypath(mut self, yes: bool) -> Self {
        self.var_as_keypath = yes;
        self
    }
}

/// Policy for duplicate non-index keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateKeys {
    /// Later assignment wins.
    #[default]
    Override,
    /// Wrap the existing value in a collection and add the new one.
    Collect,
    /// Error on the second assignment.
    Disallow,
}

/// The file loader: resolves a request path against the root directory and
/// returns the file's text.
pub type Loader = Rc<dyn Fn(&Path, &str) -> io::Result<String>>;

/// Configuration shared by a parse and every nested parse it spawns.
///
/// Nested parses (through [`ResolverContext::parse`]) share this by
/// reference-count but get fresh parser state: a fresh root scope, an empty
/// result tree, and an independent export map.
///
/// [`ResolverContext::parse`]: crate::ResolverContext::parse
pub struct ParseConfig {
    /// Tag resolvers by name.
    pub tags: HashMap<String, TagResolver>,
    /// Statement resolvers by the first named part of the statement key.
    pub statements: HashMap<String, StatementResolver>,
    /// The environment map served to resolvers and the `env` tag.
    pub env: HashMap<String, String>,
    /// Base directory handed to the loader.
    pub root_dir: PathBuf,
    /// Informational source URL/path of the top-level document.
    pub file: Option<String>,
    /// The file loader; `None` makes `load_file` an error.
    pub loader: Option<Loader>,
    /// Duplicate-key policy.
    pub duplicate_keys: DuplicateKeys,
    /// Variables pre-declared beneath the root scope.
    pub seeds: IndexMap<String, Value>,
}

impl Default for ParseConfig {
    fn default() -> Self {
        Self {
            tags: HashMap::new(),
            statements: HashMap::new(),
            env: HashMap::new(),
            root_dir: PathBuf::from("/"),
            file: None,
            loader: None,
            duplicate_keys: DuplicateKeys::Override,
            seeds: IndexMap::new(),
        }
    }
}
