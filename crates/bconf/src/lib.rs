//! bconf — a human-authored configuration language.
//!
//! bconf documents are hierarchical key-value files with typed scalars,
//! scoped variables, string interpolation, base-document composition via
//! `extends`, cross-file variable `import`/`export`, and an extensible
//! tag/statement system:
//!
//! ```text
//! extends "base"
//!
//! $port = 8080
//! server {
//!     host = "0.0.0.0"
//!     port = $port
//!     banner = "listening on ${$port}"
//! }
//! allow from localhost
//! allow from "10.0.0.0/8"
//! upstreams[0] = ref(server.host)
//! ```
//!
//! Parse with [`parse`] (process defaults) or [`parse_with`] (custom
//! resolvers, seed variables, environment, loader):
//!
//! ```
//! let doc = bconf::parse("greeting = \"hello\"").unwrap();
//! assert_eq!(
//!     doc.data.as_object().unwrap().get("greeting").unwrap().as_str(),
//!     Some("hello")
//! );
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

use indexmap::IndexMap;

mod diagnostic;
mod loader;

pub use bconf_parse::{
    BlockKind, Collection, Document, DuplicateKeys, IdentifierMode, KeyPart, KeyPath, Loader,
    NestedParseArgs, Object, ParseError, ResolverContext, SetVarArgs, StatementAction,
    StatementResolver, StatementValue, TagResolver, TagValue, Value, ValueArgs, VarScope,
};
pub use diagnostic::{render, write_report};
pub use loader::fs_loader;

use bconf_parse::{ParseConfig, Parser, builtin_statements, builtin_tags};

/// Options for [`parse_with`].
pub struct Options {
    /// Tag resolvers merged over the built-in table; user entries win on
    /// name conflicts.
    pub tags: Vec<(String, TagResolver)>,
    /// Statement resolvers merged over the built-in table.
    pub statements: Vec<(String, StatementResolver)>,
    /// Variables pre-defined beneath the root scope. Names must be
    /// `$`-prefixed to be reachable from documents.
    pub variables: IndexMap<String, Value>,
    /// Environment map; defaults to the process environment.
    pub env: Option<HashMap<String, String>>,
    /// Base directory for the file loader; defaults to the working
    /// directory.
    pub root_dir: Option<PathBuf>,
    /// Informational source URL/path, passed through to resolvers.
    pub file: Option<String>,
    /// The file loader; defaults to [`fs_loader`].
    pub loader: Option<Loader>,
    /// Duplicate-key policy; `Override` by default.
    pub duplicate_keys: DuplicateKeys,
    /// Unwrap internal values in the result; defaults to true.
    pub unwrap: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            statements: Vec::new(),
            variables: IndexMap::new(),
            env: None,
            root_dir: None,
            file: None,
            loader: None,
            duplicate_keys: DuplicateKeys::Override,
            unwrap: true,
        }
    }
}

/// Parse a bconf document with default options.
pub fn parse(input: &str) -> Result<Document, ParseError> {
    parse_with(input, Options::default())
}

/// Parse a bconf document.
///
/// Returns the unwrapped root object as `data` and the exported-variables
/// map as `variables` (unless `unwrap` is disabled, in which case internal
/// values remain).
pub fn parse_with(input: &str, options: Options) -> Result<Document, ParseError> {
    let mut tags = builtin_tags();
    for (name, resolver) in options.tags {
        tags.insert(name, resolver);
    }
    let mut statements = builtin_statements();
    for (name, resolver) in options.statements {
        statements.insert(name, resolver);
    }

    let config = ParseConfig {
        tags,
        statements,
        env: options.env.unwrap_or_else(|| std::env::vars().collect()),
        root_dir: options.root_dir.unwrap_or_else(default_root_dir),
        file: options.file,
        loader: Some(options.loader.unwrap_or_else(fs_loader)),
        duplicate_keys: options.duplicate_keys,
        seeds: options.variables,
    };
    Parser::new(input, Rc::new(config)).parse_document(options.unwrap)
}

fn default_root_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"))
}
