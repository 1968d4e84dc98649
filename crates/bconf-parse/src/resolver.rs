//! The resolver runtime.
//!
//! Tags and statements are resolved by user (or built-in) callbacks. A
//! resolver receives a [`ResolverContext`] that borrows the parser mutably:
//! it can pull further values from the token stream, read the
//! partially-materialised result tree, read and write variables, load files,
//! and spawn nested parses. The parser waits for the resolver before
//! advancing, so source order is preserved exactly.

use std::collections::HashMap;
use std::rc::Rc;

use bconf_lexer::TokenKind;

use crate::parser::{Document, Parser};
use crate::{KeyPath, ParseError, Value, ValueArgs, VarScope};

/// A tag resolver: consumes arguments through the context and produces the
/// value that replaces the tag invocation.
pub type TagResolver = Rc<dyn Fn(&mut ResolverContext<'_, '_>) -> Result<Value, ParseError>>;

/// A statement resolver: consumes arguments through the context and decides
/// what happens to the statement.
pub type StatementResolver =
    Rc<dyn Fn(&mut ResolverContext<'_, '_>) -> Result<StatementAction, ParseError>>;

/// What the parser does with a statement after its resolver returns.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementAction {
    /// Drop the statement entirely.
    Discard,
    /// Deep-merge the given object under the current block.
    ///
    /// Missing keys are inserted, object/object pairs recurse, and keys the
    /// block already has win — which is what lets assignments before *and*
    /// after the statement take precedence over merged content.
    Merge(Value),
    /// Append a call group to the statement record at the key: the given
    /// value as a single-element group, or the remaining unconsumed values.
    Collect(Option<Value>),
}

/// Whether the statement or tag sits at the document root or inside an
/// object block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Top level of the document.
    Root,
    /// Inside an object block.
    Object,
}

/// Arguments to [`ResolverContext::set_var`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SetVarArgs {
    /// Which scope frame to bind in.
    pub scope: VarScope,
    /// Allow overwriting an existing binding in that frame.
    pub override_existing: bool,
    /// Also record the binding in the exported-variables map.
    pub export: bool,
    /// Record in the exported-variables map only, leaving scopes untouched.
    pub export_only: bool,
}

/// Arguments to [`ResolverContext::parse`].
#[derive(Debug, Clone, Default)]
pub struct NestedParseArgs {
    /// Informational source path for the nested document.
    pub file: Option<String>,
    /// Unwrap the nested result. Defaults to false so exported variables and
    /// merged data keep their internal structure.
    pub unwrap: bool,
}

/// The resolver-facing interface onto the parser.
pub struct ResolverContext<'p, 'src> {
    parser: &'p mut Parser<'src>,
    stop: Option<TokenKind>,
    next_args: ValueArgs,
    block: BlockKind,
}

impl<'p, 'src> ResolverContext<'p, 'src> {
    pub(crate) fn new(
        parser: &'p mut Parser<'src>,
        stop: Option<TokenKind>,
        next_args: ValueArgs,
    ) -> Self {
        let block = parser.block_kind();
        Self {
            parser,
            stop,
            next_args,
            block,
        }
    }

    /// The environment map.
    pub fn env(&self) -> &HashMap<String, String> {
        &self.parser.config().env
    }

    /// Whether the parse position is at the document root or inside an
    /// object block.
    pub fn block(&self) -> BlockKind {
        self.block
    }

    /// The URL/path of the document being parsed, if known.
    pub fn file(&self) -> Option<&str> {
        self.parser.file()
    }

    /// The value-parsing options `next` uses by default.
    pub fn next_args(&self) -> ValueArgs {
        self.next_args
    }

    /// Pull the next argument value.
    ///
    /// Returns `Ok(None)` at a newline, EOF, the stop token (`)` for tags,
    /// `}` inside an object block), or a comma.
    pub fn next(&mut self) -> Result<Option<Value>, ParseError> {
        self.parser.next_resolver_value(self.stop, self.next_args)
    }

    /// Pull the next argument value with overridden parse options.
    pub fn next_with(&mut self, args: ValueArgs) -> Result<Option<Value>, ParseError> {
        self.parser.next_resolver_value(self.stop, args)
    }

    /// Read a value out of the already-materialised result tree.
    ///
    /// This reads the document root, not the scope chain; values assigned
    /// earlier in source order are visible, later ones are not.
    pub fn lookup(&self, path: &KeyPath) -> Option<Value> {
        self.parser.lookup_root(path)
    }

    /// Read a variable through the scope chain.
    pub fn get_var(&self, name: &str) -> Option<Value> {
        self.parser.scopes().get(name).cloned()
    }

    /// Declare or override a variable.
    ///
    /// The name must be `$`-prefixed and contain no `.`, `[`, or `]`.
    /// Returns false when the name is invalid or already bound in the
    /// targeted frame without `override_existing`.
    pub fn set_var(&mut self, name: &str, value: Value, args: SetVarArgs) -> bool {
        if !is_valid_var_name(name) {
            return false;
        }
        if args.export_only {
            self.parser.exports_mut().insert(name.to_string(), value);
            return true;
        }
        let declared =
            self.parser
                .scopes_mut()
                .declare(name, value.clone(), args.scope, args.override_existing);
        if !declared {
            return false;
        }
        if args.export {
            self.parser.exports_mut().insert(name.to_string(), value);
        }
        true
    }

    /// Load a file through the configured loader, relative to the parse's
    /// root directory.
    pub fn load_file(&mut self, path: &str) -> Result<String, ParseError> {
        let config = self.parser.config();
        let Some(loader) = config.loader.clone() else {
            return Err(ParseError::message("no file loader configured"));
        };
        let root_dir = config.root_dir.clone();
        loader(&root_dir, path)
            .map_err(|err| ParseError::message(format!("could not load file '{path}': {err}")))
    }

    /// Parse another document with this parse's configuration.
    ///
    /// The nested parse shares resolvers, loader, environment, and root
    /// directory, but starts from fresh state: a fresh root scope, an empty
    /// result tree, and an independent export map.
    pub fn parse(&self, input: &str, args: NestedParseArgs) -> Result<Document, ParseError> {
        let mut parser = Parser::new(input, Rc::clone(self.parser.config_rc()));
        if args.file.is_some() {
            parser.set_file(args.file);
        }
        parser.parse_document(args.unwrap)
    }
}

/// Variable names are `$`-prefixed and must not look like paths.
fn is_valid_var_name(name: &str) -> bool {
    name.len() > 1
        && name.starts_with('$')
        && !name.contains(['.', '[', ']'])
}
