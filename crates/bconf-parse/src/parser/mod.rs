//! Recursive-descent parser for bconf documents.
//!
//! The parser owns the result tree as it builds it: object and array values
//! in assignment position are attached to the tree before their bodies
//! parse, and the current block is addressed through a path of steps from
//! the root. That makes partially-built containers visible to `ref` and to
//! resolver lookups in exact source order. Values in tag and statement
//! argument position build on a detached scratch stack with the same
//! machinery.

use std::rc::Rc;

use bconf_lexer::{Lexer, Pos, Token, TokenKind};
use indexmap::IndexMap;

#[allow(unused_imports)]
use crate::trace;
use crate::number;
use crate::resolver::{ResolverContext, StatementAction};
use crate::unwrap::unwrap_value;
use crate::{
    Collection, DuplicateKeys, IdentifierMode, KeyPart, KeyPath, Object, ParseConfig, ParseError,
    ScopeStack, StatementValue, TagValue, Value, ValueArgs, VarScope,
};

use crate::resolver::BlockKind;

/// The outcome of a parse: the result tree and the exported variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// The root object.
    pub data: Value,
    /// The exported-variables map (`export vars { … }`).
    pub variables: IndexMap<String, Value>,
}

/// One step of the current-block path.
#[derive(Debug, Clone)]
enum Step {
    /// Object entry by key.
    Key(String),
    /// Array element by index.
    Index(usize),
    /// The newest element of a collection (`collect` duplicate policy).
    Last,
}

/// A detached container under construction (tag/statement argument
/// position). `fence` marks where its steps start in the shared step list.
struct Scratch {
    value: Value,
    fence: usize,
}

/// Recursive-descent parser over a pre-lexed token buffer.
pub struct Parser<'src> {
    /// Tokens with whitespace and comments filtered out; ends with EOF.
    tokens: Vec<Token<'src>>,
    /// Cursor into `tokens`.
    pos: usize,

    config: Rc<ParseConfig>,
    file: Option<String>,

    /// The document root (always an object).
    root: Value,
    /// Path from the current base container to the current block.
    steps: Vec<Step>,
    /// Stack of detached containers; the innermost is the current base.
    detached: Vec<Scratch>,

    scopes: ScopeStack,
    exports: IndexMap<String, Value>,

    /// Whether variables currently parse as key paths instead of resolving.
    /// Threaded through nested parses so resolver-provided overrides reach
    /// statement arguments inside block values.
    var_as_keypath: bool,
}

impl<'src> Parser<'src> {
    /// Create a parser over the given source text.
    pub fn new(input: &'src str, config: Rc<ParseConfig>) -> Self {
        let mut tokens = Vec::new();
        let mut lexer = Lexer::new(input);
        loop {
            let token = lexer.next_token();
            let eof = token.kind == TokenKind::Eof;
            if !token.kind.is_trivia() {
                tokens.push(token);
            }
            if eof {
                break;
            }
        }

        let file = config.file.clone();
        let scopes = ScopeStack::new(config.seeds.clone());
        Self {
            tokens,
            pos: 0,
            config,
            file,
            root: Value::Object(Object::new()),
            steps: Vec::new(),
            detached: Vec::new(),
            scopes,
            exports: IndexMap::new(),
            var_as_keypath: false,
        }
    }

    /// Override the informational source path of this parse.
    pub fn set_file(&mut self, file: Option<String>) {
        self.file = file;
    }

    /// Parse the document and return the result tree plus exports.
    pub fn parse_document(mut self, unwrap: bool) -> Result<Document, ParseError> {
        self.parse_block(None)?;
        debug_assert!(self.steps.is_empty());
        debug_assert!(self.detached.is_empty());

        let data = if unwrap {
            unwrap_value(self.root)
        } else {
            self.root
        };
        let variables = self
            .exports
            .into_iter()
            .map(|(name, value)| {
                let value = if unwrap { unwrap_value(value) } else { value };
                (name, value)
            })
            .collect();
        Ok(Document { data, variables })
    }

    // ------------------------------------------------------------------
    // Token access
    // ------------------------------------------------------------------

    fn peek(&self) -> &Token<'src> {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> TokenKind {
        self.tokens[self.pos].kind
    }

    fn bump(&mut self) -> Token<'src> {
        let token = self.tokens[self.pos].clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn pos_here(&self) -> Pos {
        self.peek().pos
    }

    fn expect(&mut self, kind: TokenKind, message: &str) -> Result<Token<'src>, ParseError> {
        if self.peek_kind() == kind {
            Ok(self.bump())
        } else {
            Err(self.error_here(format!("{message}, found {}", describe(self.peek()))))
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.pos_here())
    }

    fn illegal_here(&self) -> ParseError {
        self.error_here(format!("illegal character {:?}", self.peek().text))
    }

    // ------------------------------------------------------------------
    // Blocks and entries
    // ------------------------------------------------------------------

    /// Parse entries until the stop token (`}` for object blocks) or EOF.
    ///
    /// The stop token is left for the caller to consume.
    fn parse_block(&mut self, stop: Option<TokenKind>) -> Result<(), ParseError> {
        loop {
            while self.peek_kind() == TokenKind::Newline {
                self.bump();
            }
            let kind = self.peek_kind();
            if kind == TokenKind::Eof {
                if stop.is_some() {
                    return Err(self.error_here("unexpected end of input, expected '}'"));
                }
                return Ok(());
            }
            if Some(kind) == stop {
                return Ok(());
            }
            if kind == TokenKind::Comma {
                return Err(self.error_here("unexpected ','"));
            }
            if kind == TokenKind::Illegal {
                return Err(self.illegal_here());
            }

            self.parse_entry(stop)?;

            match self.peek_kind() {
                TokenKind::Newline | TokenKind::Eof => {}
                k if Some(k) == stop => {}
                TokenKind::Comma if stop.is_some() => {
                    self.bump();
                }
                TokenKind::Comma => {
                    return Err(self.error_here("unexpected ',' at the root"));
                }
                _ => {
                    let expected = if stop.is_some() {
                        "expected newline, ',' or '}'"
                    } else {
                        "expected a newline"
                    };
                    return Err(self.error_here(format!(
                        "{expected} after entry, found {}",
                        describe(self.peek())
                    )));
                }
            }
        }
    }

    /// Parse one entry: a key path followed by an operator.
    fn parse_entry(&mut self, stop: Option<TokenKind>) -> Result<(), ParseError> {
        let key_pos = self.pos_here();
        let key = self.parse_key_path()?;
        trace!("entry {} at {}", key, key_pos);

        match self.peek_kind() {
            TokenKind::Assign => {
                self.bump();
                self.parse_assignment(&key, key_pos)
            }
            TokenKind::LBrace => self.parse_assignment(&key, key_pos),
            TokenKind::Append => {
                self.bump();
                let args = ValueArgs::disallow().with_var_as_keypath(self.var_as_keypath);
                let value = self.parse_value(args)?;
                self.append_to(&key, value, key_pos)
            }
            TokenKind::Newline | TokenKind::Eof | TokenKind::Comma => {
                self.assign_value(&key, Value::Bool(true), key_pos)
            }
            k if Some(k) == stop => self.assign_value(&key, Value::Bool(true), key_pos),
            k if is_statement_start(k) => self.parse_statement(key, key_pos, stop),
            TokenKind::Illegal => Err(self.illegal_here()),
            _ => Err(self.error_here(format!(
                "unexpected token {} after key '{key}'",
                describe(self.peek())
            ))),
        }
    }

    /// Parse the value side of `key = …` or the `key { … }` shorthand.
    fn parse_assignment(&mut self, key: &KeyPath, key_pos: Pos) -> Result<(), ParseError> {
        match self.peek_kind() {
            TokenKind::LBrace if !key.is_variable() => self.parse_attached_object(key, key_pos),
            TokenKind::LBracket if !key.is_variable() => self.parse_attached_array(key, key_pos),
            _ => {
                let args = ValueArgs::disallow().with_var_as_keypath(self.var_as_keypath);
                let value = self.parse_value(args)?;
                if key.is_variable() {
                    self.bind_variable(key, value, key_pos)
                } else {
                    self.assign_value(key, value, key_pos)
                }
            }
        }
    }

    /// Bind `$name = value` in the current scope.
    fn bind_variable(&mut self, key: &KeyPath, value: Value, pos: Pos) -> Result<(), ParseError> {
        let Some(name) = key.single_name() else {
            return Err(ParseError::new(
                format!("cannot assign to variable path '{key}'"),
                pos,
            ));
        };
        if !self
            .scopes
            .declare(name, value, VarScope::Current, false)
        {
            return Err(ParseError::new(
                format!("variable '{name}' has already been declared"),
                pos,
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(
        &mut self,
        key: KeyPath,
        key_pos: Pos,
        stop: Option<TokenKind>,
    ) -> Result<(), ParseError> {
        if matches!(key.last(), KeyPart::Index(_)) {
            return Err(ParseError::new(
                format!("a statement key cannot end in an index: '{key}'"),
                key_pos,
            ));
        }
        let head = match key.head() {
            KeyPart::Ident(name) | KeyPart::Variable(name) => name.clone(),
            KeyPart::Quoted(_) => {
                return Err(ParseError::new(
                    format!("invalid statement key '{key}'"),
                    key_pos,
                ));
            }
            KeyPart::Index(_) => unreachable!("key paths start with a named part"),
        };

        let action = match self.config.statements.get(&head).cloned() {
            Some(resolver) => {
                let args = ValueArgs::literal().with_var_as_keypath(self.var_as_keypath);
                let action = {
                    let mut ctx = ResolverContext::new(self, stop, args);
                    resolver(&mut ctx)
                };
                action.map_err(|e| e.at(self.pos_here()))?
            }
            None => StatementAction::Collect(None),
        };

        match action {
            StatementAction::Discard => {
                self.drain_statement_values(stop, false)?;
                Ok(())
            }
            StatementAction::Merge(value) => {
                self.drain_statement_values(stop, false)?;
                let Value::Object(incoming) = value else {
                    return Err(ParseError::new(
                        format!("merge value must be an object, got {}", value.type_name()),
                        key_pos,
                    ));
                };
                let container = self
                    .current_container_mut()
                    .as_object_mut()
                    .expect("block containers are objects");
                deep_merge_under(container, incoming);
                Ok(())
            }
            StatementAction::Collect(Some(value)) => {
                self.drain_statement_values(stop, false)?;
                self.collect_statement(&key, vec![value])
            }
            StatementAction::Collect(None) => {
                let group = self.drain_statement_values(stop, true)?;
                self.collect_statement(&key, group)
            }
        }
    }

    /// Parse remaining statement values up to the newline/EOF/stop/comma,
    /// optionally keeping them.
    fn drain_statement_values(
        &mut self,
        stop: Option<TokenKind>,
        keep: bool,
    ) -> Result<Vec<Value>, ParseError> {
        let args = ValueArgs::literal().with_var_as_keypath(self.var_as_keypath);
        let mut group = Vec::new();
        while let Some(value) = self.next_resolver_value(stop, args)? {
            if keep {
                group.push(value);
            }
        }
        Ok(group)
    }

    /// Append a call group to the statement record at `key`, creating the
    /// record on first collection.
    fn collect_statement(&mut self, key: &KeyPath, group: Vec<Value>) -> Result<(), ParseError> {
        let container = self.current_container_mut();
        match materialize_slot(container, key.parts()) {
            Slot::Entry { object, name } => match object.get_mut(&name) {
                Some(Value::Statement(statement)) => statement.args.push(group),
                _ => {
                    object.insert(
                        name,
                        Value::Statement(Box::new(StatementValue {
                            name: key.clone(),
                            args: vec![group],
                        })),
                    );
                }
            },
            Slot::Element { .. } => unreachable!("statement keys do not end in an index"),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Storage: key-path materialization
    // ------------------------------------------------------------------

    /// The container the current block writes into.
    fn current_container_mut(&mut self) -> &mut Value {
        let (base, fence) = match self.detached.last_mut() {
            Some(scratch) => (&mut scratch.value, scratch.fence),
            None => (&mut self.root, 0),
        };
        walk_steps(base, &self.steps[fence..])
    }

    /// Store `value` at `key` in the current block, honoring the
    /// duplicate-key policy for named terminal slots.
    fn assign_value(&mut self, key: &KeyPath, value: Value, pos: Pos) -> Result<(), ParseError> {
        let policy = self.config.duplicate_keys;
        let container = self.current_container_mut();
        match materialize_slot(container, key.parts()) {
            Slot::Entry { object, name } => match object.get_mut(&name) {
                None => {
                    object.insert(name, value);
                }
                Some(Value::Collection(collection)) if policy == DuplicateKeys::Collect => {
                    collection.push(value);
                }
                Some(existing) => match policy {
                    DuplicateKeys::Override => *existing = value,
                    DuplicateKeys::Collect => {
                        let old = std::mem::replace(existing, Value::Null);
                        *existing = Value::Collection(Collection::pair(old, value));
                    }
                    DuplicateKeys::Disallow => {
                        return Err(ParseError::new(format!("duplicate key '{key}'"), pos));
                    }
                },
            },
            // Index assignments always overwrite.
            Slot::Element { array, index } => array[index] = value,
        }
        Ok(())
    }

    /// Append `value` to the array at `key`, creating one when the slot is
    /// absent or holds a non-array.
    fn append_to(&mut self, key: &KeyPath, value: Value, pos: Pos) -> Result<(), ParseError> {
        if key.is_variable() {
            let Some(name) = key.single_name() else {
                return Err(ParseError::new(
                    format!("cannot append to variable path '{key}'"),
                    pos,
                ));
            };
            match self.scopes.get_mut(name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => *existing = Value::Array(vec![value]),
                None => {
                    self.scopes
                        .declare(name, Value::Array(vec![value]), VarScope::Current, false);
                }
            }
            return Ok(());
        }

        let container = self.current_container_mut();
        match materialize_slot(container, key.parts()) {
            Slot::Entry { object, name } => match object.get_mut(&name) {
                Some(Value::Array(items)) => items.push(value),
                Some(existing) => *existing = Value::Array(vec![value]),
                None => {
                    object.insert(name, Value::Array(vec![value]));
                }
            },
            Slot::Element { array, index } => match &mut array[index] {
                Value::Array(items) => items.push(value),
                slot => *slot = Value::Array(vec![value]),
            },
        }
        Ok(())
    }

    /// Write a fresh container at `key` and extend the block path to it.
    /// Returns the number of steps pushed.
    fn enter_container(
        &mut self,
        key: &KeyPath,
        fresh: Value,
        pos: Pos,
    ) -> Result<usize, ParseError> {
        let policy = self.config.duplicate_keys;
        let mut into_collection = false;
        {
            let container = self.current_container_mut();
            match materialize_slot(container, key.parts()) {
                Slot::Entry { object, name } => match object.get_mut(&name) {
                    None => {
                        object.insert(name, fresh);
                    }
                    Some(Value::Collection(collection)) if policy == DuplicateKeys::Collect => {
                        collection.push(fresh);
                        into_collection = true;
                    }
                    Some(existing) => match policy {
                        DuplicateKeys::Override => *existing = fresh,
                        DuplicateKeys::Collect => {
                            let old = std::mem::replace(existing, Value::Null);
                            *existing = Value::Collection(Collection::pair(old, fresh));
                            into_collection = true;
                        }
                        DuplicateKeys::Disallow => {
                            return Err(ParseError::new(format!("duplicate key '{key}'"), pos));
                        }
                    },
                },
                Slot::Element { array, index } => array[index] = fresh,
            }
        }

        for part in key.parts() {
            self.steps.push(match part {
                KeyPart::Ident(name) | KeyPart::Quoted(name) | KeyPart::Variable(name) => {
                    Step::Key(name.clone())
                }
                KeyPart::Index(index) => Step::Index(*index),
            });
        }
        let mut pushed = key.parts().len();
        if into_collection {
            self.steps.push(Step::Last);
            pushed += 1;
        }
        Ok(pushed)
    }

    /// Parse `key { … }` / `key = { … }` into a tree-attached object.
    fn parse_attached_object(&mut self, key: &KeyPath, pos: Pos) -> Result<(), ParseError> {
        self.bump(); // `{`
        let pushed = self.enter_container(key, Value::Object(Object::new()), pos)?;
        self.scopes.push();
        let body = self.parse_block(Some(TokenKind::RBrace));
        self.scopes.pop();
        self.steps.truncate(self.steps.len() - pushed);
        body?;
        self.expect(TokenKind::RBrace, "expected '}'")?;
        Ok(())
    }

    /// Parse `key = [ … ]` into a tree-attached array.
    fn parse_attached_array(&mut self, key: &KeyPath, pos: Pos) -> Result<(), ParseError> {
        self.bump(); // `[`
        let pushed = self.enter_container(key, Value::Array(Vec::new()), pos)?;
        let body = self.parse_array_items();
        self.steps.truncate(self.steps.len() - pushed);
        body
    }

    /// Parse array elements into the current container, consuming the
    /// closing `]`. Elements separate on commas and/or newlines; a trailing
    /// comma is permitted.
    fn parse_array_items(&mut self) -> Result<(), ParseError> {
        loop {
            while self.peek_kind() == TokenKind::Newline {
                self.bump();
            }
            match self.peek_kind() {
                TokenKind::RBracket => {
                    self.bump();
                    return Ok(());
                }
                TokenKind::Eof => {
                    return Err(self.error_here("unexpected end of input, expected ']'"));
                }
                TokenKind::Comma => return Err(self.error_here("unexpected ','")),
                TokenKind::Illegal => return Err(self.illegal_here()),
                TokenKind::LBrace => {
                    self.bump();
                    let index = {
                        let items = self
                            .current_container_mut()
                            .as_array_mut()
                            .expect("array body addresses an array");
                        items.push(Value::Object(Object::new()));
                        items.len() - 1
                    };
                    self.steps.push(Step::Index(index));
                    self.scopes.push();
                    let body = self.parse_block(Some(TokenKind::RBrace));
                    self.scopes.pop();
                    self.steps.pop();
                    body?;
                    self.expect(TokenKind::RBrace, "expected '}'")?;
                }
                TokenKind::LBracket => {
                    self.bump();
                    let index = {
                        let items = self
                            .current_container_mut()
                            .as_array_mut()
                            .expect("array body addresses an array");
                        items.push(Value::Array(Vec::new()));
                        items.len() - 1
                    };
                    self.steps.push(Step::Index(index));
                    let body = self.parse_array_items();
                    self.steps.pop();
                    body?;
                }
                _ => {
                    let args = ValueArgs::disallow().with_var_as_keypath(self.var_as_keypath);
                    let value = self.parse_value(args)?;
                    self.current_container_mut()
                        .as_array_mut()
                        .expect("array body addresses an array")
                        .push(value);
                }
            }

            let mut separated = false;
            while self.peek_kind() == TokenKind::Newline {
                self.bump();
                separated = true;
            }
            if self.peek_kind() == TokenKind::Comma {
                self.bump();
                separated = true;
            }
            if !separated && self.peek_kind() != TokenKind::RBracket {
                return Err(self.error_here(format!(
                    "expected ',' or ']' after array element, found {}",
                    describe(self.peek())
                )));
            }
        }
    }

    // ------------------------------------------------------------------
    // Key paths
    // ------------------------------------------------------------------

    /// `keyPart (DOT keyPart | '[' integer ']')*`; variables first-only.
    fn parse_key_path(&mut self) -> Result<KeyPath, ParseError> {
        let mut parts = Vec::new();

        let first = self.peek().clone();
        match first.kind {
            TokenKind::Identifier => {
                self.bump();
                parts.push(KeyPart::Ident(self.validate_key_ident(&first)?));
            }
            TokenKind::DoubleQuote | TokenKind::TripleQuote => {
                parts.push(KeyPart::Quoted(self.parse_string()?));
            }
            TokenKind::Variable => {
                self.bump();
                parts.push(KeyPart::Variable(first.text.to_string()));
            }
            _ => {
                return Err(self.error_here(format!(
                    "expected key, found {}",
                    describe(&first)
                )));
            }
        }

        loop {
            match self.peek_kind() {
                TokenKind::Dot => {
                    self.bump();
                    let token = self.peek().clone();
                    match token.kind {
                        TokenKind::Identifier => {
                            self.bump();
                            parts.push(KeyPart::Ident(self.validate_key_ident(&token)?));
                        }
                        TokenKind::DoubleQuote | TokenKind::TripleQuote => {
                            parts.push(KeyPart::Quoted(self.parse_string()?));
                        }
                        TokenKind::Variable => {
                            return Err(ParseError::new(
                                "variable segments are only allowed at the start of a key path",
                                token.pos,
                            ));
                        }
                        _ => {
                            return Err(self.error_here(format!(
                                "expected key segment after '.', found {}",
                                describe(&token)
                            )));
                        }
                    }
                }
                TokenKind::IndexLBracket => {
                    self.bump();
                    let token = self.expect(TokenKind::Identifier, "expected array index")?;
                    parts.push(KeyPart::Index(parse_index(&token)?));
                    self.expect(TokenKind::RBracket, "expected ']' after array index")?;
                }
                _ => break,
            }
        }

        Ok(KeyPath::new(parts))
    }

    fn validate_key_ident(&self, token: &Token<'src>) -> Result<String, ParseError> {
        if is_valid_key_ident(token.text) {
            Ok(token.text.to_string())
        } else {
            Err(ParseError::new(
                format!("invalid key '{}'", token.text),
                token.pos,
            ))
        }
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    /// Pull one resolver-facing value, or `None` at a newline, EOF, the stop
    /// token, or a comma.
    pub(crate) fn next_resolver_value(
        &mut self,
        stop: Option<TokenKind>,
        args: ValueArgs,
    ) -> Result<Option<Value>, ParseError> {
        let kind = self.peek_kind();
        if matches!(kind, TokenKind::Newline | TokenKind::Eof | TokenKind::Comma) {
            return Ok(None);
        }
        if Some(kind) == stop {
            return Ok(None);
        }
        self.parse_value(args).map(Some)
    }

    fn parse_value(&mut self, args: ValueArgs) -> Result<Value, ParseError> {
        let saved = self.var_as_keypath;
        self.var_as_keypath = args.var_as_keypath;
        let result = self.parse_value_inner(args);
        self.var_as_keypath = saved;
        result
    }

    fn parse_value_inner(&mut self, args: ValueArgs) -> Result<Value, ParseError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Null => {
                self.bump();
                Ok(Value::Null)
            }
            TokenKind::Boolean => {
                self.bump();
                Ok(Value::Bool(token.text == "true"))
            }
            TokenKind::Identifier => {
                if self.peek_is_tag() {
                    return self.parse_tag();
                }
                if number::is_number_start(token.text) {
                    return self.parse_number_value();
                }
                match args.identifiers {
                    IdentifierMode::KeyPath => Ok(Value::Path(self.parse_key_path()?)),
                    IdentifierMode::Literal => {
                        self.bump();
                        match self.peek_kind() {
                            TokenKind::Dot | TokenKind::IndexLBracket => {
                                Err(self.error_here(format!(
                                    "unexpected '{}' after '{}'",
                                    self.peek().text,
                                    token.text
                                )))
                            }
                            _ => Ok(Value::String(token.text.to_string())),
                        }
                    }
                    IdentifierMode::Disallow => {
                        if is_valid_key_ident(token.text) {
                            Err(ParseError::new(
                                format!("unexpected identifier '{}'", token.text),
                                token.pos,
                            ))
                        } else {
                            Err(ParseError::new(
                                format!("invalid key '{}'", token.text),
                                token.pos,
                            ))
                        }
                    }
                }
            }
            TokenKind::LBrace => self.parse_detached_object(),
            TokenKind::LBracket => self.parse_detached_array(),
            TokenKind::DoubleQuote | TokenKind::TripleQuote => {
                Ok(Value::String(self.parse_string()?))
            }
            TokenKind::Variable => {
                let path = self.parse_key_path()?;
                if args.var_as_keypath {
                    Ok(Value::Path(path))
                } else {
                    self.resolve_variable(&path, token.pos)
                }
            }
            TokenKind::Illegal => Err(self.illegal_here()),
            TokenKind::Eof => Err(self.error_here("unexpected end of input, expected a value")),
            TokenKind::Newline => Err(self.error_here("unexpected end of line, expected a value")),
            _ => Err(self.error_here(format!(
                "unexpected token {}, expected a value",
                describe(&token)
            ))),
        }
    }

    /// `{ … }` in value position: an object detached from the result tree.
    fn parse_detached_object(&mut self) -> Result<Value, ParseError> {
        self.bump(); // `{`
        self.detached.push(Scratch {
            value: Value::Object(Object::new()),
            fence: self.steps.len(),
        });
        self.scopes.push();
        let body = self.parse_block(Some(TokenKind::RBrace));
        self.scopes.pop();
        let scratch = self.detached.pop().expect("detached stack is balanced");
        body?;
        self.expect(TokenKind::RBrace, "expected '}'")?;
        Ok(scratch.value)
    }

    /// `[ … ]` in value position: an array detached from the result tree.
    fn parse_detached_array(&mut self) -> Result<Value, ParseError> {
        self.bump(); // `[`
        self.detached.push(Scratch {
            value: Value::Array(Vec::new()),
            fence: self.steps.len(),
        });
        let body = self.parse_array_items();
        let scratch = self.detached.pop().expect("detached stack is balanced");
        body?;
        Ok(scratch.value)
    }

    /// Whether the upcoming tokens are `IDENTIFIER(` with no gap — a tag.
    fn peek_is_tag(&self) -> bool {
        let token = &self.tokens[self.pos];
        if token.kind != TokenKind::Identifier {
            return false;
        }
        let next = &self.tokens[self.pos + 1];
        next.kind == TokenKind::LParen && next.span.start == token.span.end
    }

    /// Parse a tag invocation: `name(<values>)`.
    fn parse_tag(&mut self) -> Result<Value, ParseError> {
        let name_token = self.bump();
        let name = name_token.text.to_string();
        self.bump(); // `(`
        trace!("tag {} at {}", name, name_token.pos);

        let args = ValueArgs::keypath().with_var_as_keypath(self.var_as_keypath);
        if let Some(resolver) = self.config.tags.get(&name).cloned() {
            let value = {
                let mut ctx = ResolverContext::new(self, Some(TokenKind::RParen), args);
                resolver(&mut ctx)
            };
            let value = value.map_err(|e| e.at(self.pos_here()))?;
            // Unconsumed argument values are discarded.
            while self.next_resolver_value(Some(TokenKind::RParen), args)?.is_some() {}
            self.expect(TokenKind::RParen, "expected ')' to close tag")?;
            Ok(value)
        } else {
            let arg = match self.next_resolver_value(Some(TokenKind::RParen), args)? {
                Some(value) => value,
                None => {
                    return Err(self.error_here(format!("tag '{name}' expects a value")));
                }
            };
            self.expect(TokenKind::RParen, "expected ')' to close tag")?;
            Ok(Value::Tag(Box::new(TagValue { name, arg })))
        }
    }

    /// Classify identifier text (plus an optional `.digits` continuation) as
    /// a number.
    fn parse_number_value(&mut self) -> Result<Value, ParseError> {
        let first = self.bump();
        let mut literal = first.text.to_string();
        if self.peek_kind() == TokenKind::Dot {
            self.bump();
            let frac = self.expect(TokenKind::Identifier, "expected digits after '.'")?;
            literal.push('.');
            literal.push_str(frac.text);
        }
        number::parse_number(&literal).map_err(|message| ParseError::new(message, first.pos))
    }

    // ------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------

    /// Parse a string from its opening quote, decoding escapes and splicing
    /// embedded expressions.
    fn parse_string(&mut self) -> Result<String, ParseError> {
        let open = self.bump();
        debug_assert!(matches!(
            open.kind,
            TokenKind::DoubleQuote | TokenKind::TripleQuote
        ));
        let mut out = String::new();
        loop {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::StringContent => {
                    self.bump();
                    out.push_str(token.text);
                }
                TokenKind::EscapeSequence => {
                    self.bump();
                    out.push(decode_escape(token.text, token.pos)?);
                }
                TokenKind::EmbeddedValueStart => {
                    self.bump();
                    let text = self.parse_embedded_value()?;
                    self.expect(TokenKind::RBrace, "expected '}' to close embedded expression")?;
                    out.push_str(&text);
                }
                kind if kind == open.kind => {
                    self.bump();
                    return Ok(out);
                }
                TokenKind::Illegal => {
                    return Err(ParseError::new(
                        format!("illegal character {:?} in string", token.text),
                        token.pos,
                    ));
                }
                TokenKind::Eof => return Err(self.error_here("unterminated string")),
                _ => {
                    return Err(self.error_here(format!(
                        "unexpected token {} in string",
                        describe(&token)
                    )));
                }
            }
        }
    }

    /// Parse one `${…}` expression; the result must be a primitive and is
    /// coerced to text.
    fn parse_embedded_value(&mut self) -> Result<String, ParseError> {
        let token = self.peek().clone();
        let value = match token.kind {
            TokenKind::DoubleQuote | TokenKind::TripleQuote => {
                Value::String(self.parse_string()?)
            }
            TokenKind::Variable => {
                let path = self.parse_key_path()?;
                self.resolve_variable(&path, token.pos)?
            }
            TokenKind::Identifier => {
                if self.peek_is_tag() {
                    self.parse_tag()?
                } else if number::is_number_start(token.text) {
                    self.parse_number_value()?
                } else {
                    return Err(ParseError::new(
                        format!("unexpected identifier '{}' in embedded expression", token.text),
                        token.pos,
                    ));
                }
            }
            TokenKind::Null => {
                self.bump();
                Value::Null
            }
            TokenKind::Boolean => {
                self.bump();
                Value::Bool(token.text == "true")
            }
            TokenKind::LBrace => {
                return Err(self.error_here("objects are not allowed in embedded expressions"));
            }
            TokenKind::LBracket => {
                return Err(self.error_here("arrays are not allowed in embedded expressions"));
            }
            _ => {
                return Err(self.error_here(format!(
                    "unexpected token {} in embedded expression",
                    describe(&token)
                )));
            }
        };
        value.primitive_text().ok_or_else(|| {
            ParseError::new(
                format!(
                    "embedded expression must produce a primitive value, got {}",
                    value.type_name()
                ),
                token.pos,
            )
        })
    }

    // ------------------------------------------------------------------
    // Variables and lookup
    // ------------------------------------------------------------------

    /// Resolve a variable-headed key path through the scope chain, then walk
    /// any remaining segments into the bound value.
    fn resolve_variable(&mut self, path: &KeyPath, pos: Pos) -> Result<Value, ParseError> {
        let KeyPart::Variable(name) = path.head() else {
            unreachable!("resolve_variable takes variable-headed paths");
        };
        let Some(mut current) = self.scopes.get(name) else {
            return Err(ParseError::new(
                format!("could not resolve variable '{name}'"),
                pos,
            ));
        };
        for part in &path.parts()[1..] {
            let next = match part {
                KeyPart::Ident(key) | KeyPart::Quoted(key) => {
                    current.as_object().and_then(|o| o.get(key))
                }
                KeyPart::Index(index) => current.as_array().and_then(|a| a.get(*index)),
                KeyPart::Variable(_) => unreachable!("variable segments are first-only"),
            };
            let Some(next) = next else {
                return Err(ParseError::new(
                    format!("could not resolve variable path '{path}'"),
                    pos,
                ));
            };
            current = next;
        }
        Ok(current.clone())
    }

    /// Read a value out of the materialised result tree, from the document
    /// root.
    pub(crate) fn lookup_root(&self, path: &KeyPath) -> Option<Value> {
        let mut current = &self.root;
        for part in path.parts() {
            current = match part {
                KeyPart::Ident(key) | KeyPart::Quoted(key) | KeyPart::Variable(key) => {
                    current.as_object()?.get(key)?
                }
                KeyPart::Index(index) => current.as_array()?.get(*index)?,
            };
        }
        Some(current.clone())
    }

    // ------------------------------------------------------------------
    // Resolver support
    // ------------------------------------------------------------------

    pub(crate) fn config(&self) -> &ParseConfig {
        &self.config
    }

    pub(crate) fn config_rc(&self) -> &Rc<ParseConfig> {
        &self.config
    }

    pub(crate) fn file(&self) -> Option<&str> {
        self.file.as_deref()
    }

    pub(crate) fn scopes(&self) -> &ScopeStack {
        &self.scopes
    }

    pub(crate) fn scopes_mut(&mut self) -> &mut ScopeStack {
        &mut self.scopes
    }

    pub(crate) fn exports_mut(&mut self) -> &mut IndexMap<String, Value> {
        &mut self.exports
    }

    pub(crate) fn block_kind(&self) -> BlockKind {
        if self.steps.is_empty() && self.detached.is_empty() {
            BlockKind::Root
        } else {
            BlockKind::Object
        }
    }
}

// ----------------------------------------------------------------------
// Free helpers
// ----------------------------------------------------------------------

/// Follow block-path steps down from a base container.
fn walk_steps<'a>(mut value: &'a mut Value, steps: &[Step]) -> &'a mut Value {
    for step in steps {
        value = match step {
            Step::Key(name) => value
                .as_object_mut()
                .and_then(|o| o.get_mut(name))
                .expect("path step addresses an object entry"),
            Step::Index(index) => value
                .as_array_mut()
                .and_then(|a| a.get_mut(*index))
                .expect("path step addresses an array element"),
            Step::Last => match value {
                Value::Collection(collection) => collection.last_mut(),
                _ => unreachable!("Last step addresses a collection"),
            },
        };
    }
    value
}

/// The terminal slot a key path addresses.
enum Slot<'a> {
    Entry {
        object: &'a mut Object,
        name: String,
    },
    Element {
        array: &'a mut Vec<Value>,
        index: usize,
    },
}

/// Walk a key path from a block container, creating intermediate containers
/// as needed: a named or index part followed by an index gets an array,
/// anything else an object; wrong-typed intermediates are replaced and
/// arrays grow with null padding.
fn materialize_slot<'a>(container: &'a mut Value, parts: &[KeyPart]) -> Slot<'a> {
    let (last, walk) = parts.split_last().expect("key paths are non-empty");

    let mut current = container;
    for (i, part) in walk.iter().enumerate() {
        let wants_array = matches!(parts[i + 1], KeyPart::Index(_));
        let slot = match part {
            KeyPart::Ident(name) | KeyPart::Quoted(name) | KeyPart::Variable(name) => current
                .as_object_mut()
                .expect("block containers are objects")
                .entry(name.clone())
                .or_insert(Value::Null),
            KeyPart::Index(index) => {
                let items = current
                    .as_array_mut()
                    .expect("index parts address arrays");
                while items.len() <= *index {
                    items.push(Value::Null);
                }
                &mut items[*index]
            }
        };
        if wants_array {
            if !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
        } else if !slot.is_object() {
            *slot = Value::Object(Object::new());
        }
        current = slot;
    }

    match last {
        KeyPart::Ident(name) | KeyPart::Quoted(name) | KeyPart::Variable(name) => Slot::Entry {
            object: current
                .as_object_mut()
                .expect("block containers are objects"),
            name: name.clone(),
        },
        KeyPart::Index(index) => {
            let items = current
                .as_array_mut()
                .expect("index parts address arrays");
            while items.len() <= *index {
                items.push(Value::Null);
            }
            Slot::Element {
                array: items,
                index: *index,
            }
        }
    }
}

/// Deep-merge `incoming` under `target`: missing keys are inserted,
/// object/object pairs recurse, and keys `target` already has win.
fn deep_merge_under(target: &mut Object, incoming: Object) {
    for (key, value) in incoming {
        match target.get_mut(&key) {
            None => {
                target.insert(key, value);
            }
            Some(existing) => {
                if let (Value::Object(existing), Value::Object(incoming)) = (existing, value) {
                    deep_merge_under(existing, incoming);
                }
            }
        }
    }
}

/// Decode one escape sequence to its character.
fn decode_escape(text: &str, pos: Pos) -> Result<char, ParseError> {
    let mut chars = text.chars();
    let lead = chars.next();
    debug_assert_eq!(lead, Some('\\'));
    let Some(kind) = chars.next() else {
        return Err(ParseError::new("unterminated escape sequence", pos));
    };
    match kind {
        '"' => Ok('"'),
        '\\' => Ok('\\'),
        '$' => Ok('$'),
        'b' => Ok('\u{0008}'),
        'f' => Ok('\u{000C}'),
        'n' => Ok('\n'),
        'r' => Ok('\r'),
        't' => Ok('\t'),
        'u' | 'U' => {
            let expected = if kind == 'u' { 4 } else { 8 };
            let hex: String = chars.collect();
            if hex.len() != expected || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(ParseError::new(
                    format!("invalid escape sequence '{text}'"),
                    pos,
                ));
            }
            let code = u32::from_str_radix(&hex, 16).expect("validated hex digits");
            char::from_u32(code).ok_or_else(|| {
                ParseError::new(
                    format!("invalid unicode code point in escape '{text}'"),
                    pos,
                )
            })
        }
        _ => Err(ParseError::new(
            format!("invalid escape sequence '{text}'"),
            pos,
        )),
    }
}

/// A value-starting token after a key means the line is a statement.
fn is_statement_start(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Identifier
            | TokenKind::Boolean
            | TokenKind::Null
            | TokenKind::LBracket
            | TokenKind::DoubleQuote
            | TokenKind::TripleQuote
    )
}

/// Key identifiers are a strict subset of identifier characters: `+` lexes
/// into identifiers for the sake of numbers but is not valid in a key.
fn is_valid_key_ident(text: &str) -> bool {
    !text.is_empty()
        && text
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Parse an index segment: a non-negative integer with no sign or fraction.
fn parse_index(token: &Token<'_>) -> Result<usize, ParseError> {
    if !token.text.is_empty() && token.text.bytes().all(|b| b.is_ascii_digit()) {
        token.text.parse().map_err(|_| {
            ParseError::new(format!("array index '{}' is out of range", token.text), token.pos)
        })
    } else {
        Err(ParseError::new(
            format!(
                "array index must be a non-negative integer, found '{}'",
                token.text
            ),
            token.pos,
        ))
    }
}

/// Render a token for an error message.
fn describe(token: &Token<'_>) -> String {
    match token.kind {
        TokenKind::Eof => "end of input".to_string(),
        TokenKind::Newline => "end of line".to_string(),
        _ => format!("'{}'", token.text),
    }
}
