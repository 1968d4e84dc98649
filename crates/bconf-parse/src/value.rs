//! Value types for bconf documents.
//!
//! The external value shapes are null, booleans, integers, floats, strings,
//! arrays, and objects. Tags, statements, key paths, and collections are
//! internal: they exist during a parse and are either resolved away or
//! replaced by their external form in the final unwrap pass.

use indexmap::IndexMap;

use crate::KeyPath;

/// An ordered map from string keys to values.
pub type Object = IndexMap<String, Value>;

/// A bconf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `null`
    Null,
    /// `true` / `false`
    Bool(bool),
    /// An integer number.
    Int(i64),
    /// A floating-point number.
    Float(f64),
    /// A string.
    String(String),
    /// An array of values.
    Array(Vec<Value>),
    /// An object (ordered map).
    Object(Object),

    /// A tag invocation with no registered resolver (internal).
    Tag(Box<TagValue>),
    /// Collected statement call groups (internal).
    Statement(Box<StatementValue>),
    /// A key path used as a value (internal).
    Path(KeyPath),
    /// Values collected under the `collect` duplicate-key policy (internal).
    Collection(Collection),
}

/// A tag record: produced when a tag invocation has no registered resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct TagValue {
    /// The tag name.
    pub name: String,
    /// The single parsed argument.
    pub arg: Value,
}

/// A statement record: one entry per invocation line.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementValue {
    /// The key the statement was written under.
    pub name: KeyPath,
    /// One inner vector per invocation line.
    pub args: Vec<Vec<Value>>,
}

/// Duplicate values retained under the `collect` policy.
///
/// Always non-empty; `last` is the most recent value and is what the
/// collection unwraps to.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    collected: Vec<Value>,
}

impl Collection {
    /// Create a collection from an initial pair of values.
    pub fn pair(first: Value, second: Value) -> Self {
        Self {
            collected: vec![first, second],
        }
    }

    /// Add a value.
    pub fn push(&mut self, value: Value) {
        self.collected.push(value);
    }

    /// All collected values, oldest first.
    pub fn collected(&self) -> &[Value] {
        &self.collected
    }

    /// The most recent value.
    pub fn last(&self) -> &Value {
        self.collected.last().expect("collections are non-empty")
    }

    /// The most recent value, mutably.
    pub fn last_mut(&mut self) -> &mut Value {
        self.collected.last_mut().expect("collections are non-empty")
    }

    /// Consume the collection, keeping only the most recent value.
    pub fn into_last(mut self) -> Value {
        self.collected.pop().expect("collections are non-empty")
    }
}

impl Value {
    /// Whether this is one of the primitive shapes (null, bool, number,
    /// string).
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_)
        )
    }

    /// Whether this is an array.
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Whether this is an object.
    pub fn is_object(&self) -> bool {
        matches!(self, Value::Object(_))
    }

    /// Get as string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as object.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Get as mutable object.
    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Get as array.
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as mutable array.
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// The textual form of a primitive value, as used by embedded string
    /// expressions and the `string` tag.
    ///
    /// Integers and floats format to their shortest round-trip text;
    /// booleans are `true`/`false`; null is `null`.
    pub fn primitive_text(&self) -> Option<String> {
        match self {
            Value::Null => Some("null".to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(n) => Some(n.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// A short name for the value's shape, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Tag(_) => "tag",
            Value::Statement(_) => "statement",
            Value::Path(_) => "key path",
            Value::Collection(_) => "collection",
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}
