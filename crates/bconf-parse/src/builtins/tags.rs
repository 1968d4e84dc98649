//! Built-in tags: `ref`, `env`, and the conversion tags.

use std::collections::HashMap;
use std::rc::Rc;

use crate::number;
use crate::resolver::{ResolverContext, TagResolver};
use crate::{KeyPart, KeyPath, ParseError, Value};

/// The built-in tag table.
pub fn builtin_tags() -> HashMap<String, TagResolver> {
    let mut tags: HashMap<String, TagResolver> = HashMap::new();
    tags.insert("ref".to_string(), Rc::new(resolve_ref));
    tags.insert("env".to_string(), Rc::new(resolve_env));
    tags.insert("string".to_string(), Rc::new(resolve_string));
    tags.insert("number".to_string(), Rc::new(resolve_number));
    tags.insert("int".to_string(), Rc::new(resolve_int));
    tags.insert("float".to_string(), Rc::new(resolve_float));
    tags.insert("bool".to_string(), Rc::new(resolve_bool));
    tags
}

/// `ref(path)`: the value at `path` in the already-materialised result
/// tree. A bare integer is treated as a string key at the root.
fn resolve_ref(ctx: &mut ResolverContext<'_, '_>) -> Result<Value, ParseError> {
    let Some(arg) = ctx.next()? else {
        return Err(ParseError::message("ref expects a key path"));
    };
    let path = match arg {
        Value::Path(path) => path,
        Value::Int(n) => KeyPath::ident(n.to_string()),
        other => {
            return Err(ParseError::message(format!(
                "ref expects a key path, got {}",
                other.type_name()
            )));
        }
    };
    ctx.lookup(&path)
        .ok_or_else(|| ParseError::message(format!("no value exists at key '{path}'")))
}

/// `env(name)`: the environment value for `name`.
fn resolve_env(ctx: &mut ResolverContext<'_, '_>) -> Result<Value, ParseError> {
    let Some(arg) = ctx.next()? else {
        return Err(ParseError::message("env expects a variable name"));
    };
    let name = match arg {
        Value::String(name) => name,
        Value::Path(path) => match path.parts() {
            [KeyPart::Ident(name)] => name.clone(),
            _ => {
                return Err(ParseError::message(format!(
                    "env expects a variable name, got the key path '{path}'"
                )));
            }
        },
        other => {
            return Err(ParseError::message(format!(
                "env expects a variable name, got {}",
                other.type_name()
            )));
        }
    };
    ctx.env()
        .get(&name)
        .cloned()
        .map(Value::String)
        .ok_or_else(|| {
            ParseError::message(format!("environment variable '{name}' is not set"))
        })
}

/// `string(v)`: the textual form of a primitive.
fn resolve_string(ctx: &mut ResolverContext<'_, '_>) -> Result<Value, ParseError> {
    let Some(arg) = ctx.next()? else {
        return Err(ParseError::message("string expects a value"));
    };
    arg.primitive_text().map(Value::String).ok_or_else(|| {
        ParseError::message(format!("cannot convert {} to a string", arg.type_name()))
    })
}

/// `number(v)`: integer or float per the numeric grammar.
fn resolve_number(ctx: &mut ResolverContext<'_, '_>) -> Result<Value, ParseError> {
    let Some(arg) = ctx.next()? else {
        return Err(ParseError::message("number expects a value"));
    };
    to_number(&arg)
}

/// `int(v)`: as `number`, truncated toward zero.
fn resolve_int(ctx: &mut ResolverContext<'_, '_>) -> Result<Value, ParseError> {
    let Some(arg) = ctx.next()? else {
        return Err(ParseError::message("int expects a value"));
    };
    match to_number(&arg)? {
        Value::Float(f) => Ok(Value::Int(f.trunc() as i64)),
        int => Ok(int),
    }
}

/// `float(v)`: as `number`, always a float.
fn resolve_float(ctx: &mut ResolverContext<'_, '_>) -> Result<Value, ParseError> {
    let Some(arg) = ctx.next()? else {
        return Err(ParseError::message("float expects a value"));
    };
    match to_number(&arg)? {
        Value::Int(n) => Ok(Value::Float(n as f64)),
        float => Ok(float),
    }
}

/// `bool(v)`: truthiness of a primitive.
fn resolve_bool(ctx: &mut ResolverContext<'_, '_>) -> Result<Value, ParseError> {
    let Some(arg) = ctx.next()? else {
        return Err(ParseError::message("bool expects a value"));
    };
    match arg {
        Value::Bool(b) => Ok(Value::Bool(b)),
        Value::Null => Ok(Value::Bool(false)),
        Value::Int(n) => Ok(Value::Bool(n != 0)),
        Value::Float(f) => Ok(Value::Bool(f != 0.0)),
        Value::String(s) => Ok(Value::Bool(!s.is_empty())),
        other => Err(ParseError::message(format!(
            "cannot convert {} to a boolean",
            other.type_name()
        ))),
    }
}

/// Numeric conversion shared by `number`, `int`, and `float`.
fn to_number(value: &Value) -> Result<Value, ParseError> {
    match value {
        Value::Int(_) | Value::Float(_) => Ok(value.clone()),
        Value::Bool(true) => Ok(Value::Int(1)),
        Value::Bool(false) | Value::Null => Ok(Value::Int(0)),
        Value::String(s) => number::parse_number(s).map_err(ParseError::message),
        other => Err(ParseError::message(format!(
            "cannot convert {} to a number",
            other.type_name()
        ))),
    }
}
