//! Built-in statements: `import`, `export`, and `extends`.

use std::collections::HashMap;
use std::rc::Rc;

use crate::resolver::{
    NestedParseArgs, ResolverContext, SetVarArgs, StatementAction, StatementResolver,
};
use crate::{KeyPart, ParseError, StatementValue, Value, ValueArgs, VarScope};

/// The built-in statement table.
pub fn builtin_statements() -> HashMap<String, StatementResolver> {
    let mut statements: HashMap<String, StatementResolver> = HashMap::new();
    statements.insert("import".to_string(), Rc::new(resolve_import));
    statements.insert("export".to_string(), Rc::new(resolve_export));
    statements.insert("extends".to_string(), Rc::new(resolve_extends));
    statements
}

/// `extends "path"`: load and parse the file, then merge its document under
/// the current one so subsequent assignments override merged keys.
fn resolve_extends(ctx: &mut ResolverContext<'_, '_>) -> Result<StatementAction, ParseError> {
    let path = match ctx.next()? {
        Some(Value::String(path)) => {
            if path.is_empty() {
                return Err(ParseError::message("extends expects a non-empty file path"));
            }
            path
        }
        Some(other) => {
            return Err(ParseError::message(format!(
                "extends expects a string path, got {}",
                other.type_name()
            )));
        }
        None => return Err(ParseError::message("extends expects a file path")),
    };
    let text = ctx.load_file(&path)?;
    let nested = ctx.parse(
        &text,
        NestedParseArgs {
            file: Some(path),
            unwrap: false,
        },
    )?;
    Ok(StatementAction::Merge(nested.data))
}

/// `import from "path" { $name [as $alias], … }`: parse the file and bind
/// each listed exported variable (or its alias) at the root scope.
fn resolve_import(ctx: &mut ResolverContext<'_, '_>) -> Result<StatementAction, ParseError> {
    match ctx.next()? {
        Some(Value::String(keyword)) if keyword == "from" => {}
        _ => return Err(ParseError::message("import expects the 'from' keyword")),
    }
    let path = match ctx.next()? {
        Some(Value::String(path)) => {
            if path.is_empty() {
                return Err(ParseError::message("import expects a non-empty file path"));
            }
            path
        }
        _ => return Err(ParseError::message("import expects a string path")),
    };
    let names = match ctx.next_with(ValueArgs::literal().with_var_as_keypath(true))? {
        Some(Value::Object(block)) => block,
        _ => return Err(ParseError::message("import expects a block of variable names")),
    };

    let text = ctx.load_file(&path)?;
    let nested = ctx.parse(
        &text,
        NestedParseArgs {
            file: Some(path.clone()),
            unwrap: false,
        },
    )?;

    for (name, spec) in names {
        if !name.starts_with('$') {
            return Err(ParseError::message(format!(
                "import expects variable names, found '{name}'"
            )));
        }
        let locals = match &spec {
            Value::Bool(true) => vec![name.clone()],
            Value::Statement(statement) => alias_names(statement).ok_or_else(|| {
                ParseError::message(format!("malformed import alias for '{name}'"))
            })?,
            _ => {
                return Err(ParseError::message(format!(
                    "malformed import alias for '{name}'"
                )));
            }
        };
        let Some(value) = nested.variables.get(&name).cloned() else {
            return Err(ParseError::message(format!(
                "variable '{name}' was not exported by '{path}'"
            )));
        };
        for local in locals {
            let bound = ctx.set_var(&local, value.clone(), SetVarArgs {
                scope: VarScope::Root,
                override_existing: false,
                export: false,
                export_only: false,
            });
            if !bound {
                return Err(ParseError::message(format!(
                    "variable '{local}' has already been declared"
                )));
            }
        }
    }
    Ok(StatementAction::Discard)
}

/// `export vars { $name [as $alias], … }`: record each listed variable (or
/// alias) in the exported-variables map, declaring unbound names `true`.
fn resolve_export(ctx: &mut ResolverContext<'_, '_>) -> Result<StatementAction, ParseError> {
    match ctx.next()? {
        Some(Value::String(keyword)) if keyword == "vars" => {}
        _ => return Err(ParseError::message("export expects the 'vars' keyword")),
    }
    let names = match ctx.next_with(ValueArgs::literal().with_var_as_keypath(true))? {
        Some(Value::Object(block)) => block,
        _ => return Err(ParseError::message("export expects a block of variable names")),
    };

    for (name, spec) in names {
        // Non-variable keys in the block are ignored.
        if !name.starts_with('$') {
            continue;
        }
        match spec {
            Value::Bool(true) => {
                let value = ensure_bound(ctx, &name);
                ctx.set_var(&name, value, SetVarArgs {
                    export_only: true,
                    ..SetVarArgs::default()
                });
            }
            Value::Statement(statement) => {
                let aliases = alias_names(&statement).ok_or_else(|| {
                    ParseError::message(format!("malformed export alias for '{name}'"))
                })?;
                let value = ensure_bound(ctx, &name);
                for alias in aliases {
                    ctx.set_var(&alias, value.clone(), SetVarArgs {
                        export_only: true,
                        ..SetVarArgs::default()
                    });
                }
            }
            _ => {
                return Err(ParseError::message(format!(
                    "malformed export alias for '{name}'"
                )));
            }
        }
    }
    Ok(StatementAction::Discard)
}

/// The variable's current value, declaring it `true` inline when unbound.
fn ensure_bound(ctx: &mut ResolverContext<'_, '_>, name: &str) -> Value {
    if let Some(value) = ctx.get_var(name) {
        value
    } else {
        ctx.set_var(name, Value::Bool(true), SetVarArgs::default());
        Value::Bool(true)
    }
}

/// Extract alias names from a collected `$name as $alias` statement.
///
/// Every call group must have exactly the shape `["as", $alias]`.
fn alias_names(statement: &StatementValue) -> Option<Vec<String>> {
    let mut names = Vec::new();
    for group in &statement.args {
        match group.as_slice() {
            [Value::String(keyword), Value::Path(path)] if keyword == "as" => {
                match path.parts() {
                    [KeyPart::Variable(alias)] => names.push(alias.clone()),
                    _ => return None,
                }
            }
            _ => return None,
        }
    }
    if names.is_empty() { None } else { Some(names) }
}
