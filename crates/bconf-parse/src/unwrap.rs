//! The final unwrap pass.
//!
//! After the top-level block completes, the result tree is traversed once to
//! replace internal values with their external shapes: statements become
//! their argument groups, unresolved tags become `[name, arg]` pairs, key
//! paths serialize to strings, and collections keep their most recent value.

use crate::Value;

/// Recursively replace internal values with their external forms.
pub fn unwrap_value(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(unwrap_value).collect()),
        Value::Object(object) => Value::Object(
            object
                .into_iter()
                .map(|(k, v)| (k, unwrap_value(v)))
                .collect(),
        ),
        Value::Tag(tag) => Value::Array(vec![
            Value::String(tag.name),
            unwrap_value(tag.arg),
        ]),
        Value::Statement(statement) => Value::Array(
            statement
                .args
                .into_iter()
                .map(|group| Value::Array(group.into_iter().map(unwrap_value).collect()))
                .collect(),
        ),
        Value::Path(path) => Value::String(path.to_string()),
        Value::Collection(collection) => unwrap_value(collection.into_last()),
        primitive => primitive,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Collection, KeyPath, Object, StatementValue, TagValue};

    #[test]
    fn test_primitives_pass_through() {
        assert_eq!(unwrap_value(Value::Int(1)), Value::Int(1));
        assert_eq!(unwrap_value(Value::Null), Value::Null);
    }

    #[test]
    fn test_tag_unwraps_to_pair() {
        let tag = Value::Tag(Box::new(TagValue {
            name: "custom".to_string(),
            arg: Value::Path(KeyPath::ident("a")),
        }));
        assert_eq!(
            unwrap_value(tag),
            Value::Array(vec![
                Value::String("custom".to_string()),
                Value::String("a".to_string()),
            ])
        );
    }

    #[test]
    fn test_statement_unwraps_to_groups() {
        let statement = Value::Statement(Box::new(StatementValue {
            name: KeyPath::ident("allow"),
            args: vec![
                vec![Value::String("from".into()), Value::String("localhost".into())],
                vec![Value::String("from".into()), Value::String("10.0.0.0/8".into())],
            ],
        }));
        assert_eq!(
            unwrap_value(statement),
            Value::Array(vec![
                Value::Array(vec![
                    Value::String("from".into()),
                    Value::String("localhost".into()),
                ]),
                Value::Array(vec![
                    Value::String("from".into()),
                    Value::String("10.0.0.0/8".into()),
                ]),
            ])
        );
    }

    #[test]
    fn test_collection_keeps_last() {
        let collection = Value::Collection(Collection::pair(Value::Int(1), Value::Int(2)));
        assert_eq!(unwrap_value(collection), Value::Int(2));
    }

    #[test]
    fn test_recurses_into_containers() {
        let mut object = Object::new();
        object.insert(
            "p".to_string(),
            Value::Path(KeyPath::ident("x")),
        );
        let value = Value::Array(vec![Value::Object(object)]);
        let unwrapped = unwrap_value(value);
        let Value::Array(items) = unwrapped else {
            panic!("expected array");
        };
        let Value::Object(object) = &items[0] else {
            panic!("expected object");
        };
        assert_eq!(object.get("p"), Some(&Value::String("x".to_string())));
    }
}
