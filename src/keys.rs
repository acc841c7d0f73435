//! Canonical key construction: `keyOfField` / `joinKeys` from §4.1, plus the
//! entity-key rules from §3.

use apollo_compiler::ast::Value as AstValue;
use apollo_compiler::Node;
use serde_json::Map as JsonMap;
use serde_json::Value as JsonValue;

/// A fully-resolved entity key: a root key (`"Query"`, `"Mutation"`,
/// `"Subscription"`) or `"Typename:id"`.
pub type EntityKey = String;

/// `name` or `name(argsJSON)`.
pub type FieldKey = String;

/// `joinKeys(parentKey, childKey)` — injective composition of an entity key
/// and a field key (or a field key and a list index) into one string.
pub fn join_keys(parent: &str, child: &str) -> String {
    let mut joined = String::with_capacity(parent.len() + child.len() + 1);
    joined.push_str(parent);
    joined.push('.');
    joined.push_str(child);
    joined
}

/// `keyOfField(name, args)`.
///
/// `args` must already have had variables substituted (see
/// [`crate::ast_utils::field_arguments`]) and undefined-valued entries
/// removed.
pub fn key_of_field(name: &str, args: Option<&JsonMap<String, JsonValue>>) -> FieldKey {
    match args {
        None => name.to_owned(),
        Some(args) if args.is_empty() => name.to_owned(),
        Some(args) => format!("{name}({})", canonical_json(&JsonValue::Object(args.clone()))),
    }
}

/// Recursively serializes a JSON value with object keys in sorted order.
/// This is the canonicalization step referenced by `keyOfField`: equal
/// semantic argument sets (regardless of source key order) must produce
/// equal strings.
pub fn canonical_json(value: &JsonValue) -> String {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = String::from("{");
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                out.push_str(&canonical_json(&map[*key]));
            }
            out.push('}');
            out
        }
        JsonValue::Array(items) => {
            let mut out = String::from("[");
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&canonical_json(item));
            }
            out.push(']');
            out
        }
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Converts a GraphQL AST argument value into a JSON value, substituting
/// variable references with concrete values from `variables`. An undefined
/// variable reference is substituted with `null` (§7).
pub fn ast_value_to_json(
    value: &AstValue,
    variables: &JsonMap<String, JsonValue>,
) -> JsonValue {
    match value {
        AstValue::Null => JsonValue::Null,
        AstValue::Enum(name) => JsonValue::String(name.to_string()),
        AstValue::String(s) => JsonValue::String(s.clone()),
        AstValue::Boolean(b) => JsonValue::Bool(*b),
        AstValue::Int(i) => i
            .try_to_i32()
            .map(JsonValue::from)
            .unwrap_or_else(|_| JsonValue::String(i.to_string())),
        AstValue::Float(f) => f
            .try_to_f64()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        AstValue::Variable(name) => variables
            .get(name.as_str())
            .cloned()
            .unwrap_or(JsonValue::Null),
        AstValue::List(items) => JsonValue::Array(
            items
                .iter()
                .map(|item| ast_value_to_json(item, variables))
                .collect(),
        ),
        AstValue::Object(fields) => {
            let mut map = JsonMap::new();
            for (name, field_value) in fields {
                map.insert(name.to_string(), ast_value_to_json(field_value, variables));
            }
            JsonValue::Object(map)
        }
    }
}

/// Convenience for argument nodes coming straight off an AST `Field`.
///
/// Every argument in `arguments` is kept, including ones whose value
/// resolves to `null` (whether written as a literal `null` or sourced from a
/// variable bound to `null`) — both bind the argument to the value `null`
/// and must canonicalize identically (§3, §4.1). There's no "argument not
/// present" case to special-case here: an argument not present on the field
/// simply isn't in `arguments` at all.
pub fn ast_arguments_to_json(
    arguments: &[Node<apollo_compiler::ast::Argument>],
    variables: &JsonMap<String, JsonValue>,
) -> JsonMap<String, JsonValue> {
    let mut map = JsonMap::new();
    for argument in arguments {
        let value = ast_value_to_json(&argument.value, variables);
        map.insert(argument.name.to_string(), value);
    }
    map
}

/// `keyOfEntity` from §3/§4.2: returns the root key for a root typename, the
/// `"Typename:id"` key for a value carrying `id`/`_id`, or `None` if the
/// value is embedded (no stable identifier).
pub fn key_of_entity(data: &JsonMap<String, JsonValue>, root_keys: &[&str]) -> Option<EntityKey> {
    let typename = data.get("__typename")?.as_str()?;
    if root_keys.contains(&typename) {
        return Some(typename.to_owned());
    }
    let id = data
        .get("id")
        .or_else(|| data.get("_id"))
        .filter(|v| !v.is_null())?;
    let id_str = match id {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    };
    Some(format!("{typename}:{id_str}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_of_field_without_args() {
        assert_eq!(key_of_field("todos", None), "todos");
    }

    #[test]
    fn key_of_field_with_empty_args() {
        assert_eq!(key_of_field("todos", Some(&JsonMap::new())), "todos");
    }

    #[test]
    fn key_of_field_is_order_independent() {
        let a = json!({ "b": 2, "a": 1 });
        let b = json!({ "a": 1, "b": 2 });
        let a_map = a.as_object().unwrap();
        let b_map = b.as_object().unwrap();
        assert_eq!(key_of_field("f", Some(a_map)), key_of_field("f", Some(b_map)));
    }

    #[rstest::rstest]
    #[case(json!({"a": 1, "b": null}), json!({"b": null, "a": 1}))]
    #[case(json!({"nested": {"x": 1, "y": 2}}), json!({"nested": {"y": 2, "x": 1}}))]
    fn canonicalization_property(#[case] left: JsonValue, #[case] right: JsonValue) {
        assert_eq!(
            key_of_field("f", left.as_object()),
            key_of_field("f", right.as_object())
        );
    }

    #[test]
    fn join_keys_is_dot_separated() {
        assert_eq!(join_keys("Query", "todos"), "Query.todos");
    }

    #[test]
    fn key_of_entity_root() {
        let data = json!({ "__typename": "Query", "todos": [] });
        assert_eq!(
            key_of_entity(data.as_object().unwrap(), &["Query", "Mutation", "Subscription"]),
            Some("Query".to_owned())
        );
    }

    #[test]
    fn key_of_entity_keyed() {
        let data = json!({ "__typename": "Todo", "id": "1" });
        assert_eq!(
            key_of_entity(data.as_object().unwrap(), &["Query", "Mutation", "Subscription"]),
            Some("Todo:1".to_owned())
        );
    }

    #[test]
    fn key_of_entity_embedded() {
        let data = json!({ "__typename": "Geo", "lat": 1.0 });
        assert_eq!(
            key_of_entity(data.as_object().unwrap(), &["Query", "Mutation", "Subscription"]),
            None
        );
    }
}
