//! Helpers over configuration trees

use crate::error::{Error, Result};
use crate::types::{ConfigTree, empty_tree};
use serde_json::{Map, Value};

/// Join a dotted field path
pub(crate) fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{path}.{field}")
    }
}

/// Check if a tree carries no configuration
///
/// Null, the empty mapping and the empty sequence are all empty.
pub fn is_empty_tree(tree: &Value) -> bool {
    match tree {
        Value::Null => true,
        Value::Object(map) => map.values().all(Value::is_null),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Coerce a root tree into a mapping, treating null as empty
pub(crate) fn normalize_root(tree: &Value) -> Result<ConfigTree> {
    match tree {
        Value::Null => Ok(empty_tree()),
        Value::Object(_) => Ok(prune_nulls(tree)),
        other => Err(Error::invalid_tree(
            "",
            format!("expected a mapping at the root, found {}", kind(other)),
        )),
    }
}

/// Drop null members of mappings, recursively
///
/// Unset options arrive as null and mean "unspecified".
pub fn prune_nulls(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), prune_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(prune_nulls).collect()),
        other => other.clone(),
    }
}

/// Deep equality that ignores integer/float representation
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x == y,
                _ => x.as_f64() == y.as_f64(),
            },
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(k, v)| y.get(k).is_some_and(|other| values_equal(v, other)))
        }
        _ => a == b,
    }
}

/// Canonical text of a value: mapping keys sorted, whole floats as integers
pub(crate) fn canonical(value: &Value) -> String {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let members: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{}:{}", Value::String(k.clone()), canonical(&map[k])))
                .collect();
            format!("{{{}}}", members.join(","))
        }
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(canonical).collect();
            format!("[{}]", items.join(","))
        }
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 9.0e15 => {
                format!("{}", f as i64)
            }
            _ => n.to_string(),
        },
        other => other.to_string(),
    }
}

/// Check if a mapping carries anything besides its identity fields
pub(crate) fn has_non_key_leaf(map: &Map<String, Value>, identity: &[String]) -> bool {
    map.iter()
        .any(|(k, v)| !v.is_null() && !identity.iter().any(|id| id == k))
}

/// Copy only the identity fields of an entry
pub(crate) fn identity_only(map: &Map<String, Value>, identity: &[String]) -> Map<String, Value> {
    identity
        .iter()
        .filter_map(|k| map.get(k).map(|v| (k.clone(), v.clone())))
        .collect()
}

/// Short name of a value's kind, for error messages
pub(crate) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}
