//! Tree differencer
//!
//! [`diff`] answers "what in A is absent from, or differs from, B". It is
//! asymmetric: `diff(want, have)` is what needs pushing, `diff(have, want)`
//! is what needs removing. [`common`] answers "what named in A exists in B",
//! which is the delete set of a `deleted` invocation.

use crate::error::Result;
use crate::keyspec::{FieldSpec, KeySpec};
use crate::matcher::match_entries;
use crate::tree::{has_non_key_leaf, identity_only, join, prune_nulls, values_equal};
use crate::types::ConfigTree;
use log::trace;
use serde_json::{Map, Value};

/// Compute the part of `want` that is absent from or differs from `have`
///
/// Keyed list entries are matched by identity; matched entries that differ
/// are reported as a partial entry carrying the differing leaves plus the
/// identity fields. Empty results are omitted at every level, so a diff with
/// no changes is the empty mapping.
pub fn diff(want: &ConfigTree, have: &ConfigTree, spec: &KeySpec) -> Result<ConfigTree> {
    let empty = Map::new();
    let want = want.as_object().unwrap_or(&empty);
    let have = have.as_object().unwrap_or(&empty);
    Ok(Value::Object(diff_map("", want, have, spec)?))
}

pub(crate) fn diff_map(
    path: &str,
    want: &Map<String, Value>,
    have: &Map<String, Value>,
    spec: &KeySpec,
) -> Result<Map<String, Value>> {
    let mut out = Map::new();
    for (field, value) in want {
        let field_path = join(path, field);
        if let Some(changed) = diff_value(&field_path, value, have.get(field), spec.get(field))? {
            trace!("diff: {field_path} differs");
            out.insert(field.clone(), changed);
        }
    }
    Ok(out)
}

fn diff_value(
    path: &str,
    want: &Value,
    have: Option<&Value>,
    field: &FieldSpec,
) -> Result<Option<Value>> {
    match want {
        Value::Null => Ok(None),
        Value::Object(w) => match have {
            Some(Value::Object(h)) => {
                let changed = diff_map(path, w, h, field.nested())?;
                Ok((!changed.is_empty()).then_some(Value::Object(changed)))
            }
            _ => Ok(non_empty(prune_nulls(want))),
        },
        Value::Array(w) => {
            let have = match have {
                Some(Value::Array(h)) => h.as_slice(),
                _ => &[],
            };
            diff_list(path, w, have, field)
        }
        scalar => match have {
            Some(h) if values_equal(scalar, h) => Ok(None),
            _ => Ok(Some(scalar.clone())),
        },
    }
}

fn diff_list(
    path: &str,
    want: &[Value],
    have: &[Value],
    field: &FieldSpec,
) -> Result<Option<Value>> {
    let identity = field.identity();
    let mut out = Vec::new();

    for m in match_entries(path, want, have, identity)? {
        let Some(left) = m.left else { continue };
        match (m.right, left, field.is_keyed()) {
            (None, _, _) => out.push(prune_nulls(left)),
            (Some(Value::Object(right)), Value::Object(left), true) => {
                let changed = diff_map(path, left, right, field.nested())?;
                if has_non_key_leaf(&changed, identity) {
                    out.push(Value::Object(with_identity(left, identity, changed)));
                }
            }
            // Equal by whole value
            _ => {}
        }
    }

    Ok((!out.is_empty()).then_some(Value::Array(out)))
}

/// Compute the part of `want` that names something present in `have`
///
/// This is the delete set of a `deleted` invocation. Scalars are matched by
/// presence and reported with the have value; a keyed entry carrying only
/// its identity names the whole entry and stays bare; an empty mapping names
/// the whole section. Anything named in `want` but absent from `have` is
/// silently skipped.
pub fn common(want: &ConfigTree, have: &ConfigTree, spec: &KeySpec) -> Result<ConfigTree> {
    let empty = Map::new();
    let want = want.as_object().unwrap_or(&empty);
    let have = have.as_object().unwrap_or(&empty);
    Ok(Value::Object(common_map("", want, have, spec)?))
}

fn common_map(
    path: &str,
    want: &Map<String, Value>,
    have: &Map<String, Value>,
    spec: &KeySpec,
) -> Result<Map<String, Value>> {
    let mut out = Map::new();
    for (field, value) in want {
        let Some(present) = have.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        let field_path = join(path, field);
        if let Some(named) = common_value(&field_path, value, present, spec.get(field))? {
            out.insert(field.clone(), named);
        }
    }
    Ok(out)
}

fn common_value(
    path: &str,
    want: &Value,
    have: &Value,
    field: &FieldSpec,
) -> Result<Option<Value>> {
    match (want, have) {
        (Value::Null, _) => Ok(None),
        (Value::Object(w), Value::Object(h)) if w.is_empty() || !has_non_key_leaf(w, &[]) => {
            Ok((!h.is_empty()).then(|| Value::Object(Map::new())))
        }
        (Value::Object(w), Value::Object(h)) => {
            let named = common_map(path, w, h, field.nested())?;
            Ok((!named.is_empty()).then_some(Value::Object(named)))
        }
        (Value::Array(w), Value::Array(h)) => common_list(path, w, h, field),
        (Value::Object(_) | Value::Array(_), _) => Ok(None),
        (_, Value::Object(_) | Value::Array(_)) => Ok(None),
        (_, present) => Ok(Some(present.clone())),
    }
}

fn common_list(
    path: &str,
    want: &[Value],
    have: &[Value],
    field: &FieldSpec,
) -> Result<Option<Value>> {
    let identity = field.identity();
    let mut out = Vec::new();

    for m in match_entries(path, want, have, identity)? {
        let (Some(left), Some(right)) = (m.left, m.right) else {
            continue;
        };
        match (left, right, field.is_keyed()) {
            (Value::Object(l), Value::Object(r), true) => {
                if !has_non_key_leaf(l, identity) {
                    out.push(Value::Object(identity_only(l, identity)));
                    continue;
                }
                let named = common_map(path, l, r, field.nested())?;
                if has_non_key_leaf(&named, identity) {
                    out.push(Value::Object(with_identity(l, identity, named)));
                }
            }
            _ => out.push(right.clone()),
        }
    }

    Ok((!out.is_empty()).then_some(Value::Array(out)))
}

/// Stand each bare keyed entry of `want` in for its matched `have` entry
///
/// Under `replaced` and `overridden` an entry carrying only its identity
/// means "keep this instance as it is". The dispatcher calls this on those
/// paths only; `deleted` reads the same entry through [`common`], where it
/// names the whole entry for removal. Bare entries with no `have` match are
/// left alone.
pub fn keep_bare(want: &ConfigTree, have: &ConfigTree, spec: &KeySpec) -> Result<ConfigTree> {
    let empty = Map::new();
    let Some(want) = want.as_object() else {
        return Ok(want.clone());
    };
    let have = have.as_object().unwrap_or(&empty);
    Ok(Value::Object(keep_bare_map("", want, have, spec)?))
}

fn keep_bare_map(
    path: &str,
    want: &Map<String, Value>,
    have: &Map<String, Value>,
    spec: &KeySpec,
) -> Result<Map<String, Value>> {
    let mut out = Map::new();
    for (field, value) in want {
        let field_path = join(path, field);
        let kept = match (value, have.get(field)) {
            (Value::Array(w), Some(Value::Array(h))) if spec.get(field).is_keyed() => {
                Value::Array(keep_bare_list(&field_path, w, h, spec.get(field))?)
            }
            (Value::Object(w), Some(Value::Object(h))) => {
                Value::Object(keep_bare_map(&field_path, w, h, spec.get(field).nested())?)
            }
            _ => value.clone(),
        };
        out.insert(field.clone(), kept);
    }
    Ok(out)
}

fn keep_bare_list(
    path: &str,
    want: &[Value],
    have: &[Value],
    field: &FieldSpec,
) -> Result<Vec<Value>> {
    let identity = field.identity();
    let mut out = Vec::with_capacity(want.len());

    for m in match_entries(path, want, have, identity)? {
        let Some(left) = m.left else { continue };
        let kept = match (left, m.right) {
            (Value::Object(l), Some(right)) if right.is_object() && !has_non_key_leaf(l, identity) => {
                trace!("diff: {path} ({}) kept as-is", m.key);
                right.clone()
            }
            (Value::Object(l), Some(Value::Object(r))) => {
                Value::Object(keep_bare_map(path, l, r, field.nested())?)
            }
            _ => left.clone(),
        };
        out.push(kept);
    }
    Ok(out)
}

/// Rewrite a subtree into a delete script that removes all of it
///
/// Keyed entries shrink to their identity fields, sections become the empty
/// mapping; scalars and whole-value lists stay as they are.
pub fn whole(value: &Value, field: &FieldSpec) -> Value {
    match value {
        Value::Array(items) if field.is_keyed() => Value::Array(
            items
                .iter()
                .map(|item| match item {
                    Value::Object(entry) => Value::Object(identity_only(entry, field.identity())),
                    other => other.clone(),
                })
                .collect(),
        ),
        Value::Object(_) => Value::Object(Map::new()),
        other => other.clone(),
    }
}

/// Accept a single mapping where a keyed list is declared
///
/// `{"name": "foo"}` given for a keyed list reads as `[{"name": "foo"}]`.
pub fn normalize_lists(tree: &ConfigTree, spec: &KeySpec) -> ConfigTree {
    match tree {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let field = spec.get(k);
                    let value = match v {
                        Value::Object(_) if field.is_keyed() => {
                            Value::Array(vec![normalize_lists(v, field.nested())])
                        }
                        Value::Array(items) => Value::Array(
                            items
                                .iter()
                                .map(|item| normalize_lists(item, field.nested()))
                                .collect(),
                        ),
                        Value::Object(_) => normalize_lists(v, field.nested()),
                        other => other.clone(),
                    };
                    (k.clone(), value)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Identity fields of `entry` first, then the rest of `fields`
pub(crate) fn with_identity(
    entry: &Map<String, Value>,
    identity: &[String],
    fields: Map<String, Value>,
) -> Map<String, Value> {
    let mut out = identity_only(entry, identity);
    for (k, v) in fields {
        if !out.contains_key(&k) {
            out.insert(k, v);
        }
    }
    out
}

fn non_empty(value: Value) -> Option<Value> {
    match &value {
        Value::Object(map) if map.is_empty() => None,
        _ => Some(value),
    }
}
