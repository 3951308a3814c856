//! Schema-declared default values
//!
//! Paths are dotted field names that skip list positions, so
//! `ars_objects.mode` covers the `mode` leaf of every `ars_objects` entry.

use crate::keyspec::{DeleteOperator, KeySpec};
use crate::tree::{has_non_key_leaf, join, values_equal};
use crate::types::ConfigTree;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field path to default value, for one resource
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefaultMap {
    entries: BTreeMap<String, Value>,
}

impl DefaultMap {
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Declare a default
    pub fn with(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.insert(path.into(), value.into());
        self
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.entries.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove leaves equal to their default
    ///
    /// Identity fields are never removed, and sections left empty are
    /// dropped. Entries of a list whose delete operator restores defaults
    /// are dropped once nothing but their identity remains. Used before
    /// computing delete sets so a field sitting at its default never produces
    /// a spurious delete.
    pub fn strip(&self, tree: &ConfigTree, spec: &KeySpec) -> ConfigTree {
        match tree {
            Value::Object(map) => Value::Object(self.strip_map("", map, spec, &[])),
            other => other.clone(),
        }
    }

    fn strip_map(
        &self,
        path: &str,
        map: &Map<String, Value>,
        spec: &KeySpec,
        identity: &[String],
    ) -> Map<String, Value> {
        let mut out = Map::new();
        for (k, v) in map {
            let field_path = join(path, k);
            let field = spec.get(k);
            let value = match v {
                Value::Object(section) => {
                    let stripped = self.strip_map(&field_path, section, field.nested(), &[]);
                    if stripped.is_empty() && !section.is_empty() {
                        continue;
                    }
                    Value::Object(stripped)
                }
                Value::Array(items) => {
                    let retained = matches!(field.delete_op(), DeleteOperator::RestoreDefault);
                    let stripped: Vec<Value> = items
                        .iter()
                        .filter_map(|item| match item {
                            Value::Object(entry) => {
                                let entry = self.strip_map(
                                    &field_path,
                                    entry,
                                    field.nested(),
                                    field.identity(),
                                );
                                // An entry that cannot be removed is at its default
                                // once only its identity is left.
                                (!retained || has_non_key_leaf(&entry, field.identity()))
                                    .then_some(Value::Object(entry))
                            }
                            other => Some(other.clone()),
                        })
                        .collect();
                    if stripped.is_empty() && !items.is_empty() {
                        continue;
                    }
                    Value::Array(stripped)
                }
                scalar => {
                    let is_identity = identity.iter().any(|id| id == k);
                    if !is_identity
                        && self
                            .get(&field_path)
                            .is_some_and(|default| values_equal(default, scalar))
                    {
                        continue;
                    }
                    scalar.clone()
                }
            };
            out.insert(k.clone(), value);
        }
        out
    }

    /// Add missing leaves at their default
    ///
    /// Defaults land in the root, in every existing entry of a keyed list,
    /// and in sections (created when missing). Used on `have` before
    /// computing push sets so a want leaf equal to an implicit device default
    /// is not pushed.
    pub fn fill(&self, tree: &ConfigTree, spec: &KeySpec) -> ConfigTree {
        if self.is_empty() {
            return tree.clone();
        }
        let mut map = match tree {
            Value::Object(map) => map.clone(),
            Value::Null => Map::new(),
            other => return other.clone(),
        };
        self.fill_map("", &mut map, spec);
        Value::Object(map)
    }

    fn fill_map(&self, path: &str, map: &mut Map<String, Value>, spec: &KeySpec) {
        for (default_path, default) in &self.entries {
            let Some(rest) = relative(path, default_path) else {
                continue;
            };
            match rest.split_once('.') {
                None => {
                    if map.get(rest).is_none_or(Value::is_null) {
                        map.insert(rest.to_string(), default.clone());
                    }
                }
                Some((first, _)) if !spec.get(first).is_keyed() => {
                    if map.get(first).is_none_or(Value::is_null) {
                        map.insert(first.to_string(), Value::Object(Map::new()));
                    }
                }
                Some(_) => {}
            }
        }

        for (k, v) in map.iter_mut() {
            let field_path = join(path, k);
            let field = spec.get(k);
            match v {
                Value::Object(section) => self.fill_map(&field_path, section, field.nested()),
                Value::Array(items) => {
                    for item in items.iter_mut() {
                        if let Value::Object(entry) = item {
                            self.fill_map(&field_path, entry, field.nested());
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

/// The part of `path` below `prefix`, if any
fn relative<'p>(prefix: &str, path: &'p str) -> Option<&'p str> {
    if prefix.is_empty() {
        return Some(path);
    }
    path.strip_prefix(prefix)?.strip_prefix('.')
}
