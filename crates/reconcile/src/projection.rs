//! Projected-config synthesizer
//!
//! Replays commands against a copy of `have` to predict the tree the device
//! ends up with. The result feeds check-mode previews and diff rendering;
//! it is never sent to a device.

use crate::defaults::DefaultMap;
use crate::diff::whole;
use crate::error::Result;
use crate::keyspec::{DeleteOperator, FieldSpec, KeySpec};
use crate::matcher::{key_of, position_of};
use crate::resource::ResourceSchema;
use crate::tree::{
    has_non_key_leaf, identity_only, join, normalize_root, prune_nulls, values_equal,
};
use crate::types::{Command, ConfigTree};
use log::trace;
use serde_json::{Map, Value};

/// Predict the tree after applying `commands` to `have`, in order
pub fn project<S: ResourceSchema + ?Sized>(
    schema: &S,
    have: &ConfigTree,
    commands: &[Command],
) -> Result<ConfigTree> {
    let projector = Projector {
        spec: schema.key_spec(),
        defaults: schema.defaults(),
    };
    let mut tree = match normalize_root(have)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };

    for command in commands {
        let Value::Object(config) = &command.config else {
            continue;
        };
        trace!("project: replaying {} command", command.state);
        if command.delete_all {
            let script: Map<String, Value> = config
                .iter()
                .map(|(k, v)| (k.clone(), whole(v, projector.spec.get(k))))
                .collect();
            projector.delete(&mut tree, &script)?;
        } else if command.is_delete() {
            projector.delete(&mut tree, config)?;
        } else {
            merge_map("", &mut tree, config, projector.spec)?;
        }
    }

    Ok(Value::Object(tree))
}

/// Deep-merge `source` into `target`
///
/// Keyed entries are matched by identity and merged field by field, new
/// entries are appended, and whole-value lists take the union.
fn merge_map(
    path: &str,
    target: &mut Map<String, Value>,
    source: &Map<String, Value>,
    spec: &KeySpec,
) -> Result<()> {
    for (k, v) in source {
        if v.is_null() {
            continue;
        }
        let field = spec.get(k);
        let field_path = join(path, k);
        match (target.get_mut(k), v) {
            (Some(Value::Object(t)), Value::Object(s)) => {
                merge_map(&field_path, t, s, field.nested())?;
            }
            (Some(Value::Array(t)), Value::Array(s)) => merge_list(&field_path, t, s, field)?,
            _ => {
                target.insert(k.clone(), prune_nulls(v));
            }
        }
    }
    Ok(())
}

fn merge_list(
    path: &str,
    target: &mut Vec<Value>,
    source: &[Value],
    field: &FieldSpec,
) -> Result<()> {
    let identity = field.identity();
    for item in source {
        if !field.is_keyed() {
            if !target.iter().any(|t| values_equal(t, item)) {
                target.push(prune_nulls(item));
            }
            continue;
        }
        let key = key_of(path, item, identity)?;
        match position_of(path, target, &key, identity)? {
            Some(pos) => match (&mut target[pos], item) {
                (Value::Object(t), Value::Object(s)) => merge_map(path, t, s, field.nested())?,
                (slot, _) => *slot = prune_nulls(item),
            },
            None => target.push(prune_nulls(item)),
        }
    }
    Ok(())
}

struct Projector<'a> {
    spec: &'a KeySpec,
    defaults: &'a DefaultMap,
}

impl Projector<'_> {
    fn delete(&self, tree: &mut Map<String, Value>, script: &Map<String, Value>) -> Result<()> {
        self.delete_map("", tree, script, self.spec, &[])?;
        Ok(())
    }

    /// Apply a delete script to one mapping
    ///
    /// Returns true when a `DeleteParentIfEmpty` field asks for the mapping
    /// itself to go.
    fn delete_map(
        &self,
        path: &str,
        target: &mut Map<String, Value>,
        script: &Map<String, Value>,
        spec: &KeySpec,
        identity: &[String],
    ) -> Result<bool> {
        let mut remove_parent = false;
        for (k, named) in script {
            if named.is_null() || identity.iter().any(|id| id == k) || !target.contains_key(k) {
                continue;
            }
            let field = spec.get(k);
            let field_path = join(path, k);
            match field.delete_op() {
                DeleteOperator::Default => {
                    self.remove(&field_path, target, k, named, field, false)?;
                }
                DeleteOperator::RestoreDefault => {
                    self.remove(&field_path, target, k, named, field, true)?;
                }
                DeleteOperator::DeleteParentIfEmpty => {
                    self.remove(&field_path, target, k, named, field, false)?;
                    if !has_non_key_leaf(target, identity) {
                        remove_parent = true;
                    }
                }
                DeleteOperator::Custom(op) => (**op)(target, k, named)?,
            }
        }
        Ok(remove_parent)
    }

    fn remove(
        &self,
        path: &str,
        parent: &mut Map<String, Value>,
        k: &str,
        named: &Value,
        field: &FieldSpec,
        restore: bool,
    ) -> Result<()> {
        let emptied = match (parent.get_mut(k), named) {
            (Some(Value::Object(section)), Value::Object(script)) if !script.is_empty() => {
                let drop = self.delete_map(path, section, script, field.nested(), &[])?;
                drop || section.is_empty()
            }
            (Some(Value::Array(items)), Value::Array(script)) => {
                self.delete_list(path, items, script, field, restore)?;
                items.is_empty()
            }
            _ => true,
        };
        if !emptied {
            return Ok(());
        }
        match self.defaults.get(path) {
            Some(default) if restore && !default.is_object() && !default.is_array() => {
                parent.insert(k.to_string(), default.clone());
            }
            _ => {
                parent.remove(k);
            }
        }
        Ok(())
    }

    fn delete_list(
        &self,
        path: &str,
        items: &mut Vec<Value>,
        script: &[Value],
        field: &FieldSpec,
        retain_entries: bool,
    ) -> Result<()> {
        if !field.is_keyed() {
            items.retain(|item| !script.iter().any(|named| values_equal(item, named)));
            return Ok(());
        }

        let identity = field.identity();
        for named in script {
            let Value::Object(named_map) = named else {
                continue;
            };
            let key = key_of(path, named, identity)?;
            let Some(pos) = position_of(path, items, &key, identity)? else {
                continue;
            };
            let Value::Object(entry) = &mut items[pos] else {
                continue;
            };
            let remove_entry = if has_non_key_leaf(named_map, identity) {
                self.delete_map(path, entry, named_map, field.nested(), identity)?
            } else if retain_entries {
                *entry = identity_only(entry, identity);
                false
            } else {
                true
            };
            if remove_entry {
                items.remove(pos);
            }
        }
        Ok(())
    }
}
