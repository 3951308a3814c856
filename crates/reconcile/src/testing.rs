//! Schema used by the engine's own tests
//!
//! Compiles commands onto a fake `data/test:root` tree: one PATCH per root
//! field, and one DELETE per named leaf, entry or section.

use crate::defaults::DefaultMap;
use crate::error::{Error, Result};
use crate::keyspec::KeySpec;
use crate::resource::ResourceSchema;
use crate::tree::has_non_key_leaf;
use crate::types::{Command, ConfigTree, Request};
use serde_json::{Map, Value};

const ROOT: &str = "data/test:root";

#[derive(Debug, Default)]
pub struct TestSchema {
    spec: KeySpec,
    defaults: DefaultMap,
    instance_field: Option<&'static str>,
    mergeable: &'static [&'static str],
    root_delete: Option<String>,
    silent: &'static [&'static str],
    rejected: Option<&'static str>,
}

impl TestSchema {
    pub fn new(spec: KeySpec) -> Self {
        Self {
            spec,
            ..Self::default()
        }
    }

    pub fn with_defaults(mut self, defaults: DefaultMap) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_instances(
        mut self,
        field: &'static str,
        mergeable: &'static [&'static str],
    ) -> Self {
        self.instance_field = Some(field);
        self.mergeable = mergeable;
        self
    }

    pub fn with_mergeable(mut self, mergeable: &'static [&'static str]) -> Self {
        self.mergeable = mergeable;
        self
    }

    pub fn with_root_delete(mut self, path: &str) -> Self {
        self.root_delete = Some(path.to_string());
        self
    }

    /// Root fields that compile to nothing
    pub fn silent(mut self, fields: &'static [&'static str]) -> Self {
        self.silent = fields;
        self
    }

    /// Root field that fails validation whenever it is present
    pub fn rejecting(mut self, field: &'static str) -> Self {
        self.rejected = Some(field);
        self
    }
}

impl ResourceSchema for TestSchema {
    fn name(&self) -> &'static str {
        "test"
    }

    fn description(&self) -> &'static str {
        "Test resource"
    }

    fn key_spec(&self) -> &KeySpec {
        &self.spec
    }

    fn defaults(&self) -> &DefaultMap {
        &self.defaults
    }

    fn instance_field(&self) -> Option<&'static str> {
        self.instance_field
    }

    fn mergeable_fields(&self) -> &'static [&'static str] {
        self.mergeable
    }

    fn root_delete_path(&self) -> Option<String> {
        self.root_delete.clone()
    }

    fn validate(&self, want: &ConfigTree) -> Result<()> {
        match self.rejected {
            Some(field) if want.get(field).is_some() => {
                Err(Error::validation(field, "rejected by test schema"))
            }
            _ => Ok(()),
        }
    }

    fn compile(&self, command: &Command, _have: &ConfigTree) -> Result<Vec<Request>> {
        let Value::Object(config) = &command.config else {
            return Ok(Vec::new());
        };
        let mut requests = Vec::new();
        if command.is_delete() {
            deletes(ROOT, config, &self.spec, command.delete_all, &mut requests);
        } else {
            for (k, v) in config {
                if !self.silent.contains(&k.as_str()) {
                    let mut data = Map::new();
                    data.insert(k.clone(), v.clone());
                    requests.push(Request::patch(format!("{ROOT}/{k}"), Value::Object(data)));
                }
            }
        }
        Ok(requests)
    }
}

fn deletes(
    path: &str,
    config: &Map<String, Value>,
    spec: &KeySpec,
    all: bool,
    out: &mut Vec<Request>,
) {
    for (k, v) in config {
        let field_path = format!("{path}/{k}");
        let field = spec.get(k);
        match v {
            Value::Object(section) if all || section.is_empty() => {
                out.push(Request::delete(field_path));
            }
            Value::Object(section) => deletes(&field_path, section, field.nested(), false, out),
            Value::Array(items) if field.is_keyed() => {
                for item in items {
                    let Value::Object(entry) = item else { continue };
                    let key: Vec<String> = field
                        .identity()
                        .iter()
                        .map(|id| entry.get(id).map(segment).unwrap_or_default())
                        .collect();
                    let entry_path = format!("{field_path}={}", key.join(","));
                    if all || !has_non_key_leaf(entry, field.identity()) {
                        out.push(Request::delete(entry_path));
                    } else {
                        let rest: Map<String, Value> = entry
                            .iter()
                            .filter(|(k, _)| !field.identity().contains(k))
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect();
                        deletes(&entry_path, &rest, field.nested(), false, out);
                    }
                }
            }
            Value::Array(items) => {
                for item in items {
                    out.push(Request::delete(format!("{field_path}={}", segment(item))));
                }
            }
            _ => out.push(Request::delete(field_path)),
        }
    }
}

fn segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
