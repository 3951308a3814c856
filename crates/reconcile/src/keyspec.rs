//! Key declarations for configuration trees
//!
//! A [`KeySpec`] describes, per field name, how the engine treats that field:
//! which fields identify the entries of a list, which specs apply inside the
//! entries or sections, and how the field is removed when a delete names it.

use crate::error::Result;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Signature of a custom delete operator
///
/// Called with the parent mapping, the field name and the value named by
/// the delete command.
pub type CustomDelete = dyn Fn(&mut Map<String, Value>, &str, &Value) -> Result<()> + Send + Sync;

/// How a field is removed from a projected tree
#[derive(Clone, Default)]
pub enum DeleteOperator {
    /// Remove the leaf or entry outright
    #[default]
    Default,
    /// Put the schema default back in place (removes when no default exists)
    RestoreDefault,
    /// Remove the leaf, then the parent too once no non-key leaf remains
    DeleteParentIfEmpty,
    /// Resource-specific removal
    Custom(Arc<CustomDelete>),
}

impl DeleteOperator {
    /// Wrap a closure as a custom operator
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&mut Map<String, Value>, &str, &Value) -> Result<()> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }
}

impl fmt::Debug for DeleteOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::RestoreDefault => f.write_str("RestoreDefault"),
            Self::DeleteParentIfEmpty => f.write_str("DeleteParentIfEmpty"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Declaration for a single field
#[derive(Debug, Clone, Default)]
pub struct FieldSpec {
    identity: Vec<String>,
    nested: KeySpec,
    delete_op: DeleteOperator,
}

static LEAF: FieldSpec = FieldSpec {
    identity: Vec::new(),
    nested: KeySpec::new(),
    delete_op: DeleteOperator::Default,
};

impl FieldSpec {
    /// A scalar leaf, a plain section or a list keyed by whole value
    pub fn leaf() -> Self {
        Self::default()
    }

    /// A list of mappings identified by the given fields
    ///
    /// Empty names are ignored, so `[""]` declares a list keyed by whole
    /// value.
    pub fn list<I, S>(identity: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identity: identity
                .into_iter()
                .map(Into::into)
                .filter(|k: &String| !k.is_empty())
                .collect(),
            ..Self::default()
        }
    }

    /// A mapping field whose own fields carry declarations
    pub fn section(nested: KeySpec) -> Self {
        Self {
            nested,
            ..Self::default()
        }
    }

    /// Declarations for the fields inside entries or the section
    pub fn with_nested(mut self, nested: KeySpec) -> Self {
        self.nested = nested;
        self
    }

    /// Attach a delete operator
    pub fn with_delete_op(mut self, op: DeleteOperator) -> Self {
        self.delete_op = op;
        self
    }

    /// Identity fields, empty unless this is a keyed list
    pub fn identity(&self) -> &[String] {
        &self.identity
    }

    pub fn nested(&self) -> &KeySpec {
        &self.nested
    }

    pub fn delete_op(&self) -> &DeleteOperator {
        &self.delete_op
    }

    /// Check if entries are identified by declared fields
    pub fn is_keyed(&self) -> bool {
        !self.identity.is_empty()
    }
}

/// Field declarations for one level of a tree
#[derive(Debug, Clone, Default)]
pub struct KeySpec {
    fields: BTreeMap<String, FieldSpec>,
}

impl KeySpec {
    pub const fn new() -> Self {
        Self {
            fields: BTreeMap::new(),
        }
    }

    /// Declare a field
    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.insert(name.into(), spec);
        self
    }

    /// Declare a keyed list field
    pub fn list<I, S>(self, name: impl Into<String>, identity: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field(name, FieldSpec::list(identity))
    }

    /// Declare a keyed list field with declarations for its entries
    pub fn list_with<I, S>(self, name: impl Into<String>, identity: I, nested: KeySpec) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field(name, FieldSpec::list(identity).with_nested(nested))
    }

    /// Declare a section field with declarations for its fields
    pub fn section(self, name: impl Into<String>, nested: KeySpec) -> Self {
        self.field(name, FieldSpec::section(nested))
    }

    /// Declaration for a field, a plain leaf when undeclared
    pub fn get(&self, name: &str) -> &FieldSpec {
        self.fields.get(name).unwrap_or(&LEAF)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldSpec)> {
        self.fields.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
