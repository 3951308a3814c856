//! Resource schema trait
//!
//! A resource schema is the only pluggable part of the engine: the key
//! declarations, defaults and replace boundaries of one resource type, plus
//! the compiler that turns commands into wire requests.

use crate::defaults::DefaultMap;
use crate::error::Result;
use crate::keyspec::KeySpec;
use crate::types::{Command, ConfigTree, Request};
use std::fmt;

static NO_DEFAULTS: DefaultMap = DefaultMap::new();

/// Per-resource schema description
///
/// Consumed by the dispatcher, the synthesizer and the executor.
///
/// # Example
///
/// ```ignore
/// use reconcile::{Command, ConfigTree, KeySpec, Request, ResourceSchema, Result};
///
/// #[derive(Debug)]
/// struct Hostname {
///     spec: KeySpec,
/// }
///
/// impl ResourceSchema for Hostname {
///     fn name(&self) -> &'static str {
///         "hostname"
///     }
///
///     fn description(&self) -> &'static str {
///         "System hostname"
///     }
///
///     fn key_spec(&self) -> &KeySpec {
///         &self.spec
///     }
///
///     fn compile(&self, command: &Command, _have: &ConfigTree) -> Result<Vec<Request>> {
///         let path = "data/openconfig-system:system/config/hostname";
///         if command.is_delete() {
///             return Ok(vec![Request::delete(path)]);
///         }
///         let name = command.config["hostname"].clone();
///         Ok(vec![Request::patch(path, serde_json::json!({ "openconfig-system:hostname": name }))])
///     }
/// }
/// ```
pub trait ResourceSchema: Send + Sync + fmt::Debug {
    /// Resource name, unique within a registry (e.g. "interfaces", "vxlans")
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// Identity declarations for every keyed list, recursively
    fn key_spec(&self) -> &KeySpec;

    /// Schema-declared defaults
    fn defaults(&self) -> &DefaultMap {
        &NO_DEFAULTS
    }

    /// Root list whose entries are the instances for replaced/overridden
    ///
    /// `None` makes the whole root a single instance.
    fn instance_field(&self) -> Option<&'static str> {
        None
    }

    /// Instance fields that replaced may reconcile leaf by leaf
    ///
    /// Any other differing field forces a full-section overwrite of the
    /// instance.
    fn mergeable_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Path that removes everything in one DELETE, if the schema has one
    ///
    /// Without it, wholesale deletes are compiled from a `delete_all`
    /// command.
    fn root_delete_path(&self) -> Option<String> {
        None
    }

    /// Pre-flight checks on the desired config
    fn validate(&self, _want: &ConfigTree) -> Result<()> {
        Ok(())
    }

    /// Translate a command into wire requests
    ///
    /// `have` is the tree the plan starts from, for deletes that must name
    /// dependents the command does not carry. Must order dependent deletes
    /// children-first. Returning no requests means the command has no device
    /// impact and it is dropped.
    fn compile(&self, command: &Command, have: &ConfigTree) -> Result<Vec<Request>>;
}

/// A boxed schema for type-erased registries
pub type BoxedSchema = Box<dyn ResourceSchema>;
