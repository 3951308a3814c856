//! Core types for want-vs-have reconciliation

use crate::error::Error;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// A semi-structured configuration fragment (want or have)
///
/// Scalars, sequences and string-keyed mappings, nested freely. The engine
/// enforces no schema; identity and defaults come from the resource schema.
pub type ConfigTree = Value;

/// An empty configuration tree (the empty mapping)
pub fn empty_tree() -> ConfigTree {
    Value::Object(Map::new())
}

/// Declared reconciliation intent for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// Add or overwrite the named leaves, never delete
    Merged,
    /// Overwrite each named instance, leave the others alone
    Replaced,
    /// Make have identical to want
    Overridden,
    /// Remove the named config, or everything when want is empty
    Deleted,
}

impl State {
    /// All states, in declaration order
    pub const ALL: [Self; 4] = [Self::Merged, Self::Replaced, Self::Overridden, Self::Deleted];

    /// Lowercase name as used on the command line and in commands
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Merged => "merged",
            Self::Replaced => "replaced",
            Self::Overridden => "overridden",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for State {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| Error::InvalidState(s.to_string()))
    }
}

/// Wire method of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patch => f.write_str("PATCH"),
            Self::Delete => f.write_str("DELETE"),
        }
    }
}

/// A single wire operation against a device path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Path relative to the device's RESTCONF root
    pub path: String,
    pub method: Method,
    /// Payload, only for PATCH
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Request {
    /// A PATCH carrying a payload
    pub fn patch(path: impl Into<String>, data: Value) -> Self {
        Self {
            path: path.into(),
            method: Method::Patch,
            data: Some(data),
        }
    }

    /// A DELETE of a path
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method: Method::Delete,
            data: None,
        }
    }

    pub fn is_delete(&self) -> bool {
        self.method == Method::Delete
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// A diff tagged with the intent that produced it
///
/// For `deleted` commands the tree reads as a delete script: a scalar leaf
/// names a leaf to remove, a keyed entry carrying only its identity fields
/// names the whole entry, and an empty mapping names the whole section.
/// `delete_all` marks a wholesale delete of everything in `config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub state: State,
    pub config: ConfigTree,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub delete_all: bool,
}

impl Command {
    pub fn new(state: State, config: ConfigTree) -> Self {
        Self {
            state,
            config,
            delete_all: false,
        }
    }

    /// A wholesale delete of `have`
    pub fn delete_all(have: ConfigTree) -> Self {
        Self {
            state: State::Deleted,
            config: have,
            delete_all: true,
        }
    }

    pub fn is_delete(&self) -> bool {
        self.state == State::Deleted
    }
}

/// The commands and requests computed for one invocation
///
/// Requests follow command order, so every delete precedes every patch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Plan {
    pub commands: Vec<Command>,
    pub requests: Vec<Request>,
}

impl Plan {
    /// Check if the plan changes nothing
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Number of DELETE requests
    pub fn deletes(&self) -> usize {
        self.requests.iter().filter(|r| r.is_delete()).count()
    }

    /// Number of PATCH requests
    pub fn patches(&self) -> usize {
        self.requests.len() - self.deletes()
    }
}

/// Summary of requests sent to the device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub patched: usize,
    pub deleted: usize,
}

impl ExecuteSummary {
    /// Total number of requests sent
    pub fn total(&self) -> usize {
        self.patched + self.deleted
    }

    /// Count one sent request
    pub fn add_request(&mut self, request: &Request) {
        match request.method {
            Method::Patch => self.patched += 1,
            Method::Delete => self.deleted += 1,
        }
    }

    /// Merge another summary into this one
    pub fn merge(&mut self, other: &ExecuteSummary) {
        self.patched += other.patched;
        self.deleted += other.deleted;
    }
}

/// Options for one invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecuteOptions {
    pub state: State,
    /// Compute requests but never submit them
    pub check_mode: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            state: State::Merged,
            check_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_round_trips_through_str() {
        for state in State::ALL {
            assert_eq!(state.as_str().parse::<State>().unwrap(), state);
        }
        assert!(matches!(
            "purged".parse::<State>(),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_request_serialization_skips_missing_data() {
        let request = Request::delete("data/openconfig-ars:ars");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"path": "data/openconfig-ars:ars", "method": "DELETE"})
        );
        assert_eq!(request.to_string(), "DELETE data/openconfig-ars:ars");
    }

    #[test]
    fn test_command_serialization_hides_delete_all_when_unset() {
        let command = Command::new(State::Merged, json!({"mtu": 9100}));
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value, json!({"state": "merged", "config": {"mtu": 9100}}));

        let command = Command::delete_all(json!({"a": 1}));
        let value = serde_json::to_value(&command).unwrap();
        assert_eq!(value["delete_all"], json!(true));
    }

    #[test]
    fn test_summary_counts_methods() {
        let mut summary = ExecuteSummary::default();
        summary.add_request(&Request::delete("a"));
        summary.add_request(&Request::patch("b", json!({})));
        summary.add_request(&Request::patch("c", json!({})));
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.patched, 2);
        assert_eq!(summary.total(), 3);
    }
}
