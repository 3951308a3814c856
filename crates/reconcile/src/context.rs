//! Collaborator traits
//!
//! These traits keep the engine free of any transport, facts source or UI:
//! the executor only needs a way to fetch a have tree, a way to send a
//! request, and somewhere to report progress.

use crate::error::Result;
use crate::types::{ConfigTree, Request, empty_tree};
use std::collections::HashMap;

/// Source of the device's current configuration
pub trait Facts {
    /// Fetch the have tree of one resource
    ///
    /// A resource with no configuration yields an empty tree, not an error.
    fn fetch(&self, resource: &str) -> Result<ConfigTree>;

    /// Called after every request of an invocation was applied
    ///
    /// Sources that read live device state ignore this; snapshot-backed
    /// sources record the projected tree so the next fetch sees it.
    fn record_applied(&self, _resource: &str, _tree: &ConfigTree) -> Result<()> {
        Ok(())
    }
}

/// Applies wire requests to the device
///
/// Failures are returned as [`crate::Error::Transport`] and are never
/// retried.
pub trait Transport {
    /// Apply a single request
    fn send(&self, request: &Request) -> Result<()>;

    /// Apply requests in order, stopping at the first failure
    ///
    /// There is no rollback: earlier requests stay applied.
    fn submit(&self, requests: &[Request]) -> Result<()> {
        for request in requests {
            self.send(request)?;
        }
        Ok(())
    }
}

/// Progress callback for request submission
pub trait ProgressCallback {
    /// Called before the first request is sent
    fn on_batch_start(&mut self, count: usize);

    /// Called before a request is sent
    fn on_request_start(&mut self, request: &Request);

    /// Called after a request was sent
    fn on_request_complete(&mut self, request: &Request, ok: bool);

    /// Called after the last request was sent
    fn on_batch_complete(&mut self);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_batch_start(&mut self, _count: usize) {}
    fn on_request_start(&mut self, _request: &Request) {}
    fn on_request_complete(&mut self, _request: &Request, _ok: bool) {}
    fn on_batch_complete(&mut self) {}
}

/// Facts held in memory, keyed by resource name
#[derive(Debug, Clone, Default)]
pub struct StaticFacts {
    trees: HashMap<String, ConfigTree>,
}

impl StaticFacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the have tree of a resource
    pub fn with(mut self, resource: impl Into<String>, tree: ConfigTree) -> Self {
        self.trees.insert(resource.into(), tree);
        self
    }
}

impl Facts for StaticFacts {
    fn fetch(&self, resource: &str) -> Result<ConfigTree> {
        Ok(self.trees.get(resource).cloned().unwrap_or_else(empty_tree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_static_facts_default_to_empty() {
        let facts = StaticFacts::new().with("interfaces", json!({"interfaces": []}));
        assert_eq!(
            facts.fetch("interfaces").unwrap(),
            json!({"interfaces": []})
        );
        assert_eq!(facts.fetch("mclag").unwrap(), json!({}));
    }
}
