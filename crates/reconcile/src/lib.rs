//! # Reconcile
//!
//! A generic want-vs-have reconciliation engine for semi-structured
//! switch configuration.
//!
//! Given the desired configuration of one resource (`want`), the device's
//! current configuration (`have`) and a declared intent, the engine computes
//! the commands that describe the change and the wire requests that apply it.
//!
//! ## Core Concepts
//!
//! - **ConfigTree**: nested mappings, sequences and scalars (`serde_json::Value`)
//! - **KeySpec**: which fields identify the entries of each list, recursively
//! - **Key Matcher**: joins two lists by identity ([`match_entries`])
//! - **Tree Differencer**: what of one tree is absent from another ([`diff`])
//! - **StateDispatcher**: `merged`, `replaced`, `overridden` and `deleted`
//! - **Synthesizer**: predicts the post-apply tree ([`project`])
//! - **ResourceSchema**: the pluggable per-resource description and compiler
//!
//! ## Example
//!
//! ```ignore
//! use reconcile::{ExecuteOptions, StaticFacts, State, run_simple};
//!
//! let facts = StaticFacts::new().with("interfaces", have);
//! let outcome = run_simple(
//!     &Interfaces::new(),
//!     ExecuteOptions { state: State::Merged, check_mode: true },
//!     Some(&want),
//!     &facts,
//!     &transport,
//! )?;
//!
//! for request in &outcome.requests {
//!     println!("{request}");
//! }
//! ```
//!
//! ## Provider Traits
//!
//! - [`Facts`]: fetches the have tree of a resource
//! - [`Transport`]: applies requests to the device
//! - [`ProgressCallback`]: receives progress updates
//!
//! The engine itself does no I/O.

pub mod context;
pub mod defaults;
pub mod diff;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod keyspec;
pub mod matcher;
pub mod projection;
pub mod resource;
pub mod tree;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types at crate root
pub use context::{Facts, NoProgress, ProgressCallback, StaticFacts, Transport};
pub use defaults::DefaultMap;
pub use diff::{common, diff, keep_bare, normalize_lists, whole};
pub use dispatcher::StateDispatcher;
pub use error::{Error, Result};
pub use executor::{Outcome, run, run_simple};
pub use keyspec::{CustomDelete, DeleteOperator, FieldSpec, KeySpec};
pub use matcher::{KeyTuple, Match, key_of, match_entries};
pub use projection::project;
pub use resource::{BoxedSchema, ResourceSchema};
pub use tree::{is_empty_tree, prune_nulls, values_equal};
pub use types::{
    Command, ConfigTree, ExecuteOptions, ExecuteSummary, Method, Plan, Request, State, empty_tree,
};
