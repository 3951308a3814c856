pub mod apply;
pub mod plan;
pub mod resources;
pub mod snapshot;

use anyhow::{Result, bail};
use reconcile::{ConfigTree, State};
use std::path::Path;

use crate::config::load_want;

/// Load the want file, if any, for a declared intent
///
/// Only `deleted` may run without one: it then removes everything, while
/// `overridden` without a want file would do the same by accident.
pub fn want_for(state: State, path: Option<&Path>) -> Result<Option<ConfigTree>> {
    match path {
        Some(path) => Ok(Some(load_want(path)?)),
        None if state == State::Deleted => Ok(None),
        None => bail!("--want is required for state '{}'", state.as_str()),
    }
}
