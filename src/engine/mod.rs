//! Plan display and the interactive apply flow
//!
//! Planning itself lives in the `reconcile` crate; this module only renders
//! plans and drives `reconcile::run` with a prompt and a progress bar.

pub mod differ;
pub mod executor;

pub use executor::{ApplyOptions, apply};
