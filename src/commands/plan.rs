//! `plan` and `plan-all`: compute without touching the device

use anyhow::{Context as AnyhowContext, Result, bail};
use colored::Colorize;
use rayon::prelude::*;
use reconcile::{
    BoxedSchema, ConfigTree, Facts, Plan, ResourceSchema, State, StateDispatcher, project,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use super::want_for;
use crate::Context;
use crate::cli::{PlanAllArgs, PlanArgs};
use crate::config::{load_want, want_file_in};
use crate::engine::differ::{display_commands, display_plan, display_tree_diff};
use crate::resource;
use crate::state::SnapshotStore;
use crate::ui;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let schema = resource::find(&args.resource)?;
    let state = State::from(args.state);
    let want = want_for(state, args.want.as_deref())?;

    let have = match &args.have {
        Some(path) => load_want(path)?,
        None => ctx.store()?.fetch(schema.name())?,
    };

    let plan = plan_one(schema.as_ref(), state, want.as_ref(), &have)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    display_plan(schema.name(), state, &plan);
    if ctx.verbose > 0 {
        display_commands(&plan);
    }
    if args.diff {
        let projected = project(schema.as_ref(), &have, &plan.commands)?;
        println!();
        display_tree_diff(&have, &projected);
    }
    Ok(())
}

/// Plan one resource against a given have tree
pub fn plan_one(
    schema: &dyn ResourceSchema,
    state: State,
    want: Option<&ConfigTree>,
    have: &ConfigTree,
) -> Result<Plan> {
    StateDispatcher::new(schema)
        .dispatch(state, want, have)
        .with_context(|| format!("Failed to plan {} ({state})", schema.name()))
}

pub fn run_all(ctx: &Context, args: PlanAllArgs) -> Result<()> {
    let state = State::from(args.state);
    let store = ctx.store()?;
    let found = discover(&args.dir);
    if found.is_empty() {
        bail!(
            "No want files in {} (expected <resource>.json or <resource>.toml for one of: {})",
            args.dir.display(),
            resource::names().join(", ")
        );
    }

    // Each plan is independent, so they are computed in parallel and shown
    // in registry order.
    let results: Vec<(&'static str, Result<Plan>)> = found
        .par_iter()
        .map(|(schema, path)| (schema.name(), plan_file(schema.as_ref(), state, path, &store)))
        .collect();

    if args.json {
        let mut out = Map::new();
        for (name, result) in &results {
            let value = match result {
                Ok(plan) => serde_json::to_value(plan)?,
                Err(e) => serde_json::json!({ "error": format!("{e:#}") }),
            };
            out.insert(name.to_string(), value);
        }
        println!("{}", serde_json::to_string_pretty(&Value::Object(out))?);
    } else {
        for (name, result) in &results {
            match result {
                Ok(plan) => display_plan(name, state, plan),
                Err(e) => {
                    println!();
                    ui::error(&format!("{}: {e:#}", name.bold()));
                }
            }
        }
    }

    let failed = results.iter().filter(|(_, r)| r.is_err()).count();
    let pending: usize = results
        .iter()
        .filter_map(|(_, r)| r.as_ref().ok())
        .filter(|plan| !plan.is_empty())
        .count();
    if !args.json {
        println!();
        ui::info(&format!(
            "{} planned, {} with changes",
            ui::count(results.len(), "resource"),
            pending
        ));
    }
    if failed > 0 {
        bail!("{} failed to plan", ui::count(failed, "resource"));
    }
    Ok(())
}

/// Registered resources that have a want file in `dir`
fn discover(dir: &Path) -> Vec<(BoxedSchema, PathBuf)> {
    resource::all()
        .into_iter()
        .filter_map(|schema| {
            let path = want_file_in(dir, schema.name())?;
            log::debug!("{}: want file {}", schema.name(), path.display());
            Some((schema, path))
        })
        .collect()
}

fn plan_file(
    schema: &dyn ResourceSchema,
    state: State,
    path: &Path,
    store: &SnapshotStore,
) -> Result<Plan> {
    let want = load_want(path)?;
    let have = store.fetch(schema.name())?;
    plan_one(schema, state, Some(&want), &have)
}
