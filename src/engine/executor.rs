//! Apply flow with confirmation and progress

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use reconcile::{
    ConfigTree, ExecuteOptions, ExecuteSummary, Facts, Plan, ResourceSchema, State, Transport,
    NoProgress, run, run_simple,
};

use super::differ::{display_plan, display_tree_diff};
use crate::progress::RequestProgress;

/// Options for one `apply`
#[derive(Debug, Clone, Copy)]
pub struct ApplyOptions {
    pub state: State,
    /// Show what would change, send nothing
    pub check: bool,
    /// Skip the confirmation prompt
    pub yes: bool,
    /// Show a line diff of the configuration
    pub diff: bool,
    /// No progress bar
    pub quiet: bool,
}

/// What happened to one resource
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub changed: bool,
    pub aborted: bool,
    pub summary: ExecuteSummary,
}

/// Preview, confirm, then submit
///
/// The preview is a check-mode run against the same facts, so the requests
/// shown are the requests sent.
pub fn apply(
    schema: &dyn ResourceSchema,
    want: Option<&ConfigTree>,
    facts: &dyn Facts,
    transport: &dyn Transport,
    opts: ApplyOptions,
) -> Result<ApplyReport> {
    let name = schema.name();
    let check = ExecuteOptions {
        state: opts.state,
        check_mode: true,
    };
    let preview = run_simple(schema, check, want, facts, transport)
        .with_context(|| format!("Failed to plan {name}"))?;

    let plan = Plan {
        commands: preview.commands,
        requests: preview.requests,
    };
    display_plan(name, opts.state, &plan);
    if opts.diff {
        println!();
        display_tree_diff(&preview.before, &preview.projected);
    }

    if plan.is_empty() {
        return Ok(ApplyReport::default());
    }

    if opts.check {
        println!();
        println!("  {} Check mode - no changes made", "ℹ".blue());
        return Ok(ApplyReport {
            changed: true,
            ..Default::default()
        });
    }

    if !opts.yes && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(ApplyReport {
            aborted: true,
            ..Default::default()
        });
    }

    let send = ExecuteOptions {
        state: opts.state,
        check_mode: false,
    };
    let outcome = if opts.quiet {
        run(schema, send, want, facts, transport, &mut NoProgress)
    } else {
        run(schema, send, want, facts, transport, &mut RequestProgress::new())
    }
    .with_context(|| format!("Failed to apply {name}"))?;

    print_summary(name, &outcome.summary);
    Ok(ApplyReport {
        changed: outcome.changed,
        aborted: false,
        summary: outcome.summary,
    })
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Send these requests?")
        .default(false)
        .interact()?;

    Ok(confirmed)
}

/// Print final summary
fn print_summary(resource: &str, summary: &ExecuteSummary) {
    println!();
    println!("  {} {} applied", "✓".green().bold(), resource.bold());
    if summary.deleted > 0 {
        println!("    • {} sent", crate::ui::count(summary.deleted, "delete"));
    }
    if summary.patched > 0 {
        println!("    • {} sent", crate::ui::count(summary.patched, "patch"));
    }
}
