use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use reconcile::State;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "sonic-cfg")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Declarative want-vs-have configuration for SONiC switches", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to ~/.config/sonic-cfg/config.toml)
    #[arg(long, global = true, env = "SONIC_CFG_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show the commands and requests that would reconcile a resource
    Plan(PlanArgs),

    /// Reconcile a resource on the device
    Apply(ApplyArgs),

    /// Plan every resource that has a want file in a directory
    PlanAll(PlanAllArgs),

    /// List resources, or describe one
    Resources {
        /// Resource to describe
        name: Option<String>,
    },

    /// Show the stored snapshot of a resource, or replace it from a file
    Snapshot(SnapshotArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Arguments
// ============================================================================

/// Declared intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StateArg {
    /// Add and update, never remove
    Merged,
    /// Replace each named instance
    Replaced,
    /// Make the resource exactly match the want file
    Overridden,
    /// Remove what the want file names, or everything
    Deleted,
}

impl From<StateArg> for State {
    fn from(state: StateArg) -> Self {
        match state {
            StateArg::Merged => State::Merged,
            StateArg::Replaced => State::Replaced,
            StateArg::Overridden => State::Overridden,
            StateArg::Deleted => State::Deleted,
        }
    }
}

#[derive(Args)]
pub struct PlanArgs {
    /// Resource name (see `sonic-cfg resources`)
    pub resource: String,

    /// Declared intent
    #[arg(short, long, value_enum, default_value = "merged")]
    pub state: StateArg,

    /// Desired configuration (.json or .toml)
    #[arg(short, long)]
    pub want: Option<PathBuf>,

    /// Current configuration to plan against instead of the stored snapshot
    #[arg(long)]
    pub have: Option<PathBuf>,

    /// Show a line diff of the current and projected configuration
    #[arg(long)]
    pub diff: bool,

    /// Print the plan as JSON
    #[arg(long, conflicts_with = "diff")]
    pub json: bool,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Resource name (see `sonic-cfg resources`)
    pub resource: String,

    /// Declared intent
    #[arg(short, long, value_enum, default_value = "merged")]
    pub state: StateArg,

    /// Desired configuration (.json or .toml)
    #[arg(short, long)]
    pub want: Option<PathBuf>,

    /// Show what would change without sending anything
    #[arg(long)]
    pub check: bool,

    /// Show a line diff of the current and projected configuration
    #[arg(long)]
    pub diff: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Args)]
pub struct PlanAllArgs {
    /// Declared intent
    #[arg(short, long, value_enum, default_value = "merged")]
    pub state: StateArg,

    /// Directory holding `<resource>.json` or `<resource>.toml` files
    #[arg(short, long, default_value = ".")]
    pub dir: PathBuf,

    /// Print the plans as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct SnapshotArgs {
    /// Resource name (see `sonic-cfg resources`)
    pub resource: String,

    /// Replace the snapshot with this file (.json or .toml)
    #[arg(long)]
    pub from: Option<PathBuf>,
}
