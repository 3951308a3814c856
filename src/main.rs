mod cli;
mod commands;
mod config;
mod engine;
mod progress;
mod resource;
mod state;
mod transport;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::path::PathBuf;

use crate::config::Config;
use crate::state::SnapshotStore;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config_path: Option<PathBuf>,
}

impl Context {
    /// Load the config file named on the command line, or the default one
    pub fn config(&self) -> Result<Config> {
        Config::load(self.config_path.as_deref())
    }

    /// Snapshot store from the configured state directory
    pub fn store(&self) -> Result<SnapshotStore> {
        Ok(SnapshotStore::new(self.config()?.state_dir()))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config_path: cli.config,
    };

    match cli.command {
        Command::Plan(args) => commands::plan::run(&ctx, args),
        Command::Apply(args) => commands::apply::run(&ctx, args),
        Command::PlanAll(args) => commands::plan::run_all(&ctx, args),
        Command::Resources { name } => commands::resources::run(name.as_deref()),
        Command::Snapshot(args) => commands::snapshot::run(&ctx, args),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "sonic-cfg", &mut io::stdout());
            Ok(())
        }
    }
}
