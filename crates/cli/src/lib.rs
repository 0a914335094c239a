//! stackinit CLI library
//!
//! This library contains all the CLI logic for stackinit, making it reusable
//! for testing.

pub mod cmd;
pub mod command;
pub mod common;
pub mod error;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stackinit_config::{AgentSettings, logging};
use std::path::PathBuf;

use command::Command;
use common::RuntimeContext;

/// stackinit - configure an instance from its stack metadata
#[derive(Parser)]
#[command(name = "stackinit")]
#[command(about = "Configure this instance from its orchestration stack metadata")]
#[command(version)]
#[command(long_about = "Configure this instance from its orchestration stack metadata

The metadata of a stack resource carries an init document describing
packages, users, files, commands and services. stackinit applies it once at
boot (init), keeps watching it afterwards (hup), and reports back to the
orchestrator (signal).")]
pub struct Cli {
    /// Enable verbose output (shows DEBUG level logs)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to a file (useful for debugging)
    #[arg(long, env = "STACKINIT_LOG_FILE", value_name = "FILE", global = true)]
    pub log_file: Option<PathBuf>,

    /// Path to the agent settings file
    #[arg(long, env = "STACKINIT_SETTINGS", value_name = "FILE", global = true)]
    pub settings: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for the stackinit CLI
#[derive(Subcommand)]
pub enum Commands {
    /// Retrieve the resource metadata and apply it to this host
    Init(cmd::init::InitCommand),

    /// Watch resource metadata, keep services running and run hooks
    #[command(long_about = "Watch resource metadata, keep services running and run hooks

Hooks are read from the main hook file ([main] with stack, credential-file,
region and interval) and every *.conf file in the hooks directory. Each
cycle retrieves the metadata of every resource a hook refers to, restarts
services that should be running, and fires post.update hooks when the
metadata changed.

Examples:
  • stackinit hup
      → Poll forever using /etc/cfn/cfn-hup.conf

  • stackinit hup --once --config ./cfn-hup.conf
      → Run a single cycle with a local hook file")]
    Hup(cmd::hup::HupCommand),

    /// Print the metadata of a resource
    #[command(name = "get-metadata")]
    GetMetadata(cmd::get_metadata::GetMetadataCommand),

    /// Signal a wait condition
    Signal(cmd::signal::SignalCommand),
}

/// Run the CLI application
///
/// # Errors
///
/// Returns an error when logging, settings or the command itself fail.
pub fn run(cli: Cli) -> Result<()> {
    logging::init(cli.verbose, cli.log_file.as_deref())?;

    let settings = AgentSettings::discover(cli.settings.as_deref())
        .context("Failed to load agent settings")?;
    let context = RuntimeContext::new(settings).context("Failed to initialise runtime")?;

    execute_command(cli.command, &context)
}

fn execute_command(command: Commands, context: &RuntimeContext) -> Result<()> {
    match command {
        Commands::Init(cmd) => cmd.execute(context).context("init failed")?,
        Commands::Hup(cmd) => cmd.execute(context).context("hup failed")?,
        Commands::GetMetadata(cmd) => cmd.execute(context).context("get-metadata failed")?,
        Commands::Signal(cmd) => cmd.execute(context).context("signal failed")?,
    }
    Ok(())
}
