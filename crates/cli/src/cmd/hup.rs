//! Hup command implementation
//!
//! Poll the metadata of every resource named by the hooks, keep services
//! running and fire hooks on change.

use clap::Args;
use stackinit_engine::{HupConfig, RetrieveOptions};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use crate::command::Command;
use crate::common::RuntimeContext;
use crate::error::Result;

/// Watch resource metadata and run hooks
#[derive(Debug, Args)]
pub struct HupCommand {
    /// Main hook configuration (default: paths.hup_config from the settings)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory of additional `*.conf` hook files (default: paths.hooks_dir)
    #[arg(long, value_name = "DIR")]
    pub hooks_dir: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,
}

impl HupCommand {
    /// Load the hook configuration named by the arguments or the settings
    ///
    /// # Errors
    ///
    /// Returns an error if the main file is missing or any file is malformed.
    pub fn load_config(&self, context: &RuntimeContext) -> Result<HupConfig> {
        let paths = context.paths();
        let main = self.config.as_ref().unwrap_or(&paths.hup_config);
        let hooks_dir = self.hooks_dir.as_ref().unwrap_or(&paths.hooks_dir);
        Ok(HupConfig::load(main, Some(hooks_dir))?)
    }

    /// One polling pass over every watched resource
    ///
    /// A resource whose metadata cannot be retrieved is skipped for this
    /// pass. Returns the number of resources processed.
    pub fn cycle(context: &RuntimeContext, config: &HupConfig) -> usize {
        let options = RetrieveOptions::from_paths(context.paths())
            .with_credentials_file(&config.credential_file);

        let mut processed = 0;
        for resource in config.unique_resources_get() {
            match context.retrieve(&config.stack, Some(&resource), &options) {
                Ok(mut metadata) => {
                    metadata.cfn_hup(&context.runtime, &config.hooks);
                    processed += 1;
                }
                Err(e) => warn!(resource = %resource, "Skipping resource: {e}"),
            }
        }
        processed
    }
}

impl Command for HupCommand {
    type Output = ();

    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let config = self.load_config(context)?;
        info!(%config, hooks = config.hooks.len(), "Loaded hook configuration");

        loop {
            let processed = Self::cycle(context, &config);
            info!(processed, "Cycle complete");
            if self.once {
                return Ok(());
            }
            thread::sleep(Duration::from_secs(config.interval));
        }
    }
}
