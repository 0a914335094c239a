//! Init command implementation
//!
//! Retrieve the resource metadata and apply its configs to this host.

use clap::Args;
use owo_colors::OwoColorize;

use crate::command::Command;
use crate::common::{CredentialArgs, RuntimeContext};
use crate::error::Result;

/// Apply the resource metadata to this host
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Stack name
    #[arg(short, long)]
    pub stack: Option<String>,

    /// Logical resource ID of this instance
    #[arg(short, long, requires = "stack")]
    pub resource: Option<String>,

    /// Comma-separated configSets to apply (default: "default")
    #[arg(short, long, value_name = "SETS")]
    pub configsets: Option<String>,

    #[command(flatten)]
    pub credentials: CredentialArgs,
}

impl Command for InitCommand {
    type Output = ();

    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let options = self
            .credentials
            .retrieve_options(context.paths(), self.stack.as_deref());
        let mut metadata = context.retrieve(
            self.stack.as_deref().unwrap_or_default(),
            self.resource.as_deref(),
            &options,
        )?;

        metadata.cfn_init(&context.runtime, self.configsets.as_deref())?;

        println!("{} Configuration applied", "✓".green());
        Ok(())
    }
}
