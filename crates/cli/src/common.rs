//! Common utilities and types shared across CLI commands

use crate::error::Result;
use clap::Args;
use stackinit_config::{AgentSettings, PathSettings};
use stackinit_engine::{Metadata, RetrieveOptions, Runtime};
use std::path::PathBuf;
use std::sync::Arc;

/// Runtime context for CLI commands
///
/// Built once per invocation from the agent settings; every command reads
/// host paths from `settings` and reaches processes and HTTP through
/// `runtime`.
pub struct RuntimeContext {
    /// Agent settings (shared so commands can hand them around cheaply)
    pub settings: Arc<AgentSettings>,
    /// Executor and HTTP client
    pub runtime: Runtime,
}

impl RuntimeContext {
    /// Production context for `settings`
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP transport cannot be built from the TLS
    /// settings.
    pub fn new(settings: AgentSettings) -> Result<Self> {
        let runtime = Runtime::from_settings(&settings)?;
        Ok(Self::from_parts(settings, runtime))
    }

    /// Context from explicit parts
    pub fn from_parts(settings: AgentSettings, runtime: Runtime) -> Self {
        Self {
            settings: Arc::new(settings),
            runtime,
        }
    }

    /// Host paths from the settings
    #[inline]
    pub fn paths(&self) -> &PathSettings {
        &self.settings.paths
    }

    /// Retrieve the metadata of `resource` in `stack`
    ///
    /// # Errors
    ///
    /// Returns an error when no metadata source yields a document.
    pub fn retrieve(
        &self,
        stack: &str,
        resource: Option<&str>,
        options: &RetrieveOptions,
    ) -> Result<Metadata> {
        let mut metadata = Metadata::new(stack, resource);
        metadata.retrieve(options, self.runtime.http())?;
        Ok(metadata)
    }
}

/// Credentials for the metadata server
#[derive(Debug, Clone, Default, Args)]
pub struct CredentialArgs {
    /// File with AWSAccessKeyId= and AWSSecretKey= lines
    #[arg(long, value_name = "FILE", conflicts_with = "access_key")]
    pub credential_file: Option<PathBuf>,

    /// Access key used to sign metadata requests
    #[arg(long, value_name = "KEY", requires = "secret_key")]
    pub access_key: Option<String>,

    /// Secret key used to sign metadata requests
    #[arg(long, value_name = "KEY", requires = "access_key")]
    pub secret_key: Option<String>,
}

impl CredentialArgs {
    /// Retrieval options for the host `paths` with these credentials applied
    ///
    /// Without a stack the metadata server cannot be asked, so no
    /// credentials are used at all.
    #[must_use]
    pub fn retrieve_options(&self, paths: &PathSettings, stack: Option<&str>) -> RetrieveOptions {
        let mut options = RetrieveOptions::from_paths(paths);
        if stack.is_none() {
            options.credentials_file = None;
            return options;
        }
        if let (Some(access), Some(secret)) = (&self.access_key, &self.secret_key) {
            options = options.with_keys(access, secret);
        } else if let Some(file) = &self.credential_file {
            options = options.with_credentials_file(file);
        }
        options
    }
}
