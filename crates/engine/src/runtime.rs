//! Process-wide collaborators, assembled once by the binary

use crate::command::{Executor, SystemExecutor};
use crate::Result;
use stackinit_config::AgentSettings;
use stackinit_http::{HttpClient, ReqwestTransport};

/// Collaborators shared by every operation of one agent run
pub struct Runtime {
    executor: Box<dyn Executor>,
    http: HttpClient,
    run_as: String,
}

impl Runtime {
    /// Assemble a runtime from explicit parts; commands run as `root`
    pub fn new(executor: impl Executor + 'static, http: HttpClient) -> Self {
        Self {
            executor: Box::new(executor),
            http,
            run_as: stackinit_config::settings::DEFAULT_RUN_AS.to_string(),
        }
    }

    /// The production runtime described by `settings`
    pub fn from_settings(settings: &AgentSettings) -> Result<Self> {
        let transport = ReqwestTransport::new(settings.http.tls_options())?;
        let http = HttpClient::new(transport).with_user_agent(&settings.http.user_agent);
        Ok(Self::new(SystemExecutor, http).with_run_as(&settings.run_as))
    }

    /// Run section commands as `user`
    #[must_use]
    pub fn with_run_as(mut self, user: impl Into<String>) -> Self {
        self.run_as = user.into();
        self
    }

    /// Process executor
    pub fn executor(&self) -> &dyn Executor {
        self.executor.as_ref()
    }

    /// HTTP client for sources and remote metadata
    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// User that packages, commands and services run as
    pub fn run_as(&self) -> &str {
        &self.run_as
    }
}
