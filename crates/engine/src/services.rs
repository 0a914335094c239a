//! Service reconciliation
//!
//! The `services` section maps a manager kind (`systemd`, `sysvinit`) to
//! services and their desired state:
//!
//! ```json
//! {"systemd": {"httpd": {"enabled": "true", "ensureRunning": "true"}}}
//! ```
//!
//! Each service is handled on its own: a failing command is logged and the
//! next service is processed.

use crate::command::{CommandRunner, CommandSequence, Executor, StepPolicy};
use crate::hooks::Hook;
use indexmap::IndexMap;
use serde_json::Value;
use stackinit_core::to_boolean;
use std::fmt;

/// Event fired when a monitored service had to be started again
pub const SERVICE_RESTARTED: &str = "service.restarted";

/// An operation on one service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    /// Start at boot
    Enable,
    /// Do not start at boot
    Disable,
    /// Query whether the service runs
    Status,
    /// Start now
    Start,
    /// Stop now
    Stop,
    /// Stop, then start
    Restart,
}

impl ServiceAction {
    /// Verb used on the command line
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Status => "status",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service management convention of the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceManager {
    /// `systemctl`
    Systemd,
    /// `chkconfig` and `service`
    SysV,
}

impl ServiceManager {
    /// Manager for a `services` section key
    #[must_use]
    pub fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "systemd" => Some(Self::Systemd),
            "sysvinit" => Some(Self::SysV),
            _ => None,
        }
    }

    /// Command line performing `action` on `service`
    #[must_use]
    pub fn command(self, action: ServiceAction, service: &str) -> String {
        match (self, action) {
            (Self::Systemd, _) => format!("/bin/systemctl {action} {service}.service"),
            (Self::SysV, ServiceAction::Enable) => format!("/sbin/chkconfig {service} on"),
            (Self::SysV, ServiceAction::Disable) => format!("/sbin/chkconfig {service} off"),
            (Self::SysV, _) => format!("/sbin/service {service} {action}"),
        }
    }

    /// Runner for `action` on `service`, not yet run
    #[must_use]
    pub fn runner(self, action: ServiceAction, service: &str) -> CommandRunner {
        CommandRunner::new(self.command(action, service))
    }

    /// Run `action` on `service` and return the finished runner
    pub fn perform(
        self,
        action: ServiceAction,
        service: &str,
        executor: &dyn Executor,
        user: &str,
    ) -> CommandRunner {
        self.runner(action, service).run(executor, user)
    }
}

/// Reconciles declared service state with what is running on the host
pub struct ServicesHandler<'a> {
    services: Vec<(ServiceManager, IndexMap<String, Value>)>,
    resource: Option<&'a str>,
    hooks: &'a [Hook],
    executor: &'a dyn Executor,
    run_as: &'a str,
}

impl<'a> ServicesHandler<'a> {
    /// Build a handler for a `services` section
    ///
    /// Unknown manager kinds are skipped with a warning.
    pub fn new(services: &Value, executor: &'a dyn Executor, run_as: &'a str) -> Self {
        let mut parsed = Vec::new();
        if let Some(section) = services.as_object() {
            for (kind, entries) in section {
                let Some(manager) = ServiceManager::from_kind(kind) else {
                    tracing::warn!(kind = %kind, "Skipping unsupported service manager");
                    continue;
                };
                let entries: IndexMap<String, Value> = entries
                    .as_object()
                    .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();
                parsed.push((manager, entries));
            }
        }

        Self {
            services: parsed,
            resource: None,
            hooks: &[],
            executor,
            run_as,
        }
    }

    /// Hooks to notify, and the resource they are notified for
    #[must_use]
    pub fn with_hooks(mut self, resource: Option<&'a str>, hooks: &'a [Hook]) -> Self {
        self.resource = resource;
        self.hooks = hooks;
        self
    }

    /// Bring every declared service into its desired state
    #[tracing::instrument(skip(self))]
    pub fn apply_services(&self) {
        for (manager, services) in &self.services {
            for (service, properties) in services {
                if let Some(enabled) = properties.get("enabled") {
                    let action = if to_boolean(enabled) {
                        ServiceAction::Enable
                    } else {
                        ServiceAction::Disable
                    };
                    self.log_failure(&manager.perform(action, service, self.executor, self.run_as));
                }

                if let Some(running) = properties.get("ensureRunning") {
                    let sequence = if to_boolean(running) {
                        CommandSequence::new(manager.runner(ServiceAction::Status, service))
                            .then(StepPolicy::OnFailure, manager.runner(ServiceAction::Start, service))
                    } else {
                        CommandSequence::new(manager.runner(ServiceAction::Status, service))
                            .then(StepPolicy::OnSuccess, manager.runner(ServiceAction::Stop, service))
                    };
                    // The status check is allowed to fail; only the follow-up counts
                    for runner in sequence.run(self.executor, self.run_as).iter().skip(1) {
                        self.log_failure(runner);
                    }
                }
            }
        }
    }

    /// Restart services that should run but do not, and notify hooks
    #[tracing::instrument(skip(self))]
    pub fn monitor_services(&self) {
        for (manager, services) in &self.services {
            for (service, properties) in services {
                let ensure_running = properties.get("ensureRunning").is_some_and(to_boolean);
                if !ensure_running {
                    continue;
                }

                let status = manager.perform(ServiceAction::Status, service, self.executor, self.run_as);
                if status.succeeded() {
                    continue;
                }

                tracing::warn!(service = %service, "Service not running, restarting");
                let start = manager.perform(ServiceAction::Start, service, self.executor, self.run_as);
                if start.succeeded() {
                    tracing::info!(service = %service, "Service restarted");
                } else {
                    self.log_failure(&start);
                }
                self.fire(SERVICE_RESTARTED);
            }
        }
    }

    fn fire(&self, event: &str) {
        let Some(resource) = self.resource else {
            return;
        };
        for hook in self.hooks {
            if let Some(runner) = hook.event(event, resource, self.executor)
                && !runner.succeeded()
            {
                tracing::warn!(hook = %hook.name, "Hook failed\n{runner}");
            }
        }
    }

    fn log_failure(&self, runner: &CommandRunner) {
        if !runner.succeeded() {
            tracing::warn!("Service command failed\n{runner}");
        }
    }
}
