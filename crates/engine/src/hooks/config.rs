//! Hook definition
//!
//! A hook binds change events on one stack resource to a command:
//!
//! ```ini
//! [restart-httpd]
//! triggers=post.update,service.restarted
//! path=Resources.WebServer.Metadata
//! action=/usr/local/bin/reload-httpd
//! runas=root
//! ```

use crate::command::{CommandRunner, Executor};
use crate::{Error, Result};
use std::fmt;

/// User that hook actions run as unless `runas` is given
pub const DEFAULT_RUNAS: &str = "root";

/// A single trigger to action binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    /// Section name the hook was declared under
    pub name: String,
    /// Comma-separated event names
    pub triggers: String,
    /// Watched metadata path, `Resources.<name>.Metadata`
    pub path: String,
    /// User the action runs as
    pub runas: String,
    /// Shell command line
    pub action: String,
}

impl Hook {
    /// Create a hook running as [`DEFAULT_RUNAS`]
    pub fn new(
        name: impl Into<String>,
        triggers: impl Into<String>,
        path: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            triggers: triggers.into(),
            path: path.into(),
            runas: DEFAULT_RUNAS.to_string(),
            action: action.into(),
        }
    }

    /// Run the action as `runas`
    #[must_use]
    pub fn with_runas(mut self, runas: impl Into<String>) -> Self {
        self.runas = runas.into();
        self
    }

    /// Resource named by `path`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] unless `path` has the shape
    /// `Resources.<name>.Metadata`.
    pub fn resource_name_get(&self) -> Result<&str> {
        let mut parts = self.path.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("Resources"), Some(name), Some("Metadata"), None) if !name.is_empty() => {
                Ok(name)
            }
            _ => Err(Error::Configuration(format!(
                "hook {}: path {} is not of the form Resources.<name>.Metadata",
                self.name, self.path
            ))),
        }
    }

    /// Event names this hook reacts to
    pub fn trigger_names(&self) -> impl Iterator<Item = &str> {
        self.triggers
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Whether `event` on `resource` concerns this hook
    #[must_use]
    pub fn matches(&self, event: &str, resource: &str) -> bool {
        self.trigger_names().any(|t| t == event)
            && self.resource_name_get().is_ok_and(|r| r == resource)
    }

    /// Run the action if `event` on `resource` matches, returning the runner
    pub fn event(
        &self,
        event: &str,
        resource: &str,
        executor: &dyn Executor,
    ) -> Option<CommandRunner> {
        if !self.matches(event, resource) {
            return None;
        }
        tracing::info!(hook = %self.name, event, resource, "Running hook action");
        Some(CommandRunner::new(&self.action).run(executor, &self.runas))
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}, {}, {}, {}, {}}}",
            self.name, self.triggers, self.path, self.runas, self.action
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use crate::command::RecordingExecutor;

    fn hook(triggers: &str) -> Hook {
        Hook::new("bar", triggers, "Resources.resource.Metadata", "/bin/true")
    }

    #[test]
    fn test_resource_name_get() {
        assert_eq!(hook("x").resource_name_get().unwrap(), "resource");
    }

    #[test]
    fn test_resource_name_get_rejects_bad_paths() {
        for path in [
            "Resources.resource",
            "Resource.resource.Metadata",
            "Resources..Metadata",
            "Resources.a.Metadata.extra",
            "",
        ] {
            let hook = Hook::new("h", "t", path, "a");
            let err = hook.resource_name_get().unwrap_err();
            assert!(matches!(err, Error::Configuration(_)), "{path}");
        }
    }

    #[test]
    fn test_display() {
        let hook = hook("post.add,post.update").with_runas("nobody");
        assert_eq!(
            hook.to_string(),
            "{bar, post.add,post.update, Resources.resource.Metadata, nobody, /bin/true}"
        );
    }

    #[test]
    fn test_event_runs_action_as_runas() {
        let executor = RecordingExecutor::new();
        let hook = hook("post.add, post.update").with_runas("nobody");

        let runner = hook.event("post.update", "resource", &executor).unwrap();
        assert!(runner.succeeded());
        assert_eq!(
            executor.invocations()[0].argv(),
            vec!["su", "nobody", "-c", "/bin/true"]
        );
    }

    #[test]
    fn test_event_ignores_other_triggers_and_resources() {
        let executor = RecordingExecutor::new();
        let hook = hook("post.add");

        assert!(hook.event("post.update", "resource", &executor).is_none());
        assert!(hook.event("post.add", "other", &executor).is_none());
        assert!(executor.invocations().is_empty());
    }
}
