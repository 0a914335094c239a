//! `commands` section
//!
//! ```json
//! {"01_migrate": {"command": "manage.py migrate", "cwd": "/srv/app",
//!                 "env": {"DJANGO_SETTINGS": "prod"}, "test": "test -f /srv/app/manage.py"},
//!  "02_notify": {"command": ["logger", "deployed"], "ignoreErrors": "true"}}
//! ```
//!
//! Commands run in document order. A failing `test` skips its command; a
//! failing command aborts the section unless `ignoreErrors` is set.

use crate::command::CommandRunner;
use crate::runtime::Runtime;
use crate::{Error, Result};
use serde_json::{Map, Value};
use stackinit_core::to_boolean;
use std::path::Path;

/// Runs the `commands` section
pub struct CommandsHandler<'a> {
    commands: &'a Map<String, Value>,
    runtime: &'a Runtime,
}

impl<'a> CommandsHandler<'a> {
    /// Handler for `commands`
    pub fn new(commands: &'a Map<String, Value>, runtime: &'a Runtime) -> Self {
        Self { commands, runtime }
    }

    /// Run every command in order
    ///
    /// # Errors
    ///
    /// [`Error::CommandFailure`] for the first failing command without
    /// `ignoreErrors`.
    #[tracing::instrument(skip(self))]
    pub fn apply(&self) -> Result<()> {
        for (name, entry) in self.commands {
            let ignore_errors = entry.get("ignoreErrors").is_some_and(to_boolean);
            match self.run_one(name, entry) {
                Ok(()) => {}
                Err(e) if ignore_errors => {
                    tracing::warn!(command = %name, "Ignoring failure: {e}");
                }
                Err(e) => {
                    tracing::error!(command = %name, "{e}");
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn run_one(&self, name: &str, entry: &Value) -> Result<()> {
        let Some(command) = entry.get("command").and_then(command_line) else {
            return Err(Error::command_failure(name, "no command given"));
        };

        let cwd = entry.get("cwd").and_then(Value::as_str);
        if let Some(cwd) = cwd
            && !Path::new(cwd).is_dir()
        {
            return Err(Error::command_failure(
                name,
                format!("working directory {cwd} does not exist"),
            ));
        }

        let env: Vec<(String, String)> = entry
            .get("env")
            .and_then(Value::as_object)
            .map(|vars| {
                vars.iter()
                    .map(|(k, v)| {
                        let v = v.as_str().map_or_else(|| v.to_string(), str::to_string);
                        (k.clone(), v)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let prepare = |runner: CommandRunner| {
            let runner = runner.envs(env.clone());
            match cwd {
                Some(cwd) => runner.cwd(cwd),
                None => runner,
            }
        };

        if let Some(test) = entry.get("test").and_then(command_line) {
            let check = prepare(CommandRunner::new(test))
                .run(self.runtime.executor(), self.runtime.run_as());
            if !check.succeeded() {
                tracing::info!(command = %name, "Test failed, skipping command\n{check}");
                return Ok(());
            }
        }

        let runner =
            prepare(CommandRunner::new(command)).run(self.runtime.executor(), self.runtime.run_as());
        if runner.succeeded() {
            tracing::info!(command = %name, "Command succeeded");
            tracing::debug!("{runner}");
            Ok(())
        } else {
            Err(Error::command_failure(name, runner.to_string()))
        }
    }
}

/// A command given as a shell line or an argv list
fn command_line(value: &Value) -> Option<String> {
    match value {
        Value::String(line) if !line.trim().is_empty() => Some(line.clone()),
        Value::Array(argv) if !argv.is_empty() => {
            let argv: Option<Vec<&str>> = argv.iter().map(Value::as_str).collect();
            argv.map(shell_words::join)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_line() {
        assert_eq!(command_line(&json!("ls -l")).unwrap(), "ls -l");
        assert_eq!(
            command_line(&json!(["echo", "a b"])).unwrap(),
            "echo 'a b'"
        );
        assert!(command_line(&json!([])).is_none());
        assert!(command_line(&json!(["echo", 1])).is_none());
        assert!(command_line(&json!("  ")).is_none());
    }
}
