//! `groups` and `users` sections
//!
//! ```json
//! {"groups": {"admins": {}, "web": {"gid": "45"}},
//!  "users": {"deploy": {"groups": ["web"], "uid": "50", "homeDir": "/srv"}}}
//! ```
//!
//! Accounts that already exist are left alone.

use super::scalar;
use crate::command::CommandRunner;
use crate::runtime::Runtime;
use crate::{Error, Result};
use serde_json::{Map, Value};

/// Creates the groups of the `groups` section
pub struct GroupsHandler<'a> {
    groups: &'a Map<String, Value>,
    runtime: &'a Runtime,
}

impl<'a> GroupsHandler<'a> {
    /// Handler for `groups`
    pub fn new(groups: &'a Map<String, Value>, runtime: &'a Runtime) -> Self {
        Self { groups, runtime }
    }

    /// `groupadd` argv for one group
    #[must_use]
    pub fn groupadd(name: &str, properties: &Value) -> Vec<String> {
        let mut argv = vec!["groupadd".to_string()];
        if let Some(gid) = properties.get("gid").and_then(scalar) {
            argv.extend(["--gid".to_string(), gid]);
        }
        argv.push(name.to_string());
        argv
    }

    /// Create every missing group
    #[tracing::instrument(skip(self))]
    pub fn apply(&self) -> Result<()> {
        for (name, properties) in self.groups {
            if uzers::get_group_by_name(name).is_some() {
                tracing::debug!(group = %name, "Group exists");
                continue;
            }
            run(&Self::groupadd(name, properties), "groups", name, self.runtime)?;
            tracing::info!(group = %name, "Group created");
        }
        Ok(())
    }
}

/// Creates the users of the `users` section
pub struct UsersHandler<'a> {
    users: &'a Map<String, Value>,
    runtime: &'a Runtime,
}

impl<'a> UsersHandler<'a> {
    /// Handler for `users`
    pub fn new(users: &'a Map<String, Value>, runtime: &'a Runtime) -> Self {
        Self { users, runtime }
    }

    /// `useradd` argv for one user; no home directory is created
    #[must_use]
    pub fn useradd(name: &str, properties: &Value) -> Vec<String> {
        let mut argv = vec!["useradd".to_string()];
        if let Some(uid) = properties.get("uid").and_then(scalar) {
            argv.extend(["--uid".to_string(), uid]);
        }
        let groups: Vec<&str> = properties
            .get("groups")
            .and_then(Value::as_array)
            .map(|groups| groups.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        if !groups.is_empty() {
            argv.extend(["--groups".to_string(), groups.join(",")]);
        }
        if let Some(home) = properties.get("homeDir").and_then(scalar) {
            argv.extend(["--home-dir".to_string(), home]);
        }
        argv.extend(["-M".to_string(), name.to_string()]);
        argv
    }

    /// Create every missing user
    #[tracing::instrument(skip(self))]
    pub fn apply(&self) -> Result<()> {
        for (name, properties) in self.users {
            if uzers::get_user_by_name(name).is_some() {
                tracing::debug!(user = %name, "User exists");
                continue;
            }
            run(&Self::useradd(name, properties), "users", name, self.runtime)?;
            tracing::info!(user = %name, "User created");
        }
        Ok(())
    }
}

fn run(argv: &[String], section: &str, name: &str, runtime: &Runtime) -> Result<()> {
    let runner = CommandRunner::from_argv(argv).run(runtime.executor(), runtime.run_as());
    if runner.succeeded() {
        Ok(())
    } else {
        Err(Error::command_failure(
            format!("{section}.{name}"),
            runner.to_string(),
        ))
    }
}
