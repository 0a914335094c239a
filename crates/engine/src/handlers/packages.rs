//! `packages` section
//!
//! ```json
//! {"yum": {"httpd": [], "php": ["5.4"]}, "python": {"boto": "2.9"}}
//! ```
//!
//! A version is given as a string or as a list whose first element is used;
//! an empty string or list means "any version".

use super::scalar;
use crate::command::CommandRunner;
use crate::runtime::Runtime;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::fmt;

/// Managers installed before all others, in this order
pub const PRIORITY: &[&str] = &["rpm", "apt", "yum"];

/// A package manager that can appear in the `packages` section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageManager {
    /// `rpm -Uvh`, values are package URLs or paths
    Rpm,
    /// `apt-get`
    Apt,
    /// `yum`
    Yum,
    /// `dnf`
    Dnf,
    /// `zypper`
    Zypper,
    /// `pip`
    Python,
    /// `gem`
    Gem,
}

impl PackageManager {
    /// Manager for a section key
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "rpm" => Some(Self::Rpm),
            "apt" => Some(Self::Apt),
            "yum" => Some(Self::Yum),
            "dnf" => Some(Self::Dnf),
            "zypper" => Some(Self::Zypper),
            "python" => Some(Self::Python),
            "gem" => Some(Self::Gem),
            _ => None,
        }
    }

    /// Section key of this manager
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Rpm => "rpm",
            Self::Apt => "apt",
            Self::Yum => "yum",
            Self::Dnf => "dnf",
            Self::Zypper => "zypper",
            Self::Python => "python",
            Self::Gem => "gem",
        }
    }

    /// Argv lists that install `packages`
    #[must_use]
    pub fn install_commands(self, packages: &Map<String, Value>) -> Vec<Vec<String>> {
        if packages.is_empty() {
            return Vec::new();
        }
        let specs = packages.iter().map(|(name, version)| (name.as_str(), version_of(version)));

        match self {
            Self::Rpm => packages
                .iter()
                .map(|(name, location)| {
                    let location = version_of(location).unwrap_or_else(|| name.clone());
                    argv(&["rpm", "-Uvh"], [location])
                })
                .collect(),
            Self::Gem => specs
                .map(|(name, version)| {
                    let mut command = argv(&["gem", "install"], [name.to_string()]);
                    if let Some(version) = version {
                        command.extend(["--version".to_string(), version]);
                    }
                    command
                })
                .collect(),
            Self::Apt | Self::Zypper | Self::Python | Self::Yum | Self::Dnf => {
                let (prefix, separator): (&[&str], &str) = match self {
                    Self::Apt => (&["apt-get", "-y", "install"], "="),
                    Self::Zypper => (&["zypper", "-n", "install"], "="),
                    Self::Python => (&["pip", "install"], "=="),
                    Self::Dnf => (&["dnf", "-y", "install"], "-"),
                    _ => (&["yum", "-y", "install"], "-"),
                };
                let targets = specs.map(|(name, version)| match version {
                    Some(version) => format!("{name}{separator}{version}"),
                    None => name.to_string(),
                });
                vec![argv(prefix, targets)]
            }
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn version_of(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.first().and_then(scalar),
        other => scalar(other),
    }
}

fn argv(prefix: &[&str], rest: impl IntoIterator<Item = String>) -> Vec<String> {
    prefix
        .iter()
        .map(|s| (*s).to_string())
        .chain(rest)
        .collect()
}

/// Installs the `packages` section
pub struct PackagesHandler<'a> {
    packages: &'a Map<String, Value>,
    runtime: &'a Runtime,
}

impl<'a> PackagesHandler<'a> {
    /// Handler for `packages`
    pub fn new(packages: &'a Map<String, Value>, runtime: &'a Runtime) -> Self {
        Self { packages, runtime }
    }

    /// Manager sections in installation order
    ///
    /// Unknown managers are skipped with a warning.
    pub fn ordered(&self) -> Vec<(PackageManager, &'a Map<String, Value>)> {
        let prioritized = PRIORITY
            .iter()
            .filter_map(|name| self.packages.get(*name).map(|section| (*name, section)));
        let rest = self
            .packages
            .iter()
            .map(|(name, section)| (name.as_str(), section))
            .filter(|(name, _)| !PRIORITY.contains(name));

        prioritized
            .chain(rest)
            .filter_map(|(name, section)| {
                let Some(manager) = PackageManager::from_name(name) else {
                    tracing::warn!(manager = %name, "Skipping unsupported package manager");
                    return None;
                };
                let Some(section) = section.as_object() else {
                    tracing::warn!(manager = %name, "Ignoring package list that is not a mapping");
                    return None;
                };
                Some((manager, section))
            })
            .collect()
    }

    /// Install every package
    ///
    /// # Errors
    ///
    /// [`Error::CommandFailure`] for the first install command that fails.
    #[tracing::instrument(skip(self))]
    pub fn apply(&self) -> Result<()> {
        for (manager, packages) in self.ordered() {
            for command in manager.install_commands(packages) {
                let runner = CommandRunner::from_argv(&command)
                    .run(self.runtime.executor(), self.runtime.run_as());
                if !runner.succeeded() {
                    return Err(Error::command_failure(
                        format!("packages.{manager}"),
                        runner.to_string(),
                    ));
                }
                tracing::info!(%manager, count = packages.len(), "Packages installed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use serde_json::json;

    fn section(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_versions_per_manager() {
        let packages = section(json!({"httpd": [], "php": ["5.4"], "mysql": "8.0"}));

        assert_eq!(
            PackageManager::Yum.install_commands(&packages),
            vec![vec!["yum", "-y", "install", "httpd", "php-5.4", "mysql-8.0"]]
        );
        assert_eq!(
            PackageManager::Apt.install_commands(&packages),
            vec![vec!["apt-get", "-y", "install", "httpd", "php=5.4", "mysql=8.0"]]
        );
        assert_eq!(
            PackageManager::Python.install_commands(&packages),
            vec![vec!["pip", "install", "httpd", "php==5.4", "mysql==8.0"]]
        );
    }

    #[test]
    fn test_gem_installs_one_by_one() {
        let packages = section(json!({"rake": "10.0", "bundler": ""}));
        assert_eq!(
            PackageManager::Gem.install_commands(&packages),
            vec![
                vec!["gem", "install", "rake", "--version", "10.0"],
                vec!["gem", "install", "bundler"],
            ]
        );
    }

    #[test]
    fn test_rpm_uses_locations() {
        let packages = section(json!({"epel": "http://example.com/epel.rpm"}));
        assert_eq!(
            PackageManager::Rpm.install_commands(&packages),
            vec![vec!["rpm", "-Uvh", "http://example.com/epel.rpm"]]
        );
    }

    #[test]
    fn test_empty_section_has_no_commands() {
        assert!(PackageManager::Yum.install_commands(&Map::new()).is_empty());
    }
}
