//! Hook configuration loading
//!
//! The main file carries a mandatory `[main]` section; every other section,
//! there or in `*.conf` files under the hooks directory, declares one hook.
//!
//! ```ini
//! [main]
//! stack=teststack
//! credential-file=/etc/cfn/cfn-credentials
//! region=nova
//! interval=10
//! ```

use super::config::{DEFAULT_RUNAS, Hook};
use crate::{Error, Result};
use indexmap::IndexMap;
use ini::{Ini, ParseOption};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Region used when `[main]` does not name one
pub const DEFAULT_REGION: &str = "nova";
/// Polling interval, in seconds, when `[main]` does not set one
pub const DEFAULT_INTERVAL: u64 = 10;

const MAIN_SECTION: &str = "main";

type Sections = IndexMap<String, IndexMap<String, String>>;

/// Parsed hook configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HupConfig {
    /// Stack whose resources are watched
    pub stack: String,
    /// Credentials file used to sign metadata requests
    pub credential_file: PathBuf,
    /// Region name
    pub region: String,
    /// Seconds between polling cycles
    pub interval: u64,
    /// Hooks, in declaration order
    pub hooks: Vec<Hook>,
}

impl HupConfig {
    /// Load the main file and every `*.conf` file under `hooks_dir`, sorted by name
    ///
    /// A missing `hooks_dir` is not an error.
    pub fn load(main: &Path, hooks_dir: Option<&Path>) -> Result<Self> {
        let mut sources = vec![read(main)?];

        if let Some(dir) = hooks_dir
            && dir.is_dir()
        {
            let mut extra: Vec<PathBuf> = fs::read_dir(dir)
                .map_err(|e| Error::FileRead {
                    path: dir.to_path_buf(),
                    source: e,
                })?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "conf"))
                .collect();
            extra.sort();
            for path in extra {
                tracing::debug!(path = %path.display(), "Loading hook definitions");
                sources.push(read(&path)?);
            }
        }

        let sources: Vec<&str> = sources.iter().map(String::as_str).collect();
        Self::parse(&sources)
    }

    /// Parse one or more INI sources, later sources extending earlier ones
    pub fn parse(sources: &[&str]) -> Result<Self> {
        let mut sections = Sections::new();
        for source in sources {
            merge(&mut sections, source)?;
        }

        let main = sections
            .shift_remove(MAIN_SECTION)
            .ok_or_else(|| Error::Configuration("no [main] section".to_string()))?;

        let stack = required(&main, MAIN_SECTION, "stack")?;
        let credential_file = PathBuf::from(required(&main, MAIN_SECTION, "credential-file")?);
        if !credential_file.is_file() {
            return Err(Error::Configuration(format!(
                "invalid credentials file {}",
                credential_file.display()
            )));
        }
        let region = main
            .get("region")
            .cloned()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let interval = match main.get("interval") {
            Some(value) => value.trim().parse().map_err(|_| {
                Error::Configuration(format!("interval must be an integer, got {value:?}"))
            })?,
            None => DEFAULT_INTERVAL,
        };

        let hooks = sections
            .iter()
            .map(|(name, props)| {
                let hook = Hook::new(
                    name,
                    required(props, name, "triggers")?,
                    required(props, name, "path")?,
                    required(props, name, "action")?,
                )
                .with_runas(props.get("runas").map_or(DEFAULT_RUNAS, String::as_str));
                hook.resource_name_get()?;
                Ok(hook)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            stack,
            credential_file,
            region,
            interval,
            hooks,
        })
    }

    /// Resources referenced by the hooks, first occurrence first
    #[must_use]
    pub fn unique_resources_get(&self) -> Vec<String> {
        let mut resources: Vec<String> = Vec::new();
        for hook in &self.hooks {
            if let Ok(name) = hook.resource_name_get()
                && !resources.iter().any(|r| r == name)
            {
                resources.push(name.to_string());
            }
        }
        resources
    }
}

impl fmt::Display for HupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{stack: {}, credential_file: {}, region: {}, interval:{}}}",
            self.stack,
            self.credential_file.display(),
            self.region,
            self.interval
        )
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })
}

fn merge(sections: &mut Sections, source: &str) -> Result<()> {
    let options = ParseOption {
        enabled_quote: false,
        enabled_escape: false,
        ..ParseOption::default()
    };
    let ini = Ini::load_from_str_opt(source, options)
        .map_err(|e| Error::Configuration(format!("malformed hook configuration: {e}")))?;

    for (section, props) in ini.iter() {
        // Keys outside any section carry no meaning
        let Some(section) = section else {
            continue;
        };
        let entry = sections.entry(section.to_string()).or_default();
        for (key, value) in props.iter() {
            entry.insert(key.to_string(), value.to_string());
        }
    }
    Ok(())
}

fn required(props: &IndexMap<String, String>, section: &str, key: &str) -> Result<String> {
    props
        .get(key)
        .cloned()
        .ok_or_else(|| Error::Configuration(format!("[{section}] is missing {key}")))
}
