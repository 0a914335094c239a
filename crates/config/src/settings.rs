//! Agent settings
//!
//! Settings are read from a TOML file; every field has a default, so an
//! empty (or missing) file yields a working configuration.
//!
//! ```toml
//! run_as = "root"
//!
//! [paths]
//! init_data = "/var/lib/heat-cfntools/cfn-init-data"
//!
//! [http]
//! user_agent = "heat-cfntools"
//! insecure = false
//! ```

use crate::paths;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use stackinit_http::TlsOptions;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level agent settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AgentSettings {
    /// User that commands, packages and services run as
    #[serde(default = "default_run_as")]
    pub run_as: String,

    /// Host file locations
    #[serde(default)]
    pub paths: PathSettings,

    /// HTTP transport settings
    #[serde(default)]
    pub http: HttpSettings,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            run_as: default_run_as(),
            paths: PathSettings::default(),
            http: HttpSettings::default(),
        }
    }
}

/// Host file locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PathSettings {
    /// Metadata written by the orchestrator at boot
    pub init_data: PathBuf,
    /// Last known good metadata cache
    pub last_metadata: PathBuf,
    /// File holding the metadata server URL
    pub metadata_server: PathBuf,
    /// Credentials file
    pub credentials: PathBuf,
    /// Main hook configuration
    pub hup_config: PathBuf,
    /// Directory of extra hook definitions
    pub hooks_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            init_data: PathBuf::from(paths::INIT_DATA),
            last_metadata: PathBuf::from(paths::LAST_METADATA),
            metadata_server: PathBuf::from(paths::METADATA_SERVER),
            credentials: PathBuf::from(paths::CREDENTIALS),
            hup_config: PathBuf::from(paths::HUP_CONFIG),
            hooks_dir: PathBuf::from(paths::HOOKS_DIR),
        }
    }
}

/// HTTP transport settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSettings {
    /// `User-Agent` sent with every request
    pub user_agent: String,
    /// CA bundle; the system bundle is searched when unset
    pub ca_file: Option<PathBuf>,
    /// Client certificate (PEM)
    pub cert_file: Option<PathBuf>,
    /// Client key (PEM)
    pub key_file: Option<PathBuf>,
    /// Skip server certificate verification
    pub insecure: bool,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: stackinit_http::client::DEFAULT_USER_AGENT.to_string(),
            ca_file: None,
            cert_file: None,
            key_file: None,
            insecure: false,
        }
    }
}

impl HttpSettings {
    /// TLS options for the transport
    #[must_use]
    pub fn tls_options(&self) -> TlsOptions {
        TlsOptions {
            cert_file: self.cert_file.clone(),
            key_file: self.key_file.clone(),
            ca_file: self.ca_file.clone(),
            insecure: self.insecure,
        }
    }
}

/// User section commands run as unless `run_as` is set
pub const DEFAULT_RUN_AS: &str = "root";

fn default_run_as() -> String {
    DEFAULT_RUN_AS.to_string()
}

impl AgentSettings {
    /// Load settings from a file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or TOML parsing fails
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::Configuration(msg) => {
                Error::Configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })
    }

    /// Parse settings from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("failed to parse settings: {e}")))
    }

    /// Load `explicit` if given, else the system settings file when it exists,
    /// else defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let system = Path::new(paths::SETTINGS_FILE);
        if system.is_file() {
            tracing::debug!(path = %system.display(), "Loading agent settings");
            Self::load(system)
        } else {
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_settings_are_defaults() {
        let settings = AgentSettings::from_toml_str("").unwrap();
        assert_eq!(settings, AgentSettings::default());
        assert_eq!(settings.run_as, "root");
        assert_eq!(settings.paths.init_data, PathBuf::from(paths::INIT_DATA));
        assert_eq!(settings.http.user_agent, "heat-cfntools");
        assert!(!settings.http.insecure);
    }

    #[test]
    fn test_partial_override() {
        let settings = AgentSettings::from_toml_str(
            r#"
run_as = "deploy"

[paths]
last_metadata = "/tmp/last"

[http]
insecure = true
ca_file = "/etc/ca.pem"
"#,
        )
        .unwrap();

        assert_eq!(settings.run_as, "deploy");
        assert_eq!(settings.paths.last_metadata, PathBuf::from("/tmp/last"));
        assert_eq!(settings.paths.credentials, PathBuf::from(paths::CREDENTIALS));

        let tls = settings.http.tls_options();
        assert!(tls.insecure);
        assert_eq!(tls.ca_file, Some(PathBuf::from("/etc/ca.pem")));
        assert_eq!(tls.cert_file, None);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = AgentSettings::from_toml_str("colour = true").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[http]\nuser_agent = \"custom\"\n").unwrap();
        let settings = AgentSettings::load(file.path()).unwrap();
        assert_eq!(settings.http.user_agent, "custom");
    }

    #[test]
    fn test_discover_explicit_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = AgentSettings::discover(Some(&dir.path().join("agent.toml"))).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
