//! Well-known host paths
//!
//! These locations are shared with the orchestration service, which writes
//! the initial metadata and the metadata server URL onto the instance.

use std::path::PathBuf;

/// Agent settings file
pub const SETTINGS_FILE: &str = "/etc/stackinit/agent.toml";

/// Metadata document written by the orchestrator at boot
pub const INIT_DATA: &str = "/var/lib/heat-cfntools/cfn-init-data";

/// Last known good metadata cache
pub const LAST_METADATA: &str = "/var/cache/heat-cfntools/last_metadata";

/// File holding the metadata server URL on its first line
pub const METADATA_SERVER: &str = "/var/lib/heat-cfntools/cfn-metadata-server";

/// Credentials file (`AWSAccessKeyId=...`, `AWSSecretKey=...`)
pub const CREDENTIALS: &str = "/etc/cfn/cfn-credentials";

/// Main hook configuration file
pub const HUP_CONFIG: &str = "/etc/cfn/cfn-hup.conf";

/// Directory of additional hook definitions (`*.conf`)
pub const HOOKS_DIR: &str = "/etc/cfn/hooks.d";

/// Per-resource cache path derived from the last-good cache path
///
/// `/var/cache/x/last_metadata` + `Server` → `/var/cache/x/last_metadata_Server`
#[must_use]
pub fn resource_cache_path(last_path: &std::path::Path, resource: Option<&str>) -> PathBuf {
    match resource {
        Some(resource) => {
            let mut name = last_path.as_os_str().to_os_string();
            name.push("_");
            name.push(resource);
            PathBuf::from(name)
        }
        None => last_path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use std::path::Path;

    #[test]
    fn test_resource_cache_path() {
        let base = Path::new("/var/cache/heat-cfntools/last_metadata");
        assert_eq!(resource_cache_path(base, None), base);
        assert_eq!(
            resource_cache_path(base, Some("WebServer")),
            Path::new("/var/cache/heat-cfntools/last_metadata_WebServer")
        );
    }
}
