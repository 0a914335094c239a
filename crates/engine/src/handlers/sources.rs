//! `sources` section: archives downloaded and unpacked into a directory
//!
//! ```json
//! {"/etc/puppet": "https://example.com/puppet-modules.tar.gz"}
//! ```

use crate::command::CommandRunner;
use crate::runtime::Runtime;
use crate::{Error, Result};
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Archive formats that can be unpacked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// `.tar`
    Tar,
    /// `.tar.gz`, `.tgz`
    TarGz,
    /// `.tar.bz2`, `.tbz2`
    TarBz2,
    /// `.zip`
    Zip,
}

impl ArchiveKind {
    /// Detect the format from the path of `url`
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        let path = url::Url::parse(url)
            .map(|u| u.path().to_ascii_lowercase())
            .unwrap_or_else(|_| url.to_ascii_lowercase());

        if path.ends_with(".tar.gz") || path.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if path.ends_with(".tar.bz2") || path.ends_with(".tbz2") {
            Some(Self::TarBz2)
        } else if path.ends_with(".tar") {
            Some(Self::Tar)
        } else if path.ends_with(".zip") {
            Some(Self::Zip)
        } else {
            None
        }
    }

    /// File suffix for a downloaded archive of this kind
    #[must_use]
    pub fn suffix(self) -> &'static str {
        match self {
            Self::Tar => ".tar",
            Self::TarGz => ".tar.gz",
            Self::TarBz2 => ".tar.bz2",
            Self::Zip => ".zip",
        }
    }

    /// Argv unpacking `archive` into `dest`
    #[must_use]
    pub fn extract_command(self, archive: &Path, dest: &Path) -> Vec<String> {
        let archive = archive.display().to_string();
        let dest = dest.display().to_string();
        let flags = match self {
            Self::Zip => {
                return vec!["unzip".into(), "-o".into(), archive, "-d".into(), dest];
            }
            Self::Tar => "-xf",
            Self::TarGz => "-xzf",
            Self::TarBz2 => "-xjf",
        };
        vec!["tar".into(), "-C".into(), dest, flags.into(), archive]
    }
}

/// Downloads and unpacks the `sources` section
pub struct SourcesHandler<'a> {
    sources: &'a Map<String, Value>,
    runtime: &'a Runtime,
}

impl<'a> SourcesHandler<'a> {
    /// Handler for `sources`
    pub fn new(sources: &'a Map<String, Value>, runtime: &'a Runtime) -> Self {
        Self { sources, runtime }
    }

    /// Unpack every archive into its directory
    ///
    /// Archives of an unknown format are skipped with a warning.
    #[tracing::instrument(skip(self))]
    pub fn apply(&self) -> Result<()> {
        for (dest, url) in self.sources {
            let Some(url) = url.as_str() else {
                tracing::warn!(dest = %dest, "Source URL must be a string");
                continue;
            };
            let Some(kind) = ArchiveKind::from_url(url) else {
                tracing::warn!(dest = %dest, url, "Skipping source of unknown archive type");
                continue;
            };
            self.unpack(url, kind, Path::new(dest))?;
            tracing::info!(dest = %dest, url, "Source unpacked");
        }
        Ok(())
    }

    fn unpack(&self, url: &str, kind: ArchiveKind, dest: &Path) -> Result<()> {
        let response = self.runtime.http().get(url)?;

        let mut archive = tempfile::Builder::new()
            .prefix("stackinit-source")
            .suffix(kind.suffix())
            .tempfile()?;
        archive.write_all(&response.body)?;
        archive.flush()?;

        fs::create_dir_all(dest).map_err(|e| Error::FileWrite {
            path: dest.to_path_buf(),
            source: e,
        })?;

        let runner = CommandRunner::from_argv(kind.extract_command(archive.path(), dest))
            .run(self.runtime.executor(), self.runtime.run_as());
        if runner.succeeded() {
            Ok(())
        } else {
            Err(Error::command_failure(
                format!("sources.{}", dest.display()),
                runner.to_string(),
            ))
        }
    }
}
