//! `files` section
//!
//! ```json
//! {"/etc/motd": {"content": "hello\n", "mode": "000644", "owner": "root", "group": "root"},
//!  "/etc/app.json": {"content": {"debug": false}},
//!  "/usr/local/bin/tool": {"source": "https://example.com/tool", "mode": "000755"}}
//! ```
//!
//! String content is written as is, or base64-decoded with
//! `"encoding": "base64"`. Any other content is written as JSON.

use crate::runtime::Runtime;
use crate::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Writes the files of the `files` section
pub struct FilesHandler<'a> {
    files: &'a Map<String, Value>,
    runtime: &'a Runtime,
}

impl<'a> FilesHandler<'a> {
    /// Handler for `files`
    pub fn new(files: &'a Map<String, Value>, runtime: &'a Runtime) -> Self {
        Self { files, runtime }
    }

    /// Write every file, then apply its mode and ownership
    #[tracing::instrument(skip(self))]
    pub fn apply(&self) -> Result<()> {
        for (path, entry) in self.files {
            let path = Path::new(path);
            let Some(content) = self.content(path, entry)? else {
                tracing::error!(path = %path.display(), "No content or source, skipping file");
                continue;
            };

            write_file(path, &content)?;
            if let Some(mode) = entry.get("mode").and_then(Value::as_str) {
                set_mode(path, mode)?;
            }
            set_owner(
                path,
                entry.get("owner").and_then(Value::as_str),
                entry.get("group").and_then(Value::as_str),
            )?;
            tracing::info!(path = %path.display(), "File written");
        }
        Ok(())
    }

    fn content(&self, path: &Path, entry: &Value) -> Result<Option<Vec<u8>>> {
        match (entry.get("content"), entry.get("source")) {
            (Some(content), source) => {
                if source.is_some() {
                    tracing::warn!(path = %path.display(), "Both content and source given, using content");
                }
                render_content(content, entry.get("encoding").and_then(Value::as_str)).map(Some)
            }
            (None, Some(Value::String(url))) => Ok(Some(self.runtime.http().get(url)?.body)),
            (None, _) => Ok(None),
        }
    }
}

/// Bytes to write for a `content` value
pub fn render_content(content: &Value, encoding: Option<&str>) -> Result<Vec<u8>> {
    match content {
        Value::String(text) if encoding == Some("base64") => STANDARD
            .decode(text.trim())
            .map_err(|e| Error::Configuration(format!("invalid base64 content: {e}"))),
        Value::String(text) => Ok(text.clone().into_bytes()),
        other => {
            let mut buffer = Vec::new();
            let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
            let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
            other.serialize(&mut serializer)?;
            Ok(buffer)
        }
    }
}

fn write_file(path: &Path, content: &[u8]) -> Result<()> {
    let to_write_error = |e| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(to_write_error)?;
    }
    fs::write(path, content).map_err(to_write_error)
}

/// Parse an octal mode such as `000644`
pub fn parse_mode(mode: &str) -> Result<u32> {
    u32::from_str_radix(mode.trim(), 8)
        .ok()
        .filter(|m| *m <= 0o7777)
        .ok_or_else(|| Error::Configuration(format!("invalid file mode {mode:?}")))
}

fn set_mode(path: &Path, mode: &str) -> Result<()> {
    let mode = parse_mode(mode)?;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

fn set_owner(path: &Path, owner: Option<&str>, group: Option<&str>) -> Result<()> {
    let uid = owner.and_then(|name| {
        let uid = uzers::get_user_by_name(name).map(|u| u.uid());
        if uid.is_none() {
            tracing::warn!(path = %path.display(), owner = name, "Unknown owner");
        }
        uid
    });
    let gid = group.and_then(|name| {
        let gid = uzers::get_group_by_name(name).map(|g| g.gid());
        if gid.is_none() {
            tracing::warn!(path = %path.display(), group = name, "Unknown group");
        }
        gid
    });
    if uid.is_none() && gid.is_none() {
        return Ok(());
    }
    std::os::unix::fs::chown(path, uid, gid).map_err(|e| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}
