//! Pure helpers shared by the interpreter and the hook configuration
//!
//! None of these functions fail: unreadable or malformed inputs map to the
//! "absent" answer (`false`, `None`, or an empty mapping).

use indexmap::IndexMap;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Coerce a metadata value into a boolean
///
/// `true`, the number `1` and the strings `"true"`, `"yes"`, `"1"` (trimmed,
/// case-insensitive) are true. Everything else, including `null` and
/// unrecognized strings, is false.
#[must_use]
pub fn to_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1) || n.as_u64() == Some(1),
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1"),
        _ => false,
    }
}

/// Read the first line of a file, without its line terminator
///
/// Returns `None` when the file is missing, unreadable or the line is empty.
#[must_use]
pub fn read_one_line_file(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    let line = content.lines().next()?.trim();
    if line.is_empty() {
        None
    } else {
        Some(line.to_string())
    }
}

/// Extract the explicit port from the URL stored on the first line of `path`
///
/// Returns `None` if the file is empty or absent, the URL does not parse, or
/// it carries no port. A port equal to the scheme default (`:80`, `:443`) is
/// still reported when it is written out.
#[must_use]
pub fn metadata_server_port(path: &Path) -> Option<u16> {
    let line = read_one_line_file(path)?;
    match url::Url::parse(&line) {
        Ok(url) => url.port().or_else(|| {
            has_explicit_port(&line)
                .then(|| url.port_or_known_default())
                .flatten()
        }),
        Err(e) => {
            tracing::debug!(url = %line, error = %e, "Ignoring malformed metadata server URL");
            None
        }
    }
}

/// Whether the authority of `text` ends in `:DIGITS`
///
/// `Url` normalizes a default port away, so the raw text has to be checked.
fn has_explicit_port(text: &str) -> bool {
    let Some((_, rest)) = text.split_once("://") else {
        return false;
    };
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    host_port.rsplit_once(':').is_some_and(|(host, port)| {
        !port.is_empty()
            && port.bytes().all(|b| b.is_ascii_digit())
            && (!host.starts_with('[') || host.ends_with(']'))
    })
}

/// Parse a `KEY=VALUE` credentials file
///
/// Whitespace around keys, values and the `=` is ignored, as are blank lines
/// and lines starting with `#`. Lines without `=` are skipped.
#[must_use]
pub fn parse_creds_file(path: &Path) -> IndexMap<String, String> {
    let Ok(content) = fs::read_to_string(path) else {
        return IndexMap::new();
    };

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}
