//! Config section handlers
//!
//! One handler per section of a config. Each borrows its section and the
//! [`Runtime`](crate::runtime::Runtime) and applies it with `apply()`.

pub mod accounts;
pub mod commands;
pub mod files;
pub mod packages;
pub mod sources;

pub use accounts::{GroupsHandler, UsersHandler};
pub use commands::CommandsHandler;
pub use files::FilesHandler;
pub use packages::{PackageManager, PackagesHandler};
pub use sources::{ArchiveKind, SourcesHandler};

use serde_json::Value;

/// A string or number property as text
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
