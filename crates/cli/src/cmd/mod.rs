//! Subcommand implementations

pub mod get_metadata;
pub mod hup;
pub mod init;
pub mod signal;
