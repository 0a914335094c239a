//! Core types and utilities for stackinit
//!
//! This is the foundation crate (Layer 0) that all other stackinit crates depend on.
//! It provides:
//! - The shared error taxonomy
//! - Pure helpers for boolean coercion and the small host files the agent reads
//!   (metadata server location, credentials)
//!
//! This crate has no dependencies on other stackinit crates.

pub mod error;
pub mod util;

pub use error::{Error, Result};
pub use util::{metadata_server_port, parse_creds_file, read_one_line_file, to_boolean};
