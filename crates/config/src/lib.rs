//! Configuration management for stackinit
//!
//! This crate handles:
//! - Agent settings loading (`agent.toml`)
//! - Well-known host paths shared with the orchestration service
//! - Logging initialization

pub mod logging;
pub mod paths;
pub mod settings;

// Re-export error types from core
pub use stackinit_core::{Error, Result};

// Re-export main types
pub use settings::{AgentSettings, HttpSettings, PathSettings};
