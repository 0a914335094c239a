//! Change hooks
//!
//! - `config`: a single [`Hook`], matching events against its triggers and resource
//! - `loader`: [`HupConfig`], the hook configuration file and its `[main]` section

pub mod config;
pub mod loader;

pub use config::{DEFAULT_RUNAS, Hook};
pub use loader::{DEFAULT_INTERVAL, DEFAULT_REGION, HupConfig};
