//! # stackinit engine
//!
//! Applies a stack resource's configuration document to the host and reacts
//! to later changes.
//!
//! - **Commands**: process execution behind the [`Executor`] seam, single
//!   command lines ([`CommandRunner`]) and conditional chains ([`CommandSequence`])
//! - **Services**: [`ServiceManager`] conventions and [`ServicesHandler`]
//!   reconciliation
//! - **Hooks**: [`Hook`] bindings and the [`HupConfig`] file
//! - **Metadata**: retrieval, validation and interpretation of the document
//!   ([`Metadata`]), with one handler per config section

pub mod command;
pub mod handlers;
pub mod hooks;
pub mod metadata;
pub mod runtime;
pub mod services;

// Re-export error types from core
pub use stackinit_core::{Error, Result};

// Re-export commonly used types
pub use command::{
    CommandRunner, CommandSequence, Executor, Invocation, ProcessOutput, RecordingExecutor,
    StepPolicy, SystemExecutor,
};
pub use hooks::{Hook, HupConfig};
pub use metadata::{INIT_KEY, Metadata, MetadataInput, RetrieveOptions};
pub use runtime::Runtime;
pub use services::{ServiceAction, ServiceManager, ServicesHandler};
