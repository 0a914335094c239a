//! HTTP plumbing for stackinit
//!
//! - `transport`: the [`HttpTransport`] seam and its blocking `reqwest` implementation
//! - `client`: [`HttpClient`], which adds default headers, redirect handling and
//!   status-code errors on top of any transport
//! - `signing`: version 2 query signing used by the describe-resource call

pub mod client;
pub mod signing;
pub mod transport;

pub use client::{HttpClient, HttpResponse, MAX_REDIRECTS};
pub use signing::{Credentials, sign_query};
pub use transport::{HttpRequest, HttpTransport, RawResponse, ReqwestTransport, TlsOptions};

// Re-export error types from core
pub use stackinit_core::{Error, Result};
