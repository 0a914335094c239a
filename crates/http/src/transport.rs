//! Transport abstraction
//!
//! [`HttpTransport`] performs exactly one request/response exchange. It never
//! follows redirects and never turns a status code into an error: both are the
//! job of [`crate::HttpClient`]. Tests substitute scripted transports.

use crate::{Error, Result};
use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// System CA bundle locations, searched in order when no CA file is configured
///
/// Debian/Ubuntu, RedHat/Fedora, SUSE, FreeBSD/OpenBSD.
pub const SYSTEM_CA_FILES: &[&str] = &[
    "/etc/ssl/certs/ca-certificates.crt",
    "/etc/pki/tls/certs/ca-bundle.crt",
    "/etc/ssl/ca-bundle.pem",
    "/etc/ssl/cert.pem",
];

/// A single outgoing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// HTTP method, upper case
    pub method: String,
    /// Absolute URL
    pub url: String,
    /// Request headers in insertion order
    pub headers: IndexMap<String, String>,
    /// Optional request body
    pub body: Option<Vec<u8>>,
}

/// A single response, exactly as received
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawResponse {
    /// Protocol version, e.g. `1.1`
    pub version: String,
    /// Status code
    pub status: u16,
    /// Reason phrase
    pub reason: String,
    /// Response headers, names lower-cased
    pub headers: IndexMap<String, String>,
    /// Response body
    pub body: Vec<u8>,
}

/// TLS settings for https requests
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsOptions {
    /// Client certificate (PEM)
    pub cert_file: Option<PathBuf>,
    /// Client private key (PEM); only used together with `cert_file`
    pub key_file: Option<PathBuf>,
    /// CA bundle to verify the server against
    pub ca_file: Option<PathBuf>,
    /// Skip server certificate verification
    pub insecure: bool,
}

impl TlsOptions {
    /// The CA bundle to trust: the configured one, else the first system bundle found
    #[must_use]
    pub fn effective_ca_file(&self) -> Option<PathBuf> {
        self.ca_file.clone().or_else(|| {
            SYSTEM_CA_FILES
                .iter()
                .map(Path::new)
                .find(|p| p.exists())
                .map(Path::to_path_buf)
        })
    }
}

/// One request/response exchange
pub trait HttpTransport {
    /// Send `request` and return whatever the server answered
    fn send(&self, request: &HttpRequest) -> Result<RawResponse>;

    /// TLS settings in effect, used for request logging
    fn tls_options(&self) -> Option<&TlsOptions> {
        None
    }
}

/// Blocking transport backed by `reqwest`
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
    tls: TlsOptions,
}

impl ReqwestTransport {
    /// Build a transport with the given TLS settings
    ///
    /// Redirects are disabled at this layer.
    pub fn new(tls: TlsOptions) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(30));

        if tls.insecure {
            builder = builder.danger_accept_invalid_certs(true);
        } else if let Some(ca_file) = tls.effective_ca_file() {
            let pem = read(&ca_file)?;
            let certs = reqwest::Certificate::from_pem_bundle(&pem).map_err(|e| {
                Error::Transport(format!("invalid CA bundle {}: {e}", ca_file.display()))
            })?;
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        if let Some(cert_file) = &tls.cert_file {
            let mut pem = read(cert_file)?;
            if let Some(key_file) = &tls.key_file {
                pem.push(b'\n');
                pem.extend(read(key_file)?);
            }
            let identity = reqwest::Identity::from_pem(&pem).map_err(|e| {
                Error::Transport(format!(
                    "invalid client certificate {}: {e}",
                    cert_file.display()
                ))
            })?;
            builder = builder.identity(identity);
        }

        let client = builder
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, tls })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, request: &HttpRequest) -> Result<RawResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|e| Error::Transport(format!("invalid method {}: {e}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .map_err(|e| Error::Transport(format!("{} {}: {e}", request.method, request.url)))?;

        let status = response.status();
        // Debug renders as "HTTP/1.1"
        let version = format!("{:?}", response.version());
        let version = version.trim_start_matches("HTTP/").to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .map_err(|e| Error::Transport(format!("failed to read response body: {e}")))?
            .to_vec();

        Ok(RawResponse {
            version,
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body,
        })
    }

    fn tls_options(&self) -> Option<&TlsOptions> {
        Some(&self.tls)
    }
}

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })
}
