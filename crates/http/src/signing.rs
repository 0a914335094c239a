//! Version 2 query signing (HMAC-SHA256)
//!
//! The string to sign is
//! `METHOD\nhost[:port]\npath\ncanonical-query`, where the canonical query is
//! the byte-sorted parameter list with RFC 3986 percent-encoding.

use crate::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use stackinit_core::parse_creds_file;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Key name of the access key in a credentials file
pub const ACCESS_KEY_NAME: &str = "AWSAccessKeyId";
/// Key name of the secret key in a credentials file
pub const SECRET_KEY_NAME: &str = "AWSSecretKey";

/// Everything except RFC 3986 unreserved characters is escaped
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

type HmacSha256 = Hmac<Sha256>;

/// Access/secret key pair used to sign requests
pub struct Credentials {
    access_key: String,
    secret_key: SecretString,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Build credentials from an explicit key pair
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: access_key.into(),
            secret_key: SecretString::from(secret_key.into()),
        }
    }

    /// Load credentials from a `KEY=VALUE` credentials file
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::Configuration(format!(
                "invalid credentials file {}",
                path.display()
            )));
        }
        let mut creds = parse_creds_file(path);
        let access = creds.shift_remove(ACCESS_KEY_NAME);
        let secret = creds.shift_remove(SECRET_KEY_NAME);
        match (access, secret) {
            (Some(access), Some(secret)) => Ok(Self::new(access, secret)),
            _ => Err(Error::Configuration(format!(
                "credentials file {} must define {ACCESS_KEY_NAME} and {SECRET_KEY_NAME}",
                path.display()
            ))),
        }
    }

    /// The public access key id
    #[must_use]
    pub fn access_key(&self) -> &str {
        &self.access_key
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, UNRESERVED).to_string()
}

/// Sign `params` for a request to `url` and return the full query string
///
/// The signing parameters (`AWSAccessKeyId`, `SignatureMethod`,
/// `SignatureVersion`, `Timestamp`) are added before signing; `Signature` is
/// appended last.
pub fn sign_query(
    method: &str,
    url: &url::Url,
    params: &[(&str, &str)],
    credentials: &Credentials,
    timestamp: &str,
) -> Result<String> {
    let mut all: BTreeMap<&str, &str> = params.iter().copied().collect();
    all.insert(ACCESS_KEY_NAME, credentials.access_key());
    all.insert("SignatureMethod", "HmacSHA256");
    all.insert("SignatureVersion", "2");
    all.insert("Timestamp", timestamp);

    let canonical = all
        .iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    let host = url
        .host_str()
        .ok_or_else(|| Error::Transport(format!("URL has no host: {url}")))?
        .to_ascii_lowercase();
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    };
    let string_to_sign = format!(
        "{}\n{host}\n{}\n{canonical}",
        method.to_ascii_uppercase(),
        url.path()
    );

    let mut mac = HmacSha256::new_from_slice(credentials.secret_key.expose_secret().as_bytes())
        .map_err(|e| Error::Transport(format!("invalid signing key: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    Ok(format!("{canonical}&Signature={}", encode(&signature)))
}

/// Current time in the format expected by the `Timestamp` parameter
#[must_use]
pub fn timestamp_now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
