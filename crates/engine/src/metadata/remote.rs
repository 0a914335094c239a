//! Describe-resource call against the metadata server

use super::RetrieveOptions;
use crate::{Error, Result};
use serde_json::Value;
use stackinit_core::{metadata_server_port, read_one_line_file};
use stackinit_http::signing::timestamp_now;
use stackinit_http::{Credentials, HttpClient, sign_query};
use std::path::Path;
use url::Url;

/// Port of the metadata server when its URL does not carry one
pub const DEFAULT_PORT: u16 = 8000;

const DEFAULT_HOST: &str = "localhost";

const METADATA_POINTER: &str =
    "/DescribeStackResourceResponse/DescribeStackResourceResult/StackResourceDetail/Metadata";

/// Key pair to sign with: explicit keys first, then the credentials file
///
/// `None` means the remote endpoint is not consulted at all.
pub fn resolve_credentials(options: &RetrieveOptions) -> Option<Credentials> {
    if let (Some(access), Some(secret)) = (&options.access_key, &options.secret_key) {
        return Some(Credentials::new(access, secret));
    }
    let path = options.credentials_file.as_deref()?;
    if !path.is_file() {
        tracing::debug!(path = %path.display(), "No credentials, skipping metadata server");
        return None;
    }
    match Credentials::from_file(path) {
        Ok(credentials) => Some(credentials),
        Err(e) => {
            tracing::warn!("{e}");
            None
        }
    }
}

/// Service endpoint derived from the metadata server file
///
/// Scheme and host come from the URL in the file; the port defaults to
/// [`DEFAULT_PORT`]. Without a usable file the endpoint is
/// `http://localhost:8000/v1/`.
pub fn endpoint(metadata_server: &Path) -> Result<Url> {
    let server = read_one_line_file(metadata_server).and_then(|line| Url::parse(&line).ok());
    let (scheme, host) = match &server {
        Some(url) => (url.scheme(), url.host_str().unwrap_or(DEFAULT_HOST)),
        None => ("http", DEFAULT_HOST),
    };
    let port = metadata_server_port(metadata_server).unwrap_or(DEFAULT_PORT);

    let endpoint = format!("{scheme}://{host}:{port}/v1/");
    Url::parse(&endpoint)
        .map_err(|e| Error::Configuration(format!("invalid metadata endpoint {endpoint}: {e}")))
}

/// Fetch the metadata of `resource` in `stack`
///
/// The `Metadata` field of the answer may be an object or a JSON string.
#[tracing::instrument(skip(http, credentials))]
pub fn describe_stack_resource(
    http: &HttpClient,
    endpoint: &Url,
    credentials: &Credentials,
    stack: &str,
    resource: Option<&str>,
) -> Result<Value> {
    let mut params = vec![
        ("Action", "DescribeStackResource"),
        ("StackName", stack),
        ("ContentType", "JSON"),
    ];
    if let Some(resource) = resource {
        params.push(("LogicalResourceId", resource));
    }
    let query = sign_query("GET", endpoint, &params, credentials, &timestamp_now())?;

    let response = http.get(&format!("{endpoint}?{query}"))?;
    let envelope: Value = serde_json::from_slice(&response.body)?;

    match envelope.pointer(METADATA_POINTER) {
        Some(Value::String(text)) => serde_json::from_str(text).map_err(Error::from),
        Some(document @ Value::Object(_)) => Ok(document.clone()),
        _ => Err(Error::Retrieval(
            "response carries no resource metadata".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use std::fs;

    #[test]
    fn test_endpoint_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let url = endpoint(&dir.path().join("absent")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8000/v1/");
    }

    #[test]
    fn test_endpoint_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server");
        fs::write(&path, "https://heat.example.com:8443/\n").unwrap();
        assert_eq!(
            endpoint(&path).unwrap().as_str(),
            "https://heat.example.com:8443/v1/"
        );

        fs::write(&path, "http://10.0.0.1/").unwrap();
        assert_eq!(endpoint(&path).unwrap().as_str(), "http://10.0.0.1:8000/v1/");
    }

    #[test]
    fn test_endpoint_keeps_scheme_default_port() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server");

        fs::write(&path, "http://10.0.0.1:80/").unwrap();
        let url = endpoint(&path).unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.1/v1/");
        assert_eq!(url.port_or_known_default(), Some(80));

        fs::write(&path, "https://heat.example.com:443\n").unwrap();
        let url = endpoint(&path).unwrap();
        assert_eq!(url.as_str(), "https://heat.example.com/v1/");
        assert_eq!(url.port_or_known_default(), Some(443));
    }

    #[test]
    fn test_explicit_keys_win() {
        let options = RetrieveOptions {
            default_path: "d".into(),
            last_path: "l".into(),
            meta_str: None,
            metadata_server: "m".into(),
            access_key: Some("foo".to_string()),
            secret_key: Some("bar".to_string()),
            credentials_file: None,
        };
        assert_eq!(resolve_credentials(&options).unwrap().access_key(), "foo");
    }

    #[test]
    fn test_no_credentials_skips_remote() {
        let dir = tempfile::tempdir().unwrap();
        let options = RetrieveOptions {
            default_path: "d".into(),
            last_path: "l".into(),
            meta_str: None,
            metadata_server: "m".into(),
            access_key: Some("foo".to_string()),
            secret_key: None,
            credentials_file: Some(dir.path().join("creds")),
        };
        assert!(resolve_credentials(&options).is_none());
    }
}
