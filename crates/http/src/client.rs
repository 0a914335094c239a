//! HTTP client with redirect and error-status handling

use crate::transport::{HttpRequest, HttpTransport, RawResponse, TlsOptions};
use crate::{Error, Result};
use indexmap::IndexMap;

/// Maximum number of redirects followed for one request
pub const MAX_REDIRECTS: usize = 10;

/// Default `User-Agent` when none is configured
pub const DEFAULT_USER_AGENT: &str = "heat-cfntools";

/// Final response of a request, after redirects
pub type HttpResponse = RawResponse;

impl RawResponse {
    /// Look up a header by (case-insensitive) name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body decoded as UTF-8, lossily
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Client that wraps a transport with the agent's request semantics
///
/// - `User-Agent` and `Accept: */*` are added unless the caller set them
/// - 400..600 become [`Error::HttpStatus`]
/// - 301, 302 and 305 are reissued against the `location` header
/// - a bare 300 is an error
pub struct HttpClient {
    transport: Box<dyn HttpTransport>,
    user_agent: String,
}

impl HttpClient {
    /// Create a client over `transport` with the default user agent
    pub fn new(transport: impl HttpTransport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }

    /// Override the `User-Agent` header value
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// The configured user agent
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Convenience wrapper for a body-less GET
    pub fn get(&self, url: &str) -> Result<HttpResponse> {
        self.request("GET", url, None, &IndexMap::new())
    }

    /// Send a request and follow redirects until a final response arrives
    #[tracing::instrument(skip(self, body, headers))]
    pub fn request(
        &self,
        method: &str,
        url: &str,
        body: Option<&[u8]>,
        headers: &IndexMap<String, String>,
    ) -> Result<HttpResponse> {
        let mut headers = headers.clone();
        set_default(&mut headers, "User-Agent", &self.user_agent);
        set_default(&mut headers, "Accept", "*/*");

        let mut request = HttpRequest {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            headers,
            body: body.map(<[u8]>::to_vec),
        };

        for _ in 0..=MAX_REDIRECTS {
            tracing::debug!(
                "{}",
                curl_command(&request, self.transport.tls_options())
            );
            let response = self.transport.send(&request)?;
            tracing::debug!("{}", log_http_response(&response));

            match response.status {
                400..600 | 300 => {
                    return Err(Error::HttpStatus {
                        reason: response.reason,
                        status: response.status,
                    });
                }
                301 | 302 | 305 => {
                    let location = response.header("location").ok_or_else(|| {
                        Error::Transport(format!(
                            "redirect ({}) from {} without a location header",
                            response.status, request.url
                        ))
                    })?;
                    let next = resolve_location(&request.url, location);
                    tracing::debug!(from = %request.url, to = %next, "Following redirect");
                    request.url = next;
                }
                _ => return Ok(response),
            }
        }

        Err(Error::Transport(format!(
            "too many redirects (more than {MAX_REDIRECTS}) for {url}"
        )))
    }
}

fn set_default(headers: &mut IndexMap<String, String>, name: &str, value: &str) {
    if !headers.keys().any(|k| k.eq_ignore_ascii_case(name)) {
        headers.insert(name.to_string(), value.to_string());
    }
}

fn resolve_location(base: &str, location: &str) -> String {
    match url::Url::parse(base).and_then(|b| b.join(location)) {
        Ok(resolved) => resolved.to_string(),
        Err(_) => location.to_string(),
    }
}

/// Render a request as the equivalent `curl` invocation
#[must_use]
pub fn curl_command(request: &HttpRequest, tls: Option<&TlsOptions>) -> String {
    let mut curl = vec![format!("curl -i -X {}", request.method)];

    for (key, value) in &request.headers {
        curl.push(format!("-H '{key}: {value}'"));
    }

    if let Some(tls) = tls {
        if let Some(key) = &tls.key_file {
            curl.push(format!("--key {}", key.display()));
        }
        if let Some(cert) = &tls.cert_file {
            curl.push(format!("--cert {}", cert.display()));
        }
        if let Some(ca) = &tls.ca_file {
            curl.push(format!("--cacert {}", ca.display()));
        }
        if tls.insecure {
            curl.push("-k".to_string());
        }
    }

    if let Some(body) = &request.body
        && !body.is_empty()
    {
        curl.push(format!("-d '{}'", String::from_utf8_lossy(body)));
    }

    curl.push(format!("\"{}\"", request.url));
    curl.join(" ")
}

/// Render a response as a status line, headers and body
#[must_use]
pub fn log_http_response(response: &RawResponse) -> String {
    let mut dump = vec![format!(
        "\nHTTP/{} {} {}",
        response.version, response.status, response.reason
    )];
    dump.extend(response.headers.iter().map(|(k, v)| format!("{k}: {v}")));
    dump.push(String::new());
    if !response.body.is_empty() {
        dump.push(response.text());
        dump.push(String::new());
    }
    dump.join("\n")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_log_http_response() {
        let response = RawResponse {
            version: "1.0".to_string(),
            status: 200,
            reason: "because".to_string(),
            headers: IndexMap::new(),
            body: b"yo".to_vec(),
        };
        assert_eq!(log_http_response(&response), "\nHTTP/1.0 200 because\n\nyo\n");
    }

    #[test]
    fn test_log_http_response_with_headers_no_body() {
        let mut headers = IndexMap::new();
        headers.insert("content-length".to_string(), "0".to_string());
        let response = RawResponse {
            version: "1.1".to_string(),
            status: 204,
            reason: "No Content".to_string(),
            headers,
            body: Vec::new(),
        };
        assert_eq!(
            log_http_response(&response),
            "\nHTTP/1.1 204 No Content\ncontent-length: 0\n"
        );
    }

    #[test]
    fn test_curl_command() {
        let mut headers = IndexMap::new();
        headers.insert("User-Agent".to_string(), "heat-cfntools".to_string());
        let request = HttpRequest {
            method: "POST".to_string(),
            url: "https://localhost/path".to_string(),
            headers,
            body: Some(br#"{"foo": "bar"}"#.to_vec()),
        };
        let tls = TlsOptions {
            cert_file: Some(PathBuf::from("/c.pem")),
            key_file: Some(PathBuf::from("/k.pem")),
            ca_file: None,
            insecure: true,
        };
        assert_eq!(
            curl_command(&request, Some(&tls)),
            "curl -i -X POST -H 'User-Agent: heat-cfntools' --key /k.pem --cert /c.pem -k \
             -d '{\"foo\": \"bar\"}' \"https://localhost/path\""
        );
    }

    #[test]
    fn test_resolve_location() {
        assert_eq!(
            resolve_location("http://h/p", "http://other/q"),
            "http://other/q"
        );
        assert_eq!(resolve_location("http://h/a/b", "/c"), "http://h/c");
    }

    #[test]
    fn test_set_default_respects_caller() {
        let mut headers = IndexMap::new();
        headers.insert("accept".to_string(), "application/json".to_string());
        set_default(&mut headers, "Accept", "*/*");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["accept"], "application/json");
    }
}
