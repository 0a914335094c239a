//! Signal command implementation
//!
//! Report success or failure to a wait condition handle.

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Args};
use indexmap::IndexMap;
use owo_colors::OwoColorize;
use serde_json::{Value, json};

use crate::command::Command;
use crate::common::RuntimeContext;
use crate::error::Result;

const REASON_SUCCESS: &str = "Configuration Complete";
const REASON_FAILURE: &str = "Configuration Failed";
const DEFAULT_DATA: &str = "Application has completed configuration.";
const DEFAULT_UNIQUE_ID: &str = "00000";

/// Signal a wait condition
#[derive(Debug, Args)]
pub struct SignalCommand {
    /// Pre-signed wait condition URL
    #[arg(value_name = "URL")]
    pub url: String,

    /// Whether configuration succeeded
    #[arg(
        short,
        long,
        default_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub success: bool,

    /// Reason for the status (default depends on --success)
    #[arg(short, long)]
    pub reason: Option<String>,

    /// Data to send back with the signal
    #[arg(short, long, default_value = DEFAULT_DATA)]
    pub data: String,

    /// Unique ID of this signal
    #[arg(short = 'i', long = "id", default_value = DEFAULT_UNIQUE_ID)]
    pub unique_id: String,
}

impl SignalCommand {
    /// `SUCCESS` or `FAILURE`
    #[must_use]
    pub fn status(&self) -> &'static str {
        if self.success { "SUCCESS" } else { "FAILURE" }
    }

    /// JSON body sent to the wait condition
    #[must_use]
    pub fn body(&self) -> Value {
        let reason = self.reason.as_deref().unwrap_or(if self.success {
            REASON_SUCCESS
        } else {
            REASON_FAILURE
        });
        json!({
            "Status": self.status(),
            "Reason": reason,
            "UniqueId": self.unique_id,
            "Data": self.data,
        })
    }
}

impl Command for SignalCommand {
    type Output = ();

    fn execute(&self, context: &RuntimeContext) -> Result<()> {
        let body = serde_json::to_vec(&self.body())?;
        let mut headers = IndexMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        tracing::info!(url = %self.url, status = self.status(), "Signalling wait condition");
        context
            .runtime
            .http()
            .request("PUT", &self.url, Some(&body), &headers)?;

        println!("{} Sent {}", "✓".green(), self.status().bold());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use stackinit_config::AgentSettings;
    use stackinit_engine::{RecordingExecutor, Runtime};
    use stackinit_http::{HttpClient, HttpRequest, HttpTransport, RawResponse};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct Capture {
        requests: Rc<RefCell<Vec<HttpRequest>>>,
        status: u16,
    }

    impl HttpTransport for Capture {
        fn send(&self, request: &HttpRequest) -> stackinit_http::Result<RawResponse> {
            self.requests.borrow_mut().push(request.clone());
            Ok(RawResponse {
                version: "1.1".to_string(),
                status: self.status,
                reason: "OK".to_string(),
                ..RawResponse::default()
            })
        }
    }

    fn signal(success: bool, reason: Option<&str>) -> SignalCommand {
        SignalCommand {
            url: "http://heat.example.com:8000/v1/waitcondition/abc".into(),
            success,
            reason: reason.map(str::to_string),
            data: DEFAULT_DATA.into(),
            unique_id: DEFAULT_UNIQUE_ID.into(),
        }
    }

    #[test]
    fn test_body_success_keeps_field_order() {
        assert_eq!(
            signal(true, None).body().to_string(),
            r#"{"Status":"SUCCESS","Reason":"Configuration Complete","UniqueId":"00000","Data":"Application has completed configuration."}"#
        );
    }

    #[test]
    fn test_body_failure_reason() {
        let body = signal(false, None).body();
        assert_eq!(body["Status"], "FAILURE");
        assert_eq!(body["Reason"], REASON_FAILURE);

        let body = signal(false, Some("yum failed")).body();
        assert_eq!(body["Reason"], "yum failed");
    }

    #[test]
    fn test_execute_puts_json() {
        let transport = Capture {
            status: 200,
            ..Capture::default()
        };
        let runtime = Runtime::new(RecordingExecutor::new(), HttpClient::new(transport.clone()));
        let context = RuntimeContext::from_parts(AgentSettings::default(), runtime);

        signal(true, None).execute(&context).unwrap();

        let requests = transport.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "PUT");
        assert_eq!(
            requests[0].headers.get("Content-Type").map(String::as_str),
            Some("application/json")
        );
        let sent: Value = serde_json::from_slice(requests[0].body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, signal(true, None).body());
    }

    #[test]
    fn test_execute_reports_http_error() {
        let transport = Capture {
            status: 403,
            ..Capture::default()
        };
        let runtime = Runtime::new(RecordingExecutor::new(), HttpClient::new(transport));
        let context = RuntimeContext::from_parts(AgentSettings::default(), runtime);

        let err = signal(true, None).execute(&context).unwrap_err();
        assert_eq!(err.to_string(), "OK (403)");
    }
}
