//! Post-restart verification against the service's `/version` endpoint.
//!
//! One request, no retries. Certificate checks are off because deployment
//! certificates are commonly self-signed. The request and response are
//! captured as a curl-style trace for the operator.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use crate::error::ProbeError;

pub const VERSION_PATH: &str = "/version";

pub trait VersionProbe {
    fn verify(&self, server_name: &str, use_ssl: bool, expected: &str) -> Result<(), ProbeError>;
}

/// Success iff `body` contains `expected`.
pub fn check_body(expected: &str, body: &str, trace: String) -> Result<(), ProbeError> {
    if body.contains(expected) {
        return Ok(());
    }
    Err(ProbeError::Mismatch {
        expected: expected.to_string(),
        observed: body.trim().to_string(),
        trace,
    })
}

/// Connects to `connect_host` (typically `localhost`) and sends the
/// server name as the `Host` header, so the right virtual host answers.
pub struct HttpVersionProbe {
    connect_host: String,
    timeout: Duration,
}

impl HttpVersionProbe {
    pub fn new(connect_host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            connect_host: connect_host.into(),
            timeout,
        }
    }

    fn url(&self, use_ssl: bool) -> String {
        let scheme = if use_ssl { "https" } else { "http" };
        format!("{scheme}://{}{VERSION_PATH}", self.connect_host)
    }

    fn agent(&self) -> Result<ureq::Agent, String> {
        let tls = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .danger_accept_invalid_hostnames(true)
            .build()
            .map_err(|e| e.to_string())?;
        Ok(ureq::AgentBuilder::new()
            .timeout(self.timeout)
            .tls_connector(Arc::new(tls))
            .build())
    }
}

impl VersionProbe for HttpVersionProbe {
    fn verify(&self, server_name: &str, use_ssl: bool, expected: &str) -> Result<(), ProbeError> {
        let url = self.url(use_ssl);
        let mut trace = String::new();
        let _ = writeln!(trace, "* Connecting to {url}");
        let _ = writeln!(trace, "> GET {VERSION_PATH} HTTP/1.1");
        let _ = writeln!(trace, "> Host: {server_name}");

        let unreachable = |reason: String, trace: String| ProbeError::Unreachable {
            url: url.clone(),
            reason,
            trace,
        };
        let agent = self.agent().map_err(|e| unreachable(e, trace.clone()))?;

        let response = match agent.get(&url).set("Host", server_name).call() {
            Ok(resp) => resp,
            // Non-2xx still carries a body worth comparing and showing.
            Err(ureq::Error::Status(_, resp)) => resp,
            Err(ureq::Error::Transport(t)) => {
                let _ = writeln!(trace, "* {t}");
                tracing::warn!(url = %url, error = %t, "version probe unreachable");
                return Err(unreachable(t.to_string(), trace));
            }
        };

        let _ = writeln!(
            trace,
            "< {} {} {}",
            response.http_version(),
            response.status(),
            response.status_text()
        );
        for name in response.headers_names() {
            if let Some(value) = response.header(&name) {
                let _ = writeln!(trace, "< {name}: {value}");
            }
        }
        let body = response
            .into_string()
            .map_err(|e| unreachable(e.to_string(), trace.clone()))?;
        let _ = writeln!(trace, "<");
        trace.push_str(&body);

        let result = check_body(expected, &body, trace);
        match &result {
            Ok(()) => tracing::info!(server_name, expected, "version verified"),
            Err(e) => tracing::error!(server_name, error = %e, "version mismatch"),
        }
        result
    }
}
