use std::time::Duration;

use serde_json::Value as JsonValue;

use crate::request::Method;

/// Per-request timeout, independent of any polling ceiling; a stalled
/// request must not block the surrounding convergence loop.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("host unreachable: {0}")]
    Unreachable(String),
}

/// Raw HTTP reply. Error statuses (4xx/5xx) come back as replies, not
/// errors; only transport-level failures surface as `TransportError`.
#[derive(Clone, Debug)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Blocking HTTP seam. One command invocation performs one login, a
/// sequence of calls, and one logout over a single implementation; tests
/// substitute a scripted fake.
pub trait Transport {
    fn call(
        &self,
        method: Method,
        url: &str,
        authorization: &str,
        body: Option<&JsonValue>,
    ) -> Result<HttpReply, TransportError>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .http_status_as_error(false)
            .build()
            .new_agent();
        UreqTransport { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn call(
        &self,
        method: Method,
        url: &str,
        authorization: &str,
        body: Option<&JsonValue>,
    ) -> Result<HttpReply, TransportError> {
        tracing::debug!(
            method = method.as_str(),
            url,
            has_body = body.is_some(),
            "admin api request"
        );
        let result = match method {
            Method::Get | Method::Delete => {
                let mut request = match method {
                    Method::Get => self.agent.get(url),
                    _ => self.agent.delete(url),
                }
                .header("Content-Type", "application/json");
                // The pre-login reachability probe carries no token.
                if !authorization.is_empty() {
                    request = request.header("Authorization", authorization);
                }
                request.call()
            }
            Method::Post | Method::Patch | Method::Put => {
                let mut request = match method {
                    Method::Post => self.agent.post(url),
                    Method::Put => self.agent.put(url),
                    _ => self.agent.patch(url),
                }
                .header("Content-Type", "application/json");
                if !authorization.is_empty() {
                    request = request.header("Authorization", authorization);
                }
                match body {
                    Some(json) => request.send_json(json),
                    // A bodyless POST still sends Content-Length: 0.
                    None => request.send_empty(),
                }
            }
        };

        match result {
            Ok(mut response) => {
                let status = response.status().as_u16();
                let body = response
                    .body_mut()
                    .read_to_string()
                    .unwrap_or_default()
                    .into_bytes();
                tracing::debug!(status, bytes = body.len(), "admin api response");
                Ok(HttpReply { status, body })
            }
            Err(err) => {
                tracing::debug!(error = %err, "admin api request failed");
                Err(TransportError::Unreachable(err.to_string()))
            }
        }
    }
}

/// Bearer tokens arrive from the server as opaque strings; strip any stray
/// line breaks before they land in a header.
pub fn bearer(token: &str) -> String {
    let cleaned: String = token.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    format!("Bearer {cleaned}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_strips_line_breaks() {
        assert_eq!(bearer("abc\r\ndef"), "Bearer abcdef");
        assert_eq!(bearer("plain"), "Bearer plain");
    }
}
