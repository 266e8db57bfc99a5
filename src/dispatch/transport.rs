//! Outbound webhook transport
//!
//! The dispatcher talks to the network only through [`WebhookTransport`], so
//! tests can count calls without a socket. [`HttpTransport`] is the real
//! implementation (blocking `ureq`, one request per call, bounded timeout).

use super::TriggerEvent;
use std::time::Duration;
use thiserror::Error;

/// `User-Agent` sent with every webhook call (GitHub rejects requests without one)
pub const USER_AGENT: &str = concat!("farewatch/", env!("CARGO_PKG_VERSION"));

/// One authenticated webhook POST
#[derive(Debug, Clone, Copy)]
pub struct WebhookRequest<'a> {
    /// Target URL
    pub url: &'a str,
    /// Bearer token for the `Authorization` header
    pub bearer_token: &'a str,
    /// JSON body
    pub event: &'a TriggerEvent,
    /// Upper bound on the whole request
    pub timeout: Duration,
}

/// Network-level failure (no HTTP status was received)
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The request did not complete within its timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, DNS, TLS or protocol failure
    #[error("transport failure: {0}")]
    Connection(String),
}

/// Sends a webhook request and reports the HTTP status code.
///
/// Any received status (2xx or not) is `Ok`; only failures to get a response
/// are `Err`.
pub trait WebhookTransport: Send + Sync {
    /// Perform exactly one POST.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if no HTTP response was received.
    fn post(&self, request: &WebhookRequest<'_>) -> Result<u16, TransportError>;
}

/// HTTP transport backed by `ureq`
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpTransport;

impl WebhookTransport for HttpTransport {
    fn post(&self, request: &WebhookRequest<'_>) -> Result<u16, TransportError> {
        let agent = ureq::AgentBuilder::new().timeout(request.timeout).build();

        let response = agent
            .post(request.url)
            .set("Authorization", &format!("Bearer {}", request.bearer_token))
            .set("Accept", "application/vnd.github+json")
            .set("User-Agent", USER_AGENT)
            .send_json(request.event);

        match response {
            Ok(resp) => Ok(resp.status()),
            Err(ureq::Error::Status(code, _)) => Ok(code),
            Err(ureq::Error::Transport(transport)) => {
                if is_timeout(&transport) {
                    Err(TransportError::Timeout(request.timeout))
                } else {
                    Err(TransportError::Connection(transport.to_string()))
                }
            }
        }
    }
}

fn is_timeout(transport: &ureq::Transport) -> bool {
    use std::error::Error as _;

    transport
        .source()
        .and_then(|source| source.downcast_ref::<std::io::Error>())
        .is_some_and(|io| {
            matches!(
                io.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_has_version() {
        assert!(USER_AGENT.starts_with("farewatch/"));
    }

    #[test]
    fn test_unreachable_endpoint_is_transport_error() {
        let event = TriggerEvent::retrain(false);
        // Port 9 (discard) on localhost is closed in test environments.
        let request = WebhookRequest {
            url: "http://127.0.0.1:9/dispatches",
            bearer_token: "token",
            event: &event,
            timeout: Duration::from_secs(2),
        };
        let result = HttpTransport.post(&request);
        assert!(result.is_err(), "expected transport failure, got {result:?}");
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Timeout(Duration::from_secs(5));
        assert!(err.to_string().contains("timed out"));
        let err = TransportError::Connection("refused".to_string());
        assert!(err.to_string().contains("refused"));
    }
}
