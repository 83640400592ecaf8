//! Messaging transports: the collaborator that actually delivers an SMS.
//!
//! - [`HttpSmsGateway`] — POSTs to an HTTP SMS gateway
//! - [`DryRunTransport`] — logs the message and reports success

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

/// HTTP connect timeout for the reqwest client.
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// HTTP request timeout for a single send.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors a transport may report for one send.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Sending SMS is not permitted (OS permission, gateway credentials).
    #[error("SMS permission denied")]
    PermissionDenied,

    /// The message was not accepted for delivery.
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

/// Outbound SMS capability.
#[async_trait]
pub trait MessagingTransport: Send + Sync {
    /// Send `text` to a phone number given as bare digits.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the message was not sent.
    async fn send(&self, phone_digits: &str, text: &str) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// HTTP gateway
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct GatewayRequest<'a> {
    to: &'a str,
    body: &'a str,
}

/// Transport that hands messages to an HTTP SMS gateway.
///
/// Sends `POST {url}` with JSON `{"to": digits, "body": text}` and an
/// optional bearer token. 401/403 map to
/// [`TransportError::PermissionDenied`].
pub struct HttpSmsGateway {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl std::fmt::Debug for HttpSmsGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSmsGateway")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpSmsGateway {
    /// Create a gateway transport for `url`.
    pub fn new(url: String, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "failed to build HTTP client with timeouts, using default");
                reqwest::Client::default()
            });
        Self { client, url, token }
    }
}

#[async_trait]
impl MessagingTransport for HttpSmsGateway {
    async fn send(&self, phone_digits: &str, text: &str) -> Result<(), TransportError> {
        let mut request = self.client.post(&self.url).json(&GatewayRequest {
            to: phone_digits,
            body: text,
        });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::DeliveryFailed(e.to_string()))?;
        let status = response.status();
        match status.as_u16() {
            200..=299 => {
                debug!(status = status.as_u16(), "gateway accepted message");
                Ok(())
            }
            401 | 403 => Err(TransportError::PermissionDenied),
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(TransportError::DeliveryFailed(format!(
                    "gateway returned {status}: {body}"
                )))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Dry run
// ---------------------------------------------------------------------------

/// Transport that only logs. Used when no gateway is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunTransport;

#[async_trait]
impl MessagingTransport for DryRunTransport {
    async fn send(&self, phone_digits: &str, text: &str) -> Result<(), TransportError> {
        info!(to = phone_digits, chars = text.chars().count(), "dry run: SMS not sent");
        Ok(())
    }
}
