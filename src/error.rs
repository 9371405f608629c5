//! Error types shared by the backend client, the chat platform client and
//! the app handlers.

use crate::config::ConfigError;

/// Errors produced while talking to the backend or the chat platform.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Startup configuration was missing or malformed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP request could not be sent or its body could not be read.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The websocket connection failed or closed mid-handshake.
    #[error("websocket failed: {0}")]
    Ws(Box<tokio_tungstenite::tungstenite::Error>),

    /// A remote service answered with a non-success status.
    #[error("{service} returned HTTP {status}: {message}")]
    Status {
        service: &'static str,
        status: u16,
        message: String,
    },

    /// A response was well-formed JSON but lacked the field we need.
    #[error("missing expected field `{0}`")]
    MissingField(&'static str),

    /// A response body was not valid JSON.
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// The chat platform refused the connection.
    #[error("chat platform refused connection: {0}")]
    ConnectionRefused(String),

    /// A platform call needs a live connection and there is none.
    #[error("not connected to the chat platform")]
    NotConnected,

    /// Login was attempted without typing an identifier.
    #[error("user id must not be empty")]
    EmptyIdentity,

    /// An action needed an active channel and none is set.
    #[error("no active channel")]
    NoActiveChannel,

    /// A newer login replaced this one before it finished.
    #[error("login superseded by a newer attempt")]
    Superseded,

    /// Reading from the terminal failed.
    #[error("io failed: {0}")]
    Io(#[from] std::io::Error),

    /// A websocket handshake or HTTP call exceeded the configured timeout.
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
}

impl From<tokio_tungstenite::tungstenite::Error> for ChatError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Ws(Box::new(error))
    }
}

impl ChatError {
    /// Pass a success reply through; turn anything else into
    /// [`ChatError::Status`] carrying the service's own error text.
    pub(crate) async fn check_status(
        service: &'static str,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, Self> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(Self::Status { service, status: status.as_u16(), message: error_message(&text) })
    }
}

/// Extract a human-readable message from an error body: the `error` field,
/// then the `message` field, then the raw text.
pub(crate) fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    if let Some(message) = parsed
        .as_ref()
        .and_then(|v| v.get("error").or_else(|| v.get("message")))
        .and_then(serde_json::Value::as_str)
    {
        return message.to_owned();
    }
    let trimmed = body.trim();
    if trimmed.is_empty() { "unknown error".to_owned() } else { trimmed.to_owned() }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
