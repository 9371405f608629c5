//! Client configuration parsed from environment variables.

use std::time::Duration;

use crate::identity::{Pairing, PairingPolicy, ParticipantPool};

pub const DEFAULT_STREAM_API_URL: &str = "https://chat.stream-io-api.com";
pub const DEFAULT_STREAM_WS_URL: &str = "wss://chat.stream-io-api.com";

/// Errors raised while building [`ChatConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required key was absent or blank.
    #[error("{0} is not defined in the environment variables")]
    Missing(&'static str),

    /// A key was present but could not be parsed.
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Backend origin, without trailing slash.
    pub backend_url: String,
    /// Public API key of the chat platform app.
    pub api_key: String,
    pub stream_api_url: String,
    pub stream_ws_url: String,
    pub pairing: Pairing,
    /// Applied to every HTTP call and the websocket handshake. `None` waits forever.
    pub request_timeout: Option<Duration>,
}

impl ChatConfig {
    /// Build typed config from the process environment.
    ///
    /// Required:
    /// - `CHAT_BACKEND_URL`
    /// - `STREAM_API_KEY`
    ///
    /// Optional:
    /// - `STREAM_API_URL`: default `https://chat.stream-io-api.com`
    /// - `STREAM_WS_URL`: default `wss://chat.stream-io-api.com`
    /// - `CHAT_PARTICIPANTS`: default `alice,bob`
    /// - `CHAT_PAIRING`: `first-other` (default) or `table:a=b,...`
    /// - `CHAT_REQUEST_TIMEOUT_SECS`: unset means no timeout
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for a missing required key or a value that
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ChatConfig::from_env`], reading keys through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`ChatConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        let backend_url = get("CHAT_BACKEND_URL").ok_or(ConfigError::Missing("CHAT_BACKEND_URL"))?;
        let backend_url = parse_base_url("CHAT_BACKEND_URL", &backend_url, &["http://", "https://"])?;
        let api_key = get("STREAM_API_KEY").ok_or(ConfigError::Missing("STREAM_API_KEY"))?;

        let stream_api_url = parse_base_url(
            "STREAM_API_URL",
            &get("STREAM_API_URL").unwrap_or_else(|| DEFAULT_STREAM_API_URL.to_owned()),
            &["http://", "https://"],
        )?;
        let stream_ws_url = parse_base_url(
            "STREAM_WS_URL",
            &get("STREAM_WS_URL").unwrap_or_else(|| DEFAULT_STREAM_WS_URL.to_owned()),
            &["ws://", "wss://"],
        )?;

        let pool = match get("CHAT_PARTICIPANTS") {
            Some(raw) => ParticipantPool::parse(&raw)?,
            None => ParticipantPool::default(),
        };
        let policy = match get("CHAT_PAIRING") {
            Some(raw) => PairingPolicy::parse(&raw)?,
            None => PairingPolicy::default(),
        };

        let request_timeout = get("CHAT_REQUEST_TIMEOUT_SECS")
            .map(|raw| {
                raw.parse::<u64>()
                    .ok()
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs)
                    .ok_or_else(|| ConfigError::Invalid {
                        key: "CHAT_REQUEST_TIMEOUT_SECS",
                        reason: format!("expected a positive number of seconds, got {raw:?}"),
                    })
            })
            .transpose()?;

        Ok(Self {
            backend_url,
            api_key,
            stream_api_url,
            stream_ws_url,
            pairing: Pairing::new(pool, policy),
            request_timeout,
        })
    }
}

fn parse_base_url(key: &'static str, raw: &str, schemes: &[&str]) -> Result<String, ConfigError> {
    if !schemes.iter().any(|scheme| raw.starts_with(scheme)) {
        return Err(ConfigError::Invalid {
            key,
            reason: format!("{raw:?} must start with one of {schemes:?}"),
        });
    }
    Ok(raw.trim_end_matches('/').to_owned())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
