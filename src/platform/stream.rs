//! Stream-compatible chat platform client.
//!
//! PROTOCOL
//! ========
//! - Connect: websocket `GET {ws}/connect?json=..&api_key=..&authorization=<token>&stream-auth-type=jwt`.
//!   The server's first `health.check` event carries the `connection_id`;
//!   `connection.error` means the token or key was rejected.
//! - Keepalive: the client sends `{"type":"health.check","client_id":..}`
//!   every [`HEALTH_CHECK_INTERVAL`].
//! - Watch: `POST {api}/channels/{type}/{id}/query` with `watch: true` binds
//!   the channel's events to the connection.
//! - Send: `POST {api}/channels/{type}/{id}/message`.
//!
//! One background task per connection owns the socket: it forwards parsed
//! events to the broadcast channel and exits on close, error or shutdown.
//!
//! Every connect and disconnect takes a new attempt number. The handshake
//! runs without the connection lock and is abandoned as soon as a newer
//! attempt starts, so a stalled handshake never blocks the next call.

use std::future::Future;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::{Mutex, broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{ChannelHandle, ChatMessage, ChatPlatform, PlatformEvent};
use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::identity::Identity;

pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(25);
const EVENT_BUFFER: usize = 256;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Debug, Deserialize)]
struct WireUser {
    id: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    user: Option<WireUser>,
    #[serde(default)]
    created_at: Option<String>,
}

impl From<WireMessage> for ChatMessage {
    fn from(wire: WireMessage) -> Self {
        let (user_id, user_name) = match wire.user {
            Some(user) => (user.id, user.name),
            None => (String::new(), None),
        };
        Self { id: wire.id, text: wire.text, user_id, user_name, created_at: wire.created_at }
    }
}

#[derive(Debug, Deserialize)]
struct WireChannel {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireMember {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct QueryChannelResponse {
    channel: WireChannel,
    #[serde(default)]
    members: Vec<WireMember>,
    #[serde(default)]
    messages: Vec<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    cid: Option<String>,
    #[serde(default)]
    connection_id: Option<String>,
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    error: Option<Value>,
}

// =============================================================================
// PARSING
// =============================================================================

/// Build the authenticated websocket URL for `identity`.
pub(crate) fn connect_url(ws_url: &str, api_key: &str, identity: &Identity, token: &str) -> Result<String, ChatError> {
    let payload = json!({
        "user_id": identity.as_str(),
        "user_details": { "id": identity.as_str(), "name": identity.display_name() },
        "server_determines_connection_id": true,
    });
    let mut url = reqwest::Url::parse(&format!("{}/connect", ws_url.trim_end_matches('/')))
        .map_err(|error| ChatError::ConnectionRefused(format!("invalid websocket url: {error}")))?;
    url.query_pairs_mut()
        .append_pair("json", &payload.to_string())
        .append_pair("api_key", api_key)
        .append_pair("authorization", token)
        .append_pair("stream-auth-type", "jwt");
    Ok(url.into())
}

/// Inspect a frame received before the connection is established.
/// `Ok(Some(id))` completes the handshake, `Ok(None)` keeps waiting.
pub(crate) fn parse_handshake(text: &str) -> Result<Option<String>, ChatError> {
    let event: WireEvent = serde_json::from_str(text)?;
    match event.kind.as_str() {
        "health.check" => event.connection_id.map(Some).ok_or(ChatError::MissingField("connection_id")),
        "connection.error" => {
            let reason = event
                .error
                .as_ref()
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("connection rejected")
                .to_owned();
            Err(ChatError::ConnectionRefused(reason))
        }
        _ => Ok(None),
    }
}

/// Convert a frame from a live connection. Keepalive echoes yield `None`.
pub(crate) fn parse_event(text: &str) -> Result<Option<PlatformEvent>, ChatError> {
    let event: WireEvent = serde_json::from_str(text)?;
    match event.kind.as_str() {
        "health.check" => Ok(None),
        "message.new" => {
            let cid = event.cid.ok_or(ChatError::MissingField("cid"))?;
            let message = event.message.ok_or(ChatError::MissingField("message"))?;
            Ok(Some(PlatformEvent::MessageNew { cid, message: message.into() }))
        }
        _ => Ok(Some(PlatformEvent::Other { kind: event.kind })),
    }
}

fn channel_from_query(response: QueryChannelResponse) -> ChannelHandle {
    ChannelHandle {
        kind: response.channel.kind,
        id: response.channel.id,
        name: response.channel.name,
        members: response.members.into_iter().map(|m| m.user_id).collect(),
        messages: response.messages.into_iter().map(ChatMessage::from).collect(),
    }
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    what: &'static str,
    fut: impl Future<Output = Result<T, ChatError>>,
) -> Result<T, ChatError> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ChatError::Timeout(what))?,
        None => fut.await,
    }
}

// =============================================================================
// CONNECTION
// =============================================================================

struct Connection {
    identity: Identity,
    token: String,
    connection_id: String,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Connection {
    async fn close(self) {
        let _ = self.shutdown.send(());
        if let Err(error) = self.task.await {
            tracing::warn!(%error, "chat platform event task ended abnormally");
        }
        tracing::info!(user_id = %self.identity, "disconnected from chat platform");
    }
}

/// Request credentials captured from the live connection so HTTP calls run
/// without holding the connection lock.
struct Credentials {
    user_id: String,
    token: String,
    connection_id: String,
}

/// Resolves once `attempts` moves past `attempt`.
async fn newer_attempt(mut attempts: watch::Receiver<u64>, attempt: u64) {
    let _ = attempts.wait_for(|current| *current != attempt).await;
}

async fn handshake(ws: &mut WsStream) -> Result<String, ChatError> {
    loop {
        let Some(message) = ws.next().await else {
            return Err(ChatError::ConnectionRefused("socket closed during handshake".into()));
        };
        match message? {
            Message::Text(text) => {
                if let Some(connection_id) = parse_handshake(&text)? {
                    return Ok(connection_id);
                }
            }
            Message::Close(_) => {
                return Err(ChatError::ConnectionRefused("socket closed during handshake".into()));
            }
            _ => {}
        }
    }
}

async fn pump_events(
    mut ws: WsStream,
    connection_id: String,
    mut shutdown: oneshot::Receiver<()>,
    events: broadcast::Sender<PlatformEvent>,
) {
    let mut keepalive = tokio::time::interval(HEALTH_CHECK_INTERVAL);
    keepalive.tick().await;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                let _ = ws.close(None).await;
                break;
            }
            _ = keepalive.tick() => {
                let frame = json!({ "type": "health.check", "client_id": connection_id }).to_string();
                if let Err(error) = ws.send(Message::Text(frame.into())).await {
                    tracing::warn!(%error, "chat platform keepalive failed");
                    let _ = events.send(PlatformEvent::Disconnected);
                    break;
                }
            }
            message = ws.next() => match message {
                Some(Ok(Message::Text(text))) => match parse_event(&text) {
                    Ok(Some(event)) => {
                        let _ = events.send(event);
                    }
                    Ok(None) => {}
                    Err(error) => tracing::debug!(%error, "ignoring unparseable chat platform event"),
                },
                Some(Ok(Message::Close(_))) | None => {
                    let _ = events.send(PlatformEvent::Disconnected);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    tracing::warn!(%error, "chat platform connection failed");
                    let _ = events.send(PlatformEvent::Disconnected);
                    break;
                }
            }
        }
    }
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct StreamPlatform {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
    ws_url: String,
    timeout: Option<Duration>,
    events: broadcast::Sender<PlatformEvent>,
    attempts: watch::Sender<u64>,
    connection: Mutex<Option<Connection>>,
}

impl StreamPlatform {
    /// Build a platform client from typed config. Does not connect.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ChatConfig) -> Result<Self, ChatError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Ok(Self {
            http: builder.build()?,
            api_key: config.api_key.clone(),
            api_url: config.stream_api_url.trim_end_matches('/').to_owned(),
            ws_url: config.stream_ws_url.trim_end_matches('/').to_owned(),
            timeout: config.request_timeout,
            events,
            attempts: watch::Sender::new(0),
            connection: Mutex::new(None),
        })
    }

    /// Start a new connect or disconnect; anything older is now stale.
    fn next_attempt(&self) -> u64 {
        let mut attempt = 0;
        self.attempts.send_modify(|current| {
            *current += 1;
            attempt = *current;
        });
        attempt
    }

    async fn take_connection(&self) -> Option<Connection> {
        self.connection.lock().await.take()
    }

    /// Credentials of the live connection. With `user` set, the connection
    /// must belong to that user.
    async fn credentials(&self, user: Option<&Identity>) -> Result<Credentials, ChatError> {
        let guard = self.connection.lock().await;
        let connection = guard
            .as_ref()
            .filter(|connection| user.is_none_or(|user| connection.identity == *user))
            .ok_or(ChatError::NotConnected)?;
        Ok(Credentials {
            user_id: connection.identity.as_str().to_owned(),
            token: connection.token.clone(),
            connection_id: connection.connection_id.clone(),
        })
    }

    fn channel_url(&self, kind: &str, id: &str, action: &str) -> String {
        format!("{}/channels/{kind}/{id}/{action}", self.api_url)
    }

    async fn post(
        &self,
        url: String,
        credentials: &Credentials,
        query: &[(&str, &str)],
        body: &Value,
    ) -> Result<reqwest::Response, ChatError> {
        let response = self
            .http
            .post(url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .header("Authorization", credentials.token.as_str())
            .header("stream-auth-type", "jwt")
            .json(body)
            .send()
            .await?;
        ChatError::check_status("chat platform", response).await
    }
}

#[async_trait::async_trait]
impl ChatPlatform for StreamPlatform {
    async fn connect_user(&self, identity: &Identity, token: &str) -> Result<(), ChatError> {
        let attempt = self.next_attempt();
        let superseded = newer_attempt(self.attempts.subscribe(), attempt);
        if let Some(previous) = self.take_connection().await {
            previous.close().await;
        }

        let url = connect_url(&self.ws_url, &self.api_key, identity, token)?;
        let connecting = with_timeout(self.timeout, "chat platform handshake", async {
            let (mut ws, _) = connect_async(url).await?;
            let connection_id = handshake(&mut ws).await?;
            Ok::<_, ChatError>((ws, connection_id))
        });
        let (mut ws, connection_id) = tokio::select! {
            () = superseded => {
                tracing::debug!(user_id = %identity, attempt, "chat platform connect superseded");
                return Err(ChatError::Superseded);
            }
            connected = connecting => connected?,
        };

        let mut guard = self.connection.lock().await;
        if *self.attempts.borrow() != attempt {
            drop(guard);
            let _ = ws.close(None).await;
            tracing::debug!(user_id = %identity, attempt, "chat platform connect superseded");
            return Err(ChatError::Superseded);
        }

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(pump_events(ws, connection_id.clone(), shutdown_rx, self.events.clone()));
        tracing::info!(user_id = %identity, %connection_id, "connected to chat platform");

        let stale = guard.replace(Connection {
            identity: identity.clone(),
            token: token.to_owned(),
            connection_id,
            shutdown,
            task,
        });
        drop(guard);
        if let Some(stale) = stale {
            stale.close().await;
        }
        Ok(())
    }

    async fn disconnect_user(&self) -> Result<(), ChatError> {
        self.next_attempt();
        if let Some(previous) = self.take_connection().await {
            previous.close().await;
        }
        Ok(())
    }

    async fn watch_channel(
        &self,
        user: &Identity,
        kind: &str,
        id: &str,
        members: &[Identity],
    ) -> Result<ChannelHandle, ChatError> {
        let credentials = self.credentials(Some(user)).await?;
        let members: Vec<&str> = members.iter().map(Identity::as_str).collect();
        let body = json!({
            "data": { "members": members },
            "state": true,
            "watch": true,
            "presence": false,
        });
        let query = [
            ("user_id", credentials.user_id.as_str()),
            ("connection_id", credentials.connection_id.as_str()),
        ];

        let response = self.post(self.channel_url(kind, id, "query"), &credentials, &query, &body).await?;
        let channel = channel_from_query(response.json::<QueryChannelResponse>().await?);
        tracing::info!(cid = %channel.cid(), members = ?channel.members, history = channel.messages.len(), "watching channel");
        Ok(channel)
    }

    async fn send_message(&self, channel: &ChannelHandle, text: &str) -> Result<ChatMessage, ChatError> {
        let credentials = self.credentials(None).await?;
        let body = json!({ "message": { "id": uuid::Uuid::new_v4().to_string(), "text": text } });

        let response = self
            .post(self.channel_url(&channel.kind, &channel.id, "message"), &credentials, &[], &body)
            .await?;
        let sent = response.json::<SendMessageResponse>().await?;
        Ok(sent.message.into())
    }

    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "stream_test.rs"]
mod tests;
