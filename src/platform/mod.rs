//! Client side of the hosted real-time messaging service.
//!
//! ARCHITECTURE
//! ============
//! The platform owns storage and fan-out. This client only needs
//! four things from it: connect as a user, watch a channel, post a message
//! and receive the event stream. [`ChatPlatform`] captures exactly that and
//! is passed into the handlers explicitly instead of living in a
//! process-wide singleton.
//!
//! A platform holds at most one user connection at a time. Events from the
//! live connection fan out through a `tokio::sync::broadcast` channel, so a
//! renderer can subscribe before or after the connection exists.

pub mod stream;

use tokio::sync::broadcast;

use crate::error::ChatError;
use crate::identity::Identity;

pub use stream::StreamPlatform;

/// Channel type used for every two-party conversation.
pub const CHANNEL_TYPE: &str = "messaging";

// =============================================================================
// TYPES
// =============================================================================

/// A single message as rendered in the channel view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub text: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub created_at: Option<String>,
}

/// Watched channel: id, membership and the history returned by the watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelHandle {
    pub kind: String,
    pub id: String,
    pub name: Option<String>,
    pub members: Vec<String>,
    pub messages: Vec<ChatMessage>,
}

impl ChannelHandle {
    /// Platform-wide channel key, `<type>:<id>`.
    #[must_use]
    pub fn cid(&self) -> String {
        format!("{}:{}", self.kind, self.id)
    }
}

/// Events delivered from the live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    /// A message was posted to channel `cid`.
    MessageNew { cid: String, message: ChatMessage },
    /// The connection dropped or was closed.
    Disconnected,
    /// Any other event type, kept for diagnostics.
    Other { kind: String },
}

// =============================================================================
// TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Open a connection authenticated as `identity` with `token`.
    async fn connect_user(&self, identity: &Identity, token: &str) -> Result<(), ChatError>;

    /// Close the current connection. A no-op when not connected.
    async fn disconnect_user(&self) -> Result<(), ChatError>;

    /// Create-or-get channel `kind:id` with `members` and subscribe to its
    /// events. Fails with [`ChatError::NotConnected`] unless the live
    /// connection belongs to `user`.
    async fn watch_channel(
        &self,
        user: &Identity,
        kind: &str,
        id: &str,
        members: &[Identity],
    ) -> Result<ChannelHandle, ChatError>;

    /// Post `text` to `channel` as the connected user.
    async fn send_message(&self, channel: &ChannelHandle, text: &str) -> Result<ChatMessage, ChatError>;

    /// Receive events from whichever connection is live.
    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent>;
}
