//! Backend service: user, channel and AI-trigger provisioning.
//!
//! DESIGN
//! ======
//! The backend is an external HTTP service. Handlers depend on the
//! [`Backend`] trait so tests can swap in a recording mock; [`HttpBackend`]
//! is the reqwest implementation used by the binary.
//!
//! Response types keep every field optional: a body that parses but lacks
//! the field a caller needs is reported by the caller as
//! [`ChatError::MissingField`], not as a decode failure.

pub mod http;

use serde::{Deserialize, Serialize};

use crate::error::ChatError;

pub use http::HttpBackend;

/// Seed prompt sent with every AI chat trigger.
pub const AI_SEED_PROMPT: &str = "Hello, AI!";

// =============================================================================
// WIRE TYPES
// =============================================================================

/// Body of `POST /create_user`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateUserRequest {
    pub user_id: String,
    pub name: String,
}

/// Reply of `POST /create_user`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreateUserResponse {
    #[serde(default)]
    pub token: Option<String>,
}

/// Body of `POST /create_chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateChatRequest {
    pub user1: String,
    pub user2: String,
    pub creator_id: String,
}

/// Reply of `POST /create_chat`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CreateChatResponse {
    #[serde(default)]
    pub channel_id: Option<String>,
}

/// Body of `POST /ai_chat`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AiChatRequest {
    pub channel_id: String,
    pub prompt_1: String,
}

impl AiChatRequest {
    /// Trigger for `channel_id` with the fixed seed prompt.
    #[must_use]
    pub fn seeded(channel_id: impl Into<String>) -> Self {
        Self { channel_id: channel_id.into(), prompt_1: AI_SEED_PROMPT.to_owned() }
    }
}

// =============================================================================
// TRAIT
// =============================================================================

#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// `GET /`: returns the welcome message.
    async fn health(&self) -> Result<String, ChatError>;

    /// `POST /create_user`: upsert the user and issue a session token.
    async fn create_user(&self, request: &CreateUserRequest) -> Result<CreateUserResponse, ChatError>;

    /// `POST /create_chat`: create or look up the two-party channel.
    async fn create_chat(&self, request: &CreateChatRequest) -> Result<CreateChatResponse, ChatError>;

    /// `POST /ai_chat`: ask the backend to seed an AI conversation.
    /// Only the status matters; the messages arrive through the platform.
    async fn start_ai_chat(&self, request: &AiChatRequest) -> Result<(), ChatError>;
}
