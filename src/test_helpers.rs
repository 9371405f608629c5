//! Recording doubles for the backend, the chat platform and alerts.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{Notify, broadcast};

use crate::app::Alerts;
use crate::backend::{AiChatRequest, Backend, CreateChatRequest, CreateChatResponse, CreateUserRequest, CreateUserResponse};
use crate::error::ChatError;
use crate::identity::Identity;
use crate::platform::{ChannelHandle, ChatMessage, ChatPlatform, PlatformEvent};

pub fn id(raw: &str) -> Identity {
    Identity::new(raw).unwrap()
}

// =========================================================================
// MockBackend
// =========================================================================

/// Holds a backend call open until the test releases it.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
pub struct MockBackend {
    pub calls: StdMutex<Vec<String>>,
    /// Per-user override of the `/create_user` reply.
    pub user_replies: StdMutex<HashMap<String, CreateUserResponse>>,
    /// Override of the `/create_chat` reply.
    pub chat_reply: StdMutex<Option<CreateChatResponse>>,
    /// Non-success status message for `/ai_chat`.
    pub ai_error: StdMutex<Option<String>>,
    pub gates: StdMutex<HashMap<String, Arc<Gate>>>,
}

impl MockBackend {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn gate(&self, user_id: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.gates.lock().unwrap().insert(user_id.to_owned(), gate.clone());
        gate
    }
}

#[async_trait::async_trait]
impl Backend for MockBackend {
    async fn health(&self) -> Result<String, ChatError> {
        Ok("ok".into())
    }

    async fn create_user(&self, request: &CreateUserRequest) -> Result<CreateUserResponse, ChatError> {
        self.calls.lock().unwrap().push(format!("create_user:{}:{}", request.user_id, request.name));
        let gate = self.gates.lock().unwrap().get(&request.user_id).cloned();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        let reply = self.user_replies.lock().unwrap().get(&request.user_id).cloned();
        Ok(reply.unwrap_or_else(|| CreateUserResponse {
            token: Some(format!("tok-{}", request.user_id)),
        }))
    }

    async fn create_chat(&self, request: &CreateChatRequest) -> Result<CreateChatResponse, ChatError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("create_chat:{}:{}:{}", request.user1, request.user2, request.creator_id));
        if let Some(reply) = self.chat_reply.lock().unwrap().clone() {
            return Ok(reply);
        }
        let mut users = [request.user1.clone(), request.user2.clone()];
        users.sort();
        Ok(CreateChatResponse { channel_id: Some(format!("{}_{}", users[0], users[1])) })
    }

    async fn start_ai_chat(&self, request: &AiChatRequest) -> Result<(), ChatError> {
        self.calls.lock().unwrap().push(format!("ai_chat:{}:{}", request.channel_id, request.prompt_1));
        match self.ai_error.lock().unwrap().clone() {
            Some(message) => Err(ChatError::Status { service: "backend", status: 500, message }),
            None => Ok(()),
        }
    }
}

// =========================================================================
// MockPlatform
// =========================================================================

pub struct MockPlatform {
    pub log: StdMutex<Vec<String>>,
    pub fail_watch: StdMutex<bool>,
    pub connect_gates: StdMutex<HashMap<String, Arc<Gate>>>,
    pub events: broadcast::Sender<PlatformEvent>,
}

impl MockPlatform {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self { log: StdMutex::default(), fail_watch: StdMutex::new(false), connect_gates: StdMutex::default(), events }
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Hold `connect_user` for `user_id` until the gate is released.
    pub fn gate_connect(&self, user_id: &str) -> Arc<Gate> {
        let gate = Arc::new(Gate::default());
        self.connect_gates.lock().unwrap().insert(user_id.to_owned(), gate.clone());
        gate
    }

    pub fn connects(&self) -> Vec<String> {
        self.log().into_iter().filter(|entry| entry.starts_with("connect:")).collect()
    }
}

#[async_trait::async_trait]
impl ChatPlatform for MockPlatform {
    async fn connect_user(&self, identity: &Identity, token: &str) -> Result<(), ChatError> {
        let gate = self.connect_gates.lock().unwrap().get(identity.as_str()).cloned();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        self.log.lock().unwrap().push(format!("connect:{identity}:{token}"));
        Ok(())
    }

    async fn disconnect_user(&self) -> Result<(), ChatError> {
        self.log.lock().unwrap().push("disconnect".into());
        Ok(())
    }

    async fn watch_channel(
        &self,
        _user: &Identity,
        kind: &str,
        id: &str,
        members: &[Identity],
    ) -> Result<ChannelHandle, ChatError> {
        let members: Vec<String> = members.iter().map(ToString::to_string).collect();
        self.log.lock().unwrap().push(format!("watch:{kind}:{id}:{}", members.join(",")));
        if *self.fail_watch.lock().unwrap() {
            return Err(ChatError::Status { service: "chat platform", status: 403, message: "not allowed".into() });
        }
        Ok(ChannelHandle { kind: kind.into(), id: id.into(), name: None, members, messages: vec![] })
    }

    async fn send_message(&self, channel: &ChannelHandle, text: &str) -> Result<ChatMessage, ChatError> {
        self.log.lock().unwrap().push(format!("send:{}:{text}", channel.cid()));
        Ok(ChatMessage {
            id: "sent-1".into(),
            text: text.into(),
            user_id: "alice".into(),
            user_name: None,
            created_at: None,
        })
    }

    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.events.subscribe()
    }
}

// =========================================================================
// RecordingAlerts
// =========================================================================

#[derive(Default)]
pub struct RecordingAlerts(pub StdMutex<Vec<String>>);

impl Alerts for RecordingAlerts {
    fn alert(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_owned());
    }
}
