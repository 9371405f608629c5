//! Chat app state and the three user actions: login, start AI chat, send.
//!
//! DESIGN
//! ======
//! Progress is one [`Phase`] value instead of independent identity/channel
//! flags, so a channel without an identity cannot be represented. The phase
//! lives in a `tokio::sync::watch` channel: handlers publish into it and the
//! renderer redraws whenever it changes.
//!
//! CONCURRENCY
//! ===========
//! Handlers take `&self` and may overlap (the binary spawns each one). Every
//! login bumps a generation counter before touching the network; a login
//! whose generation is no longer current stops at its next checkpoint and
//! never publishes, so the most recent login always wins. Platform
//! (re)connection runs under `connect_lock` with the generation re-checked
//! inside, so two logins never interleave disconnect/connect. The connect
//! and watch steps are raced against the generation: a newer login cancels
//! them rather than waiting for a stalled platform call.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{broadcast, watch};

use crate::backend::{AiChatRequest, Backend};
use crate::channel;
use crate::error::ChatError;
use crate::identity::{Identity, Pairing};
use crate::platform::{ChannelHandle, ChatMessage, ChatPlatform, PlatformEvent};
use crate::session;

pub const NO_CHANNEL_ALERT: &str = "No active channel. Please log in and create a channel first.";

// =============================================================================
// PHASE
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    LoggedOut,
    /// Logged in; channel provisioning or watch still pending (or failed).
    AwaitingChannel(Identity),
    Ready { identity: Identity, channel: ChannelHandle },
}

impl Phase {
    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::LoggedOut => None,
            Self::AwaitingChannel(identity) | Self::Ready { identity, .. } => Some(identity),
        }
    }

    #[must_use]
    pub fn channel(&self) -> Option<&ChannelHandle> {
        match self {
            Self::Ready { channel, .. } => Some(channel),
            _ => None,
        }
    }
}

/// User-facing, blocking notifications. Diagnostics go to `tracing`.
pub trait Alerts: Send + Sync {
    fn alert(&self, message: &str);
}

// =============================================================================
// APP
// =============================================================================

pub struct ChatApp {
    backend: Arc<dyn Backend>,
    platform: Arc<dyn ChatPlatform>,
    alerts: Arc<dyn Alerts>,
    pairing: Pairing,
    pending: Mutex<String>,
    phase: watch::Sender<Phase>,
    generation: watch::Sender<u64>,
    connect_lock: tokio::sync::Mutex<()>,
}

impl ChatApp {
    #[must_use]
    pub fn new(
        backend: Arc<dyn Backend>,
        platform: Arc<dyn ChatPlatform>,
        alerts: Arc<dyn Alerts>,
        pairing: Pairing,
    ) -> Self {
        Self {
            backend,
            platform,
            alerts,
            pairing,
            pending: Mutex::new(String::new()),
            phase: watch::Sender::new(Phase::LoggedOut),
            generation: watch::Sender::new(0),
            connect_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn pending_guard(&self) -> MutexGuard<'_, String> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the typed-but-not-submitted identifier.
    pub fn set_pending(&self, text: &str) {
        text.clone_into(&mut self.pending_guard());
    }

    #[must_use]
    pub fn pending(&self) -> String {
        self.pending_guard().clone()
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase.borrow().clone()
    }

    /// Receiver that wakes on every phase change.
    #[must_use]
    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Platform events for the renderer.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.platform.subscribe()
    }

    fn is_current(&self, generation: u64) -> bool {
        *self.generation.borrow() == generation
    }

    fn next_generation(&self) -> u64 {
        let mut generation = 0;
        self.generation.send_modify(|current| {
            *current += 1;
            generation = *current;
        });
        generation
    }

    /// Run `step` for login `generation`, dropping it as soon as a newer
    /// login starts.
    async fn unless_superseded<T>(
        &self,
        generation: u64,
        step: impl Future<Output = Result<T, ChatError>>,
    ) -> Result<T, ChatError> {
        let superseded = newer_generation(self.generation.subscribe(), generation);
        tokio::select! {
            biased;
            () = superseded => Err(ChatError::Superseded),
            result = step => result,
        }
    }

    fn ensure_current(&self, generation: u64) -> Result<(), ChatError> {
        if self.is_current(generation) { Ok(()) } else { Err(ChatError::Superseded) }
    }

    /// Set `phase` only if `generation` is still the newest login.
    fn publish(&self, generation: u64, phase: Phase) -> Result<(), ChatError> {
        let published = self.phase.send_if_modified(|current| {
            if !self.is_current(generation) {
                return false;
            }
            *current = phase;
            true
        });
        if published { Ok(()) } else { Err(ChatError::Superseded) }
    }

    // =========================================================================
    // LOGIN
    // =========================================================================

    /// Type `identifier` into the pending field and log in with it.
    ///
    /// # Errors
    ///
    /// See [`ChatApp::login`].
    pub async fn login_as(&self, identifier: &str) -> Result<(), ChatError> {
        self.set_pending(identifier);
        self.login().await
    }

    /// Log in with the pending identifier, then provision and watch the
    /// two-party channel.
    ///
    /// The phase is reset to [`Phase::LoggedOut`] before any network call.
    /// Failures are logged and leave the phase where the flow stopped.
    ///
    /// # Errors
    ///
    /// Returns the failing step's error, or [`ChatError::Superseded`] when a
    /// newer login started meanwhile.
    pub async fn login(&self) -> Result<(), ChatError> {
        let generation = self.next_generation();
        self.phase.send_replace(Phase::LoggedOut);
        let identifier = self.pending();

        let result = self.run_login(generation, &identifier).await;
        match &result {
            Ok(()) => {}
            Err(ChatError::Superseded) => tracing::debug!(generation, user_id = %identifier, "login superseded"),
            Err(ChatError::EmptyIdentity) => tracing::warn!("login ignored: empty user id"),
            Err(_) => {}
        }
        result
    }

    async fn run_login(&self, generation: u64, identifier: &str) -> Result<(), ChatError> {
        let identity = Identity::new(identifier)?;

        let session = session::request_session(self.backend.as_ref(), &identity)
            .await
            .inspect_err(|error| tracing::error!(%error, user_id = %identity, "error logging in user"))?;
        self.unless_superseded(generation, async {
            let _connecting = self.connect_lock.lock().await;
            self.ensure_current(generation)?;
            session::connect(self.platform.as_ref(), &session).await
        })
        .await
        .inspect_err(|error| {
            if !matches!(error, ChatError::Superseded) {
                tracing::error!(%error, user_id = %identity, "error logging in user");
            }
        })?;
        self.publish(generation, Phase::AwaitingChannel(identity.clone()))?;
        tracing::info!(user_id = %identity, "logged in");

        let provisioned = channel::provision(self.backend.as_ref(), &self.pairing, &identity)
            .await
            .inspect_err(|error| tracing::error!(%error, user_id = %identity, "error creating channel"))?;
        self.ensure_current(generation)?;
        let handle = self
            .unless_superseded(generation, channel::watch(self.platform.as_ref(), &provisioned))
            .await
            .inspect_err(|error| {
                if !matches!(error, ChatError::Superseded) {
                    tracing::error!(%error, channel_id = %provisioned.channel_id, "error creating channel");
                }
            })?;

        let cid = handle.cid();
        self.publish(generation, Phase::Ready { identity, channel: handle })?;
        tracing::info!(%cid, "channel ready");
        Ok(())
    }

    // =========================================================================
    // CHANNEL ACTIONS
    // =========================================================================

    fn active_channel(&self) -> Option<ChannelHandle> {
        self.phase.borrow().channel().cloned()
    }

    /// Ask the backend to seed an AI conversation into the active channel.
    /// Without a channel this raises one alert and sends nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NoActiveChannel`] or the backend error; both are
    /// already reported by the time this returns.
    pub async fn start_ai_chat(&self) -> Result<(), ChatError> {
        let Some(channel) = self.active_channel() else {
            self.alerts.alert(NO_CHANNEL_ALERT);
            return Err(ChatError::NoActiveChannel);
        };

        match self.backend.start_ai_chat(&AiChatRequest::seeded(&channel.id)).await {
            Ok(()) => {
                tracing::info!(channel_id = %channel.id, "AI chat started successfully");
                Ok(())
            }
            Err(error) => {
                tracing::error!(%error, channel_id = %channel.id, "error starting AI chat");
                Err(error)
            }
        }
    }

    /// Post `text` to the active channel. Blank text is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::NoActiveChannel`] (after alerting) or the
    /// platform error.
    pub async fn send_message(&self, text: &str) -> Result<Option<ChatMessage>, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        let Some(channel) = self.active_channel() else {
            self.alerts.alert(NO_CHANNEL_ALERT);
            return Err(ChatError::NoActiveChannel);
        };

        let sent = self
            .platform
            .send_message(&channel, text)
            .await
            .inspect_err(|error| tracing::error!(%error, cid = %channel.cid(), "error sending message"))?;
        Ok(Some(sent))
    }

    /// Fold a platform event into the active channel's history.
    /// Returns the message when it is new to the active channel.
    pub fn apply_event(&self, event: &PlatformEvent) -> Option<ChatMessage> {
        let PlatformEvent::MessageNew { cid, message } = event else {
            return None;
        };
        let mut appended = None;
        self.phase.send_if_modified(|phase| {
            let Phase::Ready { channel, .. } = phase else {
                return false;
            };
            if channel.cid() != *cid || channel.messages.iter().any(|m| m.id == message.id) {
                return false;
            }
            channel.messages.push(message.clone());
            appended = Some(message.clone());
            // History grew but the phase did not change; do not wake the renderer.
            false
        });
        appended
    }
}

/// Resolves once `generations` moves past `generation`.
async fn newer_generation(mut generations: watch::Receiver<u64>, generation: u64) {
    let _ = generations.wait_for(|current| *current != generation).await;
}

#[cfg(test)]
#[path = "app_test.rs"]
mod tests;
