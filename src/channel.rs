//! Channel orchestrator: identity -> counterpart -> backend channel ->
//! platform watch.

use crate::backend::{Backend, CreateChatRequest};
use crate::error::ChatError;
use crate::identity::{Identity, Pairing};
use crate::platform::{CHANNEL_TYPE, ChannelHandle, ChatPlatform};

/// A channel the backend has provisioned but nobody is watching yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedChannel {
    pub channel_id: String,
    /// Caller first, counterpart second.
    pub members: [Identity; 2],
}

/// Ask the backend to create or look up the channel between `identity` and
/// its counterpart, with `identity` as creator.
///
/// # Errors
///
/// Returns [`ChatError::MissingField`] when the reply carries no channel id,
/// or the transport error from the backend.
pub async fn provision(
    backend: &dyn Backend,
    pairing: &Pairing,
    identity: &Identity,
) -> Result<ProvisionedChannel, ChatError> {
    let counterpart = pairing.counterpart(identity);
    let request = CreateChatRequest {
        user1: identity.as_str().to_owned(),
        user2: counterpart.as_str().to_owned(),
        creator_id: identity.as_str().to_owned(),
    };
    let response = backend.create_chat(&request).await?;
    let channel_id = response
        .channel_id
        .filter(|id| !id.is_empty())
        .ok_or(ChatError::MissingField("channel_id"))?;
    Ok(ProvisionedChannel { channel_id, members: [identity.clone(), counterpart] })
}

/// Watch a provisioned channel on the platform as its caller.
///
/// # Errors
///
/// Returns the platform error when the watch call fails.
pub async fn watch(platform: &dyn ChatPlatform, channel: &ProvisionedChannel) -> Result<ChannelHandle, ChatError> {
    let [caller, _] = &channel.members;
    platform.watch_channel(caller, CHANNEL_TYPE, &channel.channel_id, &channel.members).await
}

#[cfg(test)]
#[path = "channel_test.rs"]
mod tests;
