//! Session initiator: identity -> backend token -> platform connection.

use crate::backend::{Backend, CreateUserRequest};
use crate::error::ChatError;
use crate::identity::Identity;
use crate::platform::ChatPlatform;

/// A backend-issued credential for one identity. Lives only as long as the
/// login that requested it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub identity: Identity,
    pub token: String,
}

/// Register `identity` with the backend and obtain its session token.
///
/// # Errors
///
/// Returns [`ChatError::MissingField`] when the reply carries no token, or
/// the transport error from the backend.
pub async fn request_session(backend: &dyn Backend, identity: &Identity) -> Result<Session, ChatError> {
    let request = CreateUserRequest { user_id: identity.as_str().to_owned(), name: identity.display_name() };
    let response = backend.create_user(&request).await?;
    let token = response
        .token
        .filter(|token| !token.is_empty())
        .ok_or(ChatError::MissingField("token"))?;
    Ok(Session { identity: identity.clone(), token })
}

/// Replace whatever connection the platform holds with one for `session`.
///
/// # Errors
///
/// Returns the platform error if either step fails.
pub async fn connect(platform: &dyn ChatPlatform, session: &Session) -> Result<(), ChatError> {
    platform.disconnect_user().await?;
    platform.connect_user(&session.identity, &session.token).await
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
