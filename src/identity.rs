//! Identities and the counterpart rule.
//!
//! DESIGN
//! ======
//! The eligible participants are an injected [`ParticipantPool`] rather than
//! a pair baked into handler logic. [`Pairing`] combines the pool with a
//! [`PairingPolicy`]; the default policy reproduces the classic two-party
//! rule: the counterpart is the first pool member that is not the caller, so
//! with `alice,bob` anybody who is not `alice` gets paired with `alice`.

use std::collections::HashMap;
use std::fmt;

use crate::config::ConfigError;
use crate::error::ChatError;

pub const DEFAULT_PARTICIPANTS: [&str; 2] = ["alice", "bob"];

// =============================================================================
// IDENTITY
// =============================================================================

/// A user-chosen identifier, used as both backend session key and chat
/// platform user id. No format validation beyond being non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Wrap a typed identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::EmptyIdentity`] for an empty or blank string.
    pub fn new(raw: impl Into<String>) -> Result<Self, ChatError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ChatError::EmptyIdentity);
        }
        Ok(Self(raw))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display name registered with the backend and the platform.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("User {}", self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// PARTICIPANT POOL
// =============================================================================

/// Ordered set of identities eligible to be picked as a counterpart.
/// Always holds at least two distinct members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantPool {
    members: Vec<Identity>,
}

impl ParticipantPool {
    /// Parse a comma-separated list, dropping blanks and duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when fewer than two distinct
    /// members remain.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut members: Vec<Identity> = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let identity = Identity(part.to_owned());
            if !members.contains(&identity) {
                members.push(identity);
            }
        }
        if members.len() < 2 {
            return Err(ConfigError::Invalid {
                key: "CHAT_PARTICIPANTS",
                reason: format!("need at least two distinct participants, got {raw:?}"),
            });
        }
        Ok(Self { members })
    }

    #[must_use]
    pub fn members(&self) -> &[Identity] {
        &self.members
    }
}

impl Default for ParticipantPool {
    fn default() -> Self {
        Self { members: DEFAULT_PARTICIPANTS.iter().map(|m| Identity((*m).to_owned())).collect() }
    }
}

// =============================================================================
// PAIRING
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum PairingPolicy {
    /// First pool member that is not the caller.
    #[default]
    FirstOther,
    /// Explicit pairs; callers not in the table fall back to `FirstOther`.
    Table(HashMap<String, String>),
}

impl PairingPolicy {
    /// Parse `first-other` or `table:a=b,c=d`. Table pairs are symmetric
    /// unless the reverse direction is listed explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for an unknown policy or a
    /// malformed table entry.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        if raw == "first-other" {
            return Ok(Self::FirstOther);
        }
        let Some(entries) = raw.strip_prefix("table:") else {
            return Err(ConfigError::Invalid {
                key: "CHAT_PAIRING",
                reason: format!("unknown pairing policy {raw:?} (expected 'first-other' or 'table:a=b,...')"),
            });
        };

        let mut explicit = HashMap::new();
        for entry in entries.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (from, to) = entry
                .split_once('=')
                .map(|(a, b)| (a.trim(), b.trim()))
                .filter(|(a, b)| !a.is_empty() && !b.is_empty() && a != b)
                .ok_or_else(|| ConfigError::Invalid {
                    key: "CHAT_PAIRING",
                    reason: format!("malformed pair {entry:?}"),
                })?;
            explicit.insert(from.to_owned(), to.to_owned());
        }

        let mut table = explicit.clone();
        for (from, to) in &explicit {
            table.entry(to.clone()).or_insert_with(|| from.clone());
        }
        Ok(Self::Table(table))
    }
}

/// Pool plus policy: everything needed to answer "who do I talk to".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pairing {
    pool: ParticipantPool,
    policy: PairingPolicy,
}

impl Pairing {
    #[must_use]
    pub fn new(pool: ParticipantPool, policy: PairingPolicy) -> Self {
        Self { pool, policy }
    }

    #[must_use]
    pub fn pool(&self) -> &ParticipantPool {
        &self.pool
    }

    /// Select the other participant for `identity`. Always returns a value,
    /// including for identities outside the pool.
    #[must_use]
    pub fn counterpart(&self, identity: &Identity) -> Identity {
        if let PairingPolicy::Table(table) = &self.policy {
            if let Some(peer) = table.get(identity.as_str()) {
                return Identity(peer.clone());
            }
        }
        // The pool holds two distinct members, so one of them differs.
        self.pool
            .members
            .iter()
            .find(|member| *member != identity)
            .unwrap_or(&self.pool.members[0])
            .clone()
    }
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
