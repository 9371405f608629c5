//! Terminal rendering of the chat view.
//!
//! Pure functions from state to lines so the binary only has to print.

use crate::app::Phase;
use crate::identity::{Identity, ParticipantPool};
use crate::platform::{ChannelHandle, ChatMessage};

pub const LOADING_CHANNEL: &str = "Loading channel...";
pub const AI_CHAT_HINT: &str = "Type /ai to Start AI Chat - 5 messages, /help for commands.";

/// Prompt shown while logged out, listing the eligible identities.
#[must_use]
pub fn login_prompt(pool: &ParticipantPool) -> String {
    let names: Vec<&str> = pool.members().iter().map(Identity::as_str).collect();
    let choices = match names.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} or {last}", rest.join(", ")),
        Some((last, _)) => (*last).to_owned(),
        None => String::new(),
    };
    format!("Enter user ID (can login as either {choices})")
}

/// Full view for `phase`.
#[must_use]
pub fn render_phase(phase: &Phase, pool: &ParticipantPool) -> Vec<String> {
    match phase {
        Phase::LoggedOut => vec![login_prompt(pool)],
        Phase::AwaitingChannel(_) => vec![LOADING_CHANNEL.to_owned()],
        Phase::Ready { identity, channel } => {
            let mut lines = vec![render_header(channel, identity)];
            lines.extend(channel.messages.iter().map(|m| render_message(m, identity)));
            lines.push(AI_CHAT_HINT.to_owned());
            lines
        }
    }
}

/// Channel title: its name, or the members other than `me`.
#[must_use]
pub fn render_header(channel: &ChannelHandle, me: &Identity) -> String {
    let title = channel.name.clone().filter(|name| !name.is_empty()).unwrap_or_else(|| {
        let others: Vec<&str> = channel
            .members
            .iter()
            .map(String::as_str)
            .filter(|member| *member != me.as_str())
            .collect();
        if others.is_empty() { channel.id.clone() } else { others.join(", ") }
    });
    format!("== {title} ({} members) ==", channel.members.len())
}

/// One message line, `[HH:MM] sender: text`.
#[must_use]
pub fn render_message(message: &ChatMessage, me: &Identity) -> String {
    let sender = if message.user_id == me.as_str() {
        "you"
    } else {
        message.user_name.as_deref().unwrap_or(&message.user_id)
    };
    match message.created_at.as_deref().and_then(clock_time) {
        Some(time) => format!("[{time}] {sender}: {}", message.text),
        None => format!("{sender}: {}", message.text),
    }
}

/// `HH:MM` out of an RFC 3339 timestamp.
fn clock_time(timestamp: &str) -> Option<&str> {
    let (_, time) = timestamp.split_once('T')?;
    let hhmm = time.get(..5)?;
    (hhmm.as_bytes()[2] == b':').then_some(hhmm)
}

#[cfg(test)]
#[path = "render_test.rs"]
mod tests;
