// src/transport/mod.rs — Chat transport abstraction

pub mod telegram;

use async_trait::async_trait;

use crate::session::{MessageId, SessionKey};

pub use telegram::TelegramTransport;

/// A message received from a chat.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundMessage {
    pub session: SessionKey,
    pub message_id: MessageId,
    /// Message text with any leading command stripped.
    pub text: String,
    /// Command name without the slash or bot suffix.
    pub command: Option<String>,
    /// Display identity used for roles and the blocklist.
    pub sender: String,
}

/// Outbound half of a chat transport. Replies thread to the original message.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn reply_text(
        &self,
        message_id: MessageId,
        session: SessionKey,
        text: &str,
    ) -> anyhow::Result<()>;

    async fn reply_file(
        &self,
        message_id: MessageId,
        session: SessionKey,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> anyhow::Result<()>;
}

/// Split `/command@bot rest` into the command name and the remaining text.
pub fn split_command(text: &str) -> (Option<String>, String) {
    let trimmed = text.trim_start();
    let Some(rest) = trimmed.strip_prefix('/') else {
        return (None, text.to_string());
    };
    let (head, tail) = match rest.find(char::is_whitespace) {
        Some(pos) => (&rest[..pos], rest[pos..].trim_start()),
        None => (rest, ""),
    };
    let name = head.split('@').next().unwrap_or(head);
    if name.is_empty() {
        return (None, text.to_string());
    }
    (Some(name.to_string()), tail.to_string())
}
