// src/transport/telegram.rs — Telegram transport (Bot API)
//
// Uses the Telegram Bot API (https://core.telegram.org/bots/api):
// getUpdates long polling for inbound, sendMessage / sendDocument for replies.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{split_command, InboundMessage, Transport};
use crate::infra::config::TelegramConfig;
use crate::session::{MessageId, SessionKey};

const ERROR_BACKOFF: Duration = Duration::from_secs(3);

pub struct TelegramTransport {
    client: Client,
    bot_token: String,
    api_base: String,
    poll_timeout: u64,
}

impl TelegramTransport {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            client: Client::new(),
            bot_token: config.token.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            poll_timeout: config.poll_timeout_seconds,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.bot_token)
    }

    /// Validate the bot token by calling getMe.
    pub async fn validate(&self) -> anyhow::Result<String> {
        #[derive(Deserialize)]
        struct BotUser {
            username: Option<String>,
            first_name: Option<String>,
        }

        let resp: TelegramResponse<BotUser> = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await?
            .json()
            .await?;

        let bot = resp.into_result("getMe")?;
        Ok(format!(
            "Authenticated as @{}",
            bot.username
                .unwrap_or_else(|| bot.first_name.unwrap_or_default())
        ))
    }

    async fn get_updates(&self, offset: i64) -> anyhow::Result<Vec<TgUpdate>> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": self.poll_timeout,
            "allowed_updates": ["message"],
        });

        let resp: TelegramResponse<Vec<TgUpdate>> = self
            .client
            .post(self.api_url("getUpdates"))
            .timeout(Duration::from_secs(self.poll_timeout + 10))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        resp.into_result("getUpdates")
    }

    /// Long-poll for messages and feed them to `tx` until `shutdown` fires
    /// or the receiver is dropped.
    pub async fn poll(
        &self,
        tx: mpsc::Sender<InboundMessage>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let mut offset = 0i64;
        tracing::info!("Telegram polling started");

        loop {
            let updates = tokio::select! {
                _ = shutdown.cancelled() => break,
                res = self.get_updates(offset) => res,
            };

            let updates = match updates {
                Ok(u) => u,
                Err(e) => {
                    tracing::warn!("Telegram getUpdates failed: {}", e);
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => continue,
                    }
                }
            };

            for update in updates {
                offset = offset.max(update.update_id + 1);
                let Some(msg) = update.message.and_then(to_inbound) else {
                    continue;
                };
                tracing::debug!(
                    session = msg.session,
                    sender = %msg.sender,
                    command = ?msg.command,
                    "Inbound message"
                );
                if tx.send(msg).await.is_err() {
                    tracing::info!("Inbound channel closed, stopping Telegram polling");
                    return Ok(());
                }
            }
        }

        tracing::info!("Telegram polling stopped");
        Ok(())
    }
}

/// Senders without a username get an `id:` identity. Telegram usernames
/// never contain `:`, so it cannot collide with a role or blocklist entry.
fn sender_identity(m: &TgMessage) -> String {
    match &m.from {
        Some(TgUser {
            username: Some(name),
            ..
        }) if !name.is_empty() => name.clone(),
        Some(user) => format!("id:{}", user.id),
        None => format!("id:{}", m.chat.id),
    }
}

fn to_inbound(m: TgMessage) -> Option<InboundMessage> {
    let sender = sender_identity(&m);
    let text = m.text?;
    let (command, text) = split_command(&text);
    Some(InboundMessage {
        session: m.chat.id,
        message_id: m.message_id,
        text,
        command,
        sender,
    })
}

// -- Telegram API response types --

#[derive(Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

impl<T> TelegramResponse<T> {
    fn into_result(self, method: &str) -> anyhow::Result<T> {
        if !self.ok {
            anyhow::bail!(
                "Telegram {method} failed: {}",
                self.description.unwrap_or_else(|| "unknown".into())
            );
        }
        self.result
            .ok_or_else(|| anyhow::anyhow!("Telegram {method} returned no result"))
    }
}

#[derive(Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
}

#[derive(Deserialize)]
struct TgMessage {
    message_id: i64,
    chat: TgChat,
    from: Option<TgUser>,
    text: Option<String>,
}

#[derive(Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Deserialize)]
struct TgUser {
    id: i64,
    username: Option<String>,
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn reply_text(
        &self,
        message_id: MessageId,
        session: SessionKey,
        text: &str,
    ) -> anyhow::Result<()> {
        let body = serde_json::json!({
            "chat_id": session,
            "text": text,
            "reply_to_message_id": message_id,
        });

        let resp: TelegramResponse<serde_json::Value> = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        resp.into_result("sendMessage").map(|_| ())
    }

    async fn reply_file(
        &self,
        message_id: MessageId,
        session: SessionKey,
        bytes: Vec<u8>,
        file_name: &str,
    ) -> anyhow::Result<()> {
        let document = reqwest::multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new()
            .text("chat_id", session.to_string())
            .text("reply_to_message_id", message_id.to_string())
            .part("document", document);

        let resp: TelegramResponse<serde_json::Value> = self
            .client
            .post(self.api_url("sendDocument"))
            .multipart(form)
            .send()
            .await?
            .json()
            .await?;

        resp.into_result("sendDocument").map(|_| ())
    }
}
