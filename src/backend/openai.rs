// src/backend/openai.rs — OpenAI-compatible chat and image generation
//
// Serves both the ChatGPT and OpenAI kinds; they differ only in endpoint,
// key and model. 429 and 503 are retried up to `retry_count` attempts.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::StatusCode;
use serde_json::{json, Value};

use super::{random_image_name, GeneratedImage, GenerationBackend};
use crate::dispatch::job::JobContext;
use crate::infra::config::OpenAiConfig;
use crate::infra::errors::{GenBotError, Result};

pub struct OpenAiBackend {
    id: String,
    client: reqwest::Client,
    api_key: String,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    pub fn new(
        id: impl Into<String>,
        client: reqwest::Client,
        api_key: String,
        config: OpenAiConfig,
    ) -> Self {
        Self {
            id: id.into(),
            client,
            api_key,
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    async fn post_json(&self, ctx: &JobContext, path: &str, body: &Value) -> Result<Value> {
        let url = self.url(path);
        let attempts = self.config.retry_count.max(1);
        let interval = Duration::from_secs(self.config.retry_interval_seconds);

        let mut attempt = 1;
        loop {
            let response = ctx
                .run(async {
                    self.client
                        .post(&url)
                        .bearer_auth(&self.api_key)
                        .json(body)
                        .send()
                        .await
                        .map_err(GenBotError::from)
                })
                .await?;

            let status = response.status();
            if is_retriable(status) && attempt < attempts {
                tracing::warn!(
                    backend = %self.id,
                    attempt,
                    max_attempts = attempts,
                    status = status.as_u16(),
                    "Retrying request"
                );
                ctx.sleep(interval).await?;
                attempt += 1;
                continue;
            }

            if !status.is_success() {
                let error_body = ctx
                    .run(async { Ok(response.text().await.unwrap_or_default()) })
                    .await?;
                return Err(GenBotError::backend(
                    &self.id,
                    format!("HTTP {status}: {error_body}"),
                ));
            }

            return ctx
                .run(async { response.json::<Value>().await.map_err(GenBotError::from) })
                .await;
        }
    }
}

fn is_retriable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE
}

fn extract_text(backend: &str, resp: &Value) -> Result<String> {
    resp["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| GenBotError::backend(backend, "empty response choices"))
}

fn extract_image(backend: &str, resp: &Value) -> Result<Vec<u8>> {
    let encoded = resp["data"][0]["b64_json"]
        .as_str()
        .ok_or_else(|| GenBotError::backend(backend, "empty response data"))?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| GenBotError::backend(backend, format!("invalid image payload: {e}")))
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate_text(&self, ctx: &JobContext, prompt: &str) -> Result<Vec<u8>> {
        let body = json!({
            "model": self.config.text_model,
            "messages": [{ "role": "user", "content": prompt }],
        });
        let resp = self.post_json(ctx, "chat/completions", &body).await?;
        Ok(extract_text(&self.id, &resp)?.into_bytes())
    }

    async fn generate_image(&self, ctx: &JobContext, prompt: &str) -> Result<GeneratedImage> {
        let body = json!({
            "prompt": prompt,
            "n": 1,
            "size": self.config.image_size,
            "response_format": "b64_json",
        });
        let resp = self.post_json(ctx, "images/generations", &body).await?;
        Ok(GeneratedImage {
            bytes: extract_image(&self.id, &resp)?,
            file_name: random_image_name(),
        })
    }
}
