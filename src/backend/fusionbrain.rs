// src/backend/fusionbrain.rs — FusionBrain (Kandinsky) text-to-image
//
// Flow per request: pick the first model, check it is not queue-disabled,
// load style names, submit the job, then poll its status until DONE or FAIL.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};

use super::{GeneratedImage, GenerationBackend};
use crate::dispatch::job::JobContext;
use crate::infra::config::FusionBrainConfig;
use crate::infra::errors::{GenBotError, Result};

const BACKEND_ID: &str = "fusionbrain";

const DEFAULT_SIZE: u32 = 512;
const MAX_SIZE: u32 = 1024;
const DEFAULT_STYLE: &str = "DEFAULT";

#[derive(Debug, Deserialize)]
struct Model {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Availability {
    #[serde(default)]
    model_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Style {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    uuid: String,
    status: String,
    #[serde(default)]
    images: Vec<String>,
    #[serde(default, rename = "errorDescription")]
    error_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateParams {
    pub query: String,
}

/// `params` part of the run request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunParams {
    #[serde(rename = "type")]
    pub kind: String,
    pub style: String,
    pub width: u32,
    pub height: u32,
    pub num_images: u32,
    #[serde(rename = "negativePromptUnclip", skip_serializing_if = "String::is_empty")]
    pub negative_prompt: String,
    #[serde(rename = "generateParams")]
    pub generate_params: GenerateParams,
}

impl RunParams {
    /// Lines are prompt, negative prompt, width, height, style. Out of range
    /// sizes and unknown styles fall back to defaults. `None` when the
    /// prompt line is empty.
    pub fn parse(text: &str, styles: &HashSet<String>) -> Option<Self> {
        let mut lines = text.lines().map(str::trim);
        let prompt = lines.next().filter(|l| !l.is_empty())?;
        let negative = lines.next().unwrap_or_default();
        let width = lines.next().and_then(parse_size).unwrap_or(DEFAULT_SIZE);
        let height = lines.next().and_then(parse_size).unwrap_or(DEFAULT_SIZE);
        let style = lines
            .next()
            .filter(|s| styles.contains(*s))
            .unwrap_or(DEFAULT_STYLE);

        Some(Self {
            kind: "GENERATE".into(),
            style: style.to_string(),
            width,
            height,
            num_images: 1,
            negative_prompt: negative.to_string(),
            generate_params: GenerateParams {
                query: prompt.to_string(),
            },
        })
    }
}

fn parse_size(line: &str) -> Option<u32> {
    line.parse::<u32>()
        .ok()
        .filter(|v| (1..=MAX_SIZE).contains(v))
}

pub struct FusionBrainBackend {
    client: reqwest::Client,
    config: FusionBrainConfig,
}

impl FusionBrainBackend {
    pub fn new(client: reqwest::Client, config: FusionBrainConfig) -> Self {
        Self { client, config }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("X-Key", format!("Key {}", self.config.key))
            .header("X-Secret", format!("Secret {}", self.config.secret_key))
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        ctx: &JobContext,
        req: reqwest::RequestBuilder,
    ) -> Result<T> {
        ctx.run(async {
            let response = req.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GenBotError::backend(
                    BACKEND_ID,
                    format!("HTTP {status}: {body}"),
                ));
            }
            Ok::<T, GenBotError>(response.json::<T>().await?)
        })
        .await
    }

    async fn first_model(&self, ctx: &JobContext) -> Result<u64> {
        let models: Vec<Model> = self
            .send(ctx, self.authorized(self.client.get(self.url("models"))))
            .await?;
        models
            .first()
            .map(|m| m.id)
            .ok_or_else(|| GenBotError::backend(BACKEND_ID, "empty models"))
    }

    async fn check_available(&self, ctx: &JobContext, model_id: u64) -> Result<()> {
        let req = self
            .client
            .get(self.url("text2image/availability"))
            .query(&[("model_id", model_id)]);
        let availability: Availability = self.send(ctx, self.authorized(req)).await?;
        match availability.model_status.as_deref() {
            Some("DISABLED_BY_QUEUE") => Err(GenBotError::backend(
                BACKEND_ID,
                "model is disabled by queue",
            )),
            _ => Ok(()),
        }
    }

    async fn style_names(&self, ctx: &JobContext) -> Result<HashSet<String>> {
        let styles: Vec<Style> = self
            .send(ctx, self.client.get(&self.config.styles_url))
            .await?;
        if styles.is_empty() {
            return Err(GenBotError::backend(BACKEND_ID, "empty styles"));
        }
        Ok(styles.into_iter().map(|s| s.name).collect())
    }

    async fn run(&self, ctx: &JobContext, params: &RunParams, model_id: u64) -> Result<String> {
        let params_json = serde_json::to_string(params)
            .map_err(|e| GenBotError::backend(BACKEND_ID, e.to_string()))?;
        let params_part = reqwest::multipart::Part::text(params_json)
            .mime_str("application/json")
            .map_err(GenBotError::from)?;
        let form = reqwest::multipart::Form::new()
            .text("model_id", model_id.to_string())
            .part("params", params_part);
        let req = self
            .client
            .post(self.url("text2image/run"))
            .multipart(form);
        let run: RunResponse = self.send(ctx, self.authorized(req)).await?;
        Ok(run.uuid)
    }

    async fn wait_for_images(&self, ctx: &JobContext, uuid: &str) -> Result<GeneratedImage> {
        let interval = Duration::from_secs(self.config.poll_interval_seconds);
        loop {
            let req = self
                .client
                .get(self.url(&format!("text2image/status/{uuid}")));
            let status: StatusResponse = self.send(ctx, self.authorized(req)).await?;
            match status.status.as_str() {
                "DONE" => return decode_image(&status),
                "FAIL" => {
                    return Err(GenBotError::backend(
                        BACKEND_ID,
                        status
                            .error_description
                            .unwrap_or_else(|| "generation failed".into()),
                    ))
                }
                _ => ctx.sleep(interval).await?,
            }
        }
    }
}

fn decode_image(status: &StatusResponse) -> Result<GeneratedImage> {
    let encoded = status
        .images
        .first()
        .map(|s| s.trim_matches('"'))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GenBotError::backend(BACKEND_ID, "no images in response"))?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| GenBotError::backend(BACKEND_ID, format!("invalid image payload: {e}")))?;
    Ok(GeneratedImage {
        bytes,
        file_name: format!("{}.png", status.uuid),
    })
}

#[async_trait]
impl GenerationBackend for FusionBrainBackend {
    fn id(&self) -> &str {
        BACKEND_ID
    }

    async fn generate_image(&self, ctx: &JobContext, prompt: &str) -> Result<GeneratedImage> {
        let model_id = self.first_model(ctx).await?;
        self.check_available(ctx, model_id).await?;
        let styles = self.style_names(ctx).await?;
        let params = RunParams::parse(prompt, &styles)
            .ok_or_else(|| GenBotError::backend(BACKEND_ID, "invalid request body"))?;
        let uuid = self.run(ctx, &params, model_id).await?;
        tracing::debug!(%uuid, "FusionBrain generation submitted");
        self.wait_for_images(ctx, &uuid).await
    }
}
