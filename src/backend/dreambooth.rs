// src/backend/dreambooth.rs — DreamBooth text-to-image (stablediffusionapi.com)
//
// Prompts are `field: value` lines overriding request defaults; plain text
// becomes the prompt. Requests rotate through the token pool when the API
// reports a monthly limit.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::{random_image_name, GeneratedImage, GenerationBackend, KeyPool};
use crate::dispatch::job::JobContext;
use crate::infra::config::DreamBoothConfig;
use crate::infra::errors::{GenBotError, Result};

const BACKEND_ID: &str = "dreambooth";
const QUOTA_MARKER: &str = "limit exceeded";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextToImageRequest {
    pub key: String,
    pub model_id: String,
    pub prompt: String,
    pub negative_prompt: String,
    pub width: String,
    pub height: String,
    pub samples: String,
    pub num_inference_steps: String,
    pub safety_checker: String,
    pub enhance_prompt: String,
    pub guidance_scale: f64,
    pub multi_lingual: String,
    pub panorama: String,
    pub self_attention: String,
    pub upscale: String,
    pub tomesd: String,
    pub clip_skip: String,
    pub use_karras_sigmas: String,
    pub scheduler: String,
}

impl TextToImageRequest {
    pub fn new(model_id: &str) -> Self {
        Self {
            key: String::new(),
            model_id: model_id.to_string(),
            prompt: String::new(),
            negative_prompt: String::new(),
            width: "1024".into(),
            height: "1024".into(),
            samples: "1".into(),
            num_inference_steps: "20".into(),
            safety_checker: "no".into(),
            enhance_prompt: "yes".into(),
            guidance_scale: 7.5,
            multi_lingual: "no".into(),
            panorama: "no".into(),
            self_attention: "no".into(),
            upscale: "no".into(),
            tomesd: "yes".into(),
            clip_skip: "2".into(),
            use_karras_sigmas: "yes".into(),
            scheduler: "UniPCMultistepScheduler".into(),
        }
    }

    /// Apply `field: value` lines. Unknown fields and empty values are
    /// ignored. When no prompt line is given the whole text is the prompt.
    pub fn parse(model_id: &str, text: &str) -> Self {
        let mut req = Self::new(model_id);
        for line in text.lines() {
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let (field, value) = (field.trim(), value.trim());
            if field.is_empty() || value.is_empty() {
                continue;
            }
            let slot = match field {
                "model_id" => &mut req.model_id,
                "prompt" => &mut req.prompt,
                "negative_prompt" => &mut req.negative_prompt,
                "width" => &mut req.width,
                "height" => &mut req.height,
                "samples" => &mut req.samples,
                "num_inference_steps" => &mut req.num_inference_steps,
                "safety_checker" => &mut req.safety_checker,
                "enhance_prompt" => &mut req.enhance_prompt,
                "multi_lingual" => &mut req.multi_lingual,
                "panorama" => &mut req.panorama,
                "self_attention" => &mut req.self_attention,
                "upscale" => &mut req.upscale,
                "tomesd" => &mut req.tomesd,
                "clip_skip" => &mut req.clip_skip,
                "use_karras_sigmas" => &mut req.use_karras_sigmas,
                "scheduler" => &mut req.scheduler,
                "guidance_scale" => {
                    if let Ok(scale) = value.parse() {
                        req.guidance_scale = scale;
                    }
                    continue;
                }
                _ => continue,
            };
            *slot = value.to_string();
        }
        if req.prompt.is_empty() {
            req.prompt = text.trim().to_string();
        }
        req
    }
}

pub struct DreamBoothBackend {
    client: reqwest::Client,
    keys: KeyPool,
    config: DreamBoothConfig,
}

impl DreamBoothBackend {
    pub fn new(client: reqwest::Client, config: DreamBoothConfig) -> Result<Self> {
        let keys = KeyPool::new(BACKEND_ID, config.tokens.clone(), config.max_key_attempts)?;
        Ok(Self {
            client,
            keys,
            config,
        })
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.config.poll_interval_seconds)
    }

    async fn post(&self, ctx: &JobContext, url: &str, body: &impl Serialize) -> Result<Value> {
        let response = ctx
            .run(async {
                self.client
                    .post(url)
                    .json(body)
                    .send()
                    .await
                    .map_err(GenBotError::from)
            })
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(GenBotError::backend(BACKEND_ID, format!("HTTP {status}")));
        }
        ctx.run(async { response.json::<Value>().await.map_err(GenBotError::from) })
            .await
    }

    async fn text_to_image(&self, ctx: &JobContext, prompt: &str, key: String) -> Result<GeneratedImage> {
        let mut request = TextToImageRequest::parse(&self.config.model_id, prompt);
        request.key = key.clone();
        tracing::debug!(model = %request.model_id, "DreamBooth text2img request");

        let resp = self.post(ctx, &self.config.base_url, &request).await?;
        match resp["status"].as_str().unwrap_or_default() {
            "success" => {
                let output = first_output(&resp)?;
                self.download(ctx, &output).await
            }
            "processing" => {
                let request_id = request_id(&resp)?;
                let output = self.wait_for_output(ctx, &key, &request_id).await?;
                self.download(ctx, &output).await
            }
            "error" => Err(status_error(&resp)),
            other => Err(GenBotError::backend(
                BACKEND_ID,
                format!("unsupported status '{other}'"),
            )),
        }
    }

    /// Poll the fetch endpoint until the queued image has an output URL.
    async fn wait_for_output(&self, ctx: &JobContext, key: &str, request_id: &str) -> Result<String> {
        let url = format!(
            "{}/fetch/{request_id}",
            self.config.base_url.trim_end_matches('/')
        );
        let body = serde_json::json!({ "key": key, "request_id": request_id });
        loop {
            ctx.check()?;
            match self.post(ctx, &url, &body).await {
                Ok(resp) => match resp["status"].as_str() {
                    Some("error") | Some("failed") => return Err(status_error(&resp)),
                    _ => {
                        if let Ok(output) = first_output(&resp) {
                            return Ok(output);
                        }
                    }
                },
                Err(e) if e.is_cancellation() || matches!(e, GenBotError::DeadlineExceeded) => {
                    return Err(e)
                }
                Err(e) => tracing::debug!(request_id, "DreamBooth fetch not ready: {}", e),
            }
            ctx.sleep(self.poll_interval()).await?;
        }
    }

    async fn download(&self, ctx: &JobContext, file_url: &str) -> Result<GeneratedImage> {
        let response = ctx
            .run(async {
                self.client
                    .get(file_url)
                    .send()
                    .await
                    .map_err(GenBotError::from)
            })
            .await?;
        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_MODIFIED {
            return Err(GenBotError::backend(
                BACKEND_ID,
                format!("download failed: HTTP {status}"),
            ));
        }
        let bytes = ctx
            .run(async { response.bytes().await.map_err(GenBotError::from) })
            .await?;
        if bytes.is_empty() {
            return Err(GenBotError::backend(BACKEND_ID, "downloaded file is empty"));
        }
        Ok(GeneratedImage {
            bytes: bytes.to_vec(),
            file_name: file_name_from_url(file_url).unwrap_or_else(random_image_name),
        })
    }
}

fn first_output(resp: &Value) -> Result<String> {
    resp["output"][0]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GenBotError::backend(BACKEND_ID, "response output is empty"))
}

fn request_id(resp: &Value) -> Result<String> {
    match &resp["id"] {
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) if !s.is_empty() => Ok(s.clone()),
        _ => Err(GenBotError::backend(BACKEND_ID, "response request id is empty")),
    }
}

/// Map an `"status": "error"` body to a quota or a plain backend error.
fn status_error(resp: &Value) -> GenBotError {
    let message = resp["message"].as_str().unwrap_or("unknown error");
    if message.to_lowercase().contains(QUOTA_MARKER) {
        GenBotError::quota(BACKEND_ID, message)
    } else {
        GenBotError::backend(BACKEND_ID, message)
    }
}

fn file_name_from_url(file_url: &str) -> Option<String> {
    let parsed = url::Url::parse(file_url).ok()?;
    parsed
        .path_segments()?
        .next_back()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl GenerationBackend for DreamBoothBackend {
    fn id(&self) -> &str {
        BACKEND_ID
    }

    async fn generate_image(&self, ctx: &JobContext, prompt: &str) -> Result<GeneratedImage> {
        self.keys
            .run(|key| self.text_to_image(ctx, prompt, key))
            .await
    }
}
