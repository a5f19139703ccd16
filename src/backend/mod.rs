// src/backend/mod.rs — Generation backend abstraction

pub mod dreambooth;
pub mod fusionbrain;
pub mod key_pool;
pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::dispatch::job::JobContext;
use crate::infra::config::Config;
use crate::infra::errors::{GenBotError, Result};
use crate::session::BackendKind;

pub use dreambooth::DreamBoothBackend;
pub use fusionbrain::FusionBrainBackend;
pub use key_pool::KeyPool;
pub use openai::OpenAiBackend;

const IMAGE_EXTENSION: &str = ".png";
const RANDOM_FILE_NAME_LEN: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub file_name: String,
}

/// A remote generation service.
///
/// Implementations must return promptly with `Canceled` or
/// `DeadlineExceeded` once `ctx` is done. Backends that only produce one
/// media type keep the default for the other.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn id(&self) -> &str;

    async fn generate_text(&self, ctx: &JobContext, prompt: &str) -> Result<Vec<u8>> {
        let _ = (ctx, prompt);
        Err(GenBotError::backend(self.id(), "text generation is not supported"))
    }

    async fn generate_image(&self, ctx: &JobContext, prompt: &str) -> Result<GeneratedImage> {
        let _ = (ctx, prompt);
        Err(GenBotError::backend(self.id(), "image generation is not supported"))
    }
}

/// The configured backend for each kind. A missing entry means the
/// corresponding chat mode is unavailable.
#[derive(Clone, Default)]
pub struct Backends {
    pub chatgpt: Option<Arc<dyn GenerationBackend>>,
    pub openai: Option<Arc<dyn GenerationBackend>>,
    pub dreambooth: Option<Arc<dyn GenerationBackend>>,
    pub fusionbrain: Option<Arc<dyn GenerationBackend>>,
}

impl Backends {
    pub fn for_kind(&self, kind: BackendKind) -> Option<Arc<dyn GenerationBackend>> {
        match kind {
            BackendKind::ChatGpt => self.chatgpt.clone(),
            BackendKind::OpenAi => self.openai.clone(),
            BackendKind::DreamBooth => self.dreambooth.clone(),
            BackendKind::FusionBrain => self.fusionbrain.clone(),
        }
    }

    pub fn with(mut self, kind: BackendKind, backend: Arc<dyn GenerationBackend>) -> Self {
        let slot = match kind {
            BackendKind::ChatGpt => &mut self.chatgpt,
            BackendKind::OpenAi => &mut self.openai,
            BackendKind::DreamBooth => &mut self.dreambooth,
            BackendKind::FusionBrain => &mut self.fusionbrain,
        };
        *slot = Some(backend);
        self
    }

    /// Kinds that have a backend.
    pub fn available(&self) -> Vec<BackendKind> {
        BackendKind::ALL
            .into_iter()
            .filter(|k| self.for_kind(*k).is_some())
            .collect()
    }

    /// Build every enabled backend from config. OpenAI keys fall back to the
    /// `OPENAI_API_KEY` environment variable.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::new();
        let mut backends = Backends::default();

        for (kind, cfg) in [
            (BackendKind::ChatGpt, &config.backends.chatgpt),
            (BackendKind::OpenAi, &config.backends.openai),
        ] {
            let Some(cfg) = cfg.as_ref().filter(|c| c.enabled) else {
                continue;
            };
            let api_key = cfg
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
            match api_key {
                Some(key) => {
                    let id = kind.label().to_lowercase();
                    backends = backends.with(
                        kind,
                        Arc::new(OpenAiBackend::new(id, client.clone(), key, cfg.clone())),
                    );
                }
                None => tracing::warn!(backend = %kind, "No API key configured, backend disabled"),
            }
        }

        if let Some(cfg) = config.backends.dreambooth.as_ref().filter(|c| c.enabled) {
            backends = backends.with(
                BackendKind::DreamBooth,
                Arc::new(DreamBoothBackend::new(client.clone(), cfg.clone())?),
            );
        }

        if let Some(cfg) = config.backends.fusionbrain.as_ref().filter(|c| c.enabled) {
            backends = backends.with(
                BackendKind::FusionBrain,
                Arc::new(FusionBrainBackend::new(client, cfg.clone())),
            );
        }

        Ok(backends)
    }
}

/// Random alphanumeric name for generated images that come without one.
pub fn random_image_name() -> String {
    let stem: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_FILE_NAME_LEN)
        .map(char::from)
        .collect();
    format!("{stem}{IMAGE_EXTENSION}")
}
