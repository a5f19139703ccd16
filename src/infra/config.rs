// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::infra::errors::GenBotError;
use crate::infra::paths;
use crate::session::BackendKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub limits: LimitsConfig,

    #[serde(default)]
    pub backends: BackendsConfig,

    #[serde(default)]
    pub roles: RolesConfig,

    #[serde(default)]
    pub permissions: PermissionsConfig,

    #[serde(default)]
    pub stats: StatsConfig,

    #[serde(default)]
    pub blocklist: BlocklistConfig,

    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub token: String,
    /// Long-poll timeout passed to getUpdates
    pub poll_timeout_seconds: u64,
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            poll_timeout_seconds: 30,
            api_base: "https://api.telegram.org".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum number of pending generation tasks
    pub capacity: usize,
    /// Number of worker tasks consuming the queue
    pub workers: usize,
    /// Pending-task count at which new messages are refused.
    /// Defaults to `capacity` when unset.
    #[serde(default)]
    pub overload_threshold: Option<usize>,
    /// Buffer between the transport and the ingress pump
    pub inbound_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            workers: 4,
            overload_threshold: None,
            inbound_capacity: 100,
        }
    }
}

impl QueueConfig {
    pub fn overload_threshold(&self) -> usize {
        self.overload_threshold.unwrap_or(self.capacity)
    }
}

/// Outstanding jobs allowed per session, per backend kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub chatgpt: usize,
    pub openai: usize,
    pub dreambooth: usize,
    pub fusionbrain: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            chatgpt: 1,
            openai: 1,
            dreambooth: 1,
            fusionbrain: 1,
        }
    }
}

impl LimitsConfig {
    pub fn for_kind(&self, kind: BackendKind) -> usize {
        match kind {
            BackendKind::ChatGpt => self.chatgpt,
            BackendKind::OpenAi => self.openai,
            BackendKind::DreamBooth => self.dreambooth,
            BackendKind::FusionBrain => self.fusionbrain,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendsConfig {
    pub chatgpt: Option<OpenAiConfig>,
    pub openai: Option<OpenAiConfig>,
    pub dreambooth: Option<DreamBoothConfig>,
    pub fusionbrain: Option<FusionBrainConfig>,
}

impl BackendsConfig {
    /// Job deadline for a backend kind. Unconfigured kinds get the image
    /// default; they are never dispatched anyway.
    pub fn timeout_for(&self, kind: BackendKind) -> Duration {
        let configured = match kind {
            BackendKind::ChatGpt => self.chatgpt.as_ref().map(OpenAiConfig::timeout),
            BackendKind::OpenAi => self.openai.as_ref().map(OpenAiConfig::timeout),
            BackendKind::DreamBooth => self.dreambooth.as_ref().map(DreamBoothConfig::timeout),
            BackendKind::FusionBrain => self.fusionbrain.as_ref().map(FusionBrainConfig::timeout),
        };
        configured.unwrap_or(Duration::from_secs(default_image_timeout_seconds()))
    }
}

/// An OpenAI-compatible endpoint (chat completions + image generation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_image_size")]
    pub image_size: String,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_interval_seconds")]
    pub retry_interval_seconds: u64,
    #[serde(default = "default_text_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl OpenAiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DreamBoothConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// API keys rotated round-robin when one reports its quota exhausted
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default = "default_dreambooth_base_url")]
    pub base_url: String,
    #[serde(default = "default_dreambooth_model")]
    pub model_id: String,
    /// Upper bound on keys tried per request (0 = every key once)
    #[serde(default)]
    pub max_key_attempts: usize,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_image_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl DreamBoothConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionBrainConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_fusionbrain_base_url")]
    pub base_url: String,
    #[serde(default = "default_fusionbrain_styles_url")]
    pub styles_url: String,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default = "default_image_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl FusionBrainConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Usernames per role. `*` matches everyone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RolesConfig {
    #[serde(default)]
    pub admin: Vec<String>,
    #[serde(default)]
    pub user: Vec<String>,
}

impl Default for RolesConfig {
    fn default() -> Self {
        Self {
            admin: Vec::new(),
            user: vec!["*".into()],
        }
    }
}

/// Command names per role. `*` allows every command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default)]
    pub admin: Vec<String>,
    #[serde(default)]
    pub user: Vec<String>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            admin: vec!["*".into()],
            user: [
                "start",
                "stop",
                "help",
                "chatGPT",
                "dreamBooth",
                "dreamBoothExample",
                "fusionBrain",
                "fusionBrainExample",
                "cancelJob",
                "listJobs",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    pub flush_interval_seconds: u64,
    /// Offset applied to row timestamps
    pub utc_offset_hours: i32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            path: None,
            flush_interval_seconds: 60,
            utc_offset_hours: 3,
        }
    }
}

impl StatsConfig {
    pub fn path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(paths::stats_path)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlocklistConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl BlocklistConfig {
    pub fn path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(paths::blocklist_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    /// Write logs to this file instead of stderr
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Rows returned by the `logs` command
    pub max_rows: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: None,
            max_rows: 50,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_text_model() -> String {
    "gpt-4.1-mini".into()
}

fn default_image_size() -> String {
    "1024x1024".into()
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_interval_seconds() -> u64 {
    2
}

fn default_text_timeout_seconds() -> u64 {
    120
}

fn default_image_timeout_seconds() -> u64 {
    300
}

fn default_poll_interval_seconds() -> u64 {
    5
}

fn default_dreambooth_base_url() -> String {
    "https://stablediffusionapi.com/api/v4/dreambooth".into()
}

fn default_dreambooth_model() -> String {
    "midjourney".into()
}

fn default_fusionbrain_base_url() -> String {
    "https://api-key.fusionbrain.ai/key/api/v1".into()
}

fn default_fusionbrain_styles_url() -> String {
    "https://cdn.fusionbrain.ai/static/styles/api".into()
}

impl Config {
    /// Load config from the default location, falling back to defaults.
    pub fn load() -> anyhow::Result<Self> {
        let path = paths::config_file_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Reject settings the dispatcher cannot run with.
    pub fn validate(&self) -> Result<(), GenBotError> {
        if self.queue.capacity == 0 {
            return Err(GenBotError::Config("queue.capacity must be > 0".into()));
        }
        if self.queue.workers == 0 {
            return Err(GenBotError::Config("queue.workers must be > 0".into()));
        }
        if self.queue.inbound_capacity == 0 {
            return Err(GenBotError::Config(
                "queue.inbound_capacity must be > 0".into(),
            ));
        }
        if let Some(db) = self.backends.dreambooth.as_ref().filter(|b| b.enabled) {
            if db.tokens.is_empty() {
                return Err(GenBotError::Config(
                    "backends.dreambooth.tokens must not be empty".into(),
                ));
            }
            if db.poll_interval_seconds == 0 {
                return Err(GenBotError::Config(
                    "backends.dreambooth.poll_interval_seconds must be > 0".into(),
                ));
            }
        }
        if let Some(fb) = self.backends.fusionbrain.as_ref().filter(|b| b.enabled) {
            if fb.key.is_empty() || fb.secret_key.is_empty() {
                return Err(GenBotError::Config(
                    "backends.fusionbrain needs key and secret_key".into(),
                ));
            }
            if fb.poll_interval_seconds == 0 {
                return Err(GenBotError::Config(
                    "backends.fusionbrain.poll_interval_seconds must be > 0".into(),
                ));
            }
        }
        Ok(())
    }
}
