// src/session/mod.rs — Session and job identifiers

pub mod registry;

use std::fmt;

use rand::Rng;

pub use registry::SessionRegistry;

/// Chat/conversation identifier assigned by the transport.
pub type SessionKey = i64;

/// Transport message identifier, used to thread replies.
pub type MessageId = i64;

const MIN_JOB_ID: u32 = 100_000;
const MAX_JOB_ID: u32 = 999_999;

/// Six-digit job number shown to the user.
///
/// Drawn at random; uniqueness inside a session is enforced by the
/// registry at registration time, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(u32);

impl JobId {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn random() -> Self {
        Self(rand::thread_rng().gen_range(MIN_JOB_ID..=MAX_JOB_ID))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u32>().map(JobId)
    }
}

/// Which backend a job runs against. Each kind has its own job table
/// and its own per-session ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BackendKind {
    ChatGpt,
    OpenAi,
    DreamBooth,
    FusionBrain,
}

impl BackendKind {
    /// Lookup order used when a job is cancelled by number alone.
    pub const ALL: [BackendKind; 4] = [
        BackendKind::ChatGpt,
        BackendKind::OpenAi,
        BackendKind::DreamBooth,
        BackendKind::FusionBrain,
    ];

    pub fn label(self) -> &'static str {
        match self {
            BackendKind::ChatGpt => "ChatGPT",
            BackendKind::OpenAi => "OpenAI",
            BackendKind::DreamBooth => "DreamBooth",
            BackendKind::FusionBrain => "FusionBrain",
        }
    }

    fn index(self) -> usize {
        match self {
            BackendKind::ChatGpt => 0,
            BackendKind::OpenAi => 1,
            BackendKind::DreamBooth => 2,
            BackendKind::FusionBrain => 3,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
