// src/dispatch/command.rs — Closed set of chat commands

use std::fmt;
use std::str::FromStr;

use crate::session::BackendKind;

/// Every command the bot understands. The pump and the workers match on
/// this exhaustively, so adding a variant forces both sides to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Start,
    Stop,
    Help,
    ChatGpt,
    OpenAiText,
    OpenAiImage,
    DreamBooth,
    DreamBoothExample,
    FusionBrain,
    FusionBrainExample,
    CancelJob,
    ListJobs,
    Stats,
    Logs,
    Ban,
    Unban,
    Blacklist,
}

impl Command {
    pub const ALL: [Command; 17] = [
        Command::Start,
        Command::Stop,
        Command::Help,
        Command::ChatGpt,
        Command::OpenAiText,
        Command::OpenAiImage,
        Command::DreamBooth,
        Command::DreamBoothExample,
        Command::FusionBrain,
        Command::FusionBrainExample,
        Command::CancelJob,
        Command::ListJobs,
        Command::Stats,
        Command::Logs,
        Command::Ban,
        Command::Unban,
        Command::Blacklist,
    ];

    /// Name as typed in chat, without the leading slash.
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Stop => "stop",
            Command::Help => "help",
            Command::ChatGpt => "chatGPT",
            Command::OpenAiText => "openAIText",
            Command::OpenAiImage => "openAIImage",
            Command::DreamBooth => "dreamBooth",
            Command::DreamBoothExample => "dreamBoothExample",
            Command::FusionBrain => "fusionBrain",
            Command::FusionBrainExample => "fusionBrainExample",
            Command::CancelJob => "cancelJob",
            Command::ListJobs => "listJobs",
            Command::Stats => "stats",
            Command::Logs => "logs",
            Command::Ban => "ban",
            Command::Unban => "unban",
            Command::Blacklist => "blacklist",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Command::Start => "start a session",
            Command::Stop => "stop the session and cancel its jobs",
            Command::Help => "show available commands",
            Command::ChatGpt => "chat with ChatGPT",
            Command::OpenAiText => "generate text with OpenAI",
            Command::OpenAiImage => "generate an image with OpenAI",
            Command::DreamBooth => "generate an image with DreamBooth",
            Command::DreamBoothExample => "show a DreamBooth prompt example",
            Command::FusionBrain => "generate an image with FusionBrain",
            Command::FusionBrainExample => "show a FusionBrain prompt example",
            Command::CancelJob => "cancel a job by number",
            Command::ListJobs => "list your running jobs",
            Command::Stats => "download request statistics",
            Command::Logs => "show recent log lines",
            Command::Ban => "block a username",
            Command::Unban => "unblock a username",
            Command::Blacklist => "list blocked usernames",
        }
    }

    /// Backend a generation mode dispatches to.
    pub fn backend_kind(self) -> Option<BackendKind> {
        match self {
            Command::ChatGpt => Some(BackendKind::ChatGpt),
            Command::OpenAiText | Command::OpenAiImage => Some(BackendKind::OpenAi),
            Command::DreamBooth => Some(BackendKind::DreamBooth),
            Command::FusionBrain => Some(BackendKind::FusionBrain),
            Command::Start
            | Command::Stop
            | Command::Help
            | Command::DreamBoothExample
            | Command::FusionBrainExample
            | Command::CancelJob
            | Command::ListJobs
            | Command::Stats
            | Command::Logs
            | Command::Ban
            | Command::Unban
            | Command::Blacklist => None,
        }
    }

    /// Whether free text sent while this command is selected becomes a
    /// queued task.
    pub fn is_task_mode(self) -> bool {
        self.backend_kind().is_some()
            || matches!(self, Command::CancelJob | Command::Ban | Command::Unban)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command: {0}")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().trim_start_matches('/');
        Command::ALL
            .into_iter()
            .find(|c| c.as_str() == name)
            .ok_or_else(|| UnknownCommand(name.to_string()))
    }
}
