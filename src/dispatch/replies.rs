// src/dispatch/replies.rs — User-facing reply texts

use crate::dispatch::command::Command;
use crate::session::{BackendKind, JobId};

pub const SESSION_CREATED: &str = "🎉 Session started, welcome! 🎉\n🔧 /help - list commands";
pub const SESSION_ALREADY_ACTIVE: &str = "⚠ Session is already active ⚠\n🔧 /help - list commands";
pub const SESSION_STOPPED: &str = "😥 Session finished. Come back soon! 😥";
pub const SESSION_NOT_ACTIVE: &str =
    "❌ Session is not active ❌\n✅ /start - start a session\n🔧 /help - list commands";
pub const NO_GENERATOR_SELECTED: &str =
    "❌ No generator selected ❌\nPick one from /help before sending a prompt";
pub const UNKNOWN_COMMAND: &str = "❌ Command is not supported ❌\nSee /help for the command list";
pub const UNKNOWN_TASK: &str = "❌ This mode does not accept input ❌";
pub const ACCESS_DENIED: &str = "⛔ Access denied ⛔";
pub const OVERLOADED: &str = "❌ Service is overloaded ❌\nPlease try again later";
pub const JOB_LIMIT: &str =
    "❌ Request limit reached ❌\nPlease wait for your previous requests to finish";
pub const ADDED_TO_QUEUE: &str = "✅ Request added to the queue ✅";
pub const BACKEND_UNAVAILABLE: &str = "❌ This generator is not configured ❌";

pub const INPUT_JOB_ID: &str = "📛 Send the job number 📛\n📋 /listJobs - list running jobs";
pub const INVALID_JOB_ID: &str = "❌ Job number must be a number ❌";
pub const JOB_CANCELED: &str = "✅ Request was canceled ✅";
pub const GENERATION_FAILED: &str = "❌ Generation failed ❌\nPlease try again";
pub const INTERNAL_ERROR: &str = "❌ Internal error ❌\nPlease try again";

pub const INPUT_USERNAME: &str = "👤 Send the username 👤";
pub const BLOCKLIST_EMPTY: &str = "Blocklist is empty";
pub const STATS_EMPTY: &str = "No statistics collected yet";
pub const LOGS_UNAVAILABLE: &str = "❌ Log file is not available ❌";

pub const STATS_FILE_NAME: &str = "stats.csv";
pub const LOGS_FILE_NAME: &str = "logs.txt";

pub const DREAMBOOTH_EXAMPLE: &str = "prompt: Iron Man, (Arnold Tsang, Toru Nakayama), Masterpiece, \
Studio Quality, 6k, glowing, axe, mecha, science_fiction, jungle, nature, dynamic lighting, \
detailed shading, digital texture painting
negative_prompt: un-detailed skin, semi-realistic, cgi, 3d, render, sketch, cartoon, drawing, \
(out of frame:1.3), worst quality, low quality, jpeg artifacts
width: 512
height: 512
model_id: midjourney";

pub const FUSIONBRAIN_EXAMPLE: &str = "Iron Man in a jungle, masterpiece, dynamic lighting
blurry, low quality, jpeg artifacts
1024
1024
UHD";

/// Acknowledgement for a mode selection.
pub fn mode_selected(command: Command) -> String {
    match command {
        Command::ChatGpt => "📖 ChatGPT text generation selected 📖\nDescribe your request in detail".into(),
        Command::OpenAiText => "📖 OpenAI text generation selected 📖\nDescribe your request in detail".into(),
        Command::OpenAiImage => "🌄 OpenAI image generation selected 🌄\nDescribe the image in detail".into(),
        Command::DreamBooth => "🌅 DreamBooth image generation selected 🌅\n\
            Prompt lines are `field: value` pairs\n📄 /dreamBoothExample - prompt example"
            .into(),
        Command::FusionBrain => "🌅 FusionBrain image generation selected 🌅\n\
            Lines: prompt, negative prompt, width, height, style\n📄 /fusionBrainExample - prompt example"
            .into(),
        Command::CancelJob => INPUT_JOB_ID.into(),
        Command::Ban | Command::Unban => INPUT_USERNAME.into(),
        other => format!("/{other} selected"),
    }
}

pub fn job_not_found(id: JobId) -> String {
    format!("Job #{id} not found")
}

pub fn job_cancelled(kind: BackendKind, id: JobId) -> String {
    format!("{kind} job #{id} cancelled")
}

pub fn banned(username: &str, changed: bool) -> String {
    if changed {
        format!("✅ {username} is blocked")
    } else {
        format!("⚠ {username} is already blocked")
    }
}

pub fn unbanned(username: &str, changed: bool) -> String {
    if changed {
        format!("✅ {username} is unblocked")
    } else {
        format!("⚠ {username} is not blocked")
    }
}

pub fn blocklist(names: &[String]) -> String {
    if names.is_empty() {
        return BLOCKLIST_EMPTY.into();
    }
    let mut out = String::from("Blocked users:\n");
    for name in names {
        out.push_str(name);
        out.push('\n');
    }
    out
}

pub fn list_jobs(jobs: &[(BackendKind, Vec<JobId>)]) -> String {
    let mut out = String::new();
    for (kind, ids) in jobs {
        out.push_str(&format!("{kind} jobs:\n"));
        for id in ids {
            out.push_str(&format!("{id}\n"));
        }
    }
    out
}

pub fn help(commands: &[Command]) -> String {
    let mut out = String::from("🔧 Available commands 🔧\n");
    for cmd in commands {
        out.push_str(&format!("/{} - {}\n", cmd.as_str(), cmd.description()));
    }
    out
}
