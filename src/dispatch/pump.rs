// src/dispatch/pump.rs — Ingress pump
//
// Single consumer of inbound messages. Commands are applied synchronously;
// free text sent while a task mode is selected is admitted to the queue.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::command::Command;
use super::queue::Task;
use super::replies;
use super::{Reply, Shared};
use crate::infra::errors::GenBotError;
use crate::infra::logger;
use crate::session::BackendKind;
use crate::transport::InboundMessage;

pub async fn run(
    shared: Arc<Shared>,
    mut inbound: mpsc::Receiver<InboundMessage>,
    shutdown: CancellationToken,
) {
    tracing::debug!("Ingress pump started");
    loop {
        let msg = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            msg = inbound.recv() => match msg {
                Some(m) => m,
                None => break,
            },
        };

        if let Some(reply) = handle_message(&shared, &msg) {
            shared.deliver(msg.session, msg.message_id, reply).await;
        }
    }
    tracing::debug!("Ingress pump stopped");
}

/// Decide what to do with one inbound message. `None` means no reply.
pub fn handle_message(shared: &Shared, msg: &InboundMessage) -> Option<Reply> {
    let session = msg.session;
    if shared.registry.contains(session) {
        let _ = shared.registry.set_username(session, &msg.sender);
    }

    if shared.blocklist.contains(&msg.sender) {
        tracing::info!(session, sender = %msg.sender, "Blocked sender");
        return Some(Reply::text(replies::ACCESS_DENIED));
    }

    if shared.queue.len() >= shared.config.queue.overload_threshold() {
        tracing::warn!(session, pending = shared.queue.len(), "Queue overloaded");
        return Some(Reply::text(replies::OVERLOADED));
    }

    if let Some(name) = &msg.command {
        return Some(handle_command(shared, msg, name));
    }

    let text = msg.text.trim();
    if text.is_empty() {
        return None;
    }

    Some(admit_task(shared, msg, text))
}

fn admit_task(shared: &Shared, msg: &InboundMessage, text: &str) -> Reply {
    let session = msg.session;
    let command = match shared.registry.command(session) {
        Ok(c) => c,
        Err(_) => return Reply::text(replies::SESSION_NOT_ACTIVE),
    };
    if !command.is_task_mode() {
        return Reply::text(replies::NO_GENERATOR_SELECTED);
    }

    if let Some(kind) = command.backend_kind() {
        let outstanding = match shared.registry.count_jobs(session, kind) {
            Ok(n) => n,
            Err(_) => return Reply::text(replies::SESSION_NOT_ACTIVE),
        };
        if outstanding >= shared.config.limits.for_kind(kind) {
            tracing::info!(session, backend = %kind, outstanding, "Job limit reached");
            return Reply::text(replies::JOB_LIMIT);
        }
    }

    let task = Task {
        session,
        message_id: msg.message_id,
        text: text.to_string(),
    };
    match shared.queue.try_enqueue(task) {
        Ok(()) => {
            tracing::debug!(session, %command, pending = shared.queue.len(), "Task enqueued");
            Reply::text(replies::ADDED_TO_QUEUE)
        }
        Err(e) => {
            tracing::warn!(session, "Task refused: {}", e);
            Reply::text(replies::OVERLOADED)
        }
    }
}

fn handle_command(shared: &Shared, msg: &InboundMessage, name: &str) -> Reply {
    let session = msg.session;
    let command: Command = match name.parse() {
        Ok(c) => c,
        Err(_) => return Reply::text(replies::UNKNOWN_COMMAND),
    };
    if !shared.roles.can_run(&msg.sender, command) {
        tracing::info!(session, sender = %msg.sender, %command, "Permission denied");
        return Reply::text(replies::ACCESS_DENIED);
    }
    tracing::debug!(session, %command, "Command");

    match command {
        Command::Start => match shared.registry.add_session(session, &msg.sender) {
            Ok(()) => {
                tracing::info!(session, sender = %msg.sender, "Session started");
                Reply::text(replies::SESSION_CREATED)
            }
            Err(GenBotError::AlreadyExists(_)) => Reply::text(replies::SESSION_ALREADY_ACTIVE),
            Err(e) => {
                tracing::error!(session, "Failed to start session: {}", e);
                Reply::text(replies::INTERNAL_ERROR)
            }
        },
        Command::Stop => match shared.registry.stop_session(session) {
            Ok(cancelled) => {
                tracing::info!(session, cancelled, "Session stopped");
                Reply::text(replies::SESSION_STOPPED)
            }
            Err(_) => Reply::text(replies::SESSION_NOT_ACTIVE),
        },
        Command::Help => {
            let commands = shared
                .roles
                .role_of(&msg.sender)
                .map(|role| shared.roles.commands_for(role))
                .unwrap_or_default();
            Reply::Text(replies::help(&commands))
        }
        Command::ChatGpt
        | Command::OpenAiText
        | Command::OpenAiImage
        | Command::DreamBooth
        | Command::FusionBrain => {
            let configured = command
                .backend_kind()
                .is_some_and(|kind| shared.backends.for_kind(kind).is_some());
            if !configured {
                return Reply::text(replies::BACKEND_UNAVAILABLE);
            }
            select_mode(shared, msg, command)
        }
        Command::CancelJob | Command::Ban | Command::Unban => select_mode(shared, msg, command),
        Command::DreamBoothExample => Reply::text(replies::DREAMBOOTH_EXAMPLE),
        Command::FusionBrainExample => Reply::text(replies::FUSIONBRAIN_EXAMPLE),
        Command::ListJobs => {
            let mut jobs = Vec::with_capacity(BackendKind::ALL.len());
            for kind in BackendKind::ALL {
                match shared.registry.list_job_ids(session, kind) {
                    Ok(ids) => jobs.push((kind, ids)),
                    Err(_) => return Reply::text(replies::SESSION_NOT_ACTIVE),
                }
            }
            Reply::Text(replies::list_jobs(&jobs))
        }
        Command::Stats => {
            let bytes = shared.stats.snapshot();
            if bytes.is_empty() {
                return Reply::text(replies::STATS_EMPTY);
            }
            Reply::File {
                bytes,
                file_name: replies::STATS_FILE_NAME.into(),
            }
        }
        Command::Logs => {
            let Some(path) = shared.config.log.file.as_deref() else {
                return Reply::text(replies::LOGS_UNAVAILABLE);
            };
            match logger::tail(path, shared.config.log.max_rows) {
                Ok(content) if !content.is_empty() => Reply::File {
                    bytes: content.into_bytes(),
                    file_name: replies::LOGS_FILE_NAME.into(),
                },
                Ok(_) => Reply::text(replies::LOGS_UNAVAILABLE),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Failed to read log file: {}", e);
                    Reply::text(replies::LOGS_UNAVAILABLE)
                }
            }
        }
        Command::Blacklist => Reply::Text(replies::blocklist(&shared.blocklist.list())),
    }
}

fn select_mode(shared: &Shared, msg: &InboundMessage, command: Command) -> Reply {
    match shared.registry.set_command(msg.session, command) {
        Ok(()) => Reply::Text(replies::mode_selected(command)),
        Err(_) => Reply::text(replies::SESSION_NOT_ACTIVE),
    }
}
