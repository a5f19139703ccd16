// src/dispatch/worker.rs — Worker pool and job lifecycle
//
// Each worker loops on the queue. A task is resolved against the session's
// current command; generation modes run as registered, cancellable jobs.
// A panicking task is contained to that task.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use uuid::Uuid;

use super::command::Command;
use super::job::JobContext;
use super::queue::Task;
use super::replies;
use super::{Reply, Shared};
use crate::infra::errors::{GenBotError, Result};
use crate::session::{BackendKind, JobId, SessionKey, SessionRegistry};

/// Job id draws before giving up on a collision streak.
const MAX_ID_DRAWS: usize = 8;

pub async fn run(worker_id: usize, shared: Arc<Shared>) {
    tracing::debug!(worker_id, "Worker started");

    while let Some(task) = shared.queue.dequeue().await {
        let task_id = Uuid::new_v4();
        tracing::debug!(worker_id, %task_id, session = task.session, "Task dequeued");

        let reply = match AssertUnwindSafe(process_task(&shared, &task))
            .catch_unwind()
            .await
        {
            Ok(reply) => reply,
            Err(panic) => {
                tracing::error!(
                    worker_id,
                    %task_id,
                    session = task.session,
                    "Task panicked: {}",
                    panic_message(panic.as_ref())
                );
                Reply::text(replies::INTERNAL_ERROR)
            }
        };

        shared.deliver(task.session, task.message_id, reply).await;
    }

    tracing::debug!(worker_id, "Worker stopped");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

/// Resolve a task against the session's current command and produce the
/// reply for it.
pub async fn process_task(shared: &Shared, task: &Task) -> Reply {
    let session = task.session;
    let command = match shared.registry.command(session) {
        Ok(c) => c,
        Err(_) => return Reply::text(replies::SESSION_NOT_ACTIVE),
    };

    match command {
        Command::ChatGpt | Command::OpenAiText => generate_text(shared, task, command).await,
        Command::OpenAiImage | Command::DreamBooth | Command::FusionBrain => {
            generate_image(shared, task, command).await
        }
        Command::CancelJob => cancel_job(&shared.registry, session, &task.text),
        Command::Ban => ban(shared, &task.text, true),
        Command::Unban => ban(shared, &task.text, false),
        Command::Start
        | Command::Stop
        | Command::Help
        | Command::DreamBoothExample
        | Command::FusionBrainExample
        | Command::ListJobs
        | Command::Stats
        | Command::Logs
        | Command::Blacklist => Reply::text(replies::UNKNOWN_TASK),
    }
}

async fn generate_text(shared: &Shared, task: &Task, command: Command) -> Reply {
    let Some(kind) = command.backend_kind() else {
        return Reply::text(replies::UNKNOWN_TASK);
    };
    let Some(backend) = shared.backends.for_kind(kind) else {
        return Reply::text(replies::BACKEND_UNAVAILABLE);
    };
    let timeout = shared.config.backends.timeout_for(kind);
    let prompt = task.text.as_str();

    let result = run_job(&shared.registry, task.session, kind, timeout, |ctx| async move {
        backend.generate_text(&ctx, prompt).await
    })
    .await;

    match result {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes).into_owned();
            if text.trim().is_empty() {
                tracing::warn!(session = task.session, backend = %kind, "Backend returned empty text");
                return Reply::text(replies::GENERATION_FAILED);
            }
            record_stats(shared, task, command, &text);
            Reply::Text(text)
        }
        Err(e) => failure_reply(task.session, kind, &e),
    }
}

async fn generate_image(shared: &Shared, task: &Task, command: Command) -> Reply {
    let Some(kind) = command.backend_kind() else {
        return Reply::text(replies::UNKNOWN_TASK);
    };
    let Some(backend) = shared.backends.for_kind(kind) else {
        return Reply::text(replies::BACKEND_UNAVAILABLE);
    };
    let timeout = shared.config.backends.timeout_for(kind);
    let prompt = task.text.as_str();

    let result = run_job(&shared.registry, task.session, kind, timeout, |ctx| async move {
        backend.generate_image(&ctx, prompt).await
    })
    .await;

    match result {
        Ok(image) => {
            record_stats(shared, task, command, &image.file_name);
            Reply::File {
                bytes: image.bytes,
                file_name: image.file_name,
            }
        }
        Err(e) => failure_reply(task.session, kind, &e),
    }
}

fn record_stats(shared: &Shared, task: &Task, command: Command, response: &str) {
    let username = shared.registry.username(task.session).unwrap_or_default();
    shared
        .stats
        .record(&username, command.as_str(), &task.text, response);
}

fn failure_reply(session: SessionKey, kind: BackendKind, err: &GenBotError) -> Reply {
    match err {
        GenBotError::Canceled => {
            tracing::info!(session, backend = %kind, "Job canceled");
            Reply::text(replies::JOB_CANCELED)
        }
        GenBotError::SessionNotFound(_) => Reply::text(replies::SESSION_NOT_ACTIVE),
        e => {
            tracing::error!(session, backend = %kind, "Job failed: {}", e);
            Reply::text(replies::GENERATION_FAILED)
        }
    }
}

/// Run one job through its lifecycle: register a fresh id with the
/// registry, drive `job` under the job context, then unregister.
///
/// Unregistration happens in [`JobGuard`]'s drop, so the job's slot is
/// freed and its token cancelled even if the job panics.
pub async fn run_job<T, F, Fut>(
    registry: &SessionRegistry,
    session: SessionKey,
    kind: BackendKind,
    timeout: Duration,
    job: F,
) -> Result<T>
where
    F: FnOnce(JobContext) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let ctx = JobContext::with_timeout(timeout);
    let id = register(registry, session, kind, &ctx)?;
    let guard = JobGuard {
        registry,
        session,
        kind,
        id,
        ctx: ctx.clone(),
    };
    tracing::info!(session, job_id = %id, backend = %kind, "Job started");

    let result = ctx.run(job(ctx.clone())).await;
    drop(guard);

    match &result {
        Ok(_) => tracing::info!(session, job_id = %id, backend = %kind, "Job completed"),
        Err(e) => tracing::debug!(session, job_id = %id, backend = %kind, "Job ended: {}", e),
    }
    result
}

struct JobGuard<'a> {
    registry: &'a SessionRegistry,
    session: SessionKey,
    kind: BackendKind,
    id: JobId,
    ctx: JobContext,
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        match self.registry.cancel_job(self.session, self.kind, self.id) {
            Ok(()) => {}
            // Already cancelled by the user or removed with its session.
            Err(e) if e.is_not_found() => {}
            Err(e) => tracing::warn!(
                session = self.session,
                job_id = %self.id,
                "Failed to unregister job: {}",
                e
            ),
        }
        self.ctx.cancel();
    }
}

fn register(
    registry: &SessionRegistry,
    session: SessionKey,
    kind: BackendKind,
    ctx: &JobContext,
) -> Result<JobId> {
    let mut draws = 0;
    loop {
        draws += 1;
        let id = JobId::random();
        match registry.add_job(session, kind, id, ctx.token()) {
            Ok(()) => return Ok(id),
            Err(GenBotError::AlreadyUsed { .. }) if draws < MAX_ID_DRAWS => continue,
            Err(e) => {
                ctx.cancel();
                return Err(e);
            }
        }
    }
}

fn cancel_job(registry: &SessionRegistry, session: SessionKey, text: &str) -> Reply {
    let Ok(id) = text.parse::<JobId>() else {
        return Reply::text(replies::INVALID_JOB_ID);
    };
    match registry.cancel_job_any(session, id) {
        Ok(kind) => {
            tracing::info!(session, job_id = %id, backend = %kind, "Job cancelled by user");
            Reply::Text(replies::job_cancelled(kind, id))
        }
        Err(GenBotError::SessionNotFound(_)) => Reply::text(replies::SESSION_NOT_ACTIVE),
        Err(_) => Reply::Text(replies::job_not_found(id)),
    }
}

fn ban(shared: &Shared, text: &str, block: bool) -> Reply {
    let username = text.trim().trim_start_matches('@');
    if username.is_empty() {
        return Reply::text(replies::INPUT_USERNAME);
    }
    let result = if block {
        shared.blocklist.ban(username)
    } else {
        shared.blocklist.unban(username)
    };
    match result {
        Ok(changed) if block => {
            tracing::info!(username, changed, "Blocklist ban");
            Reply::Text(replies::banned(username, changed))
        }
        Ok(changed) => {
            tracing::info!(username, changed, "Blocklist unban");
            Reply::Text(replies::unbanned(username, changed))
        }
        Err(e) => {
            tracing::error!(username, "Failed to update blocklist: {}", e);
            Reply::text(replies::INTERNAL_ERROR)
        }
    }
}
