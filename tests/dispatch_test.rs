// tests/dispatch_test.rs — Integration tests for the ingress pump and workers

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use genbot::backend::{Backends, GeneratedImage, GenerationBackend};
use genbot::dispatch::job::JobContext;
use genbot::dispatch::{pump, replies, worker, Command, Dispatcher, Reply, Shared, Task};
use genbot::infra::config::Config;
use genbot::infra::errors::Result;
use genbot::security::Blocklist;
use genbot::session::{BackendKind, MessageId, SessionKey};
use genbot::stats::StatsRecorder;
use genbot::transport::{split_command, InboundMessage, Transport};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// ---------- Mock adapters for testing ----------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Sent {
    Text(String),
    File(String),
}

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(SessionKey, MessageId, Sent)>>,
}

impl RecordingTransport {
    fn sent_to(&self, session: SessionKey) -> Vec<Sent> {
        self.sent
            .lock()
            .iter()
            .filter(|(s, _, _)| *s == session)
            .map(|(_, _, m)| m.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn reply_text(
        &self,
        message_id: MessageId,
        session: SessionKey,
        text: &str,
    ) -> anyhow::Result<()> {
        self.sent
            .lock()
            .push((session, message_id, Sent::Text(text.to_string())));
        Ok(())
    }

    async fn reply_file(
        &self,
        message_id: MessageId,
        session: SessionKey,
        _bytes: Vec<u8>,
        file_name: &str,
    ) -> anyhow::Result<()> {
        self.sent
            .lock()
            .push((session, message_id, Sent::File(file_name.to_string())));
        Ok(())
    }
}

/// Returns a fixed image immediately.
struct InstantImage;

#[async_trait]
impl GenerationBackend for InstantImage {
    fn id(&self) -> &str {
        "instant"
    }

    async fn generate_image(&self, _ctx: &JobContext, prompt: &str) -> Result<GeneratedImage> {
        Ok(GeneratedImage {
            bytes: prompt.as_bytes().to_vec(),
            file_name: "fox.png".into(),
        })
    }
}

/// Echoes the prompt back as text.
struct EchoText;

#[async_trait]
impl GenerationBackend for EchoText {
    fn id(&self) -> &str {
        "echo"
    }

    async fn generate_text(&self, _ctx: &JobContext, prompt: &str) -> Result<Vec<u8>> {
        Ok(format!("echo: {prompt}").into_bytes())
    }
}

/// Never finishes on its own; ends only when the job is done.
struct Stalled;

#[async_trait]
impl GenerationBackend for Stalled {
    fn id(&self) -> &str {
        "stalled"
    }

    async fn generate_image(&self, ctx: &JobContext, _prompt: &str) -> Result<GeneratedImage> {
        Err(ctx.done().await)
    }
}

struct Exploding;

#[async_trait]
impl GenerationBackend for Exploding {
    fn id(&self) -> &str {
        "exploding"
    }

    async fn generate_image(&self, _ctx: &JobContext, _prompt: &str) -> Result<GeneratedImage> {
        panic!("backend exploded");
    }
}

// ---------- Helpers ----------

struct Harness {
    shared: Arc<Shared>,
    transport: Arc<RecordingTransport>,
    _dir: TempDir,
}

fn harness_with(config: Config, backends: Backends) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let transport = Arc::new(RecordingTransport::default());
    let blocklist = Blocklist::load(&dir.path().join("blocklist.txt")).unwrap();
    let stats = StatsRecorder::new(&dir.path().join("stats.csv"), 0);
    let shared = Shared::new(config, backends, transport.clone(), blocklist, stats);
    Harness {
        shared: Arc::new(shared),
        transport,
        _dir: dir,
    }
}

fn harness(backends: Backends) -> Harness {
    let mut config = Config::default();
    config.roles.admin = vec!["root".into()];
    harness_with(config, backends)
}

fn default_backends() -> Backends {
    Backends::default()
        .with(BackendKind::ChatGpt, Arc::new(EchoText))
        .with(BackendKind::DreamBooth, Arc::new(InstantImage))
        .with(BackendKind::FusionBrain, Arc::new(Stalled))
}

fn msg(session: SessionKey, sender: &str, text: &str) -> InboundMessage {
    let (command, rest) = split_command(text);
    InboundMessage {
        session,
        message_id: 1,
        text: rest,
        command,
        sender: sender.into(),
    }
}

fn send(h: &Harness, session: SessionKey, sender: &str, text: &str) -> Option<Reply> {
    pump::handle_message(&h.shared, &msg(session, sender, text))
}

fn text(s: &str) -> Option<Reply> {
    Some(Reply::text(s))
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

// ---------- Pump ----------

#[test]
fn test_session_start_and_stop() {
    let h = harness(default_backends());
    assert_eq!(send(&h, 1, "alice", "/start"), text(replies::SESSION_CREATED));
    assert_eq!(send(&h, 1, "alice", "/start"), text(replies::SESSION_ALREADY_ACTIVE));
    assert_eq!(send(&h, 1, "alice", "/stop"), text(replies::SESSION_STOPPED));
    assert_eq!(send(&h, 1, "alice", "/stop"), text(replies::SESSION_NOT_ACTIVE));
}

#[test]
fn test_text_requires_session_and_mode() {
    let h = harness(default_backends());
    assert_eq!(send(&h, 1, "alice", "hello"), text(replies::SESSION_NOT_ACTIVE));
    send(&h, 1, "alice", "/start");
    assert_eq!(send(&h, 1, "alice", "hello"), text(replies::NO_GENERATOR_SELECTED));
    assert_eq!(send(&h, 1, "alice", "   "), None);
}

#[test]
fn test_unknown_command() {
    let h = harness(default_backends());
    assert_eq!(send(&h, 1, "alice", "/teleport"), text(replies::UNKNOWN_COMMAND));
}

#[test]
fn test_admin_commands_need_admin_role() {
    let h = harness(default_backends());
    assert_eq!(send(&h, 1, "alice", "/blacklist"), text(replies::ACCESS_DENIED));
    assert_eq!(send(&h, 2, "root", "/blacklist"), text(replies::BLOCKLIST_EMPTY));
}

#[test]
fn test_unconfigured_backend_is_refused() {
    let h = harness(default_backends());
    send(&h, 1, "root", "/start");
    assert_eq!(
        send(&h, 1, "root", "/openAIImage"),
        text(replies::BACKEND_UNAVAILABLE)
    );
}

#[test]
fn test_generation_text_is_queued() {
    let h = harness(default_backends());
    send(&h, 1, "alice", "/start");
    assert_eq!(
        send(&h, 1, "alice", "/dreamBooth"),
        Some(Reply::Text(replies::mode_selected(Command::DreamBooth)))
    );
    assert_eq!(send(&h, 1, "alice", "a red fox"), text(replies::ADDED_TO_QUEUE));
    assert_eq!(h.shared.queue.len(), 1);
}

#[test]
fn test_full_queue_reports_overload() {
    let mut config = Config::default();
    config.queue.capacity = 1;
    config.limits.chatgpt = 5;
    let h = harness_with(config, default_backends());
    send(&h, 1, "alice", "/start");
    send(&h, 1, "alice", "/chatGPT");
    assert_eq!(send(&h, 1, "alice", "first"), text(replies::ADDED_TO_QUEUE));
    assert_eq!(send(&h, 1, "alice", "second"), text(replies::OVERLOADED));
    assert_eq!(h.shared.queue.len(), 1);
}

#[tokio::test]
async fn test_blocked_sender_is_ignored_after_ban() {
    let h = harness(default_backends());
    send(&h, 1, "root", "/start");
    send(&h, 1, "root", "/ban");
    let task = Task {
        session: 1,
        message_id: 2,
        text: "@mallory".into(),
    };
    assert_eq!(
        worker::process_task(&h.shared, &task).await,
        Reply::Text(replies::banned("mallory", true))
    );
    assert_eq!(send(&h, 5, "mallory", "/start"), text(replies::ACCESS_DENIED));
    assert!(!h.shared.registry.contains(5));
}

// ---------- Workers ----------

#[tokio::test]
async fn test_text_job_replies_and_records_stats() {
    let h = harness(default_backends());
    send(&h, 1, "alice", "/start");
    send(&h, 1, "alice", "/chatGPT");
    let task = Task {
        session: 1,
        message_id: 3,
        text: "hi".into(),
    };
    assert_eq!(
        worker::process_task(&h.shared, &task).await,
        Reply::text("echo: hi")
    );
    assert_eq!(h.shared.stats.pending(), 1);
    assert_eq!(
        h.shared.registry.count_jobs(1, BackendKind::ChatGpt).unwrap(),
        0
    );
}

#[tokio::test]
async fn test_job_limit_then_cancel_by_number() {
    let h = harness(default_backends());
    send(&h, 1, "alice", "/start");
    send(&h, 1, "alice", "/fusionBrain");

    let running = {
        let shared = h.shared.clone();
        tokio::spawn(async move {
            let task = Task {
                session: 1,
                message_id: 4,
                text: "a castle".into(),
            };
            worker::process_task(&shared, &task).await
        })
    };

    let registry = &h.shared.registry;
    wait_until(|| registry.count_jobs(1, BackendKind::FusionBrain).unwrap() == 1).await;
    assert_eq!(send(&h, 1, "alice", "another castle"), text(replies::JOB_LIMIT));

    let id = registry.list_job_ids(1, BackendKind::FusionBrain).unwrap()[0];
    send(&h, 1, "alice", "/cancelJob");
    let cancel = Task {
        session: 1,
        message_id: 5,
        text: id.to_string(),
    };
    assert_eq!(
        worker::process_task(&h.shared, &cancel).await,
        Reply::Text(replies::job_cancelled(BackendKind::FusionBrain, id))
    );

    assert_eq!(running.await.unwrap(), Reply::text(replies::JOB_CANCELED));
    assert_eq!(registry.count_jobs(1, BackendKind::FusionBrain).unwrap(), 0);
}

#[tokio::test]
async fn test_stop_cancels_running_job() {
    let h = harness(default_backends());
    send(&h, 1, "alice", "/start");
    send(&h, 1, "alice", "/fusionBrain");

    let running = {
        let shared = h.shared.clone();
        tokio::spawn(async move {
            let task = Task {
                session: 1,
                message_id: 6,
                text: "a castle".into(),
            };
            worker::process_task(&shared, &task).await
        })
    };

    let registry = &h.shared.registry;
    wait_until(|| registry.count_jobs(1, BackendKind::FusionBrain).unwrap() == 1).await;
    assert_eq!(send(&h, 1, "alice", "/stop"), text(replies::SESSION_STOPPED));
    assert_eq!(running.await.unwrap(), Reply::text(replies::JOB_CANCELED));
}

#[tokio::test]
async fn test_task_for_vanished_session() {
    let h = harness(default_backends());
    let task = Task {
        session: 42,
        message_id: 1,
        text: "orphan".into(),
    };
    assert_eq!(
        worker::process_task(&h.shared, &task).await,
        Reply::text(replies::SESSION_NOT_ACTIVE)
    );
}

// ---------- End to end ----------

async fn start_dispatcher(
    h: &Harness,
) -> (
    mpsc::Sender<InboundMessage>,
    CancellationToken,
    tokio::task::JoinHandle<anyhow::Result<()>>,
) {
    let (tx, rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();
    let dispatcher = Dispatcher::from_shared(h.shared.clone());
    let handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { dispatcher.run(rx, shutdown).await })
    };
    (tx, shutdown, handle)
}

#[tokio::test]
async fn test_image_request_end_to_end() {
    let h = harness(default_backends());
    let (tx, shutdown, handle) = start_dispatcher(&h).await;

    for line in ["/start", "/dreamBooth", "a red fox"] {
        tx.send(msg(1, "alice", line)).await.unwrap();
    }

    let transport = h.transport.clone();
    wait_until(|| transport.sent_to(1).contains(&Sent::File("fox.png".into()))).await;

    let sent = h.transport.sent_to(1);
    assert_eq!(sent[0], Sent::Text(replies::SESSION_CREATED.into()));
    assert!(sent.contains(&Sent::Text(replies::ADDED_TO_QUEUE.into())));
    assert!(h
        .shared
        .registry
        .list_job_ids(1, BackendKind::DreamBooth)
        .unwrap()
        .is_empty());

    shutdown.cancel();
    handle.await.unwrap().unwrap();
    assert!(h.shared.registry.is_empty());
    assert!(h.shared.queue.is_closed());
}

#[tokio::test]
async fn test_panicking_backend_does_not_stop_worker() {
    let mut config = Config::default();
    config.queue.workers = 1;
    let backends = Backends::default()
        .with(BackendKind::DreamBooth, Arc::new(InstantImage))
        .with(BackendKind::FusionBrain, Arc::new(Exploding));
    let h = harness_with(config, backends);
    let (tx, shutdown, handle) = start_dispatcher(&h).await;

    for line in ["/start", "/fusionBrain", "boom"] {
        tx.send(msg(1, "alice", line)).await.unwrap();
    }
    let transport = h.transport.clone();
    wait_until(|| {
        transport
            .sent_to(1)
            .contains(&Sent::Text(replies::INTERNAL_ERROR.into()))
    })
    .await;
    assert_eq!(
        h.shared.registry.count_jobs(1, BackendKind::FusionBrain).unwrap(),
        0
    );

    for line in ["/dreamBooth", "a red fox"] {
        tx.send(msg(1, "alice", line)).await.unwrap();
    }
    wait_until(|| transport.sent_to(1).contains(&Sent::File("fox.png".into()))).await;

    shutdown.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_jobs() {
    let h = harness(default_backends());
    let (tx, shutdown, handle) = start_dispatcher(&h).await;

    for line in ["/start", "/fusionBrain", "a castle"] {
        tx.send(msg(1, "alice", line)).await.unwrap();
    }
    let registry = &h.shared.registry;
    wait_until(|| {
        registry
            .count_jobs(1, BackendKind::FusionBrain)
            .is_ok_and(|n| n == 1)
    })
    .await;

    shutdown.cancel();
    handle.await.unwrap().unwrap();
    assert!(registry.is_empty());
    assert!(h
        .transport
        .sent_to(1)
        .contains(&Sent::Text(replies::JOB_CANCELED.into())));
}
