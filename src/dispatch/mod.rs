// src/dispatch/mod.rs — Dispatcher: ingress pump, task queue, worker pool
//
// One pump consumes inbound messages and either answers them directly or
// enqueues a task. N workers drain the queue and run jobs against the
// backends. Everything they share lives in `Shared`.

pub mod command;
pub mod job;
pub mod pump;
pub mod queue;
pub mod replies;
pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::backend::Backends;
use crate::infra::config::Config;
use crate::security::{Blocklist, RoleBook};
use crate::session::{MessageId, SessionKey, SessionRegistry};
use crate::stats::StatsRecorder;
use crate::transport::{InboundMessage, Transport};

pub use command::Command;
pub use job::JobContext;
pub use queue::{Task, TaskQueue};

/// A reply produced by the pump or a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    File { bytes: Vec<u8>, file_name: String },
}

impl Reply {
    pub fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }
}

/// State shared by the pump and every worker.
pub struct Shared {
    pub config: Config,
    pub registry: SessionRegistry,
    pub queue: TaskQueue,
    pub backends: Backends,
    pub transport: Arc<dyn Transport>,
    pub roles: RoleBook,
    pub blocklist: Blocklist,
    pub stats: StatsRecorder,
}

impl Shared {
    pub fn new(
        config: Config,
        backends: Backends,
        transport: Arc<dyn Transport>,
        blocklist: Blocklist,
        stats: StatsRecorder,
    ) -> Self {
        let roles = RoleBook::new(&config.roles, &config.permissions);
        let queue = TaskQueue::new(config.queue.capacity);
        Self {
            config,
            registry: SessionRegistry::new(),
            queue,
            backends,
            transport,
            roles,
            blocklist,
            stats,
        }
    }

    /// Send a reply, logging transport failures.
    pub async fn deliver(&self, session: SessionKey, message_id: MessageId, reply: Reply) {
        let result = match reply {
            Reply::Text(text) => {
                self.transport
                    .reply_text(message_id, session, &text)
                    .await
            }
            Reply::File { bytes, file_name } => {
                self.transport
                    .reply_file(message_id, session, bytes, &file_name)
                    .await
            }
        };
        if let Err(e) = result {
            tracing::warn!(session, message_id, "Failed to deliver reply: {}", e);
        }
    }
}

pub struct Dispatcher {
    shared: Arc<Shared>,
}

impl Dispatcher {
    pub fn new(shared: Shared) -> Self {
        Self {
            shared: Arc::new(shared),
        }
    }

    pub fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    pub fn shared(&self) -> Arc<Shared> {
        self.shared.clone()
    }

    /// Run the pump, the workers and the stats flusher until `shutdown`
    /// fires or the inbound channel closes. On exit the queue is closed,
    /// every session is torn down and statistics are flushed.
    pub async fn run(
        &self,
        inbound: mpsc::Receiver<InboundMessage>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let workers = self.shared.config.queue.workers;
        tracing::info!(
            workers,
            capacity = self.shared.queue.capacity(),
            backends = ?self.shared.backends.available(),
            "Dispatcher starting"
        );

        let mut tasks = JoinSet::new();
        for worker_id in 0..workers {
            let shared = self.shared.clone();
            tasks.spawn(async move { worker::run(worker_id, shared).await });
        }

        let stats_shutdown = CancellationToken::new();
        let stats_handle = {
            let shared = self.shared.clone();
            let token = stats_shutdown.clone();
            let interval = Duration::from_secs(shared.config.stats.flush_interval_seconds.max(1));
            tokio::spawn(async move { shared.stats.run(interval, token).await })
        };

        pump::run(self.shared.clone(), inbound, shutdown).await;

        tracing::info!("Dispatcher stopping");
        self.shared.queue.close();
        let cancelled = self.shared.registry.shutdown();
        if cancelled > 0 {
            tracing::info!(cancelled, "Cancelled in-flight jobs");
        }

        while let Some(res) = tasks.join_next().await {
            if let Err(e) = res {
                tracing::error!("Worker task failed: {}", e);
            }
        }

        stats_shutdown.cancel();
        stats_handle.await?;
        tracing::info!("Dispatcher stopped");
        Ok(())
    }
}
