// src/dispatch/queue.rs — Bounded task queue with non-blocking admission

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::infra::errors::{GenBotError, Result};
use crate::session::{MessageId, SessionKey};

/// A unit of work: one free-text message sent while a task mode was active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub session: SessionKey,
    pub message_id: MessageId,
    pub text: String,
}

/// Multi-producer, multi-consumer bounded queue.
///
/// Producers never wait: a full queue refuses the task. Workers share the
/// receiver behind an async mutex and wait in `dequeue`.
pub struct TaskQueue {
    tx: mpsc::Sender<Task>,
    rx: Mutex<mpsc::Receiver<Task>>,
    closed: CancellationToken,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
            closed: CancellationToken::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Pending tasks.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    pub fn try_enqueue(&self, task: Task) -> Result<()> {
        if self.is_closed() {
            return Err(GenBotError::QueueClosed);
        }
        self.tx.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => GenBotError::Overloaded,
            mpsc::error::TrySendError::Closed(_) => GenBotError::QueueClosed,
        })
    }

    /// Wait for the next task. `None` once the queue is closed.
    pub async fn dequeue(&self) -> Option<Task> {
        tokio::select! {
            biased;
            _ = self.closed.cancelled() => None,
            task = async { self.rx.lock().await.recv().await } => task,
        }
    }

    /// Stop handing out tasks and wake every waiting worker. Tasks still
    /// buffered are dropped.
    pub fn close(&self) {
        self.closed.cancel();
    }
}
