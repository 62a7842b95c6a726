//! Typed task queue modeled on the source system's `asynq` usage: a task
//! carries a [`TaskKind`], is routed to `main` or `email`, and is retried
//! per [`TaskOptions`] until it completes, is permanently failed, or a
//! handler emits [`Outcome::SkipRetry`].

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use keyward_core::task::{TaskKind, TaskOptions, TaskState};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no such task: {0}")]
    NotFound(Uuid),
    #[error("queue backend error: {0}")]
    Backend(String),
}

/// What a task handler reports back to the queue after running.
pub enum Outcome {
    /// The task finished; `result` is the JSON (or otherwise serialized)
    /// payload future readers of the task's result expect.
    Complete(Vec<u8>),
    /// The task failed but may be retried, subject to `max_retry`.
    Fail(String),
    /// The task failed and must never be retried regardless of budget
    /// (e.g. a permanent 4xx from the email gateway).
    SkipRetry(String),
}

#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub id: Uuid,
    pub kind: TaskKind,
    pub payload: Vec<u8>,
    pub options: TaskOptions,
    pub attempts: u32,
}

struct TaskRecord {
    state: TaskState,
    result: Option<Vec<u8>>,
    last_error: Option<String>,
}

/// The queue contract: enqueue a typed task, pull the next one off a named
/// queue, and report its outcome.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn enqueue(&self, kind: TaskKind, payload: Vec<u8>) -> Result<Uuid, QueueError>;

    /// Pop the next pending task for `queue_name` (`"main"` or `"email"`),
    /// if any, marking it active.
    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueuedTask>, QueueError>;

    async fn report(&self, id: Uuid, outcome: Outcome) -> Result<(), QueueError>;

    async fn state(&self, id: Uuid) -> Result<Option<TaskState>, QueueError>;

    async fn result(&self, id: Uuid) -> Result<Option<Vec<u8>>, QueueError>;
}

/// An in-process queue backed by per-queue-name FIFOs. Used by the worker
/// and API binaries when no external broker is configured, and by tests
/// for both.
#[derive(Default)]
pub struct InMemoryQueue {
    queues: Mutex<HashMap<&'static str, VecDeque<QueuedTask>>>,
    records: Mutex<HashMap<Uuid, TaskRecord>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskQueue for InMemoryQueue {
    async fn enqueue(&self, kind: TaskKind, payload: Vec<u8>) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        let options = kind.default_options();
        let task = QueuedTask {
            id,
            kind,
            payload,
            options,
            attempts: 0,
        };

        self.queues
            .lock()
            .await
            .entry(options.queue)
            .or_default()
            .push_back(task);

        self.records.lock().await.insert(
            id,
            TaskRecord {
                state: TaskState::Pending,
                result: None,
                last_error: None,
            },
        );

        tracing::debug!(task_id = %id, kind = ?kind, queue = options.queue, "task enqueued");
        Ok(id)
    }

    async fn dequeue(&self, queue_name: &str) -> Result<Option<QueuedTask>, QueueError> {
        let mut queues = self.queues.lock().await;
        let Some(queue) = queues.get_mut(queue_name) else {
            return Ok(None);
        };
        let Some(mut task) = queue.pop_front() else {
            return Ok(None);
        };
        task.attempts += 1;

        if let Some(record) = self.records.lock().await.get_mut(&task.id) {
            record.state = TaskState::Active;
        }
        Ok(Some(task))
    }

    async fn report(&self, id: Uuid, outcome: Outcome) -> Result<(), QueueError> {
        match outcome {
            Outcome::Complete(result) => {
                let mut records = self.records.lock().await;
                let record = records.get_mut(&id).ok_or(QueueError::NotFound(id))?;
                record.state = TaskState::Completed;
                record.result = Some(result);
                record.last_error = None;
            }
            Outcome::SkipRetry(error) => {
                let mut records = self.records.lock().await;
                let record = records.get_mut(&id).ok_or(QueueError::NotFound(id))?;
                record.state = TaskState::Failed;
                record.last_error = Some(error);
            }
            Outcome::Fail(error) => {
                let mut records = self.records.lock().await;
                let record = records.get_mut(&id).ok_or(QueueError::NotFound(id))?;
                record.state = TaskState::Failed;
                record.last_error = Some(error);
            }
        }
        Ok(())
    }

    async fn state(&self, id: Uuid) -> Result<Option<TaskState>, QueueError> {
        Ok(self.records.lock().await.get(&id).map(|r| r.state))
    }

    async fn result(&self, id: Uuid) -> Result<Option<Vec<u8>>, QueueError> {
        Ok(self
            .records
            .lock()
            .await
            .get(&id)
            .and_then(|r| r.result.clone()))
    }
}

/// Requeue a task for another attempt, respecting `max_retry`. Returns
/// `true` if the task was requeued, `false` if its retry budget is spent
/// and it was instead marked permanently failed.
///
/// This is deliberately a free function over [`TaskQueue`] rather than a
/// trait method: retry policy is the same for every backend, so it's
/// implemented once against the public enqueue/dequeue/report surface
/// instead of duplicated per backend.
pub async fn retry_or_fail(
    queue: &InMemoryQueue,
    task: &QueuedTask,
    error: String,
) -> Result<bool, QueueError> {
    if task.attempts > task.options.max_retry {
        queue.report(task.id, Outcome::Fail(error)).await?;
        return Ok(false);
    }

    let mut queues = queue.queues.lock().await;
    queues
        .entry(task.options.queue)
        .or_default()
        .push_back(task.clone());
    drop(queues);

    if let Some(record) = queue.records.lock().await.get_mut(&task.id) {
        record.state = TaskState::Pending;
        record.last_error = Some(error);
    }
    Ok(true)
}
