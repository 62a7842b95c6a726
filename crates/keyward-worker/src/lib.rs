//! The task-queue orchestrator: pulls tasks off `main`/`email`, runs the
//! matching handler, and reports the outcome back to the queue.
//!
//! Mirrors the source system's `asynq` mux: one handler per [`TaskKind`],
//! each wrapping unrecoverable conditions as [`Outcome::SkipRetry`] rather
//! than letting the queue burn through a retry budget on a payload that
//! will never succeed.

mod email;
mod handlers;

use std::sync::Arc;

use keyward_blobstore::BlobStore;
use keyward_cache::Cache;
use keyward_core::{Config, Metrics};
use keyward_queue::{Outcome, TaskQueue};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("task cancelled")]
    Cancelled,
    #[error("malformed task payload: {0}")]
    BadPayload(#[from] serde_json::Error),
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error(transparent)]
    Blob(#[from] keyward_blobstore::BlobStoreError),
    #[error(transparent)]
    Codec(#[from] keyward_vault::VaultCodecError),
    #[error(transparent)]
    State(#[from] keyward_state::StateError),
    #[error(transparent)]
    Mpc(#[from] keyward_mpc::MpcError),
    #[error(transparent)]
    Cache(#[from] keyward_cache::CacheError),
    #[error(transparent)]
    Queue(#[from] keyward_queue::QueueError),
    #[error("email gateway returned {0}")]
    EmailGateway(reqwest::StatusCode),
    #[error(transparent)]
    Request(#[from] reqwest::Error),
}

impl WorkerError {
    /// Every condition this worker can hit is either a malformed payload, a
    /// missing/wrong-typed vault, or an unrecoverable upstream 4xx/5xx — none
    /// of which change on retry. The queue's own timeout/requeue policy
    /// covers transient network hiccups inside `reqwest`/`Relay`, so every
    /// `WorkerError` that reaches a handler boundary is permanent.
    fn is_permanent(&self) -> bool {
        true
    }
}

/// Shared dependencies every task handler needs, grouped so the dispatch
/// loop can clone one handle per spawned task.
#[derive(Clone)]
pub struct Worker {
    pub config: Arc<Config>,
    pub cache: Arc<dyn Cache>,
    pub blob_store: Arc<BlobStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub rng: Arc<dyn keyward_core::RngSource>,
    pub metrics: Arc<dyn Metrics>,
    pub http: reqwest::Client,
}

impl Worker {
    pub fn new(
        config: Config,
        cache: Arc<dyn Cache>,
        blob_store: BlobStore,
        queue: Arc<dyn TaskQueue>,
        rng: Arc<dyn keyward_core::RngSource>,
        metrics: Arc<dyn Metrics>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            cache,
            blob_store: Arc::new(blob_store),
            queue,
            rng,
            metrics,
            http: reqwest::Client::new(),
        }
    }

    /// Run `worker_concurrency` task loops until `shutdown` fires. Each loop
    /// round-robins the two queues so an idle `email` queue never starves
    /// behind a busy `main` queue (or vice versa).
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let concurrency = self.config.server.worker_concurrency;
        let mut loops = Vec::with_capacity(concurrency);
        for id in 0..concurrency {
            let worker = self.clone();
            let shutdown = shutdown.clone();
            loops.push(tokio::spawn(async move { worker.loop_forever(id, shutdown).await }));
        }
        for handle in loops {
            let _ = handle.await;
        }
    }

    async fn loop_forever(&self, loop_id: usize, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                tracing::info!(loop_id, "worker loop shutting down");
                return;
            }

            let mut ran_something = false;
            for queue_name in ["main", "email"] {
                if shutdown.is_cancelled() {
                    return;
                }
                match self.queue.dequeue(queue_name).await {
                    Ok(Some(task)) => {
                        ran_something = true;
                        self.run_one(task, shutdown.clone()).await;
                    }
                    Ok(None) => {}
                    Err(err) => tracing::error!(%err, queue_name, "dequeue failed"),
                }
            }

            if !ran_something {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            }
        }
    }

    async fn run_one(&self, task: keyward_queue::QueuedTask, shutdown: CancellationToken) {
        let kind = task.kind;
        let id = task.id;
        let outcome = handlers::dispatch(self, &task, shutdown).await;
        let outcome = match outcome {
            Ok(result) => Outcome::Complete(result),
            Err(err) if matches!(err, WorkerError::Cancelled) => {
                tracing::warn!(task_id = %id, kind = ?kind, "task cancelled, will retry");
                Outcome::Fail(err.to_string())
            }
            Err(err) if err.is_permanent() => {
                tracing::error!(task_id = %id, kind = ?kind, error = %err, "task permanently failed");
                Outcome::SkipRetry(err.to_string())
            }
            Err(err) => Outcome::Fail(err.to_string()),
        };

        if let Err(err) = self.queue.report(id, outcome).await {
            tracing::error!(task_id = %id, %err, "failed to report task outcome");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keyward_cache::InMemoryCache;
    use keyward_core::requests::VaultCreateRequest;
    use keyward_core::rng::OsRngSource;
    use keyward_core::{LibType, NoopMetrics, TaskKind};
    use keyward_queue::InMemoryQueue;
    use tempfile::tempdir;

    fn test_worker() -> (Arc<Worker>, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = Config {
            relay: keyward_core::config::RelayConfig {
                server: "https://relay.example".into(),
                verification_server: None,
            },
            cache: keyward_core::config::CacheConfig::default(),
            blob_store: keyward_core::config::BlobStoreConfig {
                vaults_file_path: dir.path().to_string_lossy().into_owned(),
            },
            email: keyward_core::config::EmailConfig {
                api_key: "test-key".into(),
                sending_domain: "keyward.example".into(),
                template_name: "fastvault".into(),
                gateway_url: "https://gateway.example/send".into(),
            },
            server: keyward_core::config::ServerConfig::default(),
        };
        let blob_store = BlobStore::open(dir.path()).unwrap();
        let worker = Worker::new(
            config,
            Arc::new(InMemoryCache::new()),
            blob_store,
            Arc::new(InMemoryQueue::new()),
            Arc::new(OsRngSource),
            Arc::new(NoopMetrics),
        );
        (Arc::new(worker), dir)
    }

    #[tokio::test]
    async fn keygen_task_produces_vault_and_schedules_email() {
        let (worker, _dir) = test_worker();
        let payload = serde_json::to_vec(&VaultCreateRequest {
            name: "my vault".into(),
            session_id: "550e8400-e29b-41d4-a716-446655440000".into(),
            hex_encryption_key: "ab".repeat(32),
            hex_chain_code: "cd".repeat(32),
            local_party_id: "party-1".into(),
            encryption_password: "correct horse".into(),
            email: "user@example.com".into(),
            lib_type: LibType::Gg20,
        })
        .unwrap();

        let id = worker.queue.enqueue(TaskKind::Keygen, payload).await.unwrap();
        let task = worker.queue.dequeue("main").await.unwrap().unwrap();
        worker.run_one(task, CancellationToken::new()).await;

        let result = worker.queue.result(id).await.unwrap().unwrap();
        let parsed: keyward_core::requests::KeyGenerationTaskResult =
            serde_json::from_slice(&result).unwrap();
        assert_eq!(parsed.ecdsa_public_key.len(), 66);

        assert!(worker.queue.dequeue("email").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn malformed_payload_is_skip_retried() {
        let (worker, _dir) = test_worker();
        worker
            .queue
            .enqueue(TaskKind::Keygen, b"not json".to_vec())
            .await
            .unwrap();
        let task = worker.queue.dequeue("main").await.unwrap().unwrap();
        let id = task.id;
        worker.run_one(task, CancellationToken::new()).await;
        assert_eq!(
            worker.queue.state(id).await.unwrap(),
            Some(keyward_core::task::TaskState::Failed)
        );
    }
}
