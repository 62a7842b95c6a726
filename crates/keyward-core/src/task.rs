use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tagged variant for the job queue's dispatch key, replacing the string-keyed
/// dynamic dispatch of the original (`"keygen"`, `"keygen_dkls"`, ...) with an
/// exhaustively-matched enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Keygen,
    KeygenDkls,
    Keysign,
    KeysignDkls,
    Reshare,
    ReshareDkls,
    Migrate,
    EmailVaultBackup,
}

impl TaskKind {
    /// The queue this kind is routed to.
    pub fn queue(self) -> &'static str {
        match self {
            TaskKind::EmailVaultBackup => "email",
            _ => "main",
        }
    }

    /// Default task options for this kind, per the worker orchestrator spec.
    pub fn default_options(self) -> TaskOptions {
        match self {
            TaskKind::Keygen | TaskKind::KeygenDkls => TaskOptions {
                max_retry: TaskOptions::UNBOUNDED_RETRY,
                timeout: Duration::from_secs(7 * 60),
                retention: Duration::from_secs(10 * 60),
                queue: self.queue(),
            },
            TaskKind::Reshare | TaskKind::ReshareDkls | TaskKind::Migrate => TaskOptions {
                max_retry: TaskOptions::UNBOUNDED_RETRY,
                timeout: Duration::from_secs(7 * 60),
                retention: Duration::from_secs(10 * 60),
                queue: self.queue(),
            },
            TaskKind::Keysign | TaskKind::KeysignDkls => TaskOptions {
                max_retry: TaskOptions::UNBOUNDED_RETRY,
                timeout: Duration::from_secs(2 * 60),
                retention: Duration::from_secs(5 * 60),
                queue: self.queue(),
            },
            TaskKind::EmailVaultBackup => TaskOptions {
                max_retry: 0,
                timeout: Duration::from_secs(2 * 60),
                retention: Duration::from_secs(10 * 60),
                queue: self.queue(),
            },
        }
    }
}

/// Enqueue options: retry budget, per-task timeout, result retention window
/// and target queue name.
#[derive(Debug, Clone, Copy)]
pub struct TaskOptions {
    pub max_retry: u32,
    pub timeout: Duration,
    pub retention: Duration,
    pub queue: &'static str,
}

impl TaskOptions {
    /// "Server drives retry" in the source system maps to asynq's
    /// `MaxRetry(-1)`; a finite ledger needs an actual bound, so unbounded
    /// retry is represented as a large-but-finite count instead of a sentinel.
    pub const UNBOUNDED_RETRY: u32 = u32::MAX;
}

/// The lifecycle state of a task as observed through the queue's
/// introspection API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Active,
    Completed,
    Failed,
}
