//! Monitoring task definitions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::domain::{EntityKey, SourceKind};

/// Work a spawned task performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorTask {
    /// Poll recent accepted submissions of one account.
    SubmissionPoll { key: EntityKey },
    /// Poll the current game of one account.
    GamePoll { key: EntityKey },
    /// Follow one reported game until it ends. `key` is the entity that
    /// first announced it.
    GameWatch { key: EntityKey, game_id: String },
}

impl MonitorTask {
    /// The recurring poll task for an entity.
    pub fn poll(key: EntityKey) -> Self {
        match key.source {
            SourceKind::LeetCode => Self::SubmissionPoll { key },
            SourceKind::Lichess => Self::GamePoll { key },
        }
    }

    pub fn key(&self) -> &EntityKey {
        match self {
            Self::SubmissionPoll { key } | Self::GamePoll { key } | Self::GameWatch { key, .. } => {
                key
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::SubmissionPoll { .. } => "submission_poll",
            Self::GamePoll { .. } => "game_poll",
            Self::GameWatch { .. } => "game_watch",
        }
    }
}

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// A handle to a spawned task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    /// Process-unique task identifier.
    pub id: u64,
    pub key: EntityKey,
    pub created_at: Instant,
    pub cancellation_token: CancellationToken,
}

impl TaskHandle {
    /// Create a handle whose token is a child of `parent_token`.
    pub fn new(key: EntityKey, parent_token: &CancellationToken) -> Self {
        Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            key,
            created_at: Instant::now(),
            cancellation_token: parent_token.child_token(),
        }
    }

    pub fn cancel(&self) {
        self.cancellation_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }
}
