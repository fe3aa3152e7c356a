//! Subscription aggregate.

use serde::{Deserialize, Serialize};

use super::entity::TrackedEntity;

/// A delivery destination (chat) and the accounts it tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub chat_id: i64,
    /// Whether pollers should be running for this chat.
    pub active: bool,
    /// Most recent polling failure, overwritten by the next one.
    pub last_error: Option<String>,
    pub entities: Vec<TrackedEntity>,
}

impl Subscription {
    pub fn new(chat_id: i64) -> Self {
        Self {
            chat_id,
            active: false,
            last_error: None,
            entities: Vec::new(),
        }
    }

    /// Whether there is anything to poll.
    pub fn should_run(&self) -> bool {
        self.active && !self.entities.is_empty()
    }

    pub fn display_names(&self) -> Vec<String> {
        self.entities.iter().map(|e| e.display_name()).collect()
    }
}
