//! Source traits consumed by the polling engine.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::leetcode::{QuestionDetail, Snapshot};
use crate::lichess::ActivityResult;

/// A site that publishes a feed of accepted submissions per account.
#[async_trait]
pub trait SubmissionSource: Send + Sync {
    /// Fetch the most recent accepted submissions of `account`, newest first.
    async fn fetch_recent_items(&self, account: &str) -> Result<Snapshot, SourceError>;

    /// Fetch enrichment metadata (difficulty, acceptance) for one problem.
    async fn fetch_item_detail(&self, title_slug: &str) -> Result<QuestionDetail, SourceError>;
}

/// A site that reports which game an account is currently playing.
#[async_trait]
pub trait GameSource: Send + Sync {
    /// Bulk status lookup.
    ///
    /// Every account present in the response maps to its current game id
    /// (`None` when not playing). Accounts missing from the map were not
    /// found on the site.
    async fn fetch_entity_status(
        &self,
        accounts: &[String],
    ) -> Result<HashMap<String, Option<String>>, SourceError>;

    /// Fetch the current state of one game.
    async fn fetch_activity_detail(&self, game_id: &str) -> Result<ActivityResult, SourceError>;
}
