//! Database models.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::{SourceKind, TrackedEntity};

/// Subscription database model. One row per chat.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubscriptionDbModel {
    pub chat_id: i64,
    pub active: bool,
    /// Last recorded polling error
    pub last_error: Option<String>,
    /// Unix epoch milliseconds (UTC) when created.
    pub created_at: i64,
    /// Unix epoch milliseconds (UTC) when last updated.
    pub updated_at: i64,
}

/// Tracked entity database model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TrackedEntityDbModel {
    pub chat_id: i64,
    /// `leetcode` or `lichess`
    pub source: String,
    pub account: String,
    pub watermark: Option<String>,
    pub not_found_notified: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TrackedEntityDbModel {
    pub fn from_domain(chat_id: i64, entity: &TrackedEntity, now: i64) -> Self {
        Self {
            chat_id,
            source: entity.source.as_str().to_string(),
            account: entity.account.clone(),
            watermark: entity.watermark.clone(),
            not_found_notified: entity.not_found_notified,
            created_at: now,
            updated_at: now,
        }
    }

    /// Convert to the domain type; rows with an unknown source are skipped by callers.
    pub fn to_domain(&self) -> Option<TrackedEntity> {
        let source = SourceKind::parse(&self.source)?;
        Some(TrackedEntity {
            source,
            account: self.account.clone(),
            watermark: self.watermark.clone(),
            not_found_notified: self.not_found_notified,
        })
    }
}
