//! Subscription and watermark state repository.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::{SubscriptionDbModel, TrackedEntityDbModel};
use crate::database::retry::retry_on_busy;
use crate::database::time::now_ms;
use crate::domain::{SourceKind, Subscription, TrackedEntity};

/// Durable storage for subscriptions, tracked entities and watermarks.
#[async_trait]
pub trait StateRepository: Send + Sync {
    /// Load every subscription with its tracked entities.
    async fn load_state(&self) -> Result<Vec<Subscription>>;
    async fn upsert_subscription(
        &self,
        chat_id: i64,
        active: bool,
        last_error: Option<&str>,
    ) -> Result<()>;
    async fn upsert_entity(&self, chat_id: i64, entity: &TrackedEntity) -> Result<()>;
    async fn delete_entity(&self, chat_id: i64, source: SourceKind, account: &str) -> Result<()>;
    /// Remove all persisted state.
    async fn clear_all(&self) -> Result<()>;
}

/// SQLx implementation of StateRepository.
pub struct SqlxStateRepository {
    pool: SqlitePool,
}

impl SqlxStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateRepository for SqlxStateRepository {
    async fn load_state(&self) -> Result<Vec<Subscription>> {
        let subscriptions = sqlx::query_as::<_, SubscriptionDbModel>(
            "SELECT * FROM subscriptions ORDER BY chat_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let entities = sqlx::query_as::<_, TrackedEntityDbModel>(
            "SELECT * FROM tracked_entities ORDER BY chat_id, created_at, account",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut by_chat: BTreeMap<i64, Subscription> = subscriptions
            .into_iter()
            .map(|s| {
                (
                    s.chat_id,
                    Subscription {
                        chat_id: s.chat_id,
                        active: s.active,
                        last_error: s.last_error,
                        entities: Vec::new(),
                    },
                )
            })
            .collect();

        for row in entities {
            let Some(entity) = row.to_domain() else {
                tracing::warn!(
                    "Skipping tracked entity {} with unknown source '{}'",
                    row.account,
                    row.source
                );
                continue;
            };
            by_chat
                .entry(row.chat_id)
                .or_insert_with(|| Subscription::new(row.chat_id))
                .entities
                .push(entity);
        }

        Ok(by_chat.into_values().collect())
    }

    async fn upsert_subscription(
        &self,
        chat_id: i64,
        active: bool,
        last_error: Option<&str>,
    ) -> Result<()> {
        retry_on_busy("upsert_subscription", || async {
            let now = now_ms();
            sqlx::query(
                r#"
                INSERT INTO subscriptions (chat_id, active, last_error, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(chat_id) DO UPDATE SET
                    active = excluded.active,
                    last_error = excluded.last_error,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(chat_id)
            .bind(active)
            .bind(last_error)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn upsert_entity(&self, chat_id: i64, entity: &TrackedEntity) -> Result<()> {
        retry_on_busy("upsert_entity", || async {
            let model = TrackedEntityDbModel::from_domain(chat_id, entity, now_ms());
            let mut tx = self.pool.begin().await?;

            // The parent row may not exist yet when entities are added before `start`.
            sqlx::query(
                "INSERT OR IGNORE INTO subscriptions (chat_id, active, created_at, updated_at) VALUES (?, FALSE, ?, ?)",
            )
            .bind(chat_id)
            .bind(model.created_at)
            .bind(model.updated_at)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO tracked_entities
                    (chat_id, source, account, watermark, not_found_notified, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(chat_id, source, account) DO UPDATE SET
                    watermark = excluded.watermark,
                    not_found_notified = excluded.not_found_notified,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(model.chat_id)
            .bind(&model.source)
            .bind(&model.account)
            .bind(&model.watermark)
            .bind(model.not_found_notified)
            .bind(model.created_at)
            .bind(model.updated_at)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        })
        .await
    }

    async fn delete_entity(&self, chat_id: i64, source: SourceKind, account: &str) -> Result<()> {
        retry_on_busy("delete_entity", || async {
            sqlx::query(
                "DELETE FROM tracked_entities WHERE chat_id = ? AND source = ? AND account = ?",
            )
            .bind(chat_id)
            .bind(source.as_str())
            .bind(account)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    async fn clear_all(&self) -> Result<()> {
        retry_on_busy("clear_all", || async {
            let mut tx = self.pool.begin().await?;
            sqlx::query("DELETE FROM tracked_entities")
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM subscriptions")
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;
            Ok(())
        })
        .await
    }
}
