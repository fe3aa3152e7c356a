//! Watermark store.
//!
//! Holds every subscription, its tracked entities and their watermarks in
//! memory, with best-effort write-through persistence to the
//! [`StateRepository`]. Each entity sits behind its own async mutex so that
//! a watermark advance and a concurrent removal of the same entity are
//! serialized, while unrelated entities never contend.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::Result;
use crate::database::repositories::StateRepository;
use crate::domain::{EntityKey, SourceKind, Subscription, TrackedEntity};

/// Per-entity state guarded by the entity mutex.
#[derive(Debug)]
struct EntityRecord {
    entity: TrackedEntity,
    /// Set once the entity is removed; late writers must not resurrect it.
    removed: bool,
}

#[derive(Debug, Clone, Default)]
struct SubscriptionRecord {
    active: bool,
    last_error: Option<String>,
    /// Insertion order of tracked entities.
    entities: Vec<EntityKey>,
}

/// Outcome of a compare-and-set watermark advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// The watermark now holds the new value.
    Applied,
    /// The stored watermark no longer matched the expected value.
    Conflict,
    /// The entity is not tracked (anymore).
    Missing,
}

/// In-memory watermark and subscription state with write-through persistence.
pub struct WatermarkStore {
    subscriptions: DashMap<i64, SubscriptionRecord>,
    entities: DashMap<EntityKey, Arc<Mutex<EntityRecord>>>,
    repo: Arc<dyn StateRepository>,
}

impl WatermarkStore {
    pub fn new(repo: Arc<dyn StateRepository>) -> Self {
        Self {
            subscriptions: DashMap::new(),
            entities: DashMap::new(),
            repo,
        }
    }

    /// Load persisted state into memory. Returns the number of subscriptions.
    pub async fn hydrate(&self) -> Result<usize> {
        info!("Hydrating subscriptions from database");

        let subscriptions = self.repo.load_state().await?;
        let count = subscriptions.len();

        for sub in subscriptions {
            let mut record = SubscriptionRecord {
                active: sub.active,
                last_error: sub.last_error,
                entities: Vec::with_capacity(sub.entities.len()),
            };
            for entity in sub.entities {
                let key = entity.key(sub.chat_id);
                record.entities.push(key.clone());
                self.entities.insert(
                    key,
                    Arc::new(Mutex::new(EntityRecord {
                        entity,
                        removed: false,
                    })),
                );
            }
            self.subscriptions.insert(sub.chat_id, record);
        }

        info!("Hydrated {} subscriptions", count);
        Ok(count)
    }

    // ========== Queries ==========

    /// Snapshot of one subscription with its entities in insertion order.
    pub async fn subscription(&self, chat_id: i64) -> Option<Subscription> {
        let record = self.subscriptions.get(&chat_id)?.value().clone();

        let mut entities = Vec::with_capacity(record.entities.len());
        for key in &record.entities {
            if let Some(entity) = self.entity(key).await {
                entities.push(entity);
            }
        }

        Some(Subscription {
            chat_id,
            active: record.active,
            last_error: record.last_error,
            entities,
        })
    }

    /// Snapshot of every subscription, ordered by chat id.
    pub async fn subscriptions(&self) -> Vec<Subscription> {
        let mut chat_ids: Vec<i64> = self.subscriptions.iter().map(|e| *e.key()).collect();
        chat_ids.sort_unstable();

        let mut out = Vec::with_capacity(chat_ids.len());
        for chat_id in chat_ids {
            if let Some(sub) = self.subscription(chat_id).await {
                out.push(sub);
            }
        }
        out
    }

    pub async fn entity(&self, key: &EntityKey) -> Option<TrackedEntity> {
        let cell = self.cell(key)?;
        let record = cell.lock().await;
        (!record.removed).then(|| record.entity.clone())
    }

    pub async fn watermark(&self, key: &EntityKey) -> Option<String> {
        self.entity(key).await.and_then(|e| e.watermark)
    }

    pub fn is_active(&self, chat_id: i64) -> bool {
        self.subscriptions
            .get(&chat_id)
            .map(|r| r.active)
            .unwrap_or(false)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    // ========== Subscription lifecycle ==========

    /// Mark a subscription active, creating it if missing.
    pub async fn activate(&self, chat_id: i64) {
        self.set_active(chat_id, true).await;
    }

    /// Mark a subscription inactive. Tracked entities are kept.
    pub async fn deactivate(&self, chat_id: i64) {
        self.set_active(chat_id, false).await;
    }

    async fn set_active(&self, chat_id: i64, active: bool) {
        let last_error = {
            let mut record = self.subscriptions.entry(chat_id).or_default();
            record.active = active;
            record.last_error.clone()
        };
        debug!("Subscription {} active={}", chat_id, active);

        if let Err(e) = self
            .repo
            .upsert_subscription(chat_id, active, last_error.as_deref())
            .await
        {
            warn!("Failed to persist subscription {}: {}", chat_id, e);
        }
    }

    /// Record the most recent polling failure of a subscription.
    pub async fn set_last_error(&self, chat_id: i64, error: impl Into<String>) {
        let error = error.into();
        let active = {
            let Some(mut record) = self.subscriptions.get_mut(&chat_id) else {
                return;
            };
            record.last_error = Some(error.clone());
            record.active
        };

        if let Err(e) = self
            .repo
            .upsert_subscription(chat_id, active, Some(&error))
            .await
        {
            warn!("Failed to persist last error for {}: {}", chat_id, e);
        }
    }

    // ========== Entities ==========

    /// Start tracking an account. Returns `false` if it was already tracked.
    ///
    /// The subscription is created (inactive) when missing.
    pub async fn add_entity(&self, chat_id: i64, source: SourceKind, account: &str) -> bool {
        let entity = TrackedEntity::new(source, account);
        let key = entity.key(chat_id);

        match self.entities.entry(key.clone()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(EntityRecord {
                    entity: entity.clone(),
                    removed: false,
                })));
            }
        }
        self.subscriptions
            .entry(chat_id)
            .or_default()
            .entities
            .push(key.clone());

        debug!("Tracking {}", key);
        if let Err(e) = self.repo.upsert_entity(chat_id, &entity).await {
            warn!("Failed to persist entity {}: {}", key, e);
        }
        true
    }

    /// Stop tracking an account. Returns `false` if it was not tracked.
    pub async fn remove_entity(&self, key: &EntityKey) -> bool {
        let Some((_, cell)) = self.entities.remove(key) else {
            return false;
        };
        if let Some(mut record) = self.subscriptions.get_mut(&key.chat_id) {
            record.entities.retain(|k| k != key);
        }

        // Wait for any in-flight advance, then fence further writes.
        let mut record = cell.lock().await;
        record.removed = true;

        debug!("Untracked {}", key);
        if let Err(e) = self
            .repo
            .delete_entity(key.chat_id, key.source, &key.account)
            .await
        {
            warn!("Failed to delete entity {}: {}", key, e);
        }
        true
    }

    /// Atomically move the watermark from `expected` to `new`.
    pub async fn advance_watermark(
        &self,
        key: &EntityKey,
        expected: Option<&str>,
        new: &str,
    ) -> Advance {
        let Some(cell) = self.cell(key) else {
            return Advance::Missing;
        };
        let mut record = cell.lock().await;
        if record.removed {
            return Advance::Missing;
        }
        if record.entity.watermark.as_deref() != expected {
            debug!(
                "Watermark conflict for {}: expected {:?}, found {:?}",
                key, expected, record.entity.watermark
            );
            return Advance::Conflict;
        }

        record.entity.watermark = Some(new.to_string());
        debug!("Watermark for {} advanced to {}", key, new);

        if let Err(e) = self.repo.upsert_entity(key.chat_id, &record.entity).await {
            warn!("Failed to persist watermark for {}: {}", key, e);
        }
        Advance::Applied
    }

    /// Update the not-found flag. Returns the previous value, or `None` if
    /// the entity is not tracked.
    pub async fn set_not_found_notified(&self, key: &EntityKey, notified: bool) -> Option<bool> {
        let cell = self.cell(key)?;
        let mut record = cell.lock().await;
        if record.removed {
            return None;
        }

        let previous = record.entity.not_found_notified;
        if previous != notified {
            record.entity.not_found_notified = notified;
            if let Err(e) = self.repo.upsert_entity(key.chat_id, &record.entity).await {
                warn!("Failed to persist not-found flag for {}: {}", key, e);
            }
        }
        Some(previous)
    }

    /// Drop every subscription and entity, in memory and on disk.
    pub async fn clear_all(&self) {
        let cells: Vec<_> = self.entities.iter().map(|e| e.value().clone()).collect();
        self.entities.clear();
        self.subscriptions.clear();

        for cell in cells {
            cell.lock().await.removed = true;
        }

        info!("Cleared all subscriptions");
        if let Err(e) = self.repo.clear_all().await {
            warn!("Failed to clear persisted state: {}", e);
        }
    }

    fn cell(&self, key: &EntityKey) -> Option<Arc<Mutex<EntityRecord>>> {
        self.entities.get(key).map(|e| e.value().clone())
    }
}
