//! Per-entity polling actor.
//!
//! One actor runs per (subscription, tracked entity). Each tick fetches a
//! snapshot, diffs it against the stored watermark, delivers what is new and
//! only then advances the watermark. Ticks of one entity never overlap, even
//! across a replaced actor; the next one is scheduled `poll_interval` after
//! the previous one completed.

use std::sync::Arc;
use std::time::Duration;

use spybot_sources::SourceError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::service::{SchedulerContext, spawn_task};
use super::task::MonitorTask;
use crate::domain::{EntityKey, SourceKind};
use crate::monitor::diff::{GameDiff, diff_game, diff_submissions};
use crate::monitor::formatter::{account_not_found, game_started};
use crate::store::Advance;

/// Why an actor's run loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorOutcome {
    Cancelled,
}

pub struct EntityActor {
    key: EntityKey,
    ctx: Arc<SchedulerContext>,
    token: CancellationToken,
    first_delay: Duration,
}

impl EntityActor {
    pub(crate) fn new(
        key: EntityKey,
        ctx: Arc<SchedulerContext>,
        token: CancellationToken,
        first_delay: Duration,
    ) -> Self {
        Self {
            key,
            ctx,
            token,
            first_delay,
        }
    }

    /// Run until cancelled. Cancellation is observed between ticks only.
    pub async fn run(self) -> ActorOutcome {
        info!("EntityActor {} starting", self.key);
        let mut delay = self.first_delay;

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    info!("EntityActor {} cancelled", self.key);
                    return ActorOutcome::Cancelled;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            // A replaced actor may still be mid-tick on the same entity.
            let tick_lock = self.ctx.registry.tick_lock(&self.key);
            let _guard = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    info!("EntityActor {} cancelled", self.key);
                    return ActorOutcome::Cancelled;
                }
                guard = tick_lock.lock() => guard,
            };

            self.tick().await;
            delay = self.ctx.config.poll_interval;
        }
    }

    /// One fetch, diff, deliver, advance cycle.
    pub async fn tick(&self) {
        debug!("EntityActor {} tick", self.key);
        match self.key.source {
            SourceKind::LeetCode => self.poll_submissions().await,
            SourceKind::Lichess => self.poll_game().await,
        }
    }

    async fn poll_submissions(&self) {
        let key = &self.key;
        let snapshot = match self.ctx.submissions.fetch_recent_items(&key.account).await {
            Ok(snapshot) => snapshot,
            Err(e) => return self.record_failure(e).await,
        };

        let Some(entity) = self.ctx.store.entity(key).await else {
            debug!("{} no longer tracked, skipping", key);
            return;
        };
        let watermark = entity.watermark;

        let diff = diff_submissions(&snapshot, watermark.as_deref());
        let Some(new_watermark) = diff.new_watermark.as_deref() else {
            return;
        };

        if diff.is_baseline() {
            info!("Baseline for {} set to {}", key, new_watermark);
        } else {
            let message = self
                .ctx
                .formatter
                .format(&key.account, &diff.new_items)
                .await;
            if let Err(e) = self
                .ctx
                .transport
                .send_message(key.chat_id, &message.text, message.flags)
                .await
            {
                warn!("Delivery to {} failed, will retry next tick: {}", key.chat_id, e);
                return;
            }
            info!("Reported {} new submissions for {}", diff.new_items.len(), key);
        }

        self.advance(watermark.as_deref(), new_watermark).await;
    }

    async fn poll_game(&self) {
        let key = &self.key;
        let accounts = [key.account.clone()];
        let statuses = match self.ctx.games.fetch_entity_status(&accounts).await {
            Ok(statuses) => statuses,
            Err(e) => return self.record_failure(e).await,
        };

        let Some(current) = statuses.get(&key.account) else {
            return self.report_not_found().await;
        };
        if self.ctx.store.set_not_found_notified(key, false).await == Some(true) {
            info!("{} found again", key);
        }

        let Some(entity) = self.ctx.store.entity(key).await else {
            return;
        };
        let watermark = entity.watermark;

        let GameDiff::Started { game_id } = diff_game(current.as_deref(), watermark.as_deref())
        else {
            return;
        };

        let message = game_started(&key.account, &game_id);
        let handle = match self
            .ctx
            .transport
            .send_message(key.chat_id, &message.text, message.flags)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Delivery to {} failed, will retry next tick: {}", key.chat_id, e);
                return;
            }
        };
        info!("{} started game {}", key, game_id);

        if self.advance(watermark.as_deref(), &game_id).await != Advance::Applied {
            return;
        }
        if self.token.is_cancelled() {
            return;
        }

        match self.ctx.registry.register_watch(key, &game_id, handle) {
            Some(task_handle) => spawn_task(
                &self.ctx,
                MonitorTask::GameWatch {
                    key: key.clone(),
                    game_id,
                },
                task_handle,
                Duration::ZERO,
            ),
            None => debug!("No new watch for game {} ({})", game_id, key),
        }
    }

    async fn report_not_found(&self) {
        let key = &self.key;
        warn!("Lichess user {} not found", key.account);

        if self.ctx.store.set_not_found_notified(key, true).await != Some(false) {
            return;
        }
        let message = account_not_found(&key.account);
        if let Err(e) = self
            .ctx
            .transport
            .send_message(key.chat_id, &message.text, message.flags)
            .await
        {
            warn!("Failed to report missing account {}: {}", key, e);
            self.ctx.store.set_not_found_notified(key, false).await;
        }
    }

    async fn advance(&self, expected: Option<&str>, new: &str) -> Advance {
        let outcome = self
            .ctx
            .store
            .advance_watermark(&self.key, expected, new)
            .await;
        if outcome != Advance::Applied {
            debug!("Watermark of {} not advanced: {:?}", self.key, outcome);
        }
        outcome
    }

    async fn record_failure(&self, error: SourceError) {
        warn!("Polling {} failed: {}", self.key, error);
        self.ctx
            .store
            .set_last_error(self.key.chat_id, format!("{}: {}", self.key.account, error))
            .await;
    }
}
