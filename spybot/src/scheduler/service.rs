//! Scheduler service.
//!
//! Owns the lifecycle of every polling actor and game watch. Watermarks are
//! never written here; actors hand diff results to the [`WatermarkStore`].

use std::sync::Arc;
use std::time::Duration;

use spybot_sources::{GameSource, SubmissionSource};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::actor::EntityActor;
use super::registry::TaskRegistry;
use super::task::{MonitorTask, TaskHandle};
use super::watch::GameWatch;
use crate::domain::{EntityKey, TrackedEntity};
use crate::monitor::formatter::SubmissionFormatter;
use crate::notification::ChatTransport;
use crate::store::WatermarkStore;

/// Timing of polls and watches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Delay before the first tick of an actor armed by `start` or restore.
    pub initial_delay: Duration,
    /// Pause between the end of one tick and the start of the next.
    pub poll_interval: Duration,
    pub watch_interval: Duration,
    /// Polls after which a game watch gives up.
    pub watch_max_polls: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            poll_interval: Duration::from_secs(60),
            watch_interval: Duration::from_secs(60),
            watch_max_polls: 360,
        }
    }
}

/// Collaborators shared by every task.
pub(crate) struct SchedulerContext {
    pub config: SchedulerConfig,
    pub store: Arc<WatermarkStore>,
    pub transport: Arc<dyn ChatTransport>,
    pub submissions: Arc<dyn SubmissionSource>,
    pub games: Arc<dyn GameSource>,
    pub formatter: SubmissionFormatter,
    pub registry: TaskRegistry,
}

/// Spawn a task onto the runtime. The handle must already be registered.
pub(crate) fn spawn_task(
    ctx: &Arc<SchedulerContext>,
    task: MonitorTask,
    handle: TaskHandle,
    first_delay: Duration,
) {
    debug!("Spawning {} for {} (task {})", task.kind(), task.key(), handle.id);
    match task {
        MonitorTask::SubmissionPoll { key } | MonitorTask::GamePoll { key } => {
            let actor = EntityActor::new(
                key,
                ctx.clone(),
                handle.cancellation_token.clone(),
                first_delay,
            );
            tokio::spawn(actor.run());
        }
        MonitorTask::GameWatch { key, game_id } => {
            let watch = GameWatch::new(key, game_id, ctx.clone(), handle);
            tokio::spawn(watch.run());
        }
    }
}

pub struct Scheduler {
    ctx: Arc<SchedulerContext>,
}

impl Scheduler {
    /// Create a scheduler. Cancelling `shutdown` stops every task.
    pub fn new(
        config: SchedulerConfig,
        store: Arc<WatermarkStore>,
        transport: Arc<dyn ChatTransport>,
        submissions: Arc<dyn SubmissionSource>,
        games: Arc<dyn GameSource>,
        shutdown: CancellationToken,
    ) -> Self {
        let formatter = SubmissionFormatter::new(submissions.clone());
        Self {
            ctx: Arc::new(SchedulerContext {
                config,
                store,
                transport,
                submissions,
                games,
                formatter,
                registry: TaskRegistry::new(shutdown),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.ctx.config
    }

    pub fn store(&self) -> &Arc<WatermarkStore> {
        &self.ctx.store
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.ctx.registry
    }

    /// (Re)arm an actor for every entity of a subscription.
    ///
    /// Existing actors are replaced; running game watches are left alone.
    pub fn arm_subscription(&self, chat_id: i64, entities: &[TrackedEntity]) {
        for entity in entities {
            self.arm_entity(entity.key(chat_id), self.ctx.config.initial_delay);
        }
        info!("Armed {} actors for chat {}", entities.len(), chat_id);
    }

    /// Arm (or replace) the actor of one entity.
    pub fn arm_entity(&self, key: EntityKey, first_delay: Duration) {
        let handle = self.ctx.registry.register_actor(key.clone());
        spawn_task(&self.ctx, MonitorTask::poll(key), handle, first_delay);
    }

    /// Cancel every actor of a subscription and detach it from game watches.
    pub fn disarm_subscription(&self, chat_id: i64) {
        self.ctx.registry.cancel_subscription(chat_id);
        info!("Disarmed chat {}", chat_id);
    }

    /// Cancel the actor of one entity and detach it from game watches.
    pub fn disarm_entity(&self, key: &EntityKey) {
        self.ctx.registry.cancel_entity(key);
    }

    pub fn disarm_all(&self) {
        self.ctx.registry.cancel_all();
        info!("Disarmed all subscriptions");
    }

    /// Re-arm every active subscription that tracks at least one entity.
    /// Returns the number of subscriptions armed.
    pub async fn restore(&self) -> usize {
        let mut armed = 0;
        for sub in self.ctx.store.subscriptions().await {
            if sub.should_run() {
                self.arm_subscription(sub.chat_id, &sub.entities);
                armed += 1;
            }
        }
        info!("Restored {} active subscriptions", armed);
        armed
    }

    /// Stop every task for good.
    pub fn shutdown(&self) {
        self.ctx.registry.root().cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceKind;
    use crate::test_utils::{StatusReply, TestHarness};
    use spybot_sources::{
        ActivityResult, FinishedGame, Participant, SourceError, SubmissionItem,
    };
    use tokio::time::sleep;

    fn items(ids: &[&str]) -> Vec<SubmissionItem> {
        ids.iter()
            .map(|id| SubmissionItem::new(*id, id.to_uppercase(), *id))
            .collect()
    }

    async fn track(h: &TestHarness, chat_id: i64, source: SourceKind, account: &str) {
        h.store.activate(chat_id).await;
        h.store.add_entity(chat_id, source, account).await;
        let sub = h.store.subscription(chat_id).await.unwrap();
        h.scheduler.arm_subscription(chat_id, &sub.entities);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_sets_baseline_then_reports_once() {
        let h = TestHarness::new();
        h.submissions.set_snapshot("alice", items(&["two-sum"]));
        track(&h, 1, SourceKind::LeetCode, "alice").await;
        let key = EntityKey::new(1, SourceKind::LeetCode, "alice");

        sleep(Duration::from_millis(1500)).await;
        assert!(h.transport.sent().is_empty());
        assert_eq!(h.store.watermark(&key).await.as_deref(), Some("two-sum"));

        h.submissions
            .set_snapshot("alice", items(&["valid-parentheses", "three-sum", "two-sum"]));
        sleep(Duration::from_secs(60)).await;

        let sent = h.transport.sent_to(1);
        assert_eq!(sent.len(), 1);
        let three = sent[0].find("THREE-SUM").unwrap();
        let valid = sent[0].find("VALID-PARENTHESES").unwrap();
        assert!(three < valid);
        assert_eq!(
            h.store.watermark(&key).await.as_deref(),
            Some("valid-parentheses")
        );

        // Same snapshot again: nothing new.
        sleep(Duration::from_secs(60)).await;
        assert_eq!(h.transport.sent_to(1).len(), 1);
        assert_eq!(h.submissions.fetch_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_delivery_is_retried_next_tick() {
        let h = TestHarness::new();
        h.submissions.set_snapshot("alice", items(&["a"]));
        track(&h, 1, SourceKind::LeetCode, "alice").await;
        let key = EntityKey::new(1, SourceKind::LeetCode, "alice");
        sleep(Duration::from_millis(1500)).await;

        h.submissions.set_snapshot("alice", items(&["b", "a"]));
        h.transport.set_fail_sends(true);
        sleep(Duration::from_secs(60)).await;
        assert_eq!(h.store.watermark(&key).await.as_deref(), Some("a"));

        h.transport.set_fail_sends(false);
        sleep(Duration::from_secs(60)).await;
        assert_eq!(h.transport.sent_to(1).len(), 1);
        assert_eq!(h.store.watermark(&key).await.as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_during_slow_tick_delivers_once() {
        let h = TestHarness::new();
        h.submissions.set_snapshot("alice", items(&["a"]));
        track(&h, 1, SourceKind::LeetCode, "alice").await;
        let key = EntityKey::new(1, SourceKind::LeetCode, "alice");
        sleep(Duration::from_millis(1500)).await;

        // The tick at t=61s spends 10s enriching "b".
        h.submissions.set_snapshot("alice", items(&["b", "a"]));
        h.submissions.set_detail_delay(Duration::from_secs(10));
        sleep(Duration::from_secs(60)).await;
        assert_eq!(h.submissions.fetch_count(), 2);
        assert!(h.transport.sent().is_empty());

        let sub = h.store.subscription(1).await.unwrap();
        h.scheduler.arm_subscription(1, &sub.entities);
        sleep(Duration::from_secs(30)).await;

        assert_eq!(h.transport.sent_to(1).len(), 1);
        assert_eq!(h.store.watermark(&key).await.as_deref(), Some("b"));
        // The replacement ticked only after the old tick finished.
        assert_eq!(h.submissions.fetch_count(), 3);
        assert_eq!(h.scheduler.registry().actor_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_error_recorded_not_sent() {
        let h = TestHarness::new();
        h.submissions
            .push_error("alice", SourceError::unavailable("HTTP 502"));
        track(&h, 1, SourceKind::LeetCode, "alice").await;

        sleep(Duration::from_millis(1500)).await;

        assert!(h.transport.sent().is_empty());
        let sub = h.store.subscription(1).await.unwrap();
        assert!(sub.last_error.unwrap().contains("HTTP 502"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_start_spawns_watch_that_reports_result() {
        let h = TestHarness::new();
        h.games.set_status("magnus", StatusReply::Playing("g123".to_string()));
        h.games.push_game(
            "g123",
            Ok(ActivityResult::Finished(FinishedGame {
                status: "mate".to_string(),
                white: Participant::new("magnus", Some(2850), Some(8)),
                black: Participant::new("hikaru", Some(2800), Some(-8)),
            })),
        );
        track(&h, 1, SourceKind::Lichess, "magnus").await;

        sleep(Duration::from_millis(1500)).await;
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "magnus is playing:\nhttps://lichess.org/g123");
        assert!(h.scheduler.registry().has_watch("g123"));

        sleep(Duration::from_secs(61)).await;
        let edits = h.transport.edits();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].message_id, sent[0].message_id);
        assert!(edits[0].text.starts_with("magnus is playing:\nhttps://lichess.org/g123\nGame finished: mate"));
        assert!(edits[0].text.ends_with("hikaru rating 2800 -8"));
        assert_eq!(h.scheduler.registry().watch_count(), 0);

        // Still the same game: no second announcement.
        assert_eq!(h.transport.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_watched_once_for_two_chats() {
        let h = TestHarness::new();
        h.games.set_status("magnus", StatusReply::Playing("g123".to_string()));
        h.games.push_game("g123", Ok(ActivityResult::InProgress));
        h.games.push_game(
            "g123",
            Ok(ActivityResult::Finished(FinishedGame {
                status: "resign".to_string(),
                white: Participant::new("magnus", Some(2850), Some(8)),
                black: Participant::new("hikaru", Some(2800), Some(-8)),
            })),
        );
        track(&h, 1, SourceKind::Lichess, "magnus").await;
        track(&h, 2, SourceKind::Lichess, "magnus").await;

        sleep(Duration::from_millis(1500)).await;
        let sent = h.transport.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(h.scheduler.registry().watch_count(), 1);
        assert_eq!(h.scheduler.registry().watch_subscribers("g123"), 2);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(h.games.game_fetch_count(), 1);
        assert!(h.transport.edits().is_empty());

        sleep(Duration::from_secs(60)).await;
        assert_eq!(h.games.game_fetch_count(), 2);
        let mut edited: Vec<_> = h
            .transport
            .edits()
            .iter()
            .map(|e| (e.chat_id, e.message_id))
            .collect();
        edited.sort();
        let mut announced: Vec<_> = sent.iter().map(|m| (m.chat_id, m.message_id)).collect();
        announced.sort();
        assert_eq!(edited, announced);
        assert!(
            h.transport
                .edits()
                .iter()
                .all(|e| e.text.contains("\nGame finished: resign"))
        );
        assert_eq!(h.scheduler.registry().watch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shared_watch_survives_one_chat_stopping() {
        let h = TestHarness::new();
        h.games.set_status("magnus", StatusReply::Playing("g1".to_string()));
        track(&h, 1, SourceKind::Lichess, "magnus").await;
        track(&h, 2, SourceKind::Lichess, "magnus").await;
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(h.scheduler.registry().watch_subscribers("g1"), 2);

        h.scheduler.disarm_subscription(1);
        assert!(h.scheduler.registry().has_watch("g1"));
        assert_eq!(h.scheduler.registry().watch_subscribers("g1"), 1);

        h.scheduler.disarm_subscription(2);
        assert!(!h.scheduler.registry().has_watch("g1"));
        sleep(Duration::from_secs(120)).await;
        assert_eq!(h.games.game_fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_gives_up_after_budget() {
        let h = TestHarness::with_config(SchedulerConfig {
            watch_max_polls: 2,
            ..SchedulerConfig::default()
        });
        h.games.set_status("magnus", StatusReply::Playing("g1".to_string()));
        track(&h, 1, SourceKind::Lichess, "magnus").await;

        sleep(Duration::from_secs(150)).await;

        let edits = h.transport.edits();
        assert_eq!(edits.len(), 1);
        assert!(edits[0].text.ends_with("\nGave up waiting for the game result"));
        assert_eq!(h.games.game_fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_found_reported_once_until_seen_again() {
        let h = TestHarness::new();
        h.games.set_status("ghost", StatusReply::NotFound);
        track(&h, 1, SourceKind::Lichess, "ghost").await;
        let key = EntityKey::new(1, SourceKind::Lichess, "ghost");

        sleep(Duration::from_secs(200)).await;
        assert_eq!(h.transport.sent_to(1), vec!["Lichess user ghost not found"]);
        assert!(h.store.contains(&key));

        h.games.set_status("ghost", StatusReply::Idle);
        sleep(Duration::from_secs(60)).await;
        assert!(!h.store.entity(&key).await.unwrap().not_found_notified);

        h.games.set_status("ghost", StatusReply::NotFound);
        sleep(Duration::from_secs(60)).await;
        assert_eq!(h.transport.sent_to(1).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_stops_polling() {
        let h = TestHarness::new();
        track(&h, 1, SourceKind::LeetCode, "alice").await;
        sleep(Duration::from_millis(1500)).await;
        assert_eq!(h.submissions.fetch_count(), 1);

        h.scheduler.disarm_subscription(1);
        sleep(Duration::from_secs(300)).await;
        assert_eq!(h.submissions.fetch_count(), 1);
        assert_eq!(h.scheduler.registry().actor_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_actor_and_keeps_watch() {
        let h = TestHarness::new();
        h.games.set_status("magnus", StatusReply::Playing("g1".to_string()));
        track(&h, 1, SourceKind::Lichess, "magnus").await;
        sleep(Duration::from_millis(1500)).await;
        assert!(h.scheduler.registry().has_watch("g1"));

        let sub = h.store.subscription(1).await.unwrap();
        h.scheduler.arm_subscription(1, &sub.entities);
        sleep(Duration::from_millis(1500)).await;

        assert_eq!(h.scheduler.registry().actor_count(), 1);
        assert!(h.scheduler.registry().has_watch("g1"));
        // Replaced actor plus the new one: exactly two status polls so far.
        assert_eq!(h.games.status_fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_arms_active_subscriptions_only() {
        let h = TestHarness::new();
        h.store.activate(1).await;
        h.store.add_entity(1, SourceKind::LeetCode, "alice").await;
        h.store.add_entity(2, SourceKind::LeetCode, "bob").await;
        h.store.activate(3).await;

        let restarted = h.restart().await.unwrap();
        assert_eq!(restarted.scheduler.restore().await, 1);
        assert!(
            restarted
                .scheduler
                .registry()
                .has_actor(&EntityKey::new(1, SourceKind::LeetCode, "alice"))
        );
        assert_eq!(restarted.scheduler.registry().actor_count(), 1);
    }
}
