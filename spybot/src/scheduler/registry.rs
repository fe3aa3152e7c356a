//! Registry of live tasks and their cancellation tokens.
//!
//! Token hierarchy:
//! `root -> subscription -> entity actor` and `root -> game watch`.
//! A game watch is shared by every subscriber that announced the game, so it
//! hangs off the root and is cancelled once its last subscriber goes away.
//! Replacing actors on a repeated `start` leaves running watches alone.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::task::TaskHandle;
use crate::domain::EntityKey;
use crate::notification::MessageHandle;

/// A live watch and the messages it edits when the game ends.
struct WatchEntry {
    handle: TaskHandle,
    subscribers: Vec<(EntityKey, MessageHandle)>,
}

impl WatchEntry {
    /// Drop matching subscribers. Returns true when none are left.
    fn detach(&mut self, mut matches: impl FnMut(&EntityKey) -> bool) -> bool {
        self.subscribers.retain(|(key, _)| !matches(key));
        self.subscribers.is_empty()
    }
}

#[derive(Default)]
struct RegistryInner {
    subscriptions: HashMap<i64, CancellationToken>,
    actors: HashMap<EntityKey, TaskHandle>,
    /// Keyed by game id.
    watches: HashMap<String, WatchEntry>,
}

impl RegistryInner {
    fn detach_watches(&mut self, mut matches: impl FnMut(&EntityKey) -> bool) {
        self.watches.retain(|game_id, entry| {
            if entry.detach(&mut matches) {
                debug!("Cancelling watch of game {} (no subscribers left)", game_id);
                entry.handle.cancel();
                false
            } else {
                true
            }
        });
    }
}

pub struct TaskRegistry {
    root: CancellationToken,
    inner: Mutex<RegistryInner>,
    /// Serializes ticks per entity across actor generations. Survives
    /// cancellation so a replacement actor waits for the old tick.
    tick_locks: Mutex<HashMap<EntityKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl TaskRegistry {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            root,
            inner: Mutex::new(RegistryInner::default()),
            tick_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &CancellationToken {
        &self.root
    }

    /// Register a new actor for `key`, cancelling any actor it replaces.
    pub fn register_actor(&self, key: EntityKey) -> TaskHandle {
        let mut inner = self.inner.lock();
        let parent = inner
            .subscriptions
            .entry(key.chat_id)
            .or_insert_with(|| self.root.child_token())
            .clone();

        let handle = TaskHandle::new(key.clone(), &parent);
        if let Some(previous) = inner.actors.insert(key, handle.clone()) {
            debug!("Replacing actor {} for {}", previous.id, previous.key);
            previous.cancel();
        }
        handle
    }

    /// The lock every tick of `key` holds from fetch to watermark advance.
    pub fn tick_lock(&self, key: &EntityKey) -> Arc<tokio::sync::Mutex<()>> {
        self.tick_locks.lock().entry(key.clone()).or_default().clone()
    }

    /// Forget tick locks nobody holds.
    fn prune_tick_locks(&self, mut matches: impl FnMut(&EntityKey) -> bool) {
        self.tick_locks
            .lock()
            .retain(|key, lock| !matches(key) || Arc::strong_count(lock) > 1);
    }

    /// Attach `message` to the watch of `game_id`, starting one if needed.
    ///
    /// Returns the handle of a new watch the caller must spawn. `None` means
    /// the message joined a live watch or the subscription is not running.
    pub fn register_watch(
        &self,
        key: &EntityKey,
        game_id: &str,
        message: MessageHandle,
    ) -> Option<TaskHandle> {
        let mut inner = self.inner.lock();
        let running = inner
            .subscriptions
            .get(&key.chat_id)
            .is_some_and(|token| !token.is_cancelled());
        if !running {
            return None;
        }

        if let Some(entry) = inner.watches.get_mut(game_id) {
            if !entry.subscribers.iter().any(|(k, _)| k == key) {
                debug!("{} joins watch of game {}", key, game_id);
                entry.subscribers.push((key.clone(), message));
            }
            return None;
        }

        let handle = TaskHandle::new(key.clone(), &self.root);
        inner.watches.insert(
            game_id.to_string(),
            WatchEntry {
                handle: handle.clone(),
                subscribers: vec![(key.clone(), message)],
            },
        );
        Some(handle)
    }

    /// Remove a finished watch and return the messages to edit.
    ///
    /// Returns nothing when the entry belongs to another task.
    pub fn finish_watch(&self, game_id: &str, task_id: u64) -> Vec<MessageHandle> {
        let mut inner = self.inner.lock();
        if !inner
            .watches
            .get(game_id)
            .is_some_and(|entry| entry.handle.id == task_id)
        {
            return Vec::new();
        }
        inner
            .watches
            .remove(game_id)
            .map(|entry| entry.subscribers.into_iter().map(|(_, m)| m).collect())
            .unwrap_or_default()
    }

    /// Cancel every task of a subscription.
    pub fn cancel_subscription(&self, chat_id: i64) {
        {
            let mut inner = self.inner.lock();
            if let Some(token) = inner.subscriptions.remove(&chat_id) {
                token.cancel();
            }
            inner.actors.retain(|key, _| key.chat_id != chat_id);
            inner.detach_watches(|key| key.chat_id == chat_id);
        }
        self.prune_tick_locks(|key| key.chat_id == chat_id);
    }

    /// Cancel the actor of one entity and detach it from game watches.
    pub fn cancel_entity(&self, key: &EntityKey) {
        {
            let mut inner = self.inner.lock();
            if let Some(handle) = inner.actors.remove(key) {
                handle.cancel();
            }
            inner.detach_watches(|k| k == key);
        }
        self.prune_tick_locks(|k| k == key);
    }

    /// Cancel every subscription's tasks. The registry stays usable.
    pub fn cancel_all(&self) {
        {
            let mut inner = self.inner.lock();
            for token in inner.subscriptions.values() {
                token.cancel();
            }
            for entry in inner.watches.values() {
                entry.handle.cancel();
            }
            *inner = RegistryInner::default();
        }
        self.prune_tick_locks(|_| true);
    }

    pub fn has_actor(&self, key: &EntityKey) -> bool {
        self.inner.lock().actors.contains_key(key)
    }

    pub fn actor_count(&self) -> usize {
        self.inner.lock().actors.len()
    }

    pub fn watch_count(&self) -> usize {
        self.inner.lock().watches.len()
    }

    pub fn has_watch(&self, game_id: &str) -> bool {
        self.inner.lock().watches.contains_key(game_id)
    }

    /// Number of messages the watch of `game_id` will edit.
    pub fn watch_subscribers(&self, game_id: &str) -> usize {
        self.inner
            .lock()
            .watches
            .get(game_id)
            .map_or(0, |entry| entry.subscribers.len())
    }
}
