//! Subscription manager.
//!
//! Applies chat commands to the watermark store and the scheduler. Every
//! mutating command passes the [`OperatorGuard`] first.

use std::sync::Arc;

use tracing::info;

use super::guard::OperatorGuard;
use super::types::{AccountRef, Command};
use crate::Result;
use crate::domain::{EntityKey, Subscription};
use crate::scheduler::Scheduler;
use crate::store::WatermarkStore;

pub struct SubscriptionManager {
    store: Arc<WatermarkStore>,
    scheduler: Arc<Scheduler>,
    guard: OperatorGuard,
    /// Seeded into empty subscriptions on `start`.
    default_accounts: Vec<AccountRef>,
}

fn bracketed<T: ToString>(items: &[T]) -> String {
    let names: Vec<String> = items.iter().map(ToString::to_string).collect();
    format!("[{}]", names.join(", "))
}

impl SubscriptionManager {
    pub fn new(
        store: Arc<WatermarkStore>,
        scheduler: Arc<Scheduler>,
        guard: OperatorGuard,
        default_accounts: Vec<AccountRef>,
    ) -> Self {
        Self {
            store,
            scheduler,
            guard,
            default_accounts,
        }
    }

    /// Run one command and return the reply text.
    ///
    /// Fails with [`crate::Error::Unauthorized`] before touching any state
    /// when a non-operator issues a guarded command.
    pub async fn handle(
        &self,
        chat_id: i64,
        username: Option<&str>,
        command: Command,
    ) -> Result<String> {
        if command.requires_operator() {
            self.guard.check(username)?;
        }

        let reply = match command {
            Command::Start => self.start(chat_id).await,
            Command::Stop => self.stop(chat_id).await,
            Command::Status => self.status(chat_id).await,
            Command::AddEntities(accounts) => self.add_entities(chat_id, &accounts).await,
            Command::RemoveEntities(accounts) => self.remove_entities(chat_id, &accounts).await,
            Command::ClearAll => self.clear_all().await,
            Command::Invalid { reason } => reason,
            Command::Unknown(_) => "Unknown command".to_string(),
        };
        Ok(reply)
    }

    pub async fn start(&self, chat_id: i64) -> String {
        self.store.activate(chat_id).await;

        let is_empty = self
            .store
            .subscription(chat_id)
            .await
            .is_none_or(|s| s.entities.is_empty());
        if is_empty {
            for account in &self.default_accounts {
                self.store
                    .add_entity(chat_id, account.source, &account.account)
                    .await;
            }
        }

        let sub = self
            .store
            .subscription(chat_id)
            .await
            .unwrap_or_else(|| Subscription::new(chat_id));
        self.scheduler.arm_subscription(chat_id, &sub.entities);
        info!("Chat {} started with {} entities", chat_id, sub.entities.len());

        format!("Bot enabled\nTracked users: {}", bracketed(&sub.display_names()))
    }

    pub async fn stop(&self, chat_id: i64) -> String {
        self.scheduler.disarm_subscription(chat_id);
        self.store.deactivate(chat_id).await;
        info!("Chat {} stopped", chat_id);
        "Bot stopped".to_string()
    }

    pub async fn status(&self, chat_id: i64) -> String {
        let Some(sub) = self.store.subscription(chat_id).await else {
            return "Bot active: no\nTracked users: []".to_string();
        };

        let mut out = format!(
            "Bot active: {}\nLast error: {}\nTracked users:",
            if sub.active { "yes" } else { "no" },
            sub.last_error.as_deref().unwrap_or("none")
        );
        if sub.entities.is_empty() {
            out.push_str(" []");
        }
        for entity in &sub.entities {
            out.push_str(&format!(
                "\n{}: {}",
                entity.display_name(),
                entity.watermark.as_deref().unwrap_or("(none)")
            ));
        }
        out
    }

    pub async fn add_entities(&self, chat_id: i64, accounts: &[AccountRef]) -> String {
        let active = self.store.is_active(chat_id);
        let mut added = Vec::new();
        let mut existing = Vec::new();

        for account in accounts {
            if self
                .store
                .add_entity(chat_id, account.source, &account.account)
                .await
            {
                if active {
                    let key = EntityKey::new(chat_id, account.source, account.account.clone());
                    self.scheduler
                        .arm_entity(key, self.scheduler.config().poll_interval);
                }
                added.push(account.clone());
            } else {
                existing.push(account.clone());
            }
        }

        let mut reply = format!("Added users: {}", bracketed(&added));
        if !existing.is_empty() {
            reply.push_str(&format!("\nAlready tracked: {}", bracketed(&existing)));
        }
        reply
    }

    pub async fn remove_entities(&self, chat_id: i64, accounts: &[AccountRef]) -> String {
        let mut removed = Vec::new();
        let mut missing = Vec::new();

        for account in accounts {
            let key = EntityKey::new(chat_id, account.source, account.account.clone());
            self.scheduler.disarm_entity(&key);
            if self.store.remove_entity(&key).await {
                removed.push(account.clone());
            } else {
                missing.push(account.clone());
            }
        }

        let mut reply = format!("Removed users: {}", bracketed(&removed));
        if !missing.is_empty() {
            reply.push_str(&format!("\nNot tracked: {}", bracketed(&missing)));
        }
        reply
    }

    pub async fn clear_all(&self) -> String {
        self.scheduler.disarm_all();
        self.store.clear_all().await;
        "All state cleared".to_string()
    }
}
