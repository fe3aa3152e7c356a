//! Inbound command loop.
//!
//! Long-polls chat updates, turns command messages into [`Command`]s and
//! replies with the manager's answer. Commands are handled one at a time.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::manager::SubscriptionManager;
use super::parser::{is_command, parse_command};
use crate::Result;
use crate::domain::SourceKind;
use crate::notification::telegram::TelegramTransport;
use crate::notification::telegram::models::Update;
use crate::notification::{ChatTransport, MessageFlags};

/// Long-poll timeout passed to the chat service.
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 30;

/// Back-off after a failed update fetch.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// A source of inbound chat updates.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn fetch_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>>;
}

#[async_trait]
impl UpdateSource for TelegramTransport {
    async fn fetch_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>> {
        self.get_updates(offset, timeout_secs).await
    }
}

pub struct CommandListener {
    updates: Arc<dyn UpdateSource>,
    transport: Arc<dyn ChatTransport>,
    manager: Arc<SubscriptionManager>,
    default_source: SourceKind,
    poll_timeout_secs: u64,
}

impl CommandListener {
    pub fn new(
        updates: Arc<dyn UpdateSource>,
        transport: Arc<dyn ChatTransport>,
        manager: Arc<SubscriptionManager>,
        default_source: SourceKind,
    ) -> Self {
        Self {
            updates,
            transport,
            manager,
            default_source,
            poll_timeout_secs: DEFAULT_POLL_TIMEOUT_SECS,
        }
    }

    pub fn with_poll_timeout(mut self, secs: u64) -> Self {
        self.poll_timeout_secs = secs;
        self
    }

    /// Process updates until `token` is cancelled.
    pub async fn run(self, token: CancellationToken) {
        info!("Command listener started");
        let mut offset: Option<i64> = None;

        loop {
            let batch = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                batch = self.updates.fetch_updates(offset, self.poll_timeout_secs) => batch,
            };

            match batch {
                Ok(updates) => {
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        self.handle_update(update).await;
                    }
                }
                Err(e) => {
                    warn!("Fetching updates failed: {}", e);
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        info!("Command listener stopped");
    }

    /// Handle one update; non-command messages are ignored.
    pub async fn handle_update(&self, update: Update) {
        let Some(message) = update.message else {
            return;
        };
        let Some(text) = message.text.as_deref().filter(|t| is_command(t)) else {
            return;
        };

        let chat_id = message.chat.id;
        let username = message.from.as_ref().and_then(|u| u.username.as_deref());
        let command = parse_command(text, self.default_source);
        debug!("Chat {} from {:?}: {:?}", chat_id, username, command);

        let reply = match self.manager.handle(chat_id, username, command).await {
            Ok(reply) => reply,
            Err(e) => {
                info!("Command from {:?} in {} rejected: {}", username, chat_id, e);
                e.to_string()
            }
        };

        if let Err(e) = self
            .transport
            .send_message(chat_id, &reply, MessageFlags::PLAIN)
            .await
        {
            warn!("Failed to reply in {}: {}", chat_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::OperatorGuard;
    use crate::notification::telegram::models::{Chat, Message, User};
    use crate::test_utils::TestHarness;

    fn command_update(update_id: i64, chat_id: i64, username: &str, text: &str) -> Update {
        Update {
            update_id,
            message: Some(Message {
                message_id: update_id,
                chat: Chat { id: chat_id },
                from: Some(User {
                    id: 7,
                    username: Some(username.to_string()),
                }),
                text: Some(text.to_string()),
            }),
        }
    }

    struct NoUpdates;

    #[async_trait]
    impl UpdateSource for NoUpdates {
        async fn fetch_updates(&self, _: Option<i64>, _: u64) -> Result<Vec<Update>> {
            Ok(Vec::new())
        }
    }

    fn listener(h: &TestHarness) -> CommandListener {
        let manager = Arc::new(SubscriptionManager::new(
            h.store.clone(),
            h.scheduler.clone(),
            OperatorGuard::new("owner"),
            Vec::new(),
        ));
        CommandListener::new(
            Arc::new(NoUpdates),
            h.transport.clone(),
            manager,
            SourceKind::LeetCode,
        )
    }

    #[tokio::test]
    async fn test_unauthorized_gets_exactly_one_rejection() {
        let h = TestHarness::new();
        let listener = listener(&h);

        listener
            .handle_update(command_update(1, 10, "mallory", "/stop"))
            .await;

        assert_eq!(h.transport.sent_to(10), vec!["User not recognized"]);
        assert!(h.store.subscription(10).await.is_none());
    }

    #[tokio::test]
    async fn test_operator_commands_are_answered() {
        let h = TestHarness::new();
        let listener = listener(&h);

        listener
            .handle_update(command_update(1, 10, "owner", "/add_user@spy_bot alice"))
            .await;
        listener
            .handle_update(command_update(2, 10, "owner", "/start"))
            .await;

        assert_eq!(
            h.transport.sent_to(10),
            vec!["Added users: [alice]", "Bot enabled\nTracked users: [alice]"]
        );
    }

    #[tokio::test]
    async fn test_plain_text_is_ignored() {
        let h = TestHarness::new();
        let listener = listener(&h);

        listener
            .handle_update(command_update(1, 10, "owner", "hello there"))
            .await;

        assert!(h.transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let h = TestHarness::new();
        let token = CancellationToken::new();
        token.cancel();
        listener(&h).run(token).await;
    }
}
