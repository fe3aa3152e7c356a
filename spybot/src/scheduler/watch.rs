//! In-flight game watch.
//!
//! Re-polls one reported game every `watch_interval`. Once the outcome is
//! known, the fetch fails or the poll budget runs out, every announcement of
//! the game is edited. One watch runs per game id whatever the number of
//! chats that announced it.

use std::sync::Arc;

use spybot_sources::{ActivityResult, SourceError};
use tracing::{debug, info, warn};

use super::service::SchedulerContext;
use super::task::TaskHandle;
use crate::domain::EntityKey;
use crate::monitor::formatter::{
    WATCH_GAVE_UP_SUFFIX, game_edit_flags, game_finished_suffix, watch_failed_suffix,
};
use crate::notification::MessageHandle;

/// Lifecycle of a game watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Polling,
    /// The game ended and the result was reported.
    Finished,
    /// The result could not be obtained.
    Abandoned,
    /// Stopped from outside before reaching a result.
    Cancelled,
}

impl WatchState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Polling)
    }
}

/// Decide the next state after poll number `polls` (1-based) and the text
/// to append to the message, if any.
pub fn next_state(
    result: std::result::Result<ActivityResult, SourceError>,
    polls: u32,
    max_polls: u32,
) -> (WatchState, Option<String>) {
    match result {
        Err(e) => (WatchState::Abandoned, Some(watch_failed_suffix(&e))),
        Ok(ActivityResult::Finished(game)) => {
            (WatchState::Finished, Some(game_finished_suffix(&game)))
        }
        Ok(ActivityResult::InProgress) if polls >= max_polls => {
            (WatchState::Abandoned, Some(WATCH_GAVE_UP_SUFFIX.to_string()))
        }
        Ok(ActivityResult::InProgress) => (WatchState::Polling, None),
    }
}

pub struct GameWatch {
    key: EntityKey,
    game_id: String,
    ctx: Arc<SchedulerContext>,
    handle: TaskHandle,
}

impl GameWatch {
    pub(crate) fn new(
        key: EntityKey,
        game_id: String,
        ctx: Arc<SchedulerContext>,
        handle: TaskHandle,
    ) -> Self {
        Self {
            key,
            game_id,
            ctx,
            handle,
        }
    }

    pub async fn run(self) -> WatchState {
        info!("Watching game {} for {}", self.game_id, self.key);
        let interval = self.ctx.config.watch_interval;
        let max_polls = self.ctx.config.watch_max_polls;
        let mut polls = 0u32;

        let (state, suffix) = loop {
            tokio::select! {
                biased;
                _ = self.handle.cancellation_token.cancelled() => break (WatchState::Cancelled, None),
                _ = tokio::time::sleep(interval) => {}
            }

            polls += 1;
            let result = self.ctx.games.fetch_activity_detail(&self.game_id).await;
            if let Err(e) = &result {
                warn!("Game {} status fetch failed: {}", self.game_id, e);
            }

            let (state, suffix) = next_state(result, polls, max_polls);
            if state.is_terminal() {
                break (state, suffix);
            }
            debug!("Game {} still in progress (poll {}/{})", self.game_id, polls, max_polls);
        };

        // Taking the subscribers out closes the watch to late joiners.
        let messages = self.ctx.registry.finish_watch(&self.game_id, self.handle.id);
        if let Some(suffix) = suffix {
            for message in &messages {
                self.append(message, &suffix).await;
            }
        }
        info!(
            "Watch of game {} ended: {:?} ({} messages)",
            self.game_id,
            state,
            messages.len()
        );
        state
    }

    async fn append(&self, message: &MessageHandle, suffix: &str) {
        let text = format!("{}{}", message.text, suffix);
        if let Err(e) = self
            .ctx
            .transport
            .edit_message(message, &text, game_edit_flags())
            .await
        {
            warn!(
                "Failed to edit message {} in chat {} for game {}: {}",
                message.message_id, message.chat_id, self.game_id, e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spybot_sources::{FinishedGame, Participant};

    #[test]
    fn test_in_progress_keeps_polling_until_budget() {
        let (state, suffix) = next_state(Ok(ActivityResult::InProgress), 1, 3);
        assert_eq!(state, WatchState::Polling);
        assert!(suffix.is_none());

        let (state, suffix) = next_state(Ok(ActivityResult::InProgress), 3, 3);
        assert_eq!(state, WatchState::Abandoned);
        assert_eq!(suffix.as_deref(), Some("\nGave up waiting for the game result"));
    }

    #[test]
    fn test_fetch_failure_abandons() {
        let (state, suffix) = next_state(Err(SourceError::unavailable("HTTP 404")), 1, 3);
        assert_eq!(state, WatchState::Abandoned);
        assert!(suffix.unwrap().starts_with("\nCouldn't update game status: "));
    }

    #[test]
    fn test_finished_reports_result() {
        let game = FinishedGame {
            status: "resign".to_string(),
            white: Participant::new("a", Some(1500), Some(-8)),
            black: Participant::new("b", Some(1500), Some(8)),
        };
        let (state, suffix) = next_state(Ok(ActivityResult::Finished(game)), 2, 3);
        assert_eq!(state, WatchState::Finished);
        assert!(suffix.unwrap().starts_with("\nGame finished: resign"));
        assert!(state.is_terminal());
    }
}
