//! Notification text.

use std::sync::Arc;

use spybot_sources::{
    FinishedGame, LichessClient, Participant, SourceError, SubmissionItem, SubmissionSource,
};
use tracing::warn;

use crate::notification::MessageFlags;

/// A rendered message with its delivery options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub flags: MessageFlags,
}

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// One line per accepted submission. `detail` carries either the
/// difficulty emoji and acceptance ratio, or the reason they are missing.
pub fn submission_line(
    account: &str,
    item: &SubmissionItem,
    detail: std::result::Result<(&str, &str), &SourceError>,
) -> String {
    let mut line = format!(
        "{} solved <a href=\"{}\">{}</a>",
        escape_html(account),
        escape_html(&item.problem_url()),
        escape_html(&item.title)
    );
    match detail {
        Ok((emoji, acceptance)) => {
            line.push_str(&format!("{} (acceptance {})", emoji, escape_html(acceptance)));
        }
        Err(e) => {
            line.push_str(&format!(" (details unavailable: {})", escape_html(&e.to_string())));
        }
    }
    line.push_str("\n\n");
    line
}

/// Builds submission notifications, enriching each item with problem details.
pub struct SubmissionFormatter {
    source: Arc<dyn SubmissionSource>,
}

impl SubmissionFormatter {
    pub fn new(source: Arc<dyn SubmissionSource>) -> Self {
        Self { source }
    }

    /// Aggregate `items` (oldest first) into a single message.
    ///
    /// Enrichment failures degrade the affected line instead of failing.
    pub async fn format(&self, account: &str, items: &[SubmissionItem]) -> OutboundMessage {
        let mut text = String::new();
        for item in items {
            let line = match self.source.fetch_item_detail(&item.title_slug).await {
                Ok(detail) => submission_line(
                    account,
                    item,
                    Ok((detail.difficulty.emoji(), detail.acceptance.as_str())),
                ),
                Err(e) => {
                    warn!("Failed to fetch details for {}: {}", item.title_slug, e);
                    submission_line(account, item, Err(&e))
                }
            };
            text.push_str(&line);
        }

        OutboundMessage {
            text,
            flags: MessageFlags::html().without_preview(),
        }
    }
}

pub fn game_started(account: &str, game_id: &str) -> OutboundMessage {
    OutboundMessage {
        text: format!("{} is playing:\n{}", account, LichessClient::game_url(game_id)),
        flags: MessageFlags::PLAIN.without_preview().silent(),
    }
}

pub fn account_not_found(account: &str) -> OutboundMessage {
    OutboundMessage {
        text: format!("Lichess user {} not found", account),
        flags: MessageFlags::PLAIN,
    }
}

/// Flags used when editing a game message.
pub fn game_edit_flags() -> MessageFlags {
    MessageFlags::PLAIN.without_preview()
}

fn participant_line(marker: &str, player: &Participant) -> String {
    let rating = player
        .rating
        .map(|r| r.to_string())
        .unwrap_or_else(|| "?".to_string());
    match player.rating_diff {
        Some(diff) => format!("\n{}{} rating {} {:+}", marker, player.name, rating, diff),
        None => format!("\n{}{} rating {}", marker, player.name, rating),
    }
}

/// Suffix appended to the game message once the result is known.
pub fn game_finished_suffix(game: &FinishedGame) -> String {
    format!(
        "\nGame finished: {}{}{}",
        game.status,
        participant_line("\u{26aa}\u{fe0f}", &game.white),
        participant_line("\u{26ab}\u{fe0f}", &game.black)
    )
}

pub fn watch_failed_suffix(error: &dyn std::fmt::Display) -> String {
    format!("\nCouldn't update game status: {}", error)
}

pub const WATCH_GAVE_UP_SUFFIX: &str = "\nGave up waiting for the game result";
