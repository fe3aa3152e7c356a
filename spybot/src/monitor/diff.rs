//! Pure state-delta computation.
//!
//! Nothing here performs I/O; the scheduler feeds fetched snapshots and the
//! stored watermark in and applies the resulting watermark after delivery.

use spybot_sources::{Snapshot, SubmissionItem};

/// Outcome of diffing a submission snapshot against a watermark.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubmissionDiff {
    /// Items to report, oldest first.
    pub new_items: Vec<SubmissionItem>,
    /// Watermark to store once `new_items` are delivered; `None` means keep.
    pub new_watermark: Option<String>,
}

impl SubmissionDiff {
    /// Whether there is anything to persist or deliver.
    pub fn is_noop(&self) -> bool {
        self.new_watermark.is_none()
    }

    /// True when the watermark moves without anything being reported.
    pub fn is_baseline(&self) -> bool {
        self.new_items.is_empty() && self.new_watermark.is_some()
    }
}

/// Compare a newest-first snapshot with the last reported submission id.
///
/// With no watermark the newest item becomes the baseline and nothing is
/// reported, so activating a subscription never replays history. When the
/// watermark is absent from the snapshot every item is considered new.
pub fn diff_submissions(snapshot: &Snapshot, watermark: Option<&str>) -> SubmissionDiff {
    let Some(newest) = snapshot.newest() else {
        return SubmissionDiff::default();
    };

    let Some(watermark) = watermark else {
        return SubmissionDiff {
            new_items: Vec::new(),
            new_watermark: Some(newest.id.clone()),
        };
    };

    if newest.id == watermark {
        return SubmissionDiff::default();
    }

    let mut new_items: Vec<SubmissionItem> = snapshot
        .items()
        .iter()
        .take_while(|item| item.id != watermark)
        .cloned()
        .collect();
    new_items.reverse();

    SubmissionDiff {
        new_items,
        new_watermark: Some(newest.id.clone()),
    }
}

/// Outcome of diffing a game status against a watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameDiff {
    Unchanged,
    /// A game not reported before is in progress.
    Started { game_id: String },
}

/// Compare the current game of an account with the last reported game id.
pub fn diff_game(current: Option<&str>, watermark: Option<&str>) -> GameDiff {
    match current {
        Some(game_id) if Some(game_id) != watermark => GameDiff::Started {
            game_id: game_id.to_string(),
        },
        _ => GameDiff::Unchanged,
    }
}
