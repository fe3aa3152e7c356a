//! Change detection and notification text.

pub mod diff;
pub mod formatter;

pub use diff::{GameDiff, SubmissionDiff, diff_game, diff_submissions};
pub use formatter::{OutboundMessage, SubmissionFormatter};
