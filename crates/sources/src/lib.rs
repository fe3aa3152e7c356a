//! Clients for the external sites watched by spybot.
//!
//! Each site is exposed through a narrow async trait so the polling engine
//! can be driven by fakes in tests:
//! - [`SubmissionSource`]: recent accepted submissions (LeetCode)
//! - [`GameSource`]: live-game status and finished-game results (Lichess)

pub mod client;
pub mod error;
pub mod leetcode;
pub mod lichess;
pub mod source;

pub use client::{create_client_builder, default_client, install_rustls_provider};
pub use error::SourceError;
pub use leetcode::{Difficulty, LeetCodeClient, QuestionDetail, Snapshot, SubmissionItem};
pub use lichess::{ActivityResult, FinishedGame, LichessClient, Participant};
pub use source::{GameSource, SubmissionSource};
