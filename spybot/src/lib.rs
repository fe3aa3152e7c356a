//! spybot library crate.
//!
//! Watches LeetCode submissions and Lichess games for chat subscribers and
//! reports new activity through Telegram. Exposed as a library so the
//! engine can be driven by integration tests; their fakes live in
//! `test_utils` behind the `test-utils` feature.

pub mod commands;
pub mod config;
pub mod database;
pub mod domain;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod panic_hook;
pub mod scheduler;
pub mod store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{Error, Result};
