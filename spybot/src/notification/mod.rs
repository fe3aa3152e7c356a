//! Chat delivery.
//!
//! The engine only talks to the [`ChatTransport`] trait; [`TelegramTransport`]
//! is the production implementation over the Telegram Bot API.

pub mod telegram;
pub mod transport;

pub use telegram::{TelegramConfig, TelegramTransport};
pub use transport::{ChatTransport, MessageFlags, MessageHandle};
