//! Domain layer for spybot.
//!
//! Subscriptions (chats), the accounts they track and the watermark cursor
//! kept for each of them.

pub mod entity;
pub mod subscription;

pub use entity::{EntityKey, SourceKind, TrackedEntity};
pub use subscription::Subscription;
