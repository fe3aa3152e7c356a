//! Outbound chat transport abstraction.

use async_trait::async_trait;

use crate::Result;

/// Delivery options for one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageFlags {
    /// Parse the text as Telegram HTML.
    pub html: bool,
    pub disable_link_preview: bool,
    /// Deliver without a notification sound.
    pub silent: bool,
}

impl MessageFlags {
    /// Plain text with link previews enabled.
    pub const PLAIN: Self = Self {
        html: false,
        disable_link_preview: false,
        silent: false,
    };

    pub fn html() -> Self {
        Self {
            html: true,
            ..Self::PLAIN
        }
    }

    pub fn without_preview(mut self) -> Self {
        self.disable_link_preview = true;
        self
    }

    pub fn silent(mut self) -> Self {
        self.silent = true;
        self
    }
}

/// Reference to a delivered message, kept for later edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub chat_id: i64,
    pub message_id: i64,
    /// Text as originally sent.
    pub text: String,
}

/// A chat service that can deliver and edit messages.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        flags: MessageFlags,
    ) -> Result<MessageHandle>;

    /// Replace the text of a previously delivered message.
    async fn edit_message(
        &self,
        handle: &MessageHandle,
        text: &str,
        flags: MessageFlags,
    ) -> Result<()>;
}
