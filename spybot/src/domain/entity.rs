//! Tracked entities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// External site an account lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Accepted-submission feed.
    LeetCode,
    /// Live-game status.
    Lichess,
}

impl SourceKind {
    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeetCode => "leetcode",
            Self::Lichess => "lichess",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "leetcode" => Some(Self::LeetCode),
            "lichess" => Some(Self::Lichess),
            _ => None,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| Error::validation(format!("unknown source: {}", s)))
    }
}

/// Identity of one tracked account within one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub chat_id: i64,
    pub source: SourceKind,
    pub account: String,
}

impl EntityKey {
    pub fn new(chat_id: i64, source: SourceKind, account: impl Into<String>) -> Self {
        Self {
            chat_id,
            source,
            account: account.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.chat_id, self.source, self.account)
    }
}

/// One external account watched for a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub source: SourceKind,
    pub account: String,
    /// Identifier of the most recently reported item, if any.
    pub watermark: Option<String>,
    /// Whether the subscriber was already told the account does not exist.
    pub not_found_notified: bool,
}

impl TrackedEntity {
    pub fn new(source: SourceKind, account: impl Into<String>) -> Self {
        Self {
            source,
            account: account.into(),
            watermark: None,
            not_found_notified: false,
        }
    }

    pub fn key(&self, chat_id: i64) -> EntityKey {
        EntityKey::new(chat_id, self.source, self.account.clone())
    }

    /// Name shown to subscribers; LeetCode accounts stay unprefixed.
    pub fn display_name(&self) -> String {
        match self.source {
            SourceKind::LeetCode => self.account.clone(),
            SourceKind::Lichess => format!("lichess:{}", self.account),
        }
    }
}
