//! Command types.

use std::fmt;

use crate::domain::{SourceKind, TrackedEntity};

/// An account named in a command argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AccountRef {
    pub source: SourceKind,
    pub account: String,
}

impl AccountRef {
    pub fn new(source: SourceKind, account: impl Into<String>) -> Self {
        Self {
            source,
            account: account.into(),
        }
    }

    /// Parse `name`, `leetcode:name` or `lichess:name`.
    pub fn parse(arg: &str, default_source: SourceKind) -> Result<Self, String> {
        let (source, account) = match arg.split_once(':') {
            Some((prefix, account)) => {
                let source = SourceKind::parse(prefix)
                    .ok_or_else(|| format!("Unknown source '{}' in {}", prefix, arg))?;
                (source, account)
            }
            None => (default_source, arg),
        };
        if account.is_empty() {
            return Err(format!("Missing account name in {}", arg));
        }
        Ok(Self::new(source, account))
    }

    /// Same rendering as [`TrackedEntity::display_name`].
    pub fn display_name(&self) -> String {
        TrackedEntity::new(self.source, self.account.clone()).display_name()
    }
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_name())
    }
}

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Stop,
    Status,
    AddEntities(Vec<AccountRef>),
    RemoveEntities(Vec<AccountRef>),
    ClearAll,
    /// A known command with unusable arguments.
    Invalid { reason: String },
    Unknown(String),
}

impl Command {
    /// Whether only the operator may run this command.
    pub fn requires_operator(&self) -> bool {
        !matches!(self, Self::Status | Self::Unknown(_))
    }
}
