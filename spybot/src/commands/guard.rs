//! Operator authorization.

use crate::{Error, Result};

/// Admits only the configured operator.
#[derive(Debug, Clone)]
pub struct OperatorGuard {
    operator: String,
}

impl OperatorGuard {
    /// `operator` is a Telegram username, with or without the leading `@`.
    pub fn new(operator: impl AsRef<str>) -> Self {
        Self {
            operator: operator.as_ref().trim_start_matches('@').to_string(),
        }
    }

    /// Telegram usernames are case-insensitive.
    pub fn check(&self, username: Option<&str>) -> Result<()> {
        match username {
            Some(name) if !self.operator.is_empty() && name.eq_ignore_ascii_case(&self.operator) => {
                Ok(())
            }
            _ => Err(Error::Unauthorized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check() {
        let guard = OperatorGuard::new("@Owner");
        assert!(guard.check(Some("owner")).is_ok());
        assert!(matches!(guard.check(Some("intruder")), Err(Error::Unauthorized)));
        assert!(matches!(guard.check(None), Err(Error::Unauthorized)));
        assert_eq!(Error::Unauthorized.to_string(), "User not recognized");
    }

    #[test]
    fn test_empty_operator_admits_nobody() {
        assert!(OperatorGuard::new("").check(Some("")).is_err());
    }
}
