use thiserror::Error;

/// Failure talking to an external site.
///
/// Both variants are transient from the engine's point of view: the next
/// scheduled poll simply tries again.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Transport error or non-2xx HTTP status.
    #[error("source unavailable: {0}")]
    Unavailable(String),
    /// The response could not be decoded into the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl SourceError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }

    /// Build the error for a non-success HTTP status.
    pub fn http_status(status: reqwest::StatusCode, url: &str) -> Self {
        Self::Unavailable(format!("HTTP {} from {}", status.as_u16(), url))
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}
