use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndexerError {
    /// Non-success HTTP status
    #[error("indexer returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection failure, timeout or other transport error
    #[error("indexer request failed: {0}")]
    Transport(String),

    /// Response body did not match the expected record
    #[error("failed to decode indexer response: {0}")]
    Decode(String),

    /// Error parsing or validating URLs
    #[error("invalid indexer url: {0}")]
    InvalidUrl(String),
}

impl IndexerError {
    pub fn is_retryable(&self) -> bool {
        is_retryable(self)
    }

    /// Whether the indexer does not know the deposit yet.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Status { status: 404, .. })
    }
}

impl From<reqwest::Error> for IndexerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Decode(e.to_string());
        }
        match e.status() {
            Some(status) => Self::Status {
                status: status.as_u16(),
                body: String::new(),
            },
            None => Self::Transport(e.to_string()),
        }
    }
}

/// Retry classification shared by every indexer call.
///
/// Only transport failures and server errors (5xx) are retried immediately with
/// backoff. Every other status, 4xx as well as unexpected 1xx/3xx, and undecodable
/// bodies wait for the next refetch.
pub const fn is_retryable(error: &IndexerError) -> bool {
    match error {
        IndexerError::Status { status, .. } => *status >= 500,
        IndexerError::Transport(_) => true,
        IndexerError::Decode(_) | IndexerError::InvalidUrl(_) => false,
    }
}
