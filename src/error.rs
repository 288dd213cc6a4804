use thiserror::Error;

/// Remote repository failures, split the way the reconciliation loop needs
/// them: not-found is an expected outcome (orphan cleanup), transient errors
/// are retried, anything else fails the document for this pass.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("resource not found")]
    NotFound,

    #[error("transient remote error: {0}")]
    Transient(String),

    #[error("remote request rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected response shape: {0}")]
    Decode(String),
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else {
            // Connect failures, timeouts, and dropped bodies are all worth a
            // retry on the next attempt or the next cycle.
            RemoteError::Transient(err.to_string())
        }
    }
}
