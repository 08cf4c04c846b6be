use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    /// Stops the whole pass (bad credentials, missing configuration).
    #[error("fatal: {0}")]
    Fatal(String),
}

impl OracleError {
    pub fn timeout(after: Duration) -> Self {
        OracleError::Timeout {
            after_ms: after.as_millis() as u64,
        }
    }

    /// Worth retrying with backoff.
    ///
    /// Any non-2xx status counts; providers map auth failures to `Fatal`
    /// and 429 to `RateLimited` before it gets here. Timeouts are not
    /// retried: a timed-out batch degrades to a no-op.
    pub fn is_transient(&self) -> bool {
        match self {
            OracleError::Network(_)
            | OracleError::RateLimited { .. }
            | OracleError::InvalidResponse(_)
            | OracleError::Http { .. } => true,
            OracleError::Timeout { .. } | OracleError::Fatal(_) => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, OracleError::Fatal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(OracleError::Network("reset".into()).is_transient());
        assert!(OracleError::Http { status: 503, body: String::new() }.is_transient());
        assert!(OracleError::Http { status: 400, body: String::new() }.is_transient());
        assert!(OracleError::Http { status: 404, body: String::new() }.is_transient());
        assert!(!OracleError::timeout(Duration::from_secs(1)).is_transient());
        assert!(OracleError::Fatal("no key".into()).is_fatal());
    }
}
