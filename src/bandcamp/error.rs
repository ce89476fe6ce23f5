use thiserror::Error;

/// Errors from talking to Bandcamp.
///
/// `is_retryable()` separates transient failures (rate limits, server errors,
/// dropped connections, timeouts) from ones that will not improve on a
/// second attempt.
#[derive(Debug, Error)]
pub enum BandcampError {
    #[error("HTTP error {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl BandcampError {
    /// Whether this error is transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self {
            BandcampError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            BandcampError::Transport { source, .. } => !(source.is_decode() || source.is_builder()),
            BandcampError::InvalidResponse { .. } => false,
            BandcampError::Client(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(status: u16) -> BandcampError {
        BandcampError::HttpStatus {
            status,
            url: "https://bandcamp.com/x".into(),
        }
    }

    #[test]
    fn test_client_errors_not_retryable() {
        assert!(!status(400).is_retryable());
        assert!(!status(403).is_retryable());
        assert!(!status(404).is_retryable());
    }

    #[test]
    fn test_rate_limit_and_server_errors_retryable() {
        assert!(status(429).is_retryable());
        assert!(status(500).is_retryable());
        assert!(status(503).is_retryable());
    }

    #[test]
    fn test_invalid_response_not_retryable() {
        let e = BandcampError::InvalidResponse {
            url: "u".into(),
            reason: "missing items".into(),
        };
        assert!(!e.is_retryable());
        assert!(e.to_string().contains("missing items"));
    }
}
