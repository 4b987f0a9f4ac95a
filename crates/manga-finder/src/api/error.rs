//! Error type for Jikan requests.

use thiserror::Error;

/// Failure of a single API request.
///
/// `Clone` because one result is handed to every caller waiting on the same
/// in-flight request, and errors are kept in the cache for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// No response (connection refused, timeout, DNS, ...)
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx response
    #[error("request failed with status {status}: {message}")]
    Http { status: u16, message: String },

    /// Body could not be decoded into the expected shape
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(429)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Parse(e.to_string())
        } else if let Some(status) = e.status() {
            ApiError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_helpers() {
        let err = ApiError::Http {
            status: 429,
            message: "Too Many Requests".to_string(),
        };
        assert_eq!(err.status(), Some(429));
        assert!(err.is_rate_limited());
        assert_eq!(ApiError::Network("refused".to_string()).status(), None);
    }

    #[test]
    fn test_from_serde_error() {
        let err = serde_json::from_str::<u32>("not json").unwrap_err();
        assert!(matches!(ApiError::from(err), ApiError::Parse(_)));
    }
}
