//! Update Engine Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpdateError {
    /// The download URL could not be parsed. Never retried.
    #[error("Malformed download URL \"{url}\": {reason}")]
    MalformedUrl { url: String, reason: String },

    /// Transport, timeout or truncation failure that outlived the retry ceiling.
    #[error(
        "Network error downloading {url} after {attempts} attempt(s), received {received} of {} bytes: {reason}",
        describe_total(.expected)
    )]
    Network {
        url: String,
        attempts: u32,
        received: u64,
        expected: Option<u64>,
        reason: String,
    },

    /// Content-level failure. Retrying the fetch cannot fix it.
    #[error("Update is invalid - {0}")]
    InvalidUpdate(String),

    /// Unexpected filesystem or serialization failure.
    #[error("{context}: {source}")]
    Unknown {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl UpdateError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidUpdate(message.into())
    }

    pub fn unknown<E>(context: impl Into<String>, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Unknown {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Whether the caller should keep the current package and report the failure
    /// as a bad update rather than a connectivity problem.
    pub fn is_content_error(&self) -> bool {
        matches!(self, Self::InvalidUpdate(_))
    }
}

fn describe_total(expected: &Option<u64>) -> String {
    match expected {
        Some(total) => total.to_string(),
        None => "unknown".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, UpdateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_error_reports_byte_counts() {
        let err = UpdateError::Network {
            url: "https://cdn.example.com/pkg".to_string(),
            attempts: 21,
            received: 512,
            expected: Some(1024),
            reason: "connection reset".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("21 attempt(s)"));
        assert!(message.contains("received 512 of 1024 bytes"));
    }

    #[test]
    fn test_network_error_unknown_total() {
        let err = UpdateError::Network {
            url: "https://cdn.example.com/pkg".to_string(),
            attempts: 1,
            received: 0,
            expected: None,
            reason: "refused".to_string(),
        };
        assert!(err.to_string().contains("of unknown bytes"));
    }

    #[test]
    fn test_unknown_wraps_io_source() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = UpdateError::unknown("Error writing status file", io);
        assert_eq!(err.to_string(), "Error writing status file: disk full");
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_content_error());
        assert!(UpdateError::invalid("bad").is_content_error());
    }
}
