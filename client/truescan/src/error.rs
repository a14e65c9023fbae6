use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unauthorized")]
    Unauthorized,

    #[error("http {status}: {}", .body.as_deref().unwrap_or("<empty body>"))]
    Http { status: u16, body: Option<String> },

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    // 5xx responses are the only failures worth retrying while polling.
    pub fn is_server_error(&self) -> bool {
        matches!(self, ApiError::Http { status, .. } if (500..=599).contains(status))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("{operation} polling timed out after {}s", .budget.as_secs())]
    Timeout {
        operation: &'static str,
        budget: Duration,
    },

    #[error("polling cancelled")]
    Cancelled,
}

impl PollError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, PollError::Cancelled)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PollError::Timeout { .. })
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, PollError::Api(err) if err.is_server_error())
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Poll(PollError),

    #[error("{0}")]
    Failed(String),

    #[error("{0}")]
    Message(String),

    #[error("empty result")]
    EmptyResult,

    #[error("request cancelled")]
    Cancelled,
}

impl From<PollError> for ServiceError {
    fn from(err: PollError) -> Self {
        match err {
            PollError::Cancelled => ServiceError::Cancelled,
            PollError::Api(err) => ServiceError::Api(err),
            other => ServiceError::Poll(other),
        }
    }
}

impl ServiceError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ServiceError::Cancelled)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid api url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http(status: u16) -> ApiError {
        ApiError::Http { status, body: None }
    }

    #[test]
    fn only_5xx_counts_as_server_error() {
        assert!(http(500).is_server_error());
        assert!(http(503).is_server_error());
        assert!(http(599).is_server_error());
        assert!(!http(499).is_server_error());
        assert!(!http(600).is_server_error());
        assert!(!http(404).is_server_error());
        assert!(!ApiError::Unauthorized.is_server_error());
        let decode = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(!ApiError::Decode(decode).is_server_error());
    }

    #[test]
    fn poll_error_classification() {
        assert!(PollError::Cancelled.is_cancelled());
        assert!(PollError::from(http(502)).is_server_error());
        let timeout = PollError::Timeout {
            operation: "analysis",
            budget: Duration::from_secs(75),
        };
        assert!(timeout.is_timeout());
        assert_eq!(timeout.to_string(), "analysis polling timed out after 75s");
    }

    #[test]
    fn service_error_keeps_cancellation_distinct() {
        assert!(ServiceError::from(PollError::Cancelled).is_cancelled());
        assert!(matches!(
            ServiceError::from(PollError::Api(http(401))),
            ServiceError::Api(_)
        ));
        assert!(matches!(
            ServiceError::from(PollError::Timeout {
                operation: "reverse search",
                budget: Duration::from_secs(1),
            }),
            ServiceError::Poll(PollError::Timeout { .. })
        ));
    }
}
