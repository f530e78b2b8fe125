use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QurlErrorKind {
    InvalidParams,
    Config,
    NotFound,
    HttpStatus,
    Timeout,
    Transport,
    Internal,
}

#[derive(Debug, Clone, Serialize)]
pub struct QurlError {
    pub kind: QurlErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl QurlError {
    pub fn new(kind: QurlErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            hint: None,
            details: None,
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(QurlErrorKind::InvalidParams, "INVALID_PARAMS", message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(QurlErrorKind::Config, "CONFIG", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(QurlErrorKind::NotFound, "NOT_FOUND", message)
    }

    /// A response arrived but its status was rejected by status validation.
    pub fn http_status(status: u16) -> Self {
        Self::new(
            QurlErrorKind::HttpStatus,
            "HTTP_STATUS",
            format!("Request failed with status code {}", status),
        )
        .with_details(serde_json::json!({ "status_code": status }))
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(QurlErrorKind::Timeout, "TIMEOUT", message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(QurlErrorKind::Transport, "TRANSPORT", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(QurlErrorKind::Internal, "INTERNAL", message)
    }

    /// True when no response could be obtained at all.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self.kind, QurlErrorKind::Transport | QurlErrorKind::Timeout)
    }
}

impl fmt::Display for QurlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for QurlError {}

impl From<std::io::Error> for QurlError {
    fn from(err: std::io::Error) -> Self {
        QurlError::internal(err.to_string())
    }
}

impl From<serde_json::Error> for QurlError {
    fn from(err: serde_json::Error) -> Self {
        QurlError::config(format!("Invalid JSON: {}", err))
    }
}

impl From<reqwest::Error> for QurlError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return QurlError::timeout(format!("HTTP request timed out: {}", err));
        }
        if err.is_builder() {
            return QurlError::invalid_params(format!("Invalid HTTP request: {}", err));
        }
        QurlError::transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::{QurlError, QurlErrorKind};

    #[test]
    fn transport_and_timeout_are_transport_failures() {
        assert!(QurlError::transport("refused").is_transport_failure());
        assert!(QurlError::timeout("slow").is_transport_failure());
        assert!(!QurlError::http_status(500).is_transport_failure());
        assert!(!QurlError::invalid_params("bad").is_transport_failure());
    }

    #[test]
    fn http_status_carries_code_in_details() {
        let err = QurlError::http_status(404);
        assert_eq!(err.kind, QurlErrorKind::HttpStatus);
        assert_eq!(err.message, "Request failed with status code 404");
        assert_eq!(err.details.unwrap()["status_code"], 404);
    }
}
