//! Error types for Beehive.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A required credential or URL is missing. Fatal, raised before any remote call.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A ritual answered with a non-2xx status.
    #[error("Ritual '{ritual}' failed with status {status}: {body}")]
    Invocation {
        ritual: String,
        status: u16,
        body: String,
    },

    /// The request never produced a response (connect, DNS, timeout).
    #[error("Transport error calling '{target}': {message}")]
    Transport { target: String, message: String },

    /// A ritual answered 2xx but the body does not have the expected shape.
    #[error("Malformed response from '{ritual}': {detail}")]
    MalformedResponse { ritual: String, detail: String },

    /// The coherence check explicitly rejected the change.
    #[error("Coherence check failed. Reason: {0}")]
    GateFailure(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Channel '{channel}' failed: {detail}")]
    Channel { channel: String, detail: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn malformed(ritual: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            ritual: ritual.into(),
            detail: detail.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_gate(&self) -> bool {
        matches!(self, Self::GateFailure(_))
    }

    /// HTTP status of a failed ritual call, if this error came from one.
    pub fn invocation_status(&self) -> Option<u16> {
        match self {
            Self::Invocation { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invocation_display_names_ritual_and_status() {
        let err = Error::Invocation {
            ritual: "risk-score".into(),
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(
            err.to_string(),
            "Ritual 'risk-score' failed with status 502: bad gateway"
        );
        assert_eq!(err.invocation_status(), Some(502));
    }

    #[test]
    fn test_gate_failure_carries_reason() {
        let err = Error::GateFailure("drift".into());
        assert!(err.is_gate());
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("drift"));
    }
}
