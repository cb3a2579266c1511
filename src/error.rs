//! Error handling for the expansion-tree session engine
//!
//! Two layers, mirroring how failures actually arrive: `ServiceError` is what
//! the remote markup channel can produce (the transport broke, or the service
//! answered with a well-formed failure payload), and `EngineError` tags a
//! service failure with the operation that was in flight so the hosting UI
//! can pick the right one-line message.

use thiserror::Error;

/// Failure of a single remote request.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The request channel itself failed (connection, timeout, non-success
    /// HTTP status).
    #[error("request failed: {message}")]
    Transport { message: String },

    /// The service answered, but the payload signals failure or lacks the
    /// field the operation needs.
    #[error("service error {code}: {info}")]
    Service { code: String, info: String },
}

impl ServiceError {
    pub fn transport(message: impl Into<String>) -> Self {
        ServiceError::Transport {
            message: message.into(),
        }
    }

    pub fn service(code: impl Into<String>, info: impl Into<String>) -> Self {
        ServiceError::Service {
            code: code.into(),
            info: info.into(),
        }
    }

    /// True for the parse API's "no text supplied" code, which the session
    /// tolerates silently.
    pub fn is_no_text(&self) -> bool {
        matches!(self, ServiceError::Service { code, .. } if code == "notext")
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        ServiceError::Transport {
            message: e.to_string(),
        }
    }
}

/// Main error type for session operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Another asynchronous operation holds the gate.
    #[error("another operation is in progress")]
    Busy,

    #[error("parse failed: {0}")]
    Parse(ServiceError),

    #[error("evaluation failed: {0}")]
    Eval(ServiceError),

    #[error("argument evaluation failed: {0}")]
    ArgEval(ServiceError),

    #[error("template name lookup failed: {0}")]
    TemplateName(ServiceError),

    #[error("template page fetch failed: {0}")]
    TemplatePage(ServiceError),

    #[error("no template found for '{invocation}'")]
    TemplateNotFound { invocation: String },

    #[error("'{title}' does not resolve to a template page")]
    NotATemplate { title: String },

    /// Defensive guard: a tree/id lookup that should never miss did.
    #[error("internal inconsistency: {message}")]
    Structure { message: String },
}

impl EngineError {
    pub fn structure(message: impl Into<String>) -> Self {
        EngineError::Structure {
            message: message.into(),
        }
    }
}

/// Result alias used throughout the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Result alias for raw service calls.
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_display() {
        let e = ServiceError::service("notext", "The text parameter must be set");
        assert_eq!(
            e.to_string(),
            "service error notext: The text parameter must be set"
        );
        assert!(e.is_no_text());
        assert!(!ServiceError::transport("boom").is_no_text());
    }

    #[test]
    fn test_operation_tagging() {
        let e = EngineError::Eval(ServiceError::transport("connection refused"));
        assert!(e.to_string().starts_with("evaluation failed"));
        assert!(matches!(e, EngineError::Eval(_)));
    }
}
