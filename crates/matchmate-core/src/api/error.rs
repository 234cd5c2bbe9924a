use thiserror::Error;

use super::envelope::{Envelope, FieldErrors};
use super::transport::{Response, TransportError};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Validation failed: {0}")]
    Validation(FieldErrors),

    #[error("Server rejected request ({status}): {}", .envelope.summary())]
    Server {
        status: u16,
        envelope: Envelope<serde_json::Value>,
    },

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Session refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Credential storage error: {0}")]
    Storage(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Error for a non-2xx response: the server's envelope when it sent one,
    /// otherwise the status and (truncated) raw body.
    pub fn from_response(response: &Response) -> Self {
        match response.envelope::<serde_json::Value>() {
            Some(envelope) => ApiError::Server {
                status: response.status,
                envelope,
            },
            None => ApiError::Status {
                status: response.status,
                body: Self::truncate_body(&response.body),
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } | ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Field errors to show next to form inputs, local or server-provided.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            ApiError::Validation(errors) => Some(errors),
            ApiError::Server { envelope, .. } => envelope.errors.as_ref(),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Storage(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_response_with_envelope() {
        let response = Response::new(
            401,
            json!({
                "success": false,
                "message": "Invalid username or password",
                "errors": {"auth": ["Invalid username or password"]}
            })
            .to_string(),
        );
        let err = ApiError::from_response(&response);
        assert!(err.is_unauthorized());
        assert_eq!(
            err.field_errors().map(|e| e.get("auth").to_vec()),
            Some(vec!["Invalid username or password".to_string()])
        );
        assert_eq!(
            err.to_string(),
            "Server rejected request (401): Invalid username or password"
        );
    }

    #[test]
    fn test_from_response_without_envelope_truncates() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 100);
        let err = ApiError::from_response(&Response::new(502, body));
        match err {
            ApiError::Status { status, body } => {
                assert_eq!(status, 502);
                assert!(body.contains("truncated, 600 total bytes"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = "é".repeat(MAX_ERROR_BODY_LENGTH);
        let truncated = ApiError::truncate_body(&body);
        assert!(truncated.starts_with('é'));
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn test_network_errors_have_no_status() {
        let err = ApiError::from(TransportError::Connect("refused".to_string()));
        assert_eq!(err.status(), None);
        assert!(!err.is_unauthorized());
        assert!(err.field_errors().is_none());
    }
}
