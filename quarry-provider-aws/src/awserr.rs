//! Remote API errors
//!
//! SDK errors are flattened to an error code and message at the API seam so
//! handlers can classify them without depending on per-operation error enums.

use aws_sdk_lakeformation::error::{DisplayErrorContext, ProvideErrorMetadata};
use thiserror::Error;

/// Code used when the SDK error carries no service code (e.g. I/O failures)
pub const UNKNOWN_CODE: &str = "Unknown";

/// Code used for errors raised before a request is sent
pub const LOCAL_CODE: &str = "InvalidRequest";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Request rejected before reaching the service
    pub fn local(message: impl Into<String>) -> Self {
        Self::new(LOCAL_CODE, message)
    }

    /// Flatten an SDK error into its service code and message
    pub fn from_sdk<E>(err: E) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error,
    {
        let code = err.code().unwrap_or(UNKNOWN_CODE).to_string();
        let message = match err.message() {
            Some(message) => message.to_string(),
            None => DisplayErrorContext(&err).to_string(),
        };
        Self { code, message }
    }

    pub fn code_equals(&self, code: &str) -> bool {
        self.code == code
    }

    /// Error has `code` and its message contains `fragment`
    pub fn message_contains(&self, code: &str, fragment: &str) -> bool {
        self.code_equals(code) && self.message.contains(fragment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_code_and_message() {
        let err = ApiError::new(
            "AccessDeniedException",
            "User: arn:aws:iam::123456789012:role/x is not authorized to perform: lakeformation:CreateDataCellsFilter",
        );

        assert!(err.code_equals("AccessDeniedException"));
        assert!(err.message_contains("AccessDeniedException", "is not authorized"));
        assert!(!err.message_contains("ConcurrentModificationException", "is not authorized"));
        assert!(!err.message_contains("AccessDeniedException", "throttled"));
        assert!(err.to_string().starts_with("AccessDeniedException: User:"));
    }

    #[test]
    fn local_errors_use_their_own_code() {
        let err = ApiError::local("table_name was not specified");
        assert_eq!(err.code, LOCAL_CODE);
        assert_eq!(err.to_string(), "InvalidRequest: table_name was not specified");
    }
}
