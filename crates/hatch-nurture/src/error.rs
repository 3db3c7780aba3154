//! Error types for the Conversation Engine.

use hatch_core::error::HatchError;
use hatch_llm::LlmError;

/// Errors from submitting a message or generating a document.
#[derive(Debug, thiserror::Error)]
pub enum NurtureError {
    #[error("authentication required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream error: {0}")]
    Upstream(#[from] LlmError),
}

impl NurtureError {
    pub(crate) fn premium_required() -> Self {
        NurtureError::Forbidden("Premium subscription required".to_string())
    }
}

impl From<NurtureError> for HatchError {
    fn from(err: NurtureError) -> Self {
        match err {
            NurtureError::Unauthorized => HatchError::Api(err.to_string()),
            NurtureError::Forbidden(msg) => HatchError::Forbidden(msg),
            NurtureError::InvalidInput(msg) => HatchError::InvalidInput(msg),
            NurtureError::NotFound(msg) => HatchError::NotFound(msg),
            NurtureError::Upstream(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nurture_error_display() {
        assert_eq!(NurtureError::Unauthorized.to_string(), "authentication required");
        assert_eq!(
            NurtureError::premium_required().to_string(),
            "Premium subscription required"
        );
        assert_eq!(
            NurtureError::InvalidInput("message cannot be empty".to_string()).to_string(),
            "invalid input: message cannot be empty"
        );
        let err: NurtureError = LlmError::Backend("overloaded".to_string()).into();
        assert_eq!(
            err.to_string(),
            "upstream error: backend reported an error: overloaded"
        );
    }

    #[test]
    fn test_nurture_error_into_hatch_error() {
        let err: HatchError = NurtureError::NotFound("document".to_string()).into();
        assert!(matches!(err, HatchError::NotFound(_)));

        let err: HatchError = NurtureError::Upstream(LlmError::Request("reset".to_string())).into();
        assert!(matches!(err, HatchError::Upstream(_)));
    }
}
