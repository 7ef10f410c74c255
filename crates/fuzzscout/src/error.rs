//! Error types for the discovery core.

/// All errors raised by the discovery core.
///
/// Degraded navigation and per-task failures are not errors: they are carried
/// in [`crate::NavigationResult::ok`] and the harness task state respectively.
#[derive(thiserror::Error, Debug)]
pub enum ScoutError {
    /// The target URL is malformed or uses an unsupported scheme.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The target is outside the permitted scope (non-loopback without opt-in).
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// A stage-handoff artifact could not be interpreted.
    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScoutError {
    /// Stable machine-readable code, used in REST error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ScoutError::InvalidInput(_) => "E_INVALID_INPUT",
            ScoutError::PolicyViolation(_) => "E_POLICY",
            ScoutError::Artifact(_) => "E_ARTIFACT",
            ScoutError::Io(_) => "E_IO",
            ScoutError::Json(_) => "E_JSON",
        }
    }

    /// Whether this error is one of the two pre-flight rejections.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            ScoutError::InvalidInput(_) | ScoutError::PolicyViolation(_)
        )
    }
}

/// Convenience result type.
pub type ScoutResult<T> = Result<T, ScoutError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(
            ScoutError::InvalidInput("x".into()).code(),
            "E_INVALID_INPUT"
        );
        assert_eq!(ScoutError::PolicyViolation("x".into()).code(), "E_POLICY");
        assert!(ScoutError::PolicyViolation("x".into()).is_preflight());
        assert!(!ScoutError::Artifact("x".into()).is_preflight());
    }
}
