use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("storage unavailable: {0}")]
    Transient(String),
}

impl DomainError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn report_not_found(report_id: &str) -> Self {
        Self::NotFound(format!("report '{report_id}'"))
    }

    pub fn user_not_found(user_id: &str) -> Self {
        Self::NotFound(format!("user '{user_id}'"))
    }

    /// Only storage-level failures are worth retrying; the other kinds need
    /// different input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Transient(_) => "transient",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_is_retryable() {
        assert!(DomainError::Transient("timeout".into()).is_retryable());
        assert!(!DomainError::conflict("merged").is_retryable());
        assert!(!DomainError::invalid("vote").is_retryable());
        assert!(!DomainError::report_not_found("r1").is_retryable());
    }

    #[test]
    fn not_found_names_the_missing_entity() {
        assert_eq!(
            DomainError::user_not_found("u1").to_string(),
            "not found: user 'u1'"
        );
    }
}
