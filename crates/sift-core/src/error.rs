//! Centralized error types for Sift.

use thiserror::Error;

/// Main error type for the retrieval core.
#[derive(Error, Debug)]
pub enum SiftError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: '{capability}' is disabled for this agent")]
    PermissionDenied { capability: String },

    #[error("Search backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Knowledge graph build failed: {0}")]
    BuildFailure(String),

    #[error("A knowledge graph build is already running")]
    BuildInProgress,

    #[error("Knowledge graph build was cancelled")]
    BuildCancelled,

    #[error("Database error: {0}")]
    Database(#[from] sift_db::DbError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for Sift operations.
pub type SiftResult<T> = Result<T, SiftError>;

impl SiftError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn permission_denied(capability: impl Into<String>) -> Self {
        Self::PermissionDenied {
            capability: capability.into(),
        }
    }

    /// Stable category name, used by the web layer and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::InvalidRequest(_) => "invalid_request",
            Self::BuildFailure(_) | Self::BuildCancelled => "build_failure",
            Self::BuildInProgress => "build_in_progress",
            Self::Database(sift_db::DbError::NotFound(_)) => "not_found",
            Self::Database(_) | Self::Json(_) | Self::Config(_) => "internal",
        }
    }

    /// True for the expected "absent" outcome, database misses included.
    pub fn is_not_found(&self) -> bool {
        self.kind() == "not_found"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(SiftError::permission_denied("enable_sql_queries").kind(), "permission_denied");
        assert!(SiftError::from(sift_db::DbError::NotFound("x".into())).is_not_found());
        assert_eq!(SiftError::BuildCancelled.kind(), "build_failure");
    }

    #[test]
    fn test_permission_message_names_the_flag() {
        let msg = SiftError::permission_denied("enable_sql_queries").to_string();
        assert!(msg.contains("enable_sql_queries"));
    }
}
