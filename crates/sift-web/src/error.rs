//! Mapping of core errors onto HTTP responses.

use axum::http::StatusCode;
use tracing::error;

use sift_core::SiftError;

pub type ApiError = (StatusCode, String);

pub fn status_of(err: &SiftError) -> StatusCode {
    match err.kind() {
        "not_found" => StatusCode::NOT_FOUND,
        "permission_denied" => StatusCode::FORBIDDEN,
        "invalid_request" => StatusCode::BAD_REQUEST,
        "build_in_progress" => StatusCode::CONFLICT,
        "backend_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert an error, logging only the unexpected ones.
pub fn api_error(err: SiftError) -> ApiError {
    let status = status_of(&err);
    if status.is_server_error() {
        error!(kind = err.kind(), error = %err, "Request failed");
    }
    (status, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statuses() {
        assert_eq!(status_of(&SiftError::not_found("entity x")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_of(&SiftError::Database(sift_db::DbError::NotFound("x".into()))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(&SiftError::permission_denied("enable_sql_queries")), StatusCode::FORBIDDEN);
        assert_eq!(status_of(&SiftError::invalid("limit")), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(&SiftError::BuildInProgress), StatusCode::CONFLICT);
        assert_eq!(status_of(&SiftError::BuildFailure("x".into())), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
