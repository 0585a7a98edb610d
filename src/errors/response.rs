use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::errors::{is_duplicate_key, AppError};

// The IntoResponse implementation converts AppError into the
// {message, data: null} envelope every endpoint returns.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        (status, Json(json!({ "message": message, "data": null }))).into_response()
    }
}

impl AppError {
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidId(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, (*msg).to_string()),
            AppError::Reference(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),

            // Duplicate-key writes are conflicts (the only unique index is
            // the user email); everything else from the driver is internal.
            AppError::Database(err) if is_duplicate_key(err) => {
                (StatusCode::CONFLICT, "Email already exists".to_string())
            }
            AppError::Database(err) => {
                tracing::error!("database error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred".to_string(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_400() {
        let (status, msg) = AppError::Validation("Task name is required".into()).status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(msg, "Task name is required");
    }

    #[test]
    fn test_invalid_id_maps_to_400() {
        let (status, _) = AppError::InvalidId("Invalid task ID format".into()).status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let (status, msg) = AppError::NotFound("Task not found").status_and_message();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(msg, "Task not found");
    }

    #[test]
    fn test_reference_maps_to_400() {
        let (status, _) =
            AppError::Reference("Assigned user does not exist".into()).status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let (status, _) = AppError::Conflict("Email already exists".into()).status_and_message();
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
