mod task;
mod user;

pub use task::{create_task, delete_task, get_task, list_tasks, update_task};
pub use user::{create_user, delete_user, get_user, list_users, update_user};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use mongodb::bson::oid::ObjectId;
use serde::Serialize;

use crate::errors::{AppError, AppResult};

// Every endpoint answers with this envelope; errors produce the same shape
// with data null (see errors::response).
#[derive(Serialize)]
struct Envelope<T> {
    message: String,
    data: Option<T>,
}

pub(crate) fn ok<T: Serialize>(data: T) -> Response {
    envelope(StatusCode::OK, data)
}

pub(crate) fn created<T: Serialize>(data: T) -> Response {
    envelope(StatusCode::CREATED, data)
}

fn envelope<T: Serialize>(status: StatusCode, data: T) -> Response {
    (
        status,
        Json(Envelope {
            message: "OK".to_string(),
            data: Some(data),
        }),
    )
        .into_response()
}

/// Rejects path ids that are not well-formed document ids, before any store
/// round-trip.
pub(crate) fn validate_id(id: &str, message: &'static str) -> AppResult<()> {
    ObjectId::parse_str(id)
        .map(|_| ())
        .map_err(|_| AppError::InvalidId(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_id_accepts_object_id_hex() {
        let id = ObjectId::new().to_hex();
        assert!(validate_id(&id, "Invalid task ID format").is_ok());
    }

    #[test]
    fn test_validate_id_rejects_malformed() {
        let err = validate_id("not-an-id", "Invalid task ID format").unwrap_err();
        assert!(matches!(err, AppError::InvalidId(ref m) if m == "Invalid task ID format"));
    }
}
