use axum::{
    extract::{Path, Query, State},
    response::{Json, Response},
};
use mongodb::bson::Document;

use super::{created, ok, validate_id};
use crate::config::Config;
use crate::errors::{is_duplicate_key, AppError, AppResult};
use crate::models::UserInput;
use crate::query::{self, QueryLimits, RawQuery, SelectQuery};
use crate::services::{sync, Store};

pub async fn list_users(
    State((store, config)): State<(Store, Config)>,
    Query(raw): Query<RawQuery>,
) -> AppResult<Response> {
    let limits = QueryLimits {
        default_limit: config.query.users_default_limit,
        max_limit: config.query.max_limit,
    };
    let q = query::translate(&raw, &limits)?;

    if q.count {
        let count = store.count_users(q.filter).await?;
        return Ok(ok(count));
    }

    let users = store.list_users(&q).await?;
    tracing::info!(count = users.len(), "fetched users");
    Ok(ok(users))
}

pub async fn create_user(
    State((store, _)): State<(Store, Config)>,
    Json(input): Json<UserInput>,
) -> AppResult<Response> {
    let user = input.into_user()?;
    // A duplicate email trips the unique index.
    store.insert_user(&user).await.map_err(|err| match err {
        AppError::Database(ref e) if is_duplicate_key(e) => {
            AppError::Conflict("Email already exists".into())
        }
        other => other,
    })?;
    tracing::info!(id = %user.id, "created user");
    Ok(created(user))
}

pub async fn get_user(
    State((store, _)): State<(Store, Config)>,
    Path(id): Path<String>,
    Query(raw): Query<SelectQuery>,
) -> AppResult<Response> {
    validate_id(&id, "Invalid user ID format")?;
    let projection = raw.projection()?;

    let user = store
        .get_user_doc(&id, projection)
        .await?
        .ok_or(AppError::NotFound("User not found"))?;
    tracing::info!(id = %id, "fetched user");
    Ok(ok(user))
}

pub async fn update_user(
    State((store, _)): State<(Store, Config)>,
    Path(id): Path<String>,
    Json(changes): Json<Document>,
) -> AppResult<Response> {
    validate_id(&id, "Invalid user ID format")?;
    let user = sync::update_user(&store, &id, &changes).await?;
    tracing::info!(id = %id, "updated user");
    Ok(ok(user))
}

pub async fn delete_user(
    State((store, _)): State<(Store, Config)>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    validate_id(&id, "Invalid user ID format")?;
    let user = sync::delete_user(&store, &id).await?;
    tracing::info!(id = %id, "deleted user");
    Ok(ok(user))
}
