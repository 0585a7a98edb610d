use axum::{
    extract::{Path, Query, State},
    response::{Json, Response},
};
use mongodb::bson::Document;

use super::{created, ok, validate_id};
use crate::config::Config;
use crate::errors::{AppError, AppResult};
use crate::models::TaskInput;
use crate::query::{self, QueryLimits, RawQuery, SelectQuery};
use crate::services::{sync, Store};

pub async fn list_tasks(
    State((store, config)): State<(Store, Config)>,
    Query(raw): Query<RawQuery>,
) -> AppResult<Response> {
    let limits = QueryLimits {
        default_limit: config.query.tasks_default_limit,
        max_limit: config.query.max_limit,
    };
    let q = query::translate(&raw, &limits)?;

    if q.count {
        let count = store.count_tasks(q.filter).await?;
        return Ok(ok(count));
    }

    let tasks = store.list_tasks(&q).await?;
    tracing::info!(count = tasks.len(), "fetched tasks");
    Ok(ok(tasks))
}

pub async fn create_task(
    State((store, _)): State<(Store, Config)>,
    Json(input): Json<TaskInput>,
) -> AppResult<Response> {
    let task = input.into_task()?;
    let task = sync::create_task(&store, task).await?;
    tracing::info!(id = %task.id, "created task");
    Ok(created(task))
}

pub async fn get_task(
    State((store, _)): State<(Store, Config)>,
    Path(id): Path<String>,
    Query(raw): Query<SelectQuery>,
) -> AppResult<Response> {
    validate_id(&id, "Invalid task ID format")?;
    let projection = raw.projection()?;

    let task = store
        .get_task_doc(&id, projection)
        .await?
        .ok_or(AppError::NotFound("Task not found"))?;
    tracing::info!(id = %id, "fetched task");
    Ok(ok(task))
}

pub async fn update_task(
    State((store, _)): State<(Store, Config)>,
    Path(id): Path<String>,
    Json(changes): Json<Document>,
) -> AppResult<Response> {
    validate_id(&id, "Invalid task ID format")?;
    let task = sync::update_task(&store, &id, &changes).await?;
    tracing::info!(id = %id, "updated task");
    Ok(ok(task))
}

pub async fn delete_task(
    State((store, _)): State<(Store, Config)>,
    Path(id): Path<String>,
) -> AppResult<Response> {
    validate_id(&id, "Invalid task ID format")?;
    let task = sync::delete_task(&store, &id).await?;
    tracing::info!(id = %id, "deleted task");
    Ok(ok(task))
}
