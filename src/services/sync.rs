//! Keeps the Task/User cross-references consistent across writes.
//!
//! Every flow here touches more than one document, so each runs inside a
//! [`TxScope`]: a transaction when the store supports one, sequential
//! best-effort writes otherwise. In best-effort mode a failure partway
//! through can leave the two collections transiently inconsistent; there is
//! no reconciliation job, which is why the fallback is logged loudly.
//!
//! The decision rules themselves (which holders to unlink, which tasks to
//! reassign or release) are computed by the pure `plan_*` functions from the
//! pre- and post-images, so they are testable without a store; the async
//! step functions only execute the plan.

use mongodb::bson::{doc, Document};
use mongodb::{Client, ClientSession};

use crate::errors::{AppError, AppResult};
use crate::models::{task, user, Task, User, UNASSIGNED};
use crate::services::Store;

/// Transaction-or-fallback scope for multi-document writes.
pub enum TxScope {
    Atomic(ClientSession),
    BestEffort,
}

impl TxScope {
    /// Tries to open a transactional session; falls back to sequential
    /// writes with a warning when the store cannot provide one.
    pub async fn begin(client: &Client, op: &str) -> Self {
        match client.start_session().await {
            Ok(mut session) => match session.start_transaction().await {
                Ok(()) => TxScope::Atomic(session),
                Err(err) => {
                    tracing::warn!(
                        "transactions not available for {}, proceeding without: {}",
                        op,
                        err
                    );
                    TxScope::BestEffort
                }
            },
            Err(err) => {
                tracing::warn!(
                    "could not start session for {}, proceeding without: {}",
                    op,
                    err
                );
                TxScope::BestEffort
            }
        }
    }

    pub fn session(&mut self) -> Option<&mut ClientSession> {
        match self {
            TxScope::Atomic(session) => Some(session),
            TxScope::BestEffort => None,
        }
    }

    pub async fn commit(self) -> AppResult<()> {
        if let TxScope::Atomic(mut session) = self {
            session.commit_transaction().await?;
        }
        Ok(())
    }

    /// Rolls back when atomic; in best-effort mode the writes already made
    /// stay applied.
    pub async fn abort(self) {
        if let TxScope::Atomic(mut session) = self {
            if let Err(err) = session.abort_transaction().await {
                tracing::warn!("failed to abort transaction: {}", err);
            }
        }
    }
}

/// Reference bookkeeping a task update requires, derived from the pre- and
/// post-images.
#[derive(Debug, PartialEq)]
struct TaskSyncPlan {
    /// Previous holder losing the task.
    unlink_prev: Option<String>,
    /// New assignee, who must exist for the update to stand.
    verify_new: Option<NewAssignee>,
    /// Holder to pull a newly-completed task from.
    unlink_completed: Option<String>,
}

#[derive(Debug, PartialEq)]
struct NewAssignee {
    user_id: String,
    /// Completed tasks are never pending, so they are not linked.
    link: bool,
    /// Refresh the denormalized name unless the update set one explicitly.
    refresh_name: bool,
}

fn plan_task_sync(prev: &Task, updated: &Task, explicit_name: bool) -> TaskSyncPlan {
    let changed = updated.assigned_user != prev.assigned_user;

    let unlink_prev = (changed && !prev.assigned_user.is_empty())
        .then(|| prev.assigned_user.clone());

    let verify_new = (changed && !updated.assigned_user.is_empty()).then(|| NewAssignee {
        user_id: updated.assigned_user.clone(),
        link: !updated.completed,
        refresh_name: !explicit_name,
    });

    let unlink_completed =
        (!updated.assigned_user.is_empty() && updated.completed && !prev.completed)
            .then(|| updated.assigned_user.clone());

    TaskSyncPlan {
        unlink_prev,
        verify_new,
        unlink_completed,
    }
}

/// Holder to unlink before a task is deleted, if any.
fn plan_task_delete(task: &Task) -> Option<&str> {
    (!task.assigned_user.is_empty()).then(|| task.assigned_user.as_str())
}

/// Cascades a user update requires: tasks to claim, tasks to release, and
/// the renamed display name to push onto assigned tasks.
#[derive(Debug, PartialEq)]
struct UserSyncPlan {
    to_assign: Vec<String>,
    to_release: Vec<String>,
    rename: Option<String>,
}

fn plan_user_sync(prev: &User, updated: &User, pending_supplied: bool) -> UserSyncPlan {
    let (to_assign, to_release) = if pending_supplied {
        pending_diff(&prev.pending_tasks, &updated.pending_tasks)
    } else {
        (Vec::new(), Vec::new())
    };

    let rename = (updated.name != prev.name).then(|| updated.name.clone());

    UserSyncPlan {
        to_assign,
        to_release,
        rename,
    }
}

pub async fn create_task(store: &Store, task: Task) -> AppResult<Task> {
    let mut scope = TxScope::begin(store.client(), "task create").await;
    match create_task_steps(store, &mut scope, task).await {
        Ok(task) => {
            scope.commit().await?;
            Ok(task)
        }
        Err(err) => {
            scope.abort().await;
            Err(err)
        }
    }
}

async fn create_task_steps(store: &Store, scope: &mut TxScope, mut task: Task) -> AppResult<Task> {
    if task.assigned_user.is_empty() {
        if task.assigned_user_name.is_empty() {
            task.assigned_user_name = UNASSIGNED.to_string();
        }
        store.insert_task(&task, scope.session()).await?;
        return Ok(task);
    }

    let assignee = store
        .find_user(&task.assigned_user, scope.session())
        .await?
        .ok_or_else(|| AppError::Reference("Assigned user does not exist".into()))?;

    // The denormalized display name defaults to the assignee's actual name;
    // an explicitly supplied one wins.
    if task.assigned_user_name.is_empty() {
        task.assigned_user_name = assignee.name;
    }

    store.insert_task(&task, scope.session()).await?;
    if !task.completed {
        store
            .link_task(&task.assigned_user, &task.id, scope.session())
            .await?;
    }
    Ok(task)
}

pub async fn update_task(store: &Store, id: &str, changes: &Document) -> AppResult<Task> {
    let set = task::sanitize_changes(changes)?;
    let mut scope = TxScope::begin(store.client(), "task update").await;
    match update_task_steps(store, &mut scope, id, set).await {
        Ok(task) => {
            scope.commit().await?;
            Ok(task)
        }
        Err(err) => {
            scope.abort().await;
            Err(err)
        }
    }
}

async fn update_task_steps(
    store: &Store,
    scope: &mut TxScope,
    id: &str,
    set: Document,
) -> AppResult<Task> {
    let explicit_name = set.contains_key("assignedUserName");

    let prev = store
        .find_task(id, scope.session())
        .await?
        .ok_or(AppError::NotFound("Task not found"))?;
    let mut updated = store
        .update_task(id, set, scope.session())
        .await?
        .ok_or(AppError::NotFound("Task not found"))?;

    let plan = plan_task_sync(&prev, &updated, explicit_name);

    if let Some(prev_user) = &plan.unlink_prev {
        store.unlink_task(prev_user, id, scope.session()).await?;
    }

    if let Some(new) = &plan.verify_new {
        let assignee = store
            .find_user(&new.user_id, scope.session())
            .await?
            .ok_or_else(|| AppError::Reference("Assigned user does not exist".into()))?;
        if new.link {
            store.link_task(&new.user_id, id, scope.session()).await?;
        }
        if new.refresh_name {
            if let Some(after) = store
                .update_task(
                    id,
                    doc! { "assignedUserName": assignee.name.as_str() },
                    scope.session(),
                )
                .await?
            {
                updated = after;
            }
        }
    }

    if let Some(holder) = &plan.unlink_completed {
        store.unlink_task(holder, id, scope.session()).await?;
    }

    Ok(updated)
}

pub async fn delete_task(store: &Store, id: &str) -> AppResult<Task> {
    let mut scope = TxScope::begin(store.client(), "task delete").await;
    match delete_task_steps(store, &mut scope, id).await {
        Ok(task) => {
            scope.commit().await?;
            Ok(task)
        }
        Err(err) => {
            scope.abort().await;
            Err(err)
        }
    }
}

async fn delete_task_steps(store: &Store, scope: &mut TxScope, id: &str) -> AppResult<Task> {
    let task = store
        .find_task(id, scope.session())
        .await?
        .ok_or(AppError::NotFound("Task not found"))?;

    if let Some(holder) = plan_task_delete(&task) {
        let holder = holder.to_string();
        store.unlink_task(&holder, id, scope.session()).await?;
    }

    store
        .delete_task(id, scope.session())
        .await?
        .ok_or(AppError::NotFound("Task not found"))
}

pub async fn update_user(store: &Store, id: &str, changes: &Document) -> AppResult<User> {
    let set = user::sanitize_changes(changes)?;
    let mut scope = TxScope::begin(store.client(), "user update").await;
    match update_user_steps(store, &mut scope, id, set).await {
        Ok(user) => {
            scope.commit().await?;
            Ok(user)
        }
        Err(err) => {
            scope.abort().await;
            Err(err)
        }
    }
}

async fn update_user_steps(
    store: &Store,
    scope: &mut TxScope,
    id: &str,
    set: Document,
) -> AppResult<User> {
    let pending_supplied = set.contains_key("pendingTasks");

    let prev = store
        .find_user(id, scope.session())
        .await?
        .ok_or(AppError::NotFound("User not found"))?;
    let updated = store
        .update_user(id, set, scope.session())
        .await?
        .ok_or(AppError::NotFound("User not found"))?;

    let plan = plan_user_sync(&prev, &updated, pending_supplied);

    // Every task being claimed must exist before anything is mutated.
    for task_id in &plan.to_assign {
        if store.find_task(task_id, scope.session()).await?.is_none() {
            return Err(AppError::Reference(format!(
                "Task {} does not exist",
                task_id
            )));
        }
    }
    for task_id in &plan.to_assign {
        store
            .assign_task(task_id, &updated.id, &updated.name, scope.session())
            .await?;
    }
    if !plan.to_release.is_empty() {
        store.unassign_tasks(&plan.to_release, scope.session()).await?;
    }

    if let Some(name) = &plan.rename {
        store.rename_assignee(id, name, scope.session()).await?;
    }

    Ok(updated)
}

pub async fn delete_user(store: &Store, id: &str) -> AppResult<User> {
    let mut scope = TxScope::begin(store.client(), "user delete").await;
    match delete_user_steps(store, &mut scope, id).await {
        Ok(user) => {
            scope.commit().await?;
            Ok(user)
        }
        Err(err) => {
            scope.abort().await;
            Err(err)
        }
    }
}

async fn delete_user_steps(store: &Store, scope: &mut TxScope, id: &str) -> AppResult<User> {
    let user = store
        .find_user(id, scope.session())
        .await?
        .ok_or(AppError::NotFound("User not found"))?;

    if !user.pending_tasks.is_empty() {
        store
            .unassign_tasks(&user.pending_tasks, scope.session())
            .await?;
    }

    store
        .delete_user(id, scope.session())
        .await?
        .ok_or(AppError::NotFound("User not found"))
}

/// Symmetric difference of two pendingTasks sets: ids newly added and ids
/// removed, in their incoming order.
pub fn pending_diff(prev: &[String], next: &[String]) -> (Vec<String>, Vec<String>) {
    let added = next
        .iter()
        .filter(|id| !prev.contains(id))
        .cloned()
        .collect();
    let removed = prev
        .iter()
        .filter(|id| !next.contains(id))
        .cloned()
        .collect();
    (added, removed)
}
