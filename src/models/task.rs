use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{AppError, AppResult};

/// Sentinel stored in `assignedUserName` when a task has no assignee.
pub const UNASSIGNED: &str = "unassigned";

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub deadline: DateTime<Utc>,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub assigned_user: String,
    #[serde(default = "unassigned")]
    pub assigned_user_name: String,
}

fn unassigned() -> String {
    UNASSIGNED.to_string()
}

/// Request body for POST /api/tasks. `deadline` and `completed` stay as raw
/// JSON values so the loose coercions below can be applied.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub deadline: Option<Value>,
    pub completed: Option<Value>,
    pub assigned_user: Option<String>,
    pub assigned_user_name: Option<String>,
}

impl TaskInput {
    /// Validates the input and builds a task document with a fresh id.
    ///
    /// `assigned_user_name` is left empty when the caller did not supply one;
    /// the synchronizer fills it from the assignee's actual name (or the
    /// "unassigned" sentinel) once the referenced user has been loaded.
    pub fn into_task(self) -> AppResult<Task> {
        let name = match self.name {
            Some(n) if !n.is_empty() => n,
            _ => return Err(AppError::Validation("Task name is required".into())),
        };

        let deadline = match self.deadline {
            None | Some(Value::Null) => {
                return Err(AppError::Validation("Task deadline is required".into()))
            }
            Some(Value::String(ref s)) if s.is_empty() => {
                return Err(AppError::Validation("Task deadline is required".into()))
            }
            Some(raw) => resolve_deadline(&raw)
                .ok_or_else(|| AppError::Validation("Invalid deadline".into()))?,
        };

        Ok(Task {
            id: mongodb::bson::oid::ObjectId::new().to_hex(),
            name,
            description: self.description.unwrap_or_default(),
            deadline,
            completed: self.completed.map(|v| coerce_completed(&v)).unwrap_or(false),
            assigned_user: self.assigned_user.unwrap_or_default(),
            assigned_user_name: self.assigned_user_name.unwrap_or_default(),
        })
    }
}

/// Resolves a deadline from either a numeric epoch-milliseconds value or a
/// parseable date string (RFC 3339, `YYYY-MM-DDTHH:MM:SS`, or `YYYY-MM-DD`).
/// Numeric strings are treated as epoch milliseconds too.
pub fn resolve_deadline(raw: &Value) -> Option<DateTime<Utc>> {
    match raw {
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_millis_opt(millis).single()
        }
        Value::String(s) => {
            if let Ok(millis) = s.trim().parse::<i64>() {
                return Utc.timestamp_millis_opt(millis).single();
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
                return Some(Utc.from_utc_datetime(&naive));
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
            }
            None
        }
        _ => None,
    }
}

/// `true`, `"true"` and `"True"` count as completed; anything else does not.
pub fn coerce_completed(raw: &Value) -> bool {
    match raw {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true" || s == "True",
        _ => false,
    }
}

/// Sanitizes a partial-update body for PUT /api/tasks/{id} into a `$set`
/// document. Unknown keys and `_id` are dropped; fields that are present are
/// validated and coerced exactly as on create, so the merged document stays
/// well-formed.
pub fn sanitize_changes(changes: &Document) -> AppResult<Document> {
    let mut set = Document::new();

    for (key, value) in changes {
        match key.as_str() {
            "name" => match value {
                Bson::String(s) if !s.is_empty() => {
                    set.insert("name", s.clone());
                }
                _ => return Err(AppError::Validation("Task name is required".into())),
            },
            "description" => match value {
                Bson::String(s) => {
                    set.insert("description", s.clone());
                }
                _ => {
                    return Err(AppError::Validation(
                        "Task description must be a string".into(),
                    ))
                }
            },
            "deadline" => {
                let deadline = resolve_deadline(&Value::from(value.clone()))
                    .ok_or_else(|| AppError::Validation("Invalid deadline".into()))?;
                set.insert("deadline", deadline.to_rfc3339());
            }
            "completed" => {
                set.insert("completed", coerce_completed(&Value::from(value.clone())));
            }
            "assignedUser" => match value {
                Bson::String(s) => {
                    set.insert("assignedUser", s.clone());
                }
                _ => {
                    return Err(AppError::Validation(
                        "assignedUser must be a user id string".into(),
                    ))
                }
            },
            "assignedUserName" => match value {
                Bson::String(s) => {
                    set.insert("assignedUserName", s.clone());
                }
                _ => {
                    return Err(AppError::Validation(
                        "assignedUserName must be a string".into(),
                    ))
                }
            },
            _ => {}
        }
    }

    // Clearing the assignee without naming a replacement resets the display
    // name to the sentinel.
    if set.get_str("assignedUser").map_or(false, str::is_empty)
        && !set.contains_key("assignedUserName")
    {
        set.insert("assignedUserName", UNASSIGNED);
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;
    use serde_json::json;

    fn input(body: Value) -> TaskInput {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn test_resolve_deadline_epoch_millis() {
        let dt = resolve_deadline(&json!(0)).unwrap();
        assert_eq!(dt, Utc.timestamp_millis_opt(0).single().unwrap());

        let dt = resolve_deadline(&json!(1_700_000_000_000i64)).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_resolve_deadline_numeric_string() {
        let dt = resolve_deadline(&json!("1700000000000")).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_resolve_deadline_date_strings() {
        assert!(resolve_deadline(&json!("2026-01-15T10:30:00Z")).is_some());
        assert!(resolve_deadline(&json!("2026-01-15T10:30:00")).is_some());
        assert!(resolve_deadline(&json!("2026-01-15")).is_some());
    }

    #[test]
    fn test_resolve_deadline_rejects_garbage() {
        assert!(resolve_deadline(&json!("not a date")).is_none());
        assert!(resolve_deadline(&json!(true)).is_none());
        assert!(resolve_deadline(&json!({"soon": true})).is_none());
    }

    #[test]
    fn test_coerce_completed() {
        assert!(coerce_completed(&json!(true)));
        assert!(coerce_completed(&json!("true")));
        assert!(coerce_completed(&json!("True")));
        assert!(!coerce_completed(&json!(false)));
        assert!(!coerce_completed(&json!("yes")));
        assert!(!coerce_completed(&json!(1)));
    }

    #[test]
    fn test_into_task_requires_name() {
        let err = input(json!({ "deadline": 0 })).into_task().unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = input(json!({ "name": "", "deadline": 0 }))
            .into_task()
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_into_task_requires_deadline() {
        let err = input(json!({ "name": "write report" })).into_task().unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Task deadline is required"));

        let err = input(json!({ "name": "write report", "deadline": "" }))
            .into_task()
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Task deadline is required"));

        let err = input(json!({ "name": "write report", "deadline": "whenever" }))
            .into_task()
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m == "Invalid deadline"));
    }

    #[test]
    fn test_into_task_defaults() {
        let task = input(json!({ "name": "write report", "deadline": "2026-06-01" }))
            .into_task()
            .unwrap();
        assert_eq!(task.id.len(), 24);
        assert_eq!(task.description, "");
        assert!(!task.completed);
        assert_eq!(task.assigned_user, "");
        assert_eq!(task.assigned_user_name, "");
    }

    #[test]
    fn test_into_task_generates_unique_ids() {
        let body = json!({ "name": "a", "deadline": 0 });
        let a = input(body.clone()).into_task().unwrap();
        let b = input(body).into_task().unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_sanitize_changes_drops_unknown_and_id() {
        let set = sanitize_changes(&doc! { "_id": "abc", "name": "new name", "bogus": 1 }).unwrap();
        assert_eq!(set, doc! { "name": "new name" });
    }

    #[test]
    fn test_sanitize_changes_rejects_empty_name() {
        assert!(sanitize_changes(&doc! { "name": "" }).is_err());
        assert!(sanitize_changes(&doc! { "name": 42 }).is_err());
    }

    #[test]
    fn test_sanitize_changes_coerces_completed() {
        let set = sanitize_changes(&doc! { "completed": "True" }).unwrap();
        assert_eq!(set, doc! { "completed": true });

        let set = sanitize_changes(&doc! { "completed": "nope" }).unwrap();
        assert_eq!(set, doc! { "completed": false });
    }

    #[test]
    fn test_sanitize_changes_parses_deadline() {
        let set = sanitize_changes(&doc! { "deadline": "2026-06-01" }).unwrap();
        assert!(set.get_str("deadline").unwrap().starts_with("2026-06-01T00:00:00"));

        assert!(sanitize_changes(&doc! { "deadline": "someday" }).is_err());
    }

    #[test]
    fn test_sanitize_changes_resets_name_when_unassigning() {
        let set = sanitize_changes(&doc! { "assignedUser": "" }).unwrap();
        assert_eq!(set.get_str("assignedUserName").unwrap(), UNASSIGNED);

        // An explicit assignee keeps whatever name the synchronizer resolves.
        let set = sanitize_changes(&doc! { "assignedUser": "abc" }).unwrap();
        assert!(!set.contains_key("assignedUserName"));
    }
}
