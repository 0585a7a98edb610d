use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub pending_tasks: Vec<String>, // ordered, duplicate-free; semantically a set
}

/// Request body for POST /api/users. Any caller-supplied pendingTasks value
/// is ignored; new users always start with none.
#[derive(Debug, Deserialize)]
pub struct UserInput {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl UserInput {
    pub fn into_user(self) -> AppResult<User> {
        match (self.name, self.email) {
            (Some(name), Some(email)) if !name.is_empty() && !email.is_empty() => Ok(User {
                id: mongodb::bson::oid::ObjectId::new().to_hex(),
                name,
                email,
                pending_tasks: Vec::new(),
            }),
            _ => Err(AppError::Validation("Name and email are required".into())),
        }
    }
}

/// Sanitizes a partial-update body for PUT /api/users/{id} into a `$set`
/// document, dropping `_id` and unknown keys.
pub fn sanitize_changes(changes: &Document) -> AppResult<Document> {
    let mut set = Document::new();

    for (key, value) in changes {
        match key.as_str() {
            "name" => match value {
                Bson::String(s) if !s.is_empty() => {
                    set.insert("name", s.clone());
                }
                _ => return Err(AppError::Validation("Name and email are required".into())),
            },
            "email" => match value {
                Bson::String(s) if !s.is_empty() => {
                    set.insert("email", s.clone());
                }
                _ => return Err(AppError::Validation("Name and email are required".into())),
            },
            "pendingTasks" => {
                let ids = match value {
                    Bson::Array(items) => items
                        .iter()
                        .map(|item| match item {
                            Bson::String(s) => Ok(Bson::String(s.clone())),
                            _ => Err(AppError::Validation(
                                "pendingTasks must be an array of task ids".into(),
                            )),
                        })
                        .collect::<AppResult<Vec<_>>>()?,
                    _ => {
                        return Err(AppError::Validation(
                            "pendingTasks must be an array of task ids".into(),
                        ))
                    }
                };
                set.insert("pendingTasks", ids);
            }
            _ => {}
        }
    }

    Ok(set)
}
