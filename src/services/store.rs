use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Document},
    options::{IndexOptions, ReturnDocument},
    Client, ClientSession, Collection, IndexModel,
};

use crate::errors::AppResult;
use crate::models::{Task, User, UNASSIGNED};
use crate::query::QueryOptions;

/// Wrapper around the task and user collections. Reads for list/detail
/// endpoints go through untyped `Document` collections so projections work;
/// the synchronizer paths use the typed ones.
#[derive(Clone)]
pub struct Store {
    client: Client,
    tasks: Collection<Task>,
    users: Collection<User>,
    task_docs: Collection<Document>,
    user_docs: Collection<Document>,
}

impl Store {
    pub fn new(client: Client, db_name: &str) -> Self {
        let db = client.database(db_name);
        let tasks: Collection<Task> = db.collection("tasks");
        let users: Collection<User> = db.collection("users");
        Self {
            task_docs: tasks.clone_with_type(),
            user_docs: users.clone_with_type(),
            client,
            tasks,
            users,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Creates the unique index backing user email uniqueness.
    pub async fn ensure_indexes(&self) -> AppResult<()> {
        let index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.users.create_index(index).await?;
        Ok(())
    }

    pub async fn list_tasks(&self, q: &QueryOptions) -> AppResult<Vec<Document>> {
        list(&self.task_docs, q).await
    }

    pub async fn list_users(&self, q: &QueryOptions) -> AppResult<Vec<Document>> {
        list(&self.user_docs, q).await
    }

    pub async fn count_tasks(&self, filter: Document) -> AppResult<u64> {
        Ok(self.task_docs.count_documents(filter).await?)
    }

    pub async fn count_users(&self, filter: Document) -> AppResult<u64> {
        Ok(self.user_docs.count_documents(filter).await?)
    }

    pub async fn get_task_doc(
        &self,
        id: &str,
        projection: Option<Document>,
    ) -> AppResult<Option<Document>> {
        get_doc(&self.task_docs, id, projection).await
    }

    pub async fn get_user_doc(
        &self,
        id: &str,
        projection: Option<Document>,
    ) -> AppResult<Option<Document>> {
        get_doc(&self.user_docs, id, projection).await
    }

    pub async fn find_task(
        &self,
        id: &str,
        session: Option<&mut ClientSession>,
    ) -> AppResult<Option<Task>> {
        let filter = doc! { "_id": id };
        Ok(match session {
            Some(s) => self.tasks.find_one(filter).session(s).await?,
            None => self.tasks.find_one(filter).await?,
        })
    }

    pub async fn find_user(
        &self,
        id: &str,
        session: Option<&mut ClientSession>,
    ) -> AppResult<Option<User>> {
        let filter = doc! { "_id": id };
        Ok(match session {
            Some(s) => self.users.find_one(filter).session(s).await?,
            None => self.users.find_one(filter).await?,
        })
    }

    pub async fn insert_task(
        &self,
        task: &Task,
        session: Option<&mut ClientSession>,
    ) -> AppResult<()> {
        match session {
            Some(s) => self.tasks.insert_one(task).session(s).await?,
            None => self.tasks.insert_one(task).await?,
        };
        Ok(())
    }

    pub async fn insert_user(&self, user: &User) -> AppResult<()> {
        self.users.insert_one(user).await?;
        Ok(())
    }

    /// Applies a `$set` of already-sanitized fields, returning the post-image.
    pub async fn update_task(
        &self,
        id: &str,
        set: Document,
        session: Option<&mut ClientSession>,
    ) -> AppResult<Option<Task>> {
        if set.is_empty() {
            return self.find_task(id, session).await;
        }
        let filter = doc! { "_id": id };
        let update = doc! { "$set": set };
        let action = self
            .tasks
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After);
        Ok(match session {
            Some(s) => action.session(s).await?,
            None => action.await?,
        })
    }

    pub async fn update_user(
        &self,
        id: &str,
        set: Document,
        session: Option<&mut ClientSession>,
    ) -> AppResult<Option<User>> {
        if set.is_empty() {
            return self.find_user(id, session).await;
        }
        let filter = doc! { "_id": id };
        let update = doc! { "$set": set };
        let action = self
            .users
            .find_one_and_update(filter, update)
            .return_document(ReturnDocument::After);
        Ok(match session {
            Some(s) => action.session(s).await?,
            None => action.await?,
        })
    }

    pub async fn delete_task(
        &self,
        id: &str,
        session: Option<&mut ClientSession>,
    ) -> AppResult<Option<Task>> {
        let action = self.tasks.find_one_and_delete(doc! { "_id": id });
        Ok(match session {
            Some(s) => action.session(s).await?,
            None => action.await?,
        })
    }

    pub async fn delete_user(
        &self,
        id: &str,
        session: Option<&mut ClientSession>,
    ) -> AppResult<Option<User>> {
        let action = self.users.find_one_and_delete(doc! { "_id": id });
        Ok(match session {
            Some(s) => action.session(s).await?,
            None => action.await?,
        })
    }

    /// Adds a task id to a user's pendingTasks set, if absent.
    pub async fn link_task(
        &self,
        user_id: &str,
        task_id: &str,
        session: Option<&mut ClientSession>,
    ) -> AppResult<()> {
        let filter = doc! { "_id": user_id };
        let update = doc! { "$addToSet": { "pendingTasks": task_id } };
        match session {
            Some(s) => self.users.update_one(filter, update).session(s).await?,
            None => self.users.update_one(filter, update).await?,
        };
        Ok(())
    }

    /// Removes a task id from a user's pendingTasks set.
    pub async fn unlink_task(
        &self,
        user_id: &str,
        task_id: &str,
        session: Option<&mut ClientSession>,
    ) -> AppResult<()> {
        let filter = doc! { "_id": user_id };
        let update = doc! { "$pull": { "pendingTasks": task_id } };
        match session {
            Some(s) => self.users.update_one(filter, update).session(s).await?,
            None => self.users.update_one(filter, update).await?,
        };
        Ok(())
    }

    /// Points a task at a new assignee, denormalizing the display name.
    pub async fn assign_task(
        &self,
        task_id: &str,
        user_id: &str,
        user_name: &str,
        session: Option<&mut ClientSession>,
    ) -> AppResult<()> {
        let filter = doc! { "_id": task_id };
        let update = doc! { "$set": { "assignedUser": user_id, "assignedUserName": user_name } };
        match session {
            Some(s) => self.tasks.update_one(filter, update).session(s).await?,
            None => self.tasks.update_one(filter, update).await?,
        };
        Ok(())
    }

    /// Clears the assignment on every listed task in one bulk write.
    pub async fn unassign_tasks(
        &self,
        task_ids: &[String],
        session: Option<&mut ClientSession>,
    ) -> AppResult<()> {
        let filter = doc! { "_id": { "$in": task_ids.to_vec() } };
        let update = doc! { "$set": { "assignedUser": "", "assignedUserName": UNASSIGNED } };
        match session {
            Some(s) => self.tasks.update_many(filter, update).session(s).await?,
            None => self.tasks.update_many(filter, update).await?,
        };
        Ok(())
    }

    /// Cascades a user rename onto every task currently assigned to them.
    pub async fn rename_assignee(
        &self,
        user_id: &str,
        name: &str,
        session: Option<&mut ClientSession>,
    ) -> AppResult<()> {
        let filter = doc! { "assignedUser": user_id };
        let update = doc! { "$set": { "assignedUserName": name } };
        match session {
            Some(s) => self.tasks.update_many(filter, update).session(s).await?,
            None => self.tasks.update_many(filter, update).await?,
        };
        Ok(())
    }
}

async fn list(coll: &Collection<Document>, q: &QueryOptions) -> AppResult<Vec<Document>> {
    let mut find = coll.find(q.filter.clone());
    if let Some(projection) = &q.projection {
        find = find.projection(projection.clone());
    }
    if let Some(sort) = &q.sort {
        find = find.sort(sort.clone());
    }
    if q.skip > 0 {
        find = find.skip(q.skip);
    }
    if q.limit > 0 {
        find = find.limit(q.limit);
    }
    Ok(find.await?.try_collect().await?)
}

async fn get_doc(
    coll: &Collection<Document>,
    id: &str,
    projection: Option<Document>,
) -> AppResult<Option<Document>> {
    let mut find = coll.find_one(doc! { "_id": id });
    if let Some(projection) = projection {
        find = find.projection(projection);
    }
    Ok(find.await?)
}
