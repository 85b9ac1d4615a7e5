use crate::{
    error::AppError,
    models::{CreateUserDto, UpdateUserDto, User},
    pubsub::PubSub,
    repository::UserRepository,
    session::SessionStorage,
    tasks::{Task, TaskProcessor},
};
use serde_json::{json, Value};
use std::sync::Arc;
use validator::Validate;

pub const USER_CREATED: &str = "user.created";
pub const USER_UPDATED: &str = "user.updated";
pub const USER_DELETED: &str = "user.deleted";

/// Session key holding `{id, email}` of the most recently created user.
pub const LAST_CREATED_USER_KEY: &str = "users.last_created";

/// Business operations on users.
///
/// Validates DTOs, delegates persistence to `UserRepository`, announces every
/// change on the bus and defers bookkeeping to the task queue.
pub struct UserService {
    repository: Arc<UserRepository>,
    pub_sub: Arc<PubSub>,
    tasks: Arc<TaskProcessor>,
    session: Arc<SessionStorage>,
}

impl UserService {
    pub fn new(
        repository: Arc<UserRepository>,
        pub_sub: Arc<PubSub>,
        tasks: Arc<TaskProcessor>,
        session: Arc<SessionStorage>,
    ) -> Self {
        Self {
            repository,
            pub_sub,
            tasks,
            session,
        }
    }

    pub async fn list_users(&self) -> Result<Vec<User>, AppError> {
        self.repository.find_all().await
    }

    pub async fn get_user(&self, id: i64) -> Result<User, AppError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    pub async fn create_user(&self, input: CreateUserDto) -> Result<User, AppError> {
        input.validate()?;
        let user = self.repository.create(&input).await?;
        self.emit(USER_CREATED, json!(user));
        self.remember_last_created(&user);
        Ok(user)
    }

    /// Creates the user unless the email is taken. The flag is `true` on insert.
    pub async fn upsert_user(&self, input: CreateUserDto) -> Result<(User, bool), AppError> {
        input.validate()?;
        let (user, inserted) = self.repository.upsert(&input).await?;
        if inserted {
            self.emit(USER_CREATED, json!(user));
            self.remember_last_created(&user);
        }
        Ok((user, inserted))
    }

    pub async fn update_user(&self, id: i64, input: UpdateUserDto) -> Result<User, AppError> {
        input.validate()?;
        if input.is_empty() {
            return Err(AppError::BadRequest("No fields to update".into()));
        }
        let user = self
            .repository
            .update(id, &input)
            .await?
            .ok_or_else(|| not_found(id))?;
        self.emit(USER_UPDATED, json!(user));
        Ok(user)
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), AppError> {
        if !self.repository.delete(id).await? {
            return Err(not_found(id));
        }
        self.emit(USER_DELETED, json!({ "id": id }));
        Ok(())
    }

    // The write has already happened, so a subscriber failure is only logged.
    fn emit(&self, event_type: &str, payload: Value) {
        if let Err(e) = self.pub_sub.publish(event_type, &payload) {
            log::warn!("{}", e);
        }
    }

    fn remember_last_created(&self, user: &User) {
        let session = Arc::clone(&self.session);
        let summary = json!({ "id": user.id, "email": user.email });
        self.tasks.enqueue_task(Task::new(
            format!("remember-last-created-user-{}", user.id),
            move || {
                session.set_item(LAST_CREATED_USER_KEY, summary);
                Ok(())
            },
        ));
    }
}

fn not_found(id: i64) -> AppError {
    AppError::NotFound(format!("User {} not found", id))
}
