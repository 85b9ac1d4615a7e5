use crate::{
    database::Database,
    error::AppError,
    models::{CreateUserDto, UpdateUserDto, User},
};
use chrono::Utc;
use std::sync::Arc;

const SELECT_USER: &str = "SELECT id, name, email, created_at, updated_at FROM users";
const RETURNING_USER: &str = "RETURNING id, name, email, created_at, updated_at";

/// SQL access to the `users` table.
///
/// The pool is fetched from the `Database` on every call, so the repository can be
/// built before the database is connected.
#[derive(Debug)]
pub struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn find_all(&self) -> Result<Vec<User>, AppError> {
        let pool = self.db.get_instance()?;
        let users = sqlx::query_as::<_, User>(&format!("{} ORDER BY id", SELECT_USER))
            .fetch_all(&pool)
            .await?;
        Ok(users)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let pool = self.db.get_instance()?;
        let user = sqlx::query_as::<_, User>(&format!("{} WHERE id = ?", SELECT_USER))
            .bind(id)
            .fetch_optional(&pool)
            .await?;
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let pool = self.db.get_instance()?;
        let user = sqlx::query_as::<_, User>(&format!("{} WHERE email = ?", SELECT_USER))
            .bind(email)
            .fetch_optional(&pool)
            .await?;
        Ok(user)
    }

    /// Inserts a new row. A duplicate email surfaces as `AppError::Conflict`.
    pub async fn create(&self, input: &CreateUserDto) -> Result<User, AppError> {
        let pool = self.db.get_instance()?;
        let now = Utc::now();
        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (name, email, created_at, updated_at) VALUES (?, ?, ?, ?) {}",
            RETURNING_USER
        ))
        .bind(&input.name)
        .bind(&input.email)
        .bind(now)
        .bind(now)
        .fetch_one(&pool)
        .await?;
        Ok(user)
    }

    /// Inserts the row unless the email already exists, then returns the stored row.
    ///
    /// The second element is `true` when a new row was inserted.
    pub async fn upsert(&self, input: &CreateUserDto) -> Result<(User, bool), AppError> {
        let pool = self.db.get_instance()?;
        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO users (name, email, created_at, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(email) DO NOTHING",
        )
        .bind(&input.name)
        .bind(&input.email)
        .bind(now)
        .bind(now)
        .execute(&pool)
        .await?;

        let user = self
            .find_by_email(&input.email)
            .await?
            .ok_or_else(|| AppError::InternalServerError("Upserted user vanished".into()))?;
        Ok((user, result.rows_affected() > 0))
    }

    /// Applies the fields present in `input`. Returns `None` when the row does not exist.
    pub async fn update(&self, id: i64, input: &UpdateUserDto) -> Result<Option<User>, AppError> {
        let pool = self.db.get_instance()?;
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET name = COALESCE(?, name), email = COALESCE(?, email), updated_at = ?
             WHERE id = ? {}",
            RETURNING_USER
        ))
        .bind(&input.name)
        .bind(&input.email)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&pool)
        .await?;
        Ok(user)
    }

    /// Returns `false` when no row matched.
    pub async fn delete(&self, id: i64) -> Result<bool, AppError> {
        let pool = self.db.get_instance()?;
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
