use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

lazy_static! {
    // Letters, digits, spaces and punctuation found in personal names.
    static ref NAME_REGEX: regex::Regex = regex::Regex::new(r"^[\p{L}\p{N} .,'_-]+$").unwrap();
}

/// A user as stored in the database and returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating (or upserting) a user.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateUserDto {
    /// Between 1 and 100 characters.
    #[validate(
        length(min = 1, max = 100),
        regex(path = "NAME_REGEX", message = "Name contains invalid characters")
    )]
    pub name: String,
    #[validate(email)]
    pub email: String,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateUserDto {
    #[validate(
        length(min = 1, max = 100),
        regex(path = "NAME_REGEX", message = "Name contains invalid characters")
    )]
    pub name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
}

impl UpdateUserDto {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none()
    }
}
