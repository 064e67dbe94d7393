use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;

use crate::users::services::is_valid_email;

/// User record in the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    /// Soft-delete marker, never exposed in JSON.
    #[serde(skip)]
    pub deleted_at: Option<OffsetDateTime>,
}

/// Insert payload; only constructible with a non-empty name and a well-formed email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    name: String,
    email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidUser {
    #[error("name is required")]
    EmptyName,
    #[error("invalid email: {0}")]
    BadEmail(String),
}

impl NewUser {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Result<Self, InvalidUser> {
        let name = name.into().trim().to_string();
        let email = email.into().trim().to_string();
        if name.is_empty() {
            return Err(InvalidUser::EmptyName);
        }
        if !is_valid_email(&email) {
            return Err(InvalidUser::BadEmail(email));
        }
        Ok(Self { name, email })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }
}
