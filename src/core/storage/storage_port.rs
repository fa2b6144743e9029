// Storage port shared by the moderation and voting features.
//
// Both features persist into the same relational store (users are referenced
// by messages, topics and votes), so the user table and the error type live
// here and the feature traits extend `UserStore`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

/// A failure of the backing store. Never caused by the user.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("User {0} is not registered")]
    UserNotFound(i64),

    #[error("Topic {0} does not exist")]
    TopicNotFound(i64),
}

// ============================================================================
// USER MODEL
// ============================================================================

/// Identity fields the transport knows about the sender.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMeta {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserMeta {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            ..Default::default()
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Best human-readable name for status texts.
    pub fn display_name(&self) -> String {
        match (&self.username, &self.first_name) {
            (Some(username), _) => format!("@{}", username),
            (None, Some(first)) => first.clone(),
            (None, None) => format!("user {}", self.user_id),
        }
    }
}

/// A registered user row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub warnings: u32,
    pub is_blocked: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn from_meta(meta: &UserMeta, created_at: DateTime<Utc>) -> Self {
        Self {
            user_id: meta.user_id,
            username: meta.username.clone(),
            first_name: meta.first_name.clone(),
            last_name: meta.last_name.clone(),
            warnings: 0,
            is_blocked: false,
            created_at,
        }
    }
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert the user if absent. Existing rows are left untouched, including
    /// their identity fields, warnings and block flag.
    async fn upsert_user(&self, meta: &UserMeta) -> Result<(), StorageError>;

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StorageError>;
}
