// Moderation service - core business logic for admitting channel messages.
//
// This service handles:
// - Sender registration
// - Block checks
// - Rate limiting over trailing windows (never escalates)
// - Spam patterns (escalate: warn -> block)
// - Banned words (never escalates)
//
// NO transport dependencies here - just pure domain logic.

use super::moderation_models::{
    Decision, ModerationConfig, Rejection, StoredMessage, Strike, UserStats,
};
use super::rate_window::{MessageCounts, RateWindow};
use super::spam_classifier::SpamClassifier;
use crate::core::storage::{StorageError, User, UserMeta, UserStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Unknown user: {0}")]
    UnknownUser(i64),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Persistence needed by the moderation engine.
///
/// Counter updates must be single atomic operations in the backend; the
/// engine never reads a counter and writes it back.
#[async_trait]
pub trait ModerationStore: UserStore {
    /// Add one spam warning and, in the same atomic step, block the user once
    /// the new total reaches `block_at`. Returns the counters after the
    /// update, so `is_blocked` always agrees with `warnings`.
    ///
    /// Fails with `UserNotFound` if the user was never upserted.
    async fn increment_warning(&self, user_id: i64, block_at: u32) -> Result<Strike, StorageError>;

    /// Return the user to the active state: zero warnings, not blocked.
    ///
    /// Fails with `UserNotFound` if the user was never upserted.
    async fn reset_warnings(&self, user_id: i64) -> Result<(), StorageError>;

    /// Count admitted messages created at or after `since`, for one user or,
    /// with `None`, for the whole channel.
    async fn count_messages(
        &self,
        user_id: Option<i64>,
        since: DateTime<Utc>,
    ) -> Result<u64, StorageError>;

    /// Persist an admitted message stamped with `at`. Returns its id.
    async fn insert_message(
        &self,
        user_id: i64,
        text: &str,
        at: DateTime<Utc>,
    ) -> Result<i64, StorageError>;

    /// The user's latest admitted messages, newest first, at most `limit`.
    async fn recent_messages(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StorageError>;

    /// The user row with their total admitted message count, or `None` for
    /// an unknown user.
    async fn user_stats(&self, user_id: i64) -> Result<Option<UserStats>, StorageError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct ModerationService<S: ModerationStore> {
    store: S,
    config: ModerationConfig,
    classifier: SpamClassifier,
    rate_window: RateWindow,
}

impl<S: ModerationStore> ModerationService<S> {
    pub fn new(store: S, config: ModerationConfig) -> Self {
        let classifier = SpamClassifier::from_config(&config);
        let rate_window = RateWindow::new(config.rate_limits);
        Self {
            store,
            config,
            classifier,
            rate_window,
        }
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    /// Decide whether an inbound message is admitted.
    pub async fn evaluate(&self, sender: &UserMeta, text: &str) -> Result<Decision, ModerationError> {
        self.evaluate_at(sender, text, Utc::now()).await
    }

    /// Same as [`evaluate`](Self::evaluate) with an explicit clock reading.
    ///
    /// Any storage failure aborts the evaluation; the message is then neither
    /// admitted nor counted against the user.
    pub async fn evaluate_at(
        &self,
        sender: &UserMeta,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Decision, ModerationError> {
        let user_id = sender.user_id;

        self.store.upsert_user(sender).await?;
        let user = self
            .store
            .get_user(user_id)
            .await?
            .ok_or(StorageError::UserNotFound(user_id))?;

        if user.is_blocked {
            tracing::debug!(user_id, "message from blocked user rejected");
            return Ok(Decision::Reject(Rejection::Blocked));
        }

        let counts = self
            .rate_window
            .counts(&self.store, Some(user_id), now)
            .await?;
        if let Some(window) = self.rate_window.exceeded(&counts) {
            let limit = self.config.rate_limits.limit_for(window);
            tracing::info!(user_id, %window, limit, "rate limit hit");
            return Ok(Decision::Reject(Rejection::RateLimited { window, limit }));
        }

        if let Some(rule) = self.classifier.spam_match(text) {
            return self.escalate(user_id, &rule.to_string()).await;
        }

        if let Some(word) = self.classifier.banned_word(text) {
            tracing::info!(user_id, word, "banned word rejected");
            return Ok(Decision::Reject(Rejection::BannedWords {
                word: word.to_string(),
            }));
        }

        let message_id = self.store.insert_message(user_id, text, now).await?;
        tracing::debug!(user_id, message_id, "message admitted");
        Ok(Decision::Admit { message_id })
    }

    /// Record a spam strike. The store blocks the user in the same step once
    /// the limit is reached.
    async fn escalate(&self, user_id: i64, rule: &str) -> Result<Decision, ModerationError> {
        let limit = self.config.warning_limit;
        let Strike {
            warnings,
            is_blocked,
        } = self.store.increment_warning(user_id, limit).await?;

        if is_blocked {
            tracing::info!(user_id, warnings, rule, "user blocked for spam");
            Ok(Decision::Reject(Rejection::BlockedNow { warnings }))
        } else {
            tracing::info!(user_id, warnings, limit, rule, "spam warning issued");
            Ok(Decision::Reject(Rejection::Warned { warnings, limit }))
        }
    }

    /// Clear a block (admin action). Resets warnings to zero.
    pub async fn unblock(&self, user_id: i64) -> Result<(), ModerationError> {
        if self.store.get_user(user_id).await?.is_none() {
            return Err(ModerationError::UnknownUser(user_id));
        }
        self.store.reset_warnings(user_id).await?;
        tracing::info!(user_id, "user unblocked");
        Ok(())
    }

    pub async fn get_user(&self, user_id: i64) -> Result<Option<User>, ModerationError> {
        Ok(self.store.get_user(user_id).await?)
    }

    pub async fn user_stats(&self, user_id: i64) -> Result<Option<UserStats>, ModerationError> {
        Ok(self.store.user_stats(user_id).await?)
    }

    pub async fn recent_messages(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, ModerationError> {
        Ok(self.store.recent_messages(user_id, limit).await?)
    }

    /// Message counts over every window, for one user or the whole channel.
    pub async fn activity(&self, user_id: Option<i64>) -> Result<MessageCounts, ModerationError> {
        Ok(self
            .rate_window
            .counts(&self.store, user_id, Utc::now())
            .await?)
    }
}

// ============================================================================
// TESTS
// ============================================================================
