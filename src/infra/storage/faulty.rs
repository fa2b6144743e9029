// Store wrapper for tests: delegates to the in-memory store but fails the
// operations it was told to fail, the way a locked or unreachable database
// would.

use super::in_memory::InMemoryChannelStore;
use crate::core::moderation::{ModerationStore, StoredMessage, Strike, UserStats};
use crate::core::storage::{StorageError, User, UserMeta, UserStore};
use crate::core::voting::{Topic, UserVote, VoteResults, VoteStore, VoteType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Fails every operation.
pub const ALL: &str = "*";

#[derive(Clone, Default)]
pub struct FaultyStore {
    /// Shares tables with the wrapped store, so tests can inspect state.
    pub inner: InMemoryChannelStore,
    failing: HashSet<&'static str>,
}

impl FaultyStore {
    pub fn failing(operations: &[&'static str]) -> Self {
        Self {
            inner: InMemoryChannelStore::new(),
            failing: operations.iter().copied().collect(),
        }
    }

    fn check(&self, operation: &str) -> Result<(), StorageError> {
        if self.failing.contains(ALL) || self.failing.contains(operation) {
            return Err(StorageError::Backend(format!(
                "{}: database is locked",
                operation
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for FaultyStore {
    async fn upsert_user(&self, meta: &UserMeta) -> Result<(), StorageError> {
        self.check("upsert_user")?;
        self.inner.upsert_user(meta).await
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StorageError> {
        self.check("get_user")?;
        self.inner.get_user(user_id).await
    }
}

#[async_trait]
impl ModerationStore for FaultyStore {
    async fn increment_warning(&self, user_id: i64, block_at: u32) -> Result<Strike, StorageError> {
        self.check("increment_warning")?;
        self.inner.increment_warning(user_id, block_at).await
    }

    async fn reset_warnings(&self, user_id: i64) -> Result<(), StorageError> {
        self.check("reset_warnings")?;
        self.inner.reset_warnings(user_id).await
    }

    async fn count_messages(
        &self,
        user_id: Option<i64>,
        since: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        self.check("count_messages")?;
        self.inner.count_messages(user_id, since).await
    }

    async fn insert_message(
        &self,
        user_id: i64,
        text: &str,
        at: DateTime<Utc>,
    ) -> Result<i64, StorageError> {
        self.check("insert_message")?;
        self.inner.insert_message(user_id, text, at).await
    }

    async fn recent_messages(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StorageError> {
        self.check("recent_messages")?;
        self.inner.recent_messages(user_id, limit).await
    }

    async fn user_stats(&self, user_id: i64) -> Result<Option<UserStats>, StorageError> {
        self.check("user_stats")?;
        self.inner.user_stats(user_id).await
    }
}

#[async_trait]
impl VoteStore for FaultyStore {
    async fn create_topic(
        &self,
        title: &str,
        proposed_by: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<i64, StorageError> {
        self.check("create_topic")?;
        self.inner.create_topic(title, proposed_by, at).await
    }

    async fn get_topic(&self, topic_id: i64) -> Result<Option<Topic>, StorageError> {
        self.check("get_topic")?;
        self.inner.get_topic(topic_id).await
    }

    async fn has_voted(&self, topic_id: i64, user_id: i64) -> Result<bool, StorageError> {
        self.check("has_voted")?;
        self.inner.has_voted(topic_id, user_id).await
    }

    async fn cast_vote(
        &self,
        topic_id: i64,
        user_id: i64,
        vote_type: VoteType,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        self.check("cast_vote")?;
        self.inner.cast_vote(topic_id, user_id, vote_type, at).await
    }

    async fn top_topics(&self, limit: usize) -> Result<Vec<Topic>, StorageError> {
        self.check("top_topics")?;
        self.inner.top_topics(limit).await
    }

    async fn vote_results(&self, topic_id: i64) -> Result<Option<VoteResults>, StorageError> {
        self.check("vote_results")?;
        self.inner.vote_results(topic_id).await
    }

    async fn current_topic(&self) -> Result<Option<Topic>, StorageError> {
        self.check("current_topic")?;
        self.inner.current_topic().await
    }

    async fn user_votes(&self, user_id: i64) -> Result<Vec<UserVote>, StorageError> {
        self.check("user_votes")?;
        self.inner.user_votes(user_id).await
    }

    async fn close_topic(&self, topic_id: i64) -> Result<bool, StorageError> {
        self.check("close_topic")?;
        self.inner.close_topic(topic_id).await
    }
}
