// In-memory implementation of the channel store.
//
// Uses DashMap so concurrent tasks can share it. Every counter update happens
// while the entry's shard lock is held, which gives the same no-lost-update
// guarantee the SQLite store gets from single statements.
// Lock order when two maps are touched: votes, then topics.

use crate::core::moderation::{ModerationStore, StoredMessage, Strike, UserStats};
use crate::core::storage::{StorageError, User, UserMeta, UserStore};
use crate::core::voting::{Topic, TopicStatus, UserVote, VoteResults, VoteStore, VoteType};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct VoteRecord {
    vote_id: i64,
    vote_type: VoteType,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct Tables {
    users: DashMap<i64, User>,
    messages: DashMap<i64, StoredMessage>,
    topics: DashMap<i64, Topic>,
    /// Keyed by (topic_id, user_id)
    votes: DashMap<(i64, i64), VoteRecord>,
    last_message_id: AtomicI64,
    last_topic_id: AtomicI64,
    last_vote_id: AtomicI64,
}

/// Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct InMemoryChannelStore {
    tables: Arc<Tables>,
}

impl InMemoryChannelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows referencing a user need the user to exist, as foreign keys do.
    fn require_user(&self, user_id: i64) -> Result<(), StorageError> {
        if self.tables.users.contains_key(&user_id) {
            Ok(())
        } else {
            Err(StorageError::UserNotFound(user_id))
        }
    }

    fn count_user_messages(&self, user_id: Option<i64>, since: Option<DateTime<Utc>>) -> u64 {
        self.tables
            .messages
            .iter()
            .filter(|m| user_id.map_or(true, |id| m.user_id == id))
            .filter(|m| since.map_or(true, |since| m.created_at >= since))
            .count() as u64
    }
}

#[async_trait]
impl UserStore for InMemoryChannelStore {
    async fn upsert_user(&self, meta: &UserMeta) -> Result<(), StorageError> {
        self.tables
            .users
            .entry(meta.user_id)
            .or_insert_with(|| User::from_meta(meta, Utc::now()));
        Ok(())
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StorageError> {
        Ok(self.tables.users.get(&user_id).map(|u| u.clone()))
    }
}

#[async_trait]
impl ModerationStore for InMemoryChannelStore {
    async fn increment_warning(&self, user_id: i64, block_at: u32) -> Result<Strike, StorageError> {
        let mut user = self
            .tables
            .users
            .get_mut(&user_id)
            .ok_or(StorageError::UserNotFound(user_id))?;
        user.warnings += 1;
        if user.warnings >= block_at {
            user.is_blocked = true;
        }
        Ok(Strike {
            warnings: user.warnings,
            is_blocked: user.is_blocked,
        })
    }

    async fn reset_warnings(&self, user_id: i64) -> Result<(), StorageError> {
        let mut user = self
            .tables
            .users
            .get_mut(&user_id)
            .ok_or(StorageError::UserNotFound(user_id))?;
        user.warnings = 0;
        user.is_blocked = false;
        Ok(())
    }

    async fn count_messages(
        &self,
        user_id: Option<i64>,
        since: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        Ok(self.count_user_messages(user_id, Some(since)))
    }

    async fn insert_message(
        &self,
        user_id: i64,
        text: &str,
        at: DateTime<Utc>,
    ) -> Result<i64, StorageError> {
        self.require_user(user_id)?;
        let message_id = self.tables.last_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.tables.messages.insert(
            message_id,
            StoredMessage {
                message_id,
                user_id,
                text: text.to_string(),
                created_at: at,
            },
        );
        Ok(message_id)
    }

    async fn recent_messages(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StorageError> {
        let mut messages: Vec<StoredMessage> = self
            .tables
            .messages
            .iter()
            .filter(|m| m.user_id == user_id)
            .map(|m| m.clone())
            .collect();
        messages.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.message_id.cmp(&a.message_id))
        });
        messages.truncate(limit);
        Ok(messages)
    }

    async fn user_stats(&self, user_id: i64) -> Result<Option<UserStats>, StorageError> {
        let user = match self.tables.users.get(&user_id) {
            Some(user) => user.clone(),
            None => return Ok(None),
        };
        Ok(Some(UserStats {
            user,
            message_count: self.count_user_messages(Some(user_id), None),
        }))
    }
}

#[async_trait]
impl VoteStore for InMemoryChannelStore {
    async fn create_topic(
        &self,
        title: &str,
        proposed_by: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<i64, StorageError> {
        if let Some(user_id) = proposed_by {
            self.require_user(user_id)?;
        }
        let topic_id = self.tables.last_topic_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.tables.topics.insert(
            topic_id,
            Topic {
                topic_id,
                title: title.to_string(),
                proposed_by,
                votes: 0,
                status: TopicStatus::Active,
                created_at: at,
            },
        );
        Ok(topic_id)
    }

    async fn get_topic(&self, topic_id: i64) -> Result<Option<Topic>, StorageError> {
        Ok(self.tables.topics.get(&topic_id).map(|t| t.clone()))
    }

    async fn has_voted(&self, topic_id: i64, user_id: i64) -> Result<bool, StorageError> {
        Ok(self.tables.votes.contains_key(&(topic_id, user_id)))
    }

    async fn cast_vote(
        &self,
        topic_id: i64,
        user_id: i64,
        vote_type: VoteType,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        if !self.tables.topics.contains_key(&topic_id) {
            return Err(StorageError::TopicNotFound(topic_id));
        }
        self.require_user(user_id)?;

        match self.tables.votes.entry((topic_id, user_id)) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                let vote_id = self.tables.last_vote_id.fetch_add(1, Ordering::SeqCst) + 1;
                slot.insert(VoteRecord {
                    vote_id,
                    vote_type,
                    created_at: at,
                });
                if let Some(mut topic) = self.tables.topics.get_mut(&topic_id) {
                    topic.votes += 1;
                }
                Ok(true)
            }
        }
    }

    async fn top_topics(&self, limit: usize) -> Result<Vec<Topic>, StorageError> {
        let mut topics: Vec<Topic> = self.tables.topics.iter().map(|t| t.clone()).collect();
        topics.sort_by(|a, b| {
            b.votes
                .cmp(&a.votes)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.topic_id.cmp(&a.topic_id))
        });
        topics.truncate(limit);
        Ok(topics)
    }

    async fn vote_results(&self, topic_id: i64) -> Result<Option<VoteResults>, StorageError> {
        let topic = match self.tables.topics.get(&topic_id) {
            Some(topic) => topic.clone(),
            None => return Ok(None),
        };

        let (mut up, mut down) = (0, 0);
        for vote in self.tables.votes.iter().filter(|v| v.key().0 == topic_id) {
            match vote.vote_type {
                VoteType::Up => up += 1,
                VoteType::Down => down += 1,
            }
        }

        Ok(Some(VoteResults {
            topic_id,
            title: topic.title,
            votes: topic.votes,
            up,
            down,
        }))
    }

    async fn current_topic(&self) -> Result<Option<Topic>, StorageError> {
        Ok(self
            .tables
            .topics
            .iter()
            .filter(|t| t.status == TopicStatus::Active)
            .max_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then(a.topic_id.cmp(&b.topic_id))
            })
            .map(|t| t.clone()))
    }

    async fn user_votes(&self, user_id: i64) -> Result<Vec<UserVote>, StorageError> {
        let mut records: Vec<(i64, VoteRecord)> = self
            .tables
            .votes
            .iter()
            .filter(|v| v.key().1 == user_id)
            .map(|v| (v.key().0, v.value().clone()))
            .collect();
        records.sort_by(|(_, a), (_, b)| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.vote_id.cmp(&a.vote_id))
        });

        Ok(records
            .into_iter()
            .filter_map(|(topic_id, record)| {
                let topic = self.tables.topics.get(&topic_id)?.clone();
                Some(UserVote {
                    topic,
                    vote_type: record.vote_type,
                    voted_at: record.created_at,
                })
            })
            .collect())
    }

    async fn close_topic(&self, topic_id: i64) -> Result<bool, StorageError> {
        let mut topic = self
            .tables
            .topics
            .get_mut(&topic_id)
            .ok_or(StorageError::TopicNotFound(topic_id))?;
        if topic.status == TopicStatus::Closed {
            return Ok(false);
        }
        topic.status = TopicStatus::Closed;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clones_share_tables() {
        let store = InMemoryChannelStore::new();
        let other = store.clone();

        store.upsert_user(&UserMeta::new(1)).await.unwrap();
        assert_eq!(other.increment_warning(1, 3).await.unwrap().warnings, 1);
        assert_eq!(store.get_user(1).await.unwrap().unwrap().warnings, 1);
    }

    #[tokio::test]
    async fn test_top_topics_tie_break() {
        let store = InMemoryChannelStore::new();
        for id in 1..=13 {
            store.upsert_user(&UserMeta::new(id)).await.unwrap();
        }
        let t0 = Utc::now();
        let t1 = store.create_topic("t1", None, t0).await.unwrap();
        let t2 = store
            .create_topic("t2", None, t0 + chrono::Duration::seconds(1))
            .await
            .unwrap();
        let t3 = store
            .create_topic("t3", None, t0 + chrono::Duration::seconds(2))
            .await
            .unwrap();

        let mut user = 0;
        for (topic, count) in [(t1, 5), (t2, 5), (t3, 3)] {
            for _ in 0..count {
                user += 1;
                store
                    .cast_vote(topic, user, VoteType::Up, Utc::now())
                    .await
                    .unwrap();
            }
        }

        let ids: Vec<i64> = store
            .top_topics(2)
            .await
            .unwrap()
            .iter()
            .map(|t| t.topic_id)
            .collect();
        assert_eq!(ids, vec![t2, t1]);
    }

    #[tokio::test]
    async fn test_vote_on_missing_topic_fails() {
        let store = InMemoryChannelStore::new();
        assert_eq!(
            store
                .cast_vote(3, 1, VoteType::Up, Utc::now())
                .await
                .unwrap_err(),
            StorageError::TopicNotFound(3)
        );
    }

    #[tokio::test]
    async fn test_message_window_counts() {
        let store = InMemoryChannelStore::new();
        store.upsert_user(&UserMeta::new(1)).await.unwrap();
        let now = Utc::now();
        store
            .insert_message(1, "a", now - chrono::Duration::minutes(5))
            .await
            .unwrap();
        store.insert_message(1, "b", now).await.unwrap();

        let since = now - chrono::Duration::minutes(1);
        assert_eq!(store.count_messages(Some(1), since).await.unwrap(), 1);
        assert_eq!(store.count_messages(Some(2), since).await.unwrap(), 0);
        assert_eq!(
            store.recent_messages(1, 1).await.unwrap()[0].text,
            "b".to_string()
        );
    }

    #[tokio::test]
    async fn test_strike_blocks_at_limit() {
        let store = InMemoryChannelStore::new();
        store.upsert_user(&UserMeta::new(1)).await.unwrap();

        let first = store.increment_warning(1, 2).await.unwrap();
        assert_eq!(first, Strike { warnings: 1, is_blocked: false });
        let second = store.increment_warning(1, 2).await.unwrap();
        assert_eq!(second, Strike { warnings: 2, is_blocked: true });
        assert!(store.get_user(1).await.unwrap().unwrap().is_blocked);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_strikes_keep_block_consistent() {
        let store = InMemoryChannelStore::new();
        store.upsert_user(&UserMeta::new(1)).await.unwrap();

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment_warning(1, 3).await })
            })
            .collect();

        for handle in handles {
            let strike = handle.await.unwrap().unwrap();
            assert_eq!(strike.is_blocked, strike.warnings >= 3);
        }
        let user = store.get_user(1).await.unwrap().unwrap();
        assert_eq!((user.warnings, user.is_blocked), (12, true));
    }

    #[tokio::test]
    async fn test_unknown_user_cannot_reference_rows() {
        let store = InMemoryChannelStore::new();
        assert_eq!(
            store.create_topic("t", Some(5), Utc::now()).await.unwrap_err(),
            StorageError::UserNotFound(5)
        );
        let topic = store.create_topic("t", None, Utc::now()).await.unwrap();
        assert_eq!(
            store
                .cast_vote(topic, 5, VoteType::Up, Utc::now())
                .await
                .unwrap_err(),
            StorageError::UserNotFound(5)
        );
    }
}
