// Topic voting service - proposals, one vote per user per topic, rankings.
//
// NO transport dependencies here - just pure domain logic.

use super::voting_models::{Topic, TopicStatus, UserVote, VoteOutcome, VoteResults, VoteType};
use crate::core::storage::{StorageError, UserMeta, UserStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub const MAX_TITLE_CHARS: usize = 200;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum VoteError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Topic {0} does not exist")]
    TopicNotFound(i64),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Persistence needed by the voting engine.
///
/// Rows that reference a user (`proposed_by`, votes) require that user to
/// exist; stores report a missing one as `UserNotFound`.
#[async_trait]
pub trait VoteStore: UserStore {
    /// Insert an active topic with zero votes. Returns its id.
    async fn create_topic(
        &self,
        title: &str,
        proposed_by: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<i64, StorageError>;

    /// Look a topic up by id.
    async fn get_topic(&self, topic_id: i64) -> Result<Option<Topic>, StorageError>;

    /// Whether this user already has a vote on the topic.
    async fn has_voted(&self, topic_id: i64, user_id: i64) -> Result<bool, StorageError>;

    /// Insert the vote unless this user already voted on the topic, and bump
    /// the topic tally, as one atomic unit. Returns `false` on a duplicate.
    async fn cast_vote(
        &self,
        topic_id: i64,
        user_id: i64,
        vote_type: VoteType,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// At most `limit` topics, most votes first; ties go to the newer topic.
    async fn top_topics(&self, limit: usize) -> Result<Vec<Topic>, StorageError>;

    /// Tally split into up and down votes, or `None` for an unknown topic.
    async fn vote_results(&self, topic_id: i64) -> Result<Option<VoteResults>, StorageError>;

    /// Newest active topic, if any.
    async fn current_topic(&self) -> Result<Option<Topic>, StorageError>;

    /// Every vote the user cast with its topic, newest vote first.
    async fn user_votes(&self, user_id: i64) -> Result<Vec<UserVote>, StorageError>;

    /// Move an active topic to closed. Returns `false` if it was not active.
    async fn close_topic(&self, topic_id: i64) -> Result<bool, StorageError>;
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct VoteService<S: VoteStore> {
    store: S,
}

impl<S: VoteStore> VoteService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Propose a new topic. It starts active with zero votes. The proposer is
    /// registered first if needed.
    pub async fn propose(
        &self,
        title: &str,
        proposer: Option<&UserMeta>,
    ) -> Result<i64, VoteError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(VoteError::Validation("topic title is empty".to_string()));
        }
        if title.chars().count() > MAX_TITLE_CHARS {
            return Err(VoteError::Validation(format!(
                "topic title is longer than {} characters",
                MAX_TITLE_CHARS
            )));
        }

        if let Some(proposer) = proposer {
            self.store.upsert_user(proposer).await?;
        }
        let proposed_by = proposer.map(|p| p.user_id);
        let topic_id = self
            .store
            .create_topic(title, proposed_by, Utc::now())
            .await?;
        tracing::info!(topic_id, ?proposed_by, "topic proposed");
        Ok(topic_id)
    }

    /// Cast a vote. A second vote by the same user on the same topic is
    /// rejected, never replaced, even when both race each other. The voter is
    /// registered first if needed.
    pub async fn vote(
        &self,
        topic_id: i64,
        voter: &UserMeta,
        vote_type: VoteType,
    ) -> Result<VoteOutcome, VoteError> {
        let user_id = voter.user_id;
        let topic = self
            .store
            .get_topic(topic_id)
            .await?
            .ok_or(VoteError::TopicNotFound(topic_id))?;
        if topic.status == TopicStatus::Closed {
            return Ok(VoteOutcome::TopicClosed);
        }

        self.store.upsert_user(voter).await?;
        let accepted = self
            .store
            .cast_vote(topic_id, user_id, vote_type, Utc::now())
            .await?;

        if accepted {
            tracing::info!(topic_id, user_id, %vote_type, "vote accepted");
            Ok(VoteOutcome::Accepted)
        } else {
            tracing::debug!(topic_id, user_id, "duplicate vote rejected");
            Ok(VoteOutcome::AlreadyVoted)
        }
    }

    pub async fn has_voted(&self, topic_id: i64, user_id: i64) -> Result<bool, VoteError> {
        Ok(self.store.has_voted(topic_id, user_id).await?)
    }

    pub async fn top_topics(&self, limit: usize) -> Result<Vec<Topic>, VoteError> {
        Ok(self.store.top_topics(limit).await?)
    }

    pub async fn results(&self, topic_id: i64) -> Result<VoteResults, VoteError> {
        self.store
            .vote_results(topic_id)
            .await?
            .ok_or(VoteError::TopicNotFound(topic_id))
    }

    pub async fn get_topic(&self, topic_id: i64) -> Result<Option<Topic>, VoteError> {
        Ok(self.store.get_topic(topic_id).await?)
    }

    pub async fn current_topic(&self) -> Result<Option<Topic>, VoteError> {
        Ok(self.store.current_topic().await?)
    }

    pub async fn user_votes(&self, user_id: i64) -> Result<Vec<UserVote>, VoteError> {
        Ok(self.store.user_votes(user_id).await?)
    }

    /// Hook for whoever owns the topic lifecycle.
    pub async fn close_topic(&self, topic_id: i64) -> Result<bool, VoteError> {
        if self.store.get_topic(topic_id).await?.is_none() {
            return Err(VoteError::TopicNotFound(topic_id));
        }
        let closed = self.store.close_topic(topic_id).await?;
        if closed {
            tracing::info!(topic_id, "topic closed");
        }
        Ok(closed)
    }
}

// ============================================================================
// TESTS
// ============================================================================
