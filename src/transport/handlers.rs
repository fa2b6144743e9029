// Transport-facing handlers - translate core decisions into chat replies.
//
// The chat transport calls one of these per inbound event. Storage failures
// never reach the user as a rule violation: they become `Reply::TryAgain`.

use crate::core::moderation::{
    Decision, ModerationError, ModerationService, ModerationStore, Rejection,
};
use crate::core::storage::UserMeta;
use crate::core::voting::{VoteError, VoteOutcome, VoteService, VoteStore, VoteType};
use std::collections::HashSet;
use std::sync::Arc;

const RECENT_IN_STATS: usize = 3;

pub const TRY_AGAIN_TEXT: &str = "⚠️ Something went wrong on our side. Please try again later.";

/// What the transport should do after handling an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Nothing to say; the message stays.
    Silent,
    /// Answer the user.
    Notice(String),
    /// The message was not admitted; remove it and tell the sender why.
    Removed(String),
    /// Nothing was decided because the store failed.
    TryAgain,
}

impl Reply {
    pub fn text(&self) -> Option<&str> {
        match self {
            Reply::Silent => None,
            Reply::Notice(text) | Reply::Removed(text) => Some(text),
            Reply::TryAgain => Some(TRY_AGAIN_TEXT),
        }
    }
}

fn rejection_text(rejection: &Rejection) -> String {
    match rejection {
        Rejection::Blocked => "🚫 You are blocked for breaking the channel rules.".to_string(),
        Rejection::RateLimited { window, limit } => format!(
            "⏳ Too many messages: the limit is {} per {}. Please wait.",
            limit, window
        ),
        Rejection::Warned { warnings, limit } => {
            let remaining = limit.saturating_sub(*warnings);
            format!(
                "⚠️ **Spam warning** ({}/{}). You have {} warning{} remaining before you are blocked.",
                warnings,
                limit,
                remaining,
                if remaining == 1 { "" } else { "s" }
            )
        }
        Rejection::BlockedNow { warnings } => format!(
            "🚫 You have been blocked for spam after {} warnings.",
            warnings
        ),
        Rejection::BannedWords { .. } => "❌ Your message contains a banned word.".to_string(),
    }
}

fn moderation_failure(err: ModerationError) -> Reply {
    match err {
        ModerationError::UnknownUser(id) => Reply::Notice(format!("❓ User {} is unknown.", id)),
        ModerationError::Storage(e) => {
            tracing::error!("Moderation storage failure: {}", e);
            Reply::TryAgain
        }
    }
}

fn vote_failure(err: VoteError) -> Reply {
    match err {
        VoteError::Validation(reason) => Reply::Notice(format!("❌ {}", reason)),
        VoteError::TopicNotFound(id) => Reply::Notice(format!("❓ Topic #{} does not exist.", id)),
        VoteError::Storage(e) => {
            tracing::error!("Voting storage failure: {}", e);
            Reply::TryAgain
        }
    }
}

/// Shared state handed to every handler invocation.
pub struct ChannelHandlers<S: ModerationStore + VoteStore> {
    pub moderation: Arc<ModerationService<S>>,
    pub voting: Arc<VoteService<S>>,
    admin_ids: HashSet<i64>,
}

impl<S: ModerationStore + VoteStore> ChannelHandlers<S> {
    pub fn new(
        moderation: Arc<ModerationService<S>>,
        voting: Arc<VoteService<S>>,
        admin_ids: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            moderation,
            voting,
            admin_ids: admin_ids.into_iter().collect(),
        }
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }

    pub async fn on_incoming_message(&self, sender: &UserMeta, text: &str) -> Reply {
        match self.moderation.evaluate(sender, text).await {
            Ok(Decision::Admit { .. }) => Reply::Silent,
            Ok(Decision::Reject(rejection)) => Reply::Removed(rejection_text(&rejection)),
            Err(e) => moderation_failure(e),
        }
    }

    pub async fn on_vote_command(
        &self,
        sender: &UserMeta,
        topic_id: i64,
        vote_type: VoteType,
    ) -> Reply {
        match self.voting.vote(topic_id, sender, vote_type).await {
            Ok(VoteOutcome::Accepted) => {
                Reply::Notice(format!("✅ Your vote for topic #{} was counted.", topic_id))
            }
            Ok(VoteOutcome::AlreadyVoted) => Reply::Notice(format!(
                "ℹ️ You have already voted for topic #{}.",
                topic_id
            )),
            Ok(VoteOutcome::TopicClosed) => {
                Reply::Notice(format!("🔒 Voting on topic #{} is closed.", topic_id))
            }
            Err(e) => vote_failure(e),
        }
    }

    pub async fn on_propose_command(&self, sender: &UserMeta, title: &str) -> Reply {
        match self.voting.propose(title, Some(sender)).await {
            Ok(topic_id) => Reply::Notice(format!(
                "📝 Topic #{} proposed by {}: {}",
                topic_id,
                sender.display_name(),
                title.trim()
            )),
            Err(e) => vote_failure(e),
        }
    }

    pub async fn on_top_command(&self, limit: usize) -> Reply {
        match self.voting.top_topics(limit).await {
            Ok(topics) if topics.is_empty() => Reply::Notice("No topics yet.".to_string()),
            Ok(topics) => {
                let lines: Vec<String> = topics
                    .iter()
                    .enumerate()
                    .map(|(rank, t)| {
                        format!("{}. #{} {} - {} votes", rank + 1, t.topic_id, t.title, t.votes)
                    })
                    .collect();
                Reply::Notice(format!("🏆 Top topics\n{}", lines.join("\n")))
            }
            Err(e) => vote_failure(e),
        }
    }

    pub async fn on_results_command(&self, topic_id: i64) -> Reply {
        match self.voting.results(topic_id).await {
            Ok(r) => Reply::Notice(format!(
                "📊 #{} {}: {} votes (👍 {} / 👎 {})",
                r.topic_id, r.title, r.votes, r.up, r.down
            )),
            Err(e) => vote_failure(e),
        }
    }

    pub async fn on_current_command(&self) -> Reply {
        match self.voting.current_topic().await {
            Ok(Some(t)) => Reply::Notice(format!(
                "🗳️ Current topic #{}: {} ({} votes)",
                t.topic_id, t.title, t.votes
            )),
            Ok(None) => Reply::Notice("No active topic right now.".to_string()),
            Err(e) => vote_failure(e),
        }
    }

    pub async fn on_my_votes_command(&self, sender: &UserMeta) -> Reply {
        match self.voting.user_votes(sender.user_id).await {
            Ok(votes) if votes.is_empty() => {
                Reply::Notice("You have not voted yet.".to_string())
            }
            Ok(votes) => {
                let lines: Vec<String> = votes
                    .iter()
                    .map(|v| format!("#{} {} - {}", v.topic.topic_id, v.topic.title, v.vote_type))
                    .collect();
                Reply::Notice(lines.join("\n"))
            }
            Err(e) => vote_failure(e),
        }
    }

    pub async fn on_stats_command(&self, sender: &UserMeta) -> Reply {
        let stats = match self.moderation.user_stats(sender.user_id).await {
            Ok(stats) => stats,
            Err(e) => return moderation_failure(e),
        };
        let channel = match self.moderation.activity(None).await {
            Ok(counts) => counts,
            Err(e) => return moderation_failure(e),
        };
        let recent = match self
            .moderation
            .recent_messages(sender.user_id, RECENT_IN_STATS)
            .await
        {
            Ok(messages) => messages,
            Err(e) => return moderation_failure(e),
        };

        let personal = match stats {
            Some(s) => format!(
                "You: {} messages, {}/{} warnings{}",
                s.message_count,
                s.user.warnings,
                self.moderation.config().warning_limit,
                if s.user.is_blocked { ", blocked" } else { "" }
            ),
            None => "You have not written anything yet.".to_string(),
        };
        let mut text = format!(
            "📈 {}\nChannel: {} in the last minute, {} in the last hour, {} today",
            personal, channel.per_minute, channel.per_hour, channel.per_day
        );
        if !recent.is_empty() {
            text.push_str("\nYour latest:");
            for message in &recent {
                text.push_str(&format!(
                    "\n  {} {}",
                    message.created_at.format("%H:%M"),
                    message.text
                ));
            }
        }
        Reply::Notice(text)
    }

    pub async fn on_unblock_command(&self, admin: &UserMeta, target: i64) -> Reply {
        if !self.is_admin(admin.user_id) {
            return Reply::Notice("⛔ Only channel admins can unblock users.".to_string());
        }
        match self.moderation.unblock(target).await {
            Ok(()) => Reply::Notice(format!("✅ User {} is unblocked.", target)),
            Err(e) => moderation_failure(e),
        }
    }

    pub async fn on_close_command(&self, admin: &UserMeta, topic_id: i64) -> Reply {
        if !self.is_admin(admin.user_id) {
            return Reply::Notice("⛔ Only channel admins can close topics.".to_string());
        }
        match self.voting.close_topic(topic_id).await {
            Ok(true) => Reply::Notice(format!("🔒 Topic #{} is closed.", topic_id)),
            Ok(false) => Reply::Notice(format!("Topic #{} was already closed.", topic_id)),
            Err(e) => vote_failure(e),
        }
    }
}
