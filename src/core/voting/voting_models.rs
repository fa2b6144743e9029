// Voting domain models - proposed topics and the votes cast on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteType {
    Up,
    Down,
}

impl VoteType {
    pub fn as_str(self) -> &'static str {
        match self {
            VoteType::Up => "up",
            VoteType::Down => "down",
        }
    }
}

impl std::fmt::Display for VoteType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VoteType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "up" | "+" | "yes" => Ok(VoteType::Up),
            "down" | "-" | "no" => Ok(VoteType::Down),
            other => Err(format!("Unknown vote type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicStatus {
    Active,
    Closed,
}

impl TopicStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TopicStatus::Active => "active",
            TopicStatus::Closed => "closed",
        }
    }
}

impl FromStr for TopicStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(TopicStatus::Active),
            "closed" => Ok(TopicStatus::Closed),
            other => Err(format!("Unknown topic status: {}", other)),
        }
    }
}

/// A proposed topic. `votes` counts every accepted vote, up or down.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub topic_id: i64,
    pub title: String,
    pub proposed_by: Option<i64>,
    pub votes: u32,
    pub status: TopicStatus,
    pub created_at: DateTime<Utc>,
}

/// Result of a vote attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Accepted,
    AlreadyVoted,
    TopicClosed,
}

/// Tally of one topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteResults {
    pub topic_id: i64,
    pub title: String,
    pub votes: u32,
    pub up: u32,
    pub down: u32,
}

/// A topic the user voted on, with their choice.
#[derive(Debug, Clone, PartialEq)]
pub struct UserVote {
    pub topic: Topic,
    pub vote_type: VoteType,
    pub voted_at: DateTime<Utc>,
}
