// Moderation domain models - data structures for the channel moderation system.
//
// These are pure domain types with no transport dependencies.
// The transport layer turns a `Decision` into a reply for the chat.

use crate::core::storage::User;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trailing time window used for rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Window {
    Minute,
    Hour,
    Day,
}

impl Window {
    pub const ALL: [Window; 3] = [Window::Minute, Window::Hour, Window::Day];

    pub fn duration(self) -> chrono::Duration {
        match self {
            Window::Minute => chrono::Duration::minutes(1),
            Window::Hour => chrono::Duration::hours(1),
            Window::Day => chrono::Duration::days(1),
        }
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Window::Minute => write!(f, "minute"),
            Window::Hour => write!(f, "hour"),
            Window::Day => write!(f, "day"),
        }
    }
}

/// Why a message was not admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The sender was already blocked before this message.
    Blocked,
    /// Too many messages in a trailing window. Never escalates.
    RateLimited { window: Window, limit: u32 },
    /// Spam detected; the sender now has `warnings` strikes.
    Warned { warnings: u32, limit: u32 },
    /// Spam detected and the strike reached the limit; the sender is blocked now.
    BlockedNow { warnings: u32 },
    /// A banned word was found. Never escalates.
    BannedWords { word: String },
}

/// Outcome of evaluating one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Admit { message_id: i64 },
    Reject(Rejection),
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admit { .. })
    }
}

/// One pattern rule of the spam classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SpamRule {
    /// `scheme://something`
    Url,
    /// `local@domain.tld`
    Email,
    /// A run of at least `min_len` digits.
    DigitRun { min_len: usize },
    /// Any character repeated at least `min_run` times in a row.
    RepeatedChar { min_run: usize },
}

impl std::fmt::Display for SpamRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpamRule::Url => write!(f, "link"),
            SpamRule::Email => write!(f, "email address"),
            SpamRule::DigitRun { min_len } => write!(f, "{}+ digit number", min_len),
            SpamRule::RepeatedChar { min_run } => write!(f, "{}+ repeated characters", min_run),
        }
    }
}

/// Per-user message thresholds for each trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
}

impl RateLimits {
    pub fn limit_for(&self, window: Window) -> u32 {
        match window {
            Window::Minute => self.per_minute,
            Window::Hour => self.per_hour,
            Window::Day => self.per_day,
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_minute: 5,
            per_hour: 20,
            per_day: 100,
        }
    }
}

/// Configuration for the moderation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Number of spam warnings that blocks a user
    pub warning_limit: u32,
    pub rate_limits: RateLimits,
    /// Matched case-insensitively as substrings
    pub banned_words: Vec<String>,
    pub spam_rules: Vec<SpamRule>,
}

pub const DEFAULT_BANNED_WORDS: [&str; 10] = [
    "спам",
    "реклама",
    "купить",
    "продать",
    "криптовалюта",
    "биткоин",
    "заработок",
    "казино",
    "ставки",
    "лотерея",
];

impl ModerationConfig {
    pub fn default_spam_rules() -> Vec<SpamRule> {
        vec![
            SpamRule::Url,
            SpamRule::Email,
            SpamRule::DigitRun { min_len: 10 },
            SpamRule::RepeatedChar { min_run: 5 },
        ]
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            warning_limit: 3,
            rate_limits: RateLimits::default(),
            banned_words: DEFAULT_BANNED_WORDS.iter().map(|w| w.to_string()).collect(),
            spam_rules: Self::default_spam_rules(),
        }
    }
}

/// Counters as left by recording one spam warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strike {
    pub warnings: u32,
    pub is_blocked: bool,
}

/// An admitted, persisted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message_id: i64,
    pub user_id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A user together with their admitted message total.
#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub user: User,
    pub message_count: u64,
}
