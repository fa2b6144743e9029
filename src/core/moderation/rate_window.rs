// Sliding-window message counting backed by store queries.

use super::moderation_models::{RateLimits, Window};
use super::moderation_service::ModerationStore;
use crate::core::storage::StorageError;
use chrono::{DateTime, Utc};

/// Admitted message counts over each trailing window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageCounts {
    pub per_minute: u64,
    pub per_hour: u64,
    pub per_day: u64,
}

impl MessageCounts {
    pub fn get(&self, window: Window) -> u64 {
        match window {
            Window::Minute => self.per_minute,
            Window::Hour => self.per_hour,
            Window::Day => self.per_day,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RateWindow {
    limits: RateLimits,
}

impl RateWindow {
    pub fn new(limits: RateLimits) -> Self {
        Self { limits }
    }

    /// Count messages for one user, or for everyone when `user_id` is `None`.
    ///
    /// The three window queries are issued concurrently.
    pub async fn counts<S: ModerationStore + ?Sized>(
        &self,
        store: &S,
        user_id: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<MessageCounts, StorageError> {
        let (per_minute, per_hour, per_day) = tokio::try_join!(
            store.count_messages(user_id, now - Window::Minute.duration()),
            store.count_messages(user_id, now - Window::Hour.duration()),
            store.count_messages(user_id, now - Window::Day.duration()),
        )?;

        Ok(MessageCounts {
            per_minute,
            per_hour,
            per_day,
        })
    }

    /// The shortest window the next message would push over its limit.
    ///
    /// `counts` holds messages already admitted, so the incoming one is
    /// rejected once a window is full.
    pub fn exceeded(&self, counts: &MessageCounts) -> Option<Window> {
        Window::ALL
            .into_iter()
            .find(|w| counts.get(*w) >= u64::from(self.limits.limit_for(*w)))
    }
}
