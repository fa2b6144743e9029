// SQLite-backed channel store: users, admitted messages, topics and votes.
//
// Tables:
// - users: senders with their warning counter and block flag
// - messages: admitted messages, used for rate windows and stats
// - topics: proposed topics with a denormalized vote tally
// - votes: one row per (topic, user), enforced by a UNIQUE constraint
//
// Counters are only changed by single statements (`UPDATE ... RETURNING`,
// `INSERT ... ON CONFLICT DO NOTHING`) so concurrent writers cannot lose
// updates.

use crate::core::moderation::{ModerationStore, StoredMessage, Strike, UserStats};
use crate::core::storage::{StorageError, User, UserMeta, UserStore};
use crate::core::voting::{Topic, TopicStatus, UserVote, VoteResults, VoteStore, VoteType};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

const SCHEMA: [&str; 8] = [
    r#"
    CREATE TABLE IF NOT EXISTS users (
        user_id INTEGER PRIMARY KEY,
        username TEXT,
        first_name TEXT,
        last_name TEXT,
        warnings INTEGER NOT NULL DEFAULT 0 CHECK (warnings >= 0),
        is_blocked BOOLEAN NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS messages (
        message_id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(user_id),
        text TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_messages_user_created ON messages(user_id, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_messages_created ON messages(created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS topics (
        topic_id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        proposed_by INTEGER REFERENCES users(user_id),
        votes INTEGER NOT NULL DEFAULT 0 CHECK (votes >= 0),
        status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'closed')),
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_topics_ranking ON topics(votes DESC, created_at DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS votes (
        vote_id INTEGER PRIMARY KEY AUTOINCREMENT,
        topic_id INTEGER NOT NULL REFERENCES topics(topic_id),
        user_id INTEGER NOT NULL REFERENCES users(user_id),
        vote_type TEXT NOT NULL CHECK (vote_type IN ('up', 'down')),
        created_at TEXT NOT NULL,
        UNIQUE (topic_id, user_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_votes_user ON votes(user_id, created_at)",
];

/// Fixed-width UTC timestamps so text comparison matches time order.
fn to_db_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_db_time(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Backend(format!("bad timestamp {:?}: {}", value, e)))
}

/// A failed foreign key means the referenced row is missing; report it as
/// `missing` instead of a backend fault.
fn reference_error(e: sqlx::Error, missing: StorageError) -> StorageError {
    match &e {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => missing,
        _ => StorageError::Backend(e.to_string()),
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User, StorageError> {
    let created_at: String = row.get("created_at");
    Ok(User {
        user_id: row.get("user_id"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        warnings: row.get::<i64, _>("warnings") as u32,
        is_blocked: row.get("is_blocked"),
        created_at: parse_db_time(&created_at)?,
    })
}

fn topic_from_row(row: &SqliteRow) -> Result<Topic, StorageError> {
    let status: String = row.get("status");
    let created_at: String = row.get("created_at");
    Ok(Topic {
        topic_id: row.get("topic_id"),
        title: row.get("title"),
        proposed_by: row.get("proposed_by"),
        votes: row.get::<i64, _>("votes") as u32,
        status: TopicStatus::from_str(&status).map_err(StorageError::Backend)?,
        created_at: parse_db_time(&created_at)?,
    })
}

#[derive(Clone)]
pub struct SqliteChannelStore {
    pool: SqlitePool,
}

impl SqliteChannelStore {
    /// Open (creating if needed) the database and run migrations.
    ///
    /// `timeout` bounds both pool checkout and lock waits; hitting it
    /// surfaces as a storage error.
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(timeout)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run database migrations to create required tables.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl UserStore for SqliteChannelStore {
    async fn upsert_user(&self, meta: &UserMeta) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, username, first_name, last_name, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO NOTHING
            "#,
        )
        .bind(meta.user_id)
        .bind(meta.username.as_deref())
        .bind(meta.first_name.as_deref())
        .bind(meta.last_name.as_deref())
        .bind(to_db_time(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_user(&self, user_id: i64) -> Result<Option<User>, StorageError> {
        let row = sqlx::query("SELECT * FROM users WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.as_ref().map(user_from_row).transpose()
    }
}

#[async_trait]
impl ModerationStore for SqliteChannelStore {
    async fn increment_warning(&self, user_id: i64, block_at: u32) -> Result<Strike, StorageError> {
        // Right-hand sides see the row before the update.
        let row = sqlx::query(
            r#"
            UPDATE users
            SET warnings = warnings + 1,
                is_blocked = CASE WHEN warnings + 1 >= ? THEN 1 ELSE is_blocked END
            WHERE user_id = ?
            RETURNING warnings, is_blocked
            "#,
        )
        .bind(i64::from(block_at))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?
        .ok_or(StorageError::UserNotFound(user_id))?;

        Ok(Strike {
            warnings: row.get::<i64, _>("warnings") as u32,
            is_blocked: row.get("is_blocked"),
        })
    }

    async fn reset_warnings(&self, user_id: i64) -> Result<(), StorageError> {
        let result = sqlx::query("UPDATE users SET warnings = 0, is_blocked = 0 WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::UserNotFound(user_id));
        }
        Ok(())
    }

    async fn count_messages(
        &self,
        user_id: Option<i64>,
        since: DateTime<Utc>,
    ) -> Result<u64, StorageError> {
        let query = match user_id {
            Some(user_id) => sqlx::query(
                "SELECT COUNT(*) AS n FROM messages WHERE user_id = ? AND created_at >= ?",
            )
            .bind(user_id),
            None => sqlx::query("SELECT COUNT(*) AS n FROM messages WHERE created_at >= ?"),
        };

        let row = query
            .bind(to_db_time(since))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(row.get::<i64, _>("n") as u64)
    }

    async fn insert_message(
        &self,
        user_id: i64,
        text: &str,
        at: DateTime<Utc>,
    ) -> Result<i64, StorageError> {
        let result =
            sqlx::query("INSERT INTO messages (user_id, text, created_at) VALUES (?, ?, ?)")
                .bind(user_id)
                .bind(text)
                .bind(to_db_time(at))
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    async fn recent_messages(
        &self,
        user_id: i64,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT message_id, user_id, text, created_at
            FROM messages
            WHERE user_id = ?
            ORDER BY created_at DESC, message_id DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let created_at: String = row.get("created_at");
                Ok(StoredMessage {
                    message_id: row.get("message_id"),
                    user_id: row.get("user_id"),
                    text: row.get("text"),
                    created_at: parse_db_time(&created_at)?,
                })
            })
            .collect()
    }

    async fn user_stats(&self, user_id: i64) -> Result<Option<UserStats>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT u.*,
                   (SELECT COUNT(*) FROM messages m WHERE m.user_id = u.user_id) AS message_count
            FROM users u
            WHERE u.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        match row {
            Some(row) => Ok(Some(UserStats {
                user: user_from_row(&row)?,
                message_count: row.get::<i64, _>("message_count") as u64,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl VoteStore for SqliteChannelStore {
    async fn create_topic(
        &self,
        title: &str,
        proposed_by: Option<i64>,
        at: DateTime<Utc>,
    ) -> Result<i64, StorageError> {
        let result = sqlx::query(
            "INSERT INTO topics (title, proposed_by, created_at) VALUES (?, ?, ?)",
        )
        .bind(title)
        .bind(proposed_by)
        .bind(to_db_time(at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            reference_error(e, StorageError::UserNotFound(proposed_by.unwrap_or_default()))
        })?;

        Ok(result.last_insert_rowid())
    }

    async fn get_topic(&self, topic_id: i64) -> Result<Option<Topic>, StorageError> {
        let row = sqlx::query("SELECT * FROM topics WHERE topic_id = ?")
            .bind(topic_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.as_ref().map(topic_from_row).transpose()
    }

    async fn has_voted(&self, topic_id: i64, user_id: i64) -> Result<bool, StorageError> {
        let row = sqlx::query("SELECT 1 FROM votes WHERE topic_id = ? AND user_id = ?")
            .bind(topic_id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(row.is_some())
    }

    async fn cast_vote(
        &self,
        topic_id: i64,
        user_id: i64,
        vote_type: VoteType,
        at: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        // The first statement is a write, so the transaction takes the write
        // lock up front and the tally update below cannot interleave.
        // Topics are never deleted and callers look the topic up first, so a
        // dangling reference here is the voter.
        let inserted = sqlx::query(
            r#"
            INSERT INTO votes (topic_id, user_id, vote_type, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(topic_id, user_id) DO NOTHING
            "#,
        )
        .bind(topic_id)
        .bind(user_id)
        .bind(vote_type.as_str())
        .bind(to_db_time(at))
        .execute(&mut *tx)
        .await
        .map_err(|e| reference_error(e, StorageError::UserNotFound(user_id)))?
        .rows_affected();

        if inserted == 0 {
            tx.rollback()
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            return Ok(false);
        }

        let updated = sqlx::query("UPDATE topics SET votes = votes + 1 WHERE topic_id = ?")
            .bind(topic_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .rows_affected();

        if updated == 0 {
            tx.rollback()
                .await
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            return Err(StorageError::TopicNotFound(topic_id));
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(true)
    }

    async fn top_topics(&self, limit: usize) -> Result<Vec<Topic>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM topics
            ORDER BY votes DESC, created_at DESC, topic_id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.iter().map(topic_from_row).collect()
    }

    async fn vote_results(&self, topic_id: i64) -> Result<Option<VoteResults>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT t.topic_id, t.title, t.votes,
                   COALESCE(SUM(CASE WHEN v.vote_type = 'up' THEN 1 ELSE 0 END), 0) AS up,
                   COALESCE(SUM(CASE WHEN v.vote_type = 'down' THEN 1 ELSE 0 END), 0) AS down
            FROM topics t
            LEFT JOIN votes v ON v.topic_id = t.topic_id
            WHERE t.topic_id = ?
            GROUP BY t.topic_id
            "#,
        )
        .bind(topic_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(row.map(|row| VoteResults {
            topic_id: row.get("topic_id"),
            title: row.get("title"),
            votes: row.get::<i64, _>("votes") as u32,
            up: row.get::<i64, _>("up") as u32,
            down: row.get::<i64, _>("down") as u32,
        }))
    }

    async fn current_topic(&self) -> Result<Option<Topic>, StorageError> {
        let row = sqlx::query(
            r#"
            SELECT * FROM topics
            WHERE status = ?
            ORDER BY created_at DESC, topic_id DESC
            LIMIT 1
            "#,
        )
        .bind(TopicStatus::Active.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.as_ref().map(topic_from_row).transpose()
    }

    async fn user_votes(&self, user_id: i64) -> Result<Vec<UserVote>, StorageError> {
        let rows = sqlx::query(
            r#"
            SELECT t.*, v.vote_type, v.created_at AS voted_at
            FROM votes v
            JOIN topics t ON t.topic_id = v.topic_id
            WHERE v.user_id = ?
            ORDER BY v.created_at DESC, v.vote_id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.iter()
            .map(|row| {
                let vote_type: String = row.get("vote_type");
                let voted_at: String = row.get("voted_at");
                Ok(UserVote {
                    topic: topic_from_row(row)?,
                    vote_type: VoteType::from_str(&vote_type).map_err(StorageError::Backend)?,
                    voted_at: parse_db_time(&voted_at)?,
                })
            })
            .collect()
    }

    async fn close_topic(&self, topic_id: i64) -> Result<bool, StorageError> {
        let result = sqlx::query(
            "UPDATE topics SET status = ? WHERE topic_id = ? AND status = ?",
        )
        .bind(TopicStatus::Closed.as_str())
        .bind(topic_id)
        .bind(TopicStatus::Active.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{Decision, ModerationConfig, ModerationService, Rejection};
    use crate::core::voting::{VoteOutcome, VoteService};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn open_store(dir: &TempDir) -> SqliteChannelStore {
        let url = format!("sqlite://{}", dir.path().join("channel.db").display());
        SqliteChannelStore::new(&url, 5, Duration::from_secs(10))
            .await
            .unwrap()
    }

    async fn register(store: &SqliteChannelStore, ids: impl IntoIterator<Item = i64>) {
        for id in ids {
            store.upsert_user(&UserMeta::new(id)).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_upsert_never_resets_counters() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        store
            .upsert_user(&UserMeta::new(1).with_username("first"))
            .await
            .unwrap();
        store.increment_warning(1, 3).await.unwrap();
        store
            .upsert_user(&UserMeta::new(1).with_username("second"))
            .await
            .unwrap();

        let user = store.get_user(1).await.unwrap().unwrap();
        assert_eq!(user.username.as_deref(), Some("first"));
        assert_eq!(user.warnings, 1);
        assert!(!user.is_blocked);
    }

    #[tokio::test]
    async fn test_warning_counter_and_reset() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        register(&store, [5]).await;

        assert_eq!(
            store.increment_warning(5, 2).await.unwrap(),
            Strike { warnings: 1, is_blocked: false }
        );
        assert_eq!(
            store.increment_warning(5, 2).await.unwrap(),
            Strike { warnings: 2, is_blocked: true }
        );
        assert!(store.get_user(5).await.unwrap().unwrap().is_blocked);

        store.reset_warnings(5).await.unwrap();
        let user = store.get_user(5).await.unwrap().unwrap();
        assert_eq!(user.warnings, 0);
        assert!(!user.is_blocked);
    }

    #[tokio::test]
    async fn test_unknown_user_updates_fail() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

        assert_eq!(
            store.increment_warning(404, 3).await.unwrap_err(),
            StorageError::UserNotFound(404)
        );
        assert_eq!(
            store.reset_warnings(404).await.unwrap_err(),
            StorageError::UserNotFound(404)
        );
    }

    #[tokio::test]
    async fn test_unknown_user_references_are_not_backend_faults() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;

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
        assert_eq!(store.vote_results(topic).await.unwrap().unwrap().votes, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_warnings_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        register(&store, [9]).await;

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.increment_warning(9, 3).await })
            })
            .collect();

        let mut seen = Vec::new();
        for handle in handles {
            let strike = handle.await.unwrap().unwrap();
            assert_eq!(strike.is_blocked, strike.warnings >= 3);
            seen.push(strike.warnings);
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=10).collect::<Vec<u32>>());
        let user = store.get_user(9).await.unwrap().unwrap();
        assert_eq!((user.warnings, user.is_blocked), (10, true));
    }

    #[tokio::test]
    async fn test_message_windows() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        register(&store, [1, 2]).await;
        let now = Utc::now();

        store
            .insert_message(1, "old", now - chrono::Duration::hours(2))
            .await
            .unwrap();
        store
            .insert_message(1, "recent", now - chrono::Duration::seconds(30))
            .await
            .unwrap();
        store.insert_message(2, "other", now).await.unwrap();

        let minute_ago = now - chrono::Duration::minutes(1);
        let day_ago = now - chrono::Duration::days(1);
        assert_eq!(store.count_messages(Some(1), minute_ago).await.unwrap(), 1);
        assert_eq!(store.count_messages(Some(1), day_ago).await.unwrap(), 2);
        assert_eq!(store.count_messages(None, minute_ago).await.unwrap(), 2);

        let recent = store.recent_messages(1, 10).await.unwrap();
        assert_eq!(recent[0].text, "recent");
        assert_eq!(recent[1].text, "old");

        let stats = store.user_stats(1).await.unwrap().unwrap();
        assert_eq!(stats.message_count, 2);
    }

    #[tokio::test]
    async fn test_cast_vote_once() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        register(&store, [1]).await;
        let topic = store.create_topic("Rust", Some(1), Utc::now()).await.unwrap();

        assert!(store.cast_vote(topic, 1, VoteType::Up, Utc::now()).await.unwrap());
        assert!(!store.cast_vote(topic, 1, VoteType::Down, Utc::now()).await.unwrap());
        assert!(store.has_voted(topic, 1).await.unwrap());

        let results = store.vote_results(topic).await.unwrap().unwrap();
        assert_eq!((results.votes, results.up, results.down), (1, 1, 0));
    }

    #[tokio::test]
    async fn test_top_topics_prefers_newer_on_ties() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        register(&store, 1..=13).await;

        let t0 = Utc::now() - chrono::Duration::hours(3);
        let t1 = store.create_topic("first", None, t0).await.unwrap();
        let t2 = store
            .create_topic("second", None, t0 + chrono::Duration::hours(1))
            .await
            .unwrap();
        let t3 = store
            .create_topic("third", None, t0 + chrono::Duration::hours(2))
            .await
            .unwrap();

        let mut voter = 1..=13;
        for (topic, count) in [(t1, 5), (t2, 5), (t3, 3)] {
            for user in voter.by_ref().take(count) {
                store
                    .cast_vote(topic, user, VoteType::Up, Utc::now())
                    .await
                    .unwrap();
            }
        }

        let top = store.top_topics(2).await.unwrap();
        let ids: Vec<i64> = top.iter().map(|t| t.topic_id).collect();
        assert_eq!(ids, vec![t2, t1]);
        assert!(top.iter().all(|t| t.votes == 5));
    }

    #[tokio::test]
    async fn test_current_topic_and_close() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let now = Utc::now();
        let older = store
            .create_topic("older", None, now - chrono::Duration::minutes(5))
            .await
            .unwrap();
        let newer = store.create_topic("newer", None, now).await.unwrap();

        assert_eq!(store.current_topic().await.unwrap().unwrap().topic_id, newer);
        assert!(store.close_topic(newer).await.unwrap());
        assert_eq!(store.current_topic().await.unwrap().unwrap().topic_id, older);
        assert_eq!(
            store.get_topic(newer).await.unwrap().unwrap().status,
            TopicStatus::Closed
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_votes_all_counted() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let service = Arc::new(VoteService::new(store));
        let topic = service.propose("Concurrency", None).await.unwrap();

        let handles: Vec<_> = (1..=24)
            .map(|user| {
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    service
                        .vote(topic, &UserMeta::new(user), VoteType::Up)
                        .await
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), VoteOutcome::Accepted);
        }
        assert_eq!(service.results(topic).await.unwrap().votes, 24);
    }

    #[tokio::test]
    async fn test_three_strikes_over_sqlite() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir).await;
        let service = ModerationService::new(store, ModerationConfig::default());
        let sender = UserMeta::new(77);

        let mut decisions = Vec::new();
        for _ in 0..4 {
            decisions.push(service.evaluate(&sender, "call 12345678901").await.unwrap());
        }

        assert_eq!(
            decisions,
            vec![
                Decision::Reject(Rejection::Warned { warnings: 1, limit: 3 }),
                Decision::Reject(Rejection::Warned { warnings: 2, limit: 3 }),
                Decision::Reject(Rejection::BlockedNow { warnings: 3 }),
                Decision::Reject(Rejection::Blocked),
            ]
        );
        let user = service.get_user(77).await.unwrap().unwrap();
        assert_eq!(user.warnings, 3);
        assert!(user.is_blocked);
    }
}
