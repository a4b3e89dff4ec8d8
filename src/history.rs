use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::info;

use crate::conversation::{limit_turns, ConversationTurn};

/// Per-chat conversation history collaborator. The core borrows the
/// history for the duration of one request: load, mutate in memory,
/// save. `limit` applies the store's window policy without reordering.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn load(&self, chat_id: i64) -> Result<Vec<ConversationTurn>>;
    fn limit(&self, turns: Vec<ConversationTurn>) -> Vec<ConversationTurn>;
    async fn save(&self, chat_id: i64, turns: &[ConversationTurn]) -> Result<()>;
}

/// SQLite-backed store: one row per chat, turns serialized as JSON.
///
/// The window policy is a fixed turn count (`max_turns`). It is applied
/// on `load` as well, so a saved history of load + new turns keeps the
/// database bounded without ever rewriting what a request appended.
#[derive(Clone)]
pub struct SqliteHistoryStore {
    conn: Arc<Mutex<Connection>>,
    max_turns: usize,
}

impl SqliteHistoryStore {
    pub fn open(path: &Path, max_turns: usize) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Self::run_migrations(&conn)?;

        info!("History store initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_turns,
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(max_turns: usize) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_turns,
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS histories (
                chat_id    INTEGER PRIMARY KEY,
                turns      TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )
        .context("Failed to run migrations")?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn load(&self, chat_id: i64) -> Result<Vec<ConversationTurn>> {
        let conn = self.conn.lock().await;
        let json: Option<String> = conn
            .query_row(
                "SELECT turns FROM histories WHERE chat_id = ?1",
                rusqlite::params![chat_id],
                |row| row.get(0),
            )
            .ok();

        let turns = match json {
            Some(json) => {
                serde_json::from_str(&json).context("Failed to decode stored history")?
            }
            None => Vec::new(),
        };

        Ok(limit_turns(turns, self.max_turns))
    }

    fn limit(&self, turns: Vec<ConversationTurn>) -> Vec<ConversationTurn> {
        limit_turns(turns, self.max_turns)
    }

    async fn save(&self, chat_id: i64, turns: &[ConversationTurn]) -> Result<()> {
        let json = serde_json::to_string(turns).context("Failed to encode history")?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO histories (chat_id, turns, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(chat_id) DO UPDATE SET
                 turns = excluded.turns,
                 updated_at = excluded.updated_at",
            rusqlite::params![chat_id, json],
        )
        .context("Failed to save history")?;
        Ok(())
    }
}
