//! SQLite implementation of the MessageStore trait.
//!
//! This is the durable backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use prim_im_core::{now_millis, ChannelKey, Msg};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{require_sequenced, MessageStore, SaveResult};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection off the async runtime.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(format!("sqlite connection: {}", e)))?;
            f(&conn)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

fn decode_frames(frames: Vec<Vec<u8>>) -> Result<Vec<Msg>> {
    frames
        .iter()
        .map(|frame| Msg::decode(frame).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn save_message(&self, channel: ChannelKey, msg: &Msg) -> Result<SaveResult> {
        let seq = require_sequenced(msg)?;
        let frame = msg.encode()?;
        let head = msg.head.clone();

        self.run(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO messages (
                    channel, seq_num, sender, receiver, type, timestamp, frame, stored_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    channel.to_string(),
                    seq as i64,
                    head.sender as i64,
                    head.receiver as i64,
                    head.typ.to_u16() as i64,
                    head.timestamp as i64,
                    frame.as_ref(),
                    now_millis() as i64,
                ],
            )?;

            if inserted == 0 {
                Ok(SaveResult::AlreadyExists)
            } else {
                Ok(SaveResult::Saved)
            }
        })
        .await
    }

    async fn get_messages_in_range(
        &self,
        channel: ChannelKey,
        from: u64,
        to: u64,
    ) -> Result<Vec<Msg>> {
        if from > to {
            return Ok(Vec::new());
        }

        let frames = self
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT frame FROM messages
                     WHERE channel = ?1 AND seq_num >= ?2 AND seq_num <= ?3
                     ORDER BY seq_num ASC",
                )?;
                let rows = stmt
                    .query_map(
                        params![channel.to_string(), from as i64, to.min(i64::MAX as u64) as i64],
                        |row| row.get::<_, Vec<u8>>(0),
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        decode_frames(frames)
    }

    async fn get_messages_before(
        &self,
        channel: ChannelKey,
        before: u64,
        limit: usize,
    ) -> Result<Vec<Msg>> {
        let frames = self
            .run(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT frame FROM messages
                     WHERE channel = ?1 AND seq_num < ?2
                     ORDER BY seq_num DESC
                     LIMIT ?3",
                )?;
                let mut rows = stmt
                    .query_map(
                        params![
                            channel.to_string(),
                            before.min(i64::MAX as u64) as i64,
                            limit as i64
                        ],
                        |row| row.get::<_, Vec<u8>>(0),
                    )?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows.reverse();
                Ok(rows)
            })
            .await?;

        decode_frames(frames)
    }

    async fn latest_seq_num(&self, channel: ChannelKey) -> Result<Option<u64>> {
        self.run(move |conn| {
            let max: Option<i64> = conn.query_row(
                "SELECT MAX(seq_num) FROM messages WHERE channel = ?1",
                params![channel.to_string()],
                |row| row.get(0),
            )?;
            Ok(max.map(|seq| seq as u64))
        })
        .await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let key = key.to_string();
        self.run(move |conn| {
            conn.query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let key = key.to_string();
        let value = value.to_vec();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now_millis() as i64],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let key = key.to_string();
        self.run(move |conn| {
            conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            Ok(())
        })
        .await
    }
}
