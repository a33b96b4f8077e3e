use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use tnb_core::{ConversationReference, PagedData};
use tokio::task::spawn_blocking;

use crate::{ReferenceStorage, RegistryEntry, Result, SharedReferenceStorage, StoreError};

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS conversation_references (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    key TEXT NOT NULL UNIQUE,
    reference TEXT NOT NULL
);
"#;

/// SQLite-backed storage. Upserts are single statements and listing pages in SQL.
///
/// Rows are listed by `seq`, which an upsert leaves unchanged, so overwriting an entry keeps
/// its position.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<StdMutex<Connection>>,
}

pub fn sqlite_storage(path: impl AsRef<Path>) -> Result<SharedReferenceStorage> {
    Ok(Arc::new(SqliteStorage::open(path)?))
}

fn backend(err: impl Into<anyhow::Error>) -> StoreError {
    StoreError::Backend(err.into())
}

fn decode(raw: &str) -> Result<ConversationReference> {
    serde_json::from_str(raw).map_err(backend)
}

impl SqliteStorage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(backend)?;
        conn.execute_batch(CREATE_TABLE_SQL).map_err(backend)?;
        Ok(Self {
            conn: Arc::new(StdMutex::new(conn)),
        })
    }

    async fn with_conn<F, T>(&self, func: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| backend(anyhow::anyhow!("sqlite connection lock poisoned")))?;
            func(&guard)
        })
        .await
        .map_err(backend)?
    }
}

#[async_trait]
impl ReferenceStorage for SqliteStorage {
    async fn read(&self, key: &str) -> Result<Option<ConversationReference>> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT reference FROM conversation_references WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
                .map_err(backend)?;
            raw.as_deref().map(decode).transpose()
        })
        .await
    }

    async fn add(
        &self,
        key: &str,
        reference: ConversationReference,
        overwrite: bool,
    ) -> Result<bool> {
        let key = key.to_string();
        let payload = serde_json::to_string(&reference).map_err(StoreError::Encode)?;
        self.with_conn(move |conn| {
            let sql = if overwrite {
                "INSERT INTO conversation_references (key, reference) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET reference = excluded.reference"
            } else {
                "INSERT OR IGNORE INTO conversation_references (key, reference) VALUES (?1, ?2)"
            };
            let changed = conn.execute(sql, params![key, payload]).map_err(backend)?;
            Ok(changed > 0)
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let changed = conn
                .execute(
                    "DELETE FROM conversation_references WHERE key = ?1",
                    params![key],
                )
                .map_err(backend)?;
            Ok(changed > 0)
        })
        .await
    }

    async fn list_entries(
        &self,
        page_size: Option<usize>,
        continuation_token: Option<&str>,
    ) -> Result<PagedData<RegistryEntry>> {
        let token = continuation_token
            .filter(|token| !token.is_empty())
            .map(str::to_string);
        // One extra row names the first entry of the next page.
        let limit = page_size
            .filter(|size| *size > 0)
            .map(|size| i64::try_from(size).unwrap_or(i64::MAX - 1) + 1)
            .unwrap_or(-1);
        let page_size = page_size.filter(|size| *size > 0);
        self.with_conn(move |conn| {
            let start: i64 = match token {
                Some(token) => conn
                    .query_row(
                        "SELECT seq FROM conversation_references WHERE key = ?1",
                        params![token],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(backend)?
                    .ok_or_else(|| StoreError::UnknownContinuationToken(token.clone()))?,
                None => 0,
            };
            let mut stmt = conn
                .prepare(
                    "SELECT key, reference FROM conversation_references
                     WHERE seq >= ?1 ORDER BY seq LIMIT ?2",
                )
                .map_err(backend)?;
            let rows = stmt
                .query_map(params![start, limit], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(backend)?;

            let mut entries = Vec::new();
            for row in rows {
                let (key, raw) = row.map_err(backend)?;
                entries.push(RegistryEntry {
                    reference: decode(&raw)?,
                    key,
                });
            }
            let next = match page_size {
                Some(size) if entries.len() > size => entries.pop().map(|entry| entry.key),
                _ => None,
            };
            Ok(PagedData::new(entries, next))
        })
        .await
    }
}
