//! SQLite-backed entry store

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tokio::sync::Mutex;

use super::{EntryStore, StoreError, StoreResult, TrackedEntry};

/// Where the SQLite database lives
#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

impl Location {
    fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Memory => ":memory:".to_string(),
        }
    }
}

/// SQLite implementation of [`EntryStore`]
///
/// The connection is opened on first use and cached for the lifetime of the
/// store. Uses an async `Mutex` so the handle can be shared across tasks.
pub struct SqliteEntryStore {
    location: Location,
    conn: Mutex<Option<Connection>>,
}

impl SqliteEntryStore {
    /// Create a store backed by a database file. Nothing is opened yet.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            location: Location::File(path.as_ref().to_path_buf()),
            conn: Mutex::new(None),
        }
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> Self {
        Self {
            location: Location::Memory,
            conn: Mutex::new(None),
        }
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let open_err = |e: &dyn std::fmt::Display| StoreError::Open {
            location: self.location.describe(),
            reason: e.to_string(),
        };

        let conn = match &self.location {
            Location::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(|e| open_err(&e))?;
                }
                let conn = Connection::open(path).map_err(|e| open_err(&e))?;
                conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
                    .map_err(|e| open_err(&e))?;
                conn
            }
            Location::Memory => Connection::open_in_memory().map_err(|e| open_err(&e))?,
        };

        conn.execute_batch(
            r#"
                CREATE TABLE IF NOT EXISTS applications (
                    resource_id TEXT PRIMARY KEY,
                    source_location TEXT NOT NULL,
                    last_update INTEGER NOT NULL DEFAULT 0
                );

                CREATE INDEX IF NOT EXISTS idx_applications_source
                    ON applications(source_location);

                CREATE INDEX IF NOT EXISTS idx_applications_last_update
                    ON applications(last_update);
            "#,
        )
        .map_err(|e| open_err(&e))?;

        tracing::info!(location = %self.location.describe(), "Entry store opened");
        Ok(conn)
    }

    /// Run `f` against the cached connection, opening it first if needed
    async fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.open_connection()?);
        }
        match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(StoreError::Open {
                location: self.location.describe(),
                reason: "connection unavailable".to_string(),
            }),
        }
    }
}

fn read_err(e: rusqlite::Error) -> StoreError {
    StoreError::Read(e.to_string())
}

fn write_err(e: rusqlite::Error) -> StoreError {
    StoreError::Write(e.to_string())
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<TrackedEntry> {
    Ok(TrackedEntry {
        resource_id: row.get(0)?,
        source_location: row.get(1)?,
        last_update: row.get(2)?,
    })
}

fn select_one(conn: &Connection, resource_id: &str) -> StoreResult<Option<TrackedEntry>> {
    conn.query_row(
        "SELECT resource_id, source_location, last_update
         FROM applications WHERE resource_id = ?1",
        params![resource_id],
        row_to_entry,
    )
    .optional()
    .map_err(read_err)
}

#[async_trait]
impl EntryStore for SqliteEntryStore {
    async fn open(&self) -> StoreResult<()> {
        self.with_conn(|_| Ok(())).await
    }

    async fn get(&self, resource_id: &str) -> StoreResult<TrackedEntry> {
        self.with_conn(|conn| {
            select_one(conn, resource_id)?
                .ok_or_else(|| StoreError::NotFound(resource_id.to_string()))
        })
        .await
    }

    async fn insert(&self, entry: &TrackedEntry) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO applications (resource_id, source_location, last_update)
                 VALUES (?1, ?2, ?3)",
                params![entry.resource_id, entry.source_location, entry.last_update],
            )
            .map_err(|e| {
                if is_constraint_violation(&e) {
                    StoreError::Duplicate(entry.resource_id.clone())
                } else {
                    write_err(e)
                }
            })?;
            Ok(())
        })
        .await
    }

    async fn put(&self, entry: &TrackedEntry) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO applications (resource_id, source_location, last_update)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(resource_id) DO UPDATE SET
                    source_location = excluded.source_location,
                    last_update = excluded.last_update",
                params![entry.resource_id, entry.source_location, entry.last_update],
            )
            .map_err(write_err)?;
            Ok(())
        })
        .await
    }

    async fn touch(&self, resource_id: &str, last_update: i64) -> StoreResult<()> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE applications SET last_update = ?2 WHERE resource_id = ?1",
                    params![resource_id, last_update],
                )
                .map_err(write_err)?;
            if changed == 0 {
                return Err(StoreError::NotFound(resource_id.to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, resource_id: &str) -> StoreResult<TrackedEntry> {
        self.with_conn(|conn| {
            let existing = select_one(conn, resource_id)?
                .ok_or_else(|| StoreError::NotFound(resource_id.to_string()))?;
            conn.execute(
                "DELETE FROM applications WHERE resource_id = ?1",
                params![resource_id],
            )
            .map_err(write_err)?;
            Ok(existing)
        })
        .await
    }

    async fn iterate_all(&self) -> StoreResult<Vec<TrackedEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT resource_id, source_location, last_update
                     FROM applications ORDER BY resource_id",
                )
                .map_err(read_err)?;
            let rows = stmt.query_map([], row_to_entry).map_err(read_err)?;
            let entries = rows
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(read_err)?;
            Ok(entries)
        })
        .await
    }

    async fn count(&self) -> StoreResult<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM applications", [], |row| row.get(0))
                .map_err(read_err)?;
            Ok(count as usize)
        })
        .await
    }
}
