//! SQLite persistence for accounts and complaints.
//!
//! Single connection behind an async mutex; all statements run on the
//! blocking pool. Timestamps are stored as unix milliseconds.
//!
//! `complaints.user_id` and `complaints.assigned_to` deliberately carry no
//! foreign key: removing an account leaves its complaints in place.

mod complaints;
mod users;

pub use complaints::ComplaintFilter;
pub use users::{UserComplaintStats, UserFilter};

use crate::error::{StoreError, ValidationError};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Where the database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    Path(PathBuf),
    /// Private in-memory database, gone when the store is dropped
    InMemory,
}

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create the database and make sure the schema exists
    pub async fn open(location: DbLocation) -> Result<Self, StoreError> {
        if let DbLocation::Path(path) = &location {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await?;
            }
            info!("Opening complaint database at: {}", path.display());
        } else {
            debug!("Opening in-memory complaint database");
        }

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, StoreError> {
            let conn = match location {
                DbLocation::Path(path) => {
                    let conn = Connection::open(path)?;
                    conn.pragma_update(None, "journal_mode", "WAL")?;
                    conn.pragma_update(None, "synchronous", "NORMAL")?;
                    conn
                }
                DbLocation::InMemory => Connection::open_in_memory()?,
            };
            // timeline rows follow their complaint
            conn.pragma_update(None, "foreign_keys", "ON")?;
            Ok(conn)
        })
        .await??;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    email TEXT NOT NULL UNIQUE,
                    password_hash TEXT NOT NULL,
                    role TEXT NOT NULL DEFAULT 'user',
                    is_active INTEGER NOT NULL DEFAULT 1,
                    department TEXT,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);

                CREATE TABLE IF NOT EXISTS complaints (
                    id TEXT PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    title TEXT NOT NULL,
                    category TEXT NOT NULL,
                    description TEXT NOT NULL,
                    attachments TEXT NOT NULL DEFAULT '[]',
                    status TEXT NOT NULL DEFAULT 'pending',
                    priority TEXT NOT NULL DEFAULT 'medium',
                    assigned_to TEXT,
                    resolution_note TEXT,
                    resolved_at INTEGER,
                    created_at INTEGER NOT NULL,
                    updated_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_complaints_user_status
                    ON complaints(user_id, status);
                CREATE INDEX IF NOT EXISTS idx_complaints_assignee_status
                    ON complaints(assigned_to, status);
                CREATE INDEX IF NOT EXISTS idx_complaints_category_status
                    ON complaints(category, status);
                CREATE INDEX IF NOT EXISTS idx_complaints_created
                    ON complaints(created_at);

                CREATE TABLE IF NOT EXISTS timeline_entries (
                    complaint_id TEXT NOT NULL
                        REFERENCES complaints(id) ON DELETE CASCADE,
                    seq INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    note TEXT NOT NULL DEFAULT '',
                    updated_by TEXT NOT NULL,
                    timestamp INTEGER NOT NULL,
                    PRIMARY KEY (complaint_id, seq)
                );",
            )?;
            Ok(())
        })
        .await
    }

    /// Remove every account and complaint
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute_batch(
                "DELETE FROM timeline_entries;
                 DELETE FROM complaints;
                 DELETE FROM users;",
            )?;
            tx.commit()?;
            info!("Cleared all accounts and complaints");
            Ok(())
        })
        .await
    }

    /// Run `f` against the connection on the blocking pool
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.blocking_lock();
            f(&mut conn)
        })
        .await?
    }
}

/// Parse a closed-enumeration column
pub(crate) fn enum_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = ValidationError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: ValidationError| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    from_millis(millis, idx)
}

pub(crate) fn optional_time_column(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let millis: Option<i64> = row.get(idx)?;
    millis.map(|m| from_millis(m, idx)).transpose()
}

fn from_millis(millis: i64, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {} out of range", millis).into(),
        )
    })
}

/// `%term%` for a case-insensitive LIKE, with wildcards in the term escaped
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .to_lowercase()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
