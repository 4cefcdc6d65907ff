//! SQLite notification store.
//!
//! Uses r2d2 with r2d2_sqlite for pooled access. WAL mode lets history reads
//! run alongside inserts; concurrent inserts serialize on SQLite's write lock
//! and wait up to the busy timeout. All blocking work runs on
//! `spawn_blocking`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::path::Path;

use super::schema::{apply_pragmas, enable_wal, initialize_schema};
use super::{NotificationRepository, StoreError};
use crate::model::{NewNotification, Notification, NotificationKind};

/// Pooled SQLite store.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and make sure the schema
    /// exists.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the SQLite database file
    /// * `max_size` - Maximum number of connections in the pool
    pub fn open<P: AsRef<Path>>(db_path: P, max_size: u32) -> Result<Self, StoreError> {
        let manager = SqliteConnectionManager::file(db_path);

        let pool = Pool::builder()
            .max_size(max_size.max(1))
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)?;

        {
            let conn = pool.get()?;
            enable_wal(&conn)?;
            initialize_schema(&conn)?;
        }

        Ok(Self { pool })
    }

    fn get(&self) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        Ok(self.pool.get()?)
    }

    fn insert(&self, notification: NewNotification) -> Result<Notification, StoreError> {
        let conn = self.get()?;

        // Stored at millisecond precision; hand back exactly what a later read returns.
        let millis = notification
            .created_at
            .unwrap_or_else(Utc::now)
            .timestamp_millis();
        let created_at = millis_to_datetime(millis).ok_or_else(|| StoreError::Corrupt {
            id: 0,
            reason: format!("timestamp {millis} out of range"),
        })?;

        conn.execute(
            "INSERT INTO notifications (room, type, title, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                notification.room,
                notification.kind.as_str(),
                notification.title,
                notification.body,
                millis
            ],
        )?;

        Ok(Notification {
            id: conn.last_insert_rowid(),
            room: notification.room,
            kind: notification.kind,
            title: notification.title,
            body: notification.body,
            created_at,
        })
    }

    fn select_room(&self, room: &str, limit: usize) -> Result<Vec<Notification>, StoreError> {
        let conn = self.get()?;
        // SQLite treats a negative LIMIT as unbounded.
        let sql_limit = if limit == 0 {
            -1
        } else {
            i64::try_from(limit).unwrap_or(i64::MAX)
        };

        let mut stmt = conn.prepare_cached(
            "SELECT id, room, type, title, body, created_at
             FROM notifications
             WHERE room = ?1
             ORDER BY id DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![room, sql_limit], |row| {
                Ok(NotificationRow {
                    id: row.get(0)?,
                    room: row.get(1)?,
                    kind: row.get(2)?,
                    title: row.get(3)?,
                    body: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(Notification::try_from).collect()
    }
}

#[async_trait]
impl NotificationRepository for SqliteStore {
    async fn create(&self, notification: NewNotification) -> Result<Notification, StoreError> {
        let store = self.clone();
        let created = tokio::task::spawn_blocking(move || store.insert(notification)).await??;
        Ok(created)
    }

    async fn list(&self, room: &str, limit: usize) -> Result<Vec<Notification>, StoreError> {
        let store = self.clone();
        let room = room.to_string();
        let history = tokio::task::spawn_blocking(move || store.select_room(&room, limit)).await??;
        Ok(history)
    }
}

/// Raw row as stored, before the type column is checked.
struct NotificationRow {
    id: i64,
    room: String,
    kind: String,
    title: String,
    body: String,
    created_at: i64,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = StoreError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let kind: NotificationKind = row.kind.parse().map_err(|_| StoreError::Corrupt {
            id: row.id,
            reason: format!("unknown type {:?}", row.kind),
        })?;
        let created_at = millis_to_datetime(row.created_at).ok_or_else(|| StoreError::Corrupt {
            id: row.id,
            reason: format!("timestamp {} out of range", row.created_at),
        })?;
        Ok(Notification {
            id: row.id,
            room: row.room,
            kind,
            title: row.title,
            body: row.body,
            created_at,
        })
    }
}

fn millis_to_datetime(millis: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
}

/// Connection customizer that applies per-connection pragmas.
#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<rusqlite::Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut rusqlite::Connection) -> Result<(), rusqlite::Error> {
        apply_pragmas(conn)
    }
}
