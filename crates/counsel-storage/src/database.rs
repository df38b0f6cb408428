//! Database connection and operations

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use crate::migrations::run_migrations;
use crate::Result;

/// Raw persisted auth session row. The payload is opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAuthSession {
    pub payload: String,
    pub integrity_hash: String,
    pub updated_at: DateTime<Utc>,
}

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;

        // WAL keeps readers unblocked while a token write is in progress
        let _: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;

        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Load the persisted auth session, if any.
    ///
    /// A row whose timestamp cannot be parsed is still returned; callers
    /// decide whether the payload itself is trustworthy.
    pub fn load_auth_session(&self) -> Result<Option<StoredAuthSession>> {
        self.with_connection(|conn| {
            let row = conn
                .query_row(
                    "SELECT payload, integrity_hash, updated_at FROM auth_session WHERE id = 1",
                    [],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?;

            Ok(row.map(|(payload, integrity_hash, updated_str)| {
                let updated_at = DateTime::parse_from_rfc3339(&updated_str)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now());

                StoredAuthSession {
                    payload,
                    integrity_hash,
                    updated_at,
                }
            }))
        })
    }

    pub fn save_auth_session(&self, payload: &str, integrity_hash: &str) -> Result<()> {
        let updated_at = Utc::now().to_rfc3339();
        self.transaction(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO auth_session (id, payload, integrity_hash, updated_at)
                 VALUES (1, ?1, ?2, ?3)",
                rusqlite::params![payload, integrity_hash, updated_at],
            )?;
            Ok(())
        })
    }

    pub fn clear_auth_session(&self) -> Result<()> {
        self.transaction(|conn| {
            conn.execute("DELETE FROM auth_session", [])?;
            Ok(())
        })
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}
