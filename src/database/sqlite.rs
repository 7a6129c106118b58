// Copyright 2024 Cargovera
// SPDX-License-Identifier: AGPL-3.0-or-later

//! # SQLite database backend.
//!
//! A single connection shared behind a mutex. Closures passed to [`Database::call`]
//! and [`Database::transaction`] run synchronously and must not await.
//!

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, OpenFlags};

use crate::error::Error;

use super::migrations::MIGRATIONS;

/// SQLite database handle.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path` and apply pending migrations.
    /// `:memory:` opens a transient database.
    pub fn open(path: &str) -> Result<Self, Error> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()
                .map_err(|_| Error::Database("SQLite fail open connection".to_owned()))?
        } else {
            open(path)?
        };
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        Self::open(":memory:")
    }

    fn with_connection(conn: Connection) -> Result<Self, Error> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        apply_migrations(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, Error> {
        self.conn
            .lock()
            .map_err(|_| Error::Database("Database connection poisoned".to_owned()))
    }

    /// Run `f` with the connection.
    pub fn call<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Connection) -> Result<T, Error>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside a transaction. The transaction is committed when `f`
    /// succeeds and rolled back otherwise.
    pub fn transaction<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Connection) -> Result<T, Error>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }
}

/// Open a SQLite connection in WAL mode.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection, Error> {
    let path = path.as_ref();
    let mut flags = OpenFlags::default();
    flags.insert(OpenFlags::SQLITE_OPEN_READ_WRITE);
    flags.insert(OpenFlags::SQLITE_OPEN_CREATE);
    let conn = Connection::open_with_flags(path, flags).map_err(|e| {
        Error::Database(format!(
            "SQLite fail open connection {}: {}",
            path.display(),
            e
        ))
    })?;
    conn.execute_batch(
        "
        PRAGMA journal_mode=WAL;
        PRAGMA synchronous=NORMAL;
        ",
    )
    .map_err(|_| Error::Database("SQLite fail execute batch".to_owned()))?;
    Ok(conn)
}

fn apply_migrations(conn: &Connection) -> Result<(), Error> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let mut stmt = conn.prepare("SELECT version FROM schema_migrations ORDER BY version")?;
    let applied: Vec<u32> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    for migration in MIGRATIONS {
        if !applied.contains(&migration.version) {
            log::info!(
                "Applying migration {} ({})",
                migration.version,
                migration.name
            );
            conn.execute_batch(migration.sql)?;
            conn.execute(
                "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                rusqlite::params![migration.version, migration.name],
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_file_applies_migrations_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cargovera.db");
        let path = path.to_str().unwrap();

        let db = Database::open(path).unwrap();
        drop(db);
        let db = Database::open(path).unwrap();
        let count: i64 = db
            .call(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<(), Error> = db.transaction(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, email, password_hash, created_at, updated_at)
                 VALUES ('u1', 'n', 'e@x.com', 'h', 't', 't')",
                [],
            )?;
            Err(Error::BadRequest("abort".to_owned()))
        });
        assert!(result.is_err());
        let count: i64 = db
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_open_invalid_path() {
        assert!(matches!(
            Database::open("/nonexistent/dir/cargovera.db"),
            Err(Error::Database(_))
        ));
    }
}
