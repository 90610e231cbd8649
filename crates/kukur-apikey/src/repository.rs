//! The `ApiKey` table: storage and lookups only. Hashing, token
//! generation, and the constant-time comparison live in [`crate::service`].

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use kukur_core::{KukurError, Result};
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::map_sqlite_err;
use crate::migrations::{ApiKeyMigration, MigrationRunner};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyRecord {
    pub name: String,
    pub creation_date: DateTime<Utc>,
}

/// One embedded SQLite file holding the `ApiKey` table. Writes are
/// serialized through a mutex around the connection; rusqlite itself has
/// no async story, so callers on an async runtime should route through
/// `spawn_blocking` if contention becomes a concern.
pub struct ApiKeyRepository {
    conn: Mutex<Connection>,
}

impl ApiKeyRepository {
    /// Open (creating if necessary) the SQLite file at `path` and apply
    /// pending migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(map_sqlite_err)?;
        Self::from_connection(conn)
    }

    /// An in-memory database, primarily for tests and the `test` CLI
    /// subcommand's "no persistent state" guarantee.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(map_sqlite_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(map_sqlite_err)?;
        let mut runner = MigrationRunner::new();
        runner.register(Box::new(ApiKeyMigration));
        runner.migrate(&conn)?;
        Ok(ApiKeyRepository {
            conn: Mutex::new(conn),
        })
    }

    pub fn store(
        &self,
        name: &str,
        digest: &[u8],
        salt: &[u8],
        creation_date: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO ApiKey (name, api_key, salt, creation_date) VALUES (?1, ?2, ?3, ?4)",
            params![name, digest, salt, creation_date.to_rfc3339()],
        )
        .map_err(map_sqlite_err)?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<ApiKeyRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT name, creation_date FROM ApiKey ORDER BY name")
            .map_err(map_sqlite_err)?;
        let rows = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let creation_date: String = row.get(1)?;
                Ok((name, creation_date))
            })
            .map_err(map_sqlite_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (name, creation_date) = row.map_err(map_sqlite_err)?;
            let creation_date = DateTime::parse_from_rfc3339(&creation_date)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| KukurError::InvalidData(e.to_string()))?;
            records.push(ApiKeyRecord {
                name,
                creation_date,
            });
        }
        Ok(records)
    }

    pub fn get(&self, name: &str) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT api_key, salt FROM ApiKey WHERE name = ?1",
            params![name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(map_sqlite_err)
    }

    pub fn has_api_key(&self, name: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM ApiKey WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(map_sqlite_err)?;
        Ok(count == 1)
    }

    pub fn revoke(&self, name: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM ApiKey WHERE name = ?1", params![name])
            .map_err(map_sqlite_err)?;
        Ok(())
    }
}
