//! A minimal migration runner: register idempotent schema migrations once
//! at startup, then apply them in registration order.

use kukur_core::Result;
use rusqlite::Connection;

use crate::error::map_sqlite_err;

pub trait Migration: Send + Sync {
    fn name(&self) -> &'static str;
    fn migrate(&self, conn: &Connection) -> Result<()>;
}

#[derive(Default)]
pub struct MigrationRunner {
    migrations: Vec<Box<dyn Migration>>,
}

impl MigrationRunner {
    pub fn new() -> Self {
        MigrationRunner::default()
    }

    pub fn register(&mut self, migration: Box<dyn Migration>) -> &mut Self {
        self.migrations.push(migration);
        self
    }

    pub fn migrate(&self, conn: &Connection) -> Result<()> {
        for migration in &self.migrations {
            tracing::debug!(migration = migration.name(), "applying migration");
            migration.migrate(conn)?;
        }
        Ok(())
    }
}

/// The `ApiKey` table schema, applied with `CREATE TABLE IF NOT EXISTS` so
/// re-running it at every startup is a no-op once applied.
pub struct ApiKeyMigration;

impl Migration for ApiKeyMigration {
    fn name(&self) -> &'static str {
        "create_api_key_table"
    }

    fn migrate(&self, conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS ApiKey (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                api_key BLOB NOT NULL,
                salt BLOB NOT NULL,
                creation_date DATETIME NOT NULL
            )",
        )
        .map_err(map_sqlite_err)
    }
}
