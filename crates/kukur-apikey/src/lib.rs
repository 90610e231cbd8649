//! The embedded API-key store (C7): hashed credential storage with
//! create/list/validate/revoke, backed by SQLite, migrated idempotently at
//! startup.

mod error;
mod migrations;
mod repository;
mod service;

pub use migrations::{ApiKeyMigration, Migration, MigrationRunner};
pub use repository::{ApiKeyRecord, ApiKeyRepository};
pub use service::ApiKeys;
