//! SQL dialect capability surface
//!
//! The engine needs only four backend-specific SQL strings: create the
//! history table, insert a history row, read the full history, and read one
//! version's most recent record. Everything else it executes is user SQL.

use crate::error::{MigError, MigResult};

/// Backend-specific SQL for the migration history table.
///
/// The read queries normalize booleans to integers and timestamps to text,
/// so row decoding in the ledger is identical across backends. History reads
/// order by the `id` insertion sequence, not by timestamp: multiple records
/// can share a timestamp, and insertion order is what breaks the tie.
pub trait SqlDialect: Send + Sync {
    /// SQL creating the `mig_migrations` history table.
    fn create_version_table_sql(&self) -> &'static str;

    /// SQL inserting one history row; binds `(version, applied)`.
    fn insert_version_sql(&self) -> &'static str;

    /// SQL reading `(version, applied)` for every history row, newest first.
    fn version_query_sql(&self) -> &'static str;

    /// SQL reading `(timestamp text, applied)` for one version's most recent
    /// record; binds `(version)`.
    fn status_query_sql(&self) -> &'static str;

    /// Dialect name, for logs and errors.
    fn name(&self) -> &'static str;
}

pub struct PostgresDialect;
pub struct MySqlDialect;
pub struct SqliteDialect;

impl SqlDialect for PostgresDialect {
    fn create_version_table_sql(&self) -> &'static str {
        "CREATE TABLE mig_migrations (
            id serial NOT NULL,
            version_id bigint NOT NULL,
            is_applied boolean NOT NULL,
            tstamp timestamp NULL default now(),
            PRIMARY KEY(id)
        );"
    }

    fn insert_version_sql(&self) -> &'static str {
        "INSERT INTO mig_migrations (version_id, is_applied) VALUES ($1, $2);"
    }

    fn version_query_sql(&self) -> &'static str {
        "SELECT version_id, is_applied::int FROM mig_migrations ORDER BY id DESC"
    }

    fn status_query_sql(&self) -> &'static str {
        "SELECT tstamp::text, is_applied::int FROM mig_migrations \
         WHERE version_id = $1 ORDER BY id DESC LIMIT 1"
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

impl SqlDialect for MySqlDialect {
    fn create_version_table_sql(&self) -> &'static str {
        "CREATE TABLE mig_migrations (
            id serial NOT NULL,
            version_id bigint NOT NULL,
            is_applied boolean NOT NULL,
            tstamp timestamp NULL default now(),
            PRIMARY KEY(id)
        );"
    }

    fn insert_version_sql(&self) -> &'static str {
        "INSERT INTO mig_migrations (version_id, is_applied) VALUES (?, ?);"
    }

    fn version_query_sql(&self) -> &'static str {
        "SELECT version_id, CAST(is_applied AS SIGNED) FROM mig_migrations ORDER BY id DESC"
    }

    fn status_query_sql(&self) -> &'static str {
        "SELECT CAST(tstamp AS CHAR), CAST(is_applied AS SIGNED) FROM mig_migrations \
         WHERE version_id = ? ORDER BY id DESC LIMIT 1"
    }

    fn name(&self) -> &'static str {
        "mysql"
    }
}

impl SqlDialect for SqliteDialect {
    fn create_version_table_sql(&self) -> &'static str {
        "CREATE TABLE mig_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            version_id INTEGER NOT NULL,
            is_applied INTEGER NOT NULL,
            tstamp TIMESTAMP DEFAULT (datetime('now'))
        );"
    }

    fn insert_version_sql(&self) -> &'static str {
        "INSERT INTO mig_migrations (version_id, is_applied) VALUES (?, ?);"
    }

    fn version_query_sql(&self) -> &'static str {
        "SELECT version_id, is_applied FROM mig_migrations ORDER BY id DESC"
    }

    fn status_query_sql(&self) -> &'static str {
        "SELECT tstamp, is_applied FROM mig_migrations \
         WHERE version_id = ? ORDER BY id DESC LIMIT 1"
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

/// Resolve a dialect from a connection URL scheme.
///
/// Accepts the same schemes the underlying drivers accept, so the one URL
/// string selects both the connection backend and the SQL dialect.
pub fn dialect_for_url(url: &str) -> MigResult<Box<dyn SqlDialect>> {
    let scheme = url.split(':').next().unwrap_or_default();
    match scheme {
        "postgres" | "postgresql" => Ok(Box::new(PostgresDialect)),
        "mysql" | "mariadb" => Ok(Box::new(MySqlDialect)),
        "sqlite" => Ok(Box::new(SqliteDialect)),
        other => Err(MigError::UnknownDialect(other.to_string())),
    }
}
