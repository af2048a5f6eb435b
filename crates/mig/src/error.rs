//! Error types for the migration engine
//!
//! Splits the taxonomy by phase: discovery errors abort a whole catalog
//! load, parse errors fail a single script, and the top-level `MigError`
//! carries everything a caller needs to diagnose and re-run.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for migration operations
pub type MigResult<T> = Result<T, MigError>;

/// Errors raised while discovering migration scripts on disk.
///
/// Every variant is fatal for the whole catalog load: a malformed file name
/// or a duplicated version is a corruption signal and is never resolved
/// automatically.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("not a recognized migration file: {}", path.display())]
    UnrecognizedFile { path: PathBuf },

    #[error("no version separator '_' in migration file name: {}", path.display())]
    MissingSeparator { path: PathBuf },

    #[error("invalid migration version in {}: {reason}", path.display())]
    InvalidVersion { path: PathBuf, reason: String },

    #[error("duplicate migration version {version}:\n  {}\n  {}", first.display(), second.display())]
    DuplicateVersion {
        version: i64,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Errors raised while splitting one script into statements.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("saw '-- +mig StatementBegin' with no matching '-- +mig StatementEnd'")]
    UnterminatedBlock,

    #[error("unexpected unfinished SQL statement: {0}. Missing a semicolon?")]
    UnfinishedStatement(String),

    #[error("no Up/Down annotations found, so no statements would be executed")]
    MissingAnnotations,
}

/// Error type for the migration engine.
///
/// `NoCurrentVersion`, `NoNextVersion`, `NoMigration` and `BootstrapNeeded`
/// are expected control-flow signals rather than failures; callers match on
/// them to detect "nothing to do" and "fresh database" conditions.
#[derive(Debug, Error)]
pub enum MigError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("error splitting migration {script}: {source}")]
    Parse {
        script: String,
        #[source]
        source: ParseError,
    },

    #[error("cannot read migration script {}: {source}", path.display())]
    Script {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error executing migration {script}: {source}")]
    Statement {
        script: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("error recording version {version}: {source}")]
    Record {
        version: i64,
        #[source]
        source: sqlx::Error,
    },

    #[error("invalid history timestamp {value}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("migration history table is missing or unreadable, bootstrap required")]
    BootstrapNeeded,

    #[error("no current version found")]
    NoCurrentVersion,

    #[error("no next version found")]
    NoNextVersion,

    #[error("no migrations to execute")]
    NoMigration,

    #[error("{0:?}: unknown dialect")]
    UnknownDialect(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigError {
    /// True for the "no migrations to execute" signal, which callers report
    /// as a no-op rather than a failure.
    pub fn is_no_migration(&self) -> bool {
        matches!(self, MigError::NoMigration)
    }
}
