//! Migration execution
//!
//! Composes the catalog, ledger and script parser into the user-facing
//! operations. Every migration runs inside its own transaction together
//! with its history row, so a migration is either fully applied and
//! recorded or not applied at all; a multi-migration batch commits each
//! migration independently and halts on the first failure.

use std::fs;
use std::path::PathBuf;
use std::sync::Once;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tracing::{debug, info};

use crate::catalog::{Migration, MigrationCatalog};
use crate::dialect::{dialect_for_url, SqlDialect};
use crate::error::{MigError, MigResult};
use crate::ledger::VersionLedger;
use crate::script::{split_statements, Direction};

static INSTALL_DRIVERS: Once = Once::new();

/// Status report row for one catalog migration.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    /// Script file name.
    pub script: String,
    pub version: i64,
    /// When the version's most recent history record was applied, or `None`
    /// while the migration is pending.
    pub applied_at: Option<DateTime<Utc>>,
}

/// Drives migrations against one database.
pub struct Migrator {
    pool: AnyPool,
    ledger: VersionLedger,
    dir: PathBuf,
}

impl Migrator {
    /// Build a migrator over an existing pool with an explicit dialect.
    pub fn new(pool: AnyPool, dialect: Box<dyn SqlDialect>, dir: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            ledger: VersionLedger::new(dialect),
            dir: dir.into(),
        }
    }

    /// Connect to `url`, deriving the dialect from the URL scheme.
    ///
    /// The pool is capped at a single connection: the engine is a single
    /// sequential writer, and this also keeps in-memory SQLite databases
    /// coherent.
    pub async fn connect(url: &str, dir: impl Into<PathBuf>) -> MigResult<Self> {
        let dialect = dialect_for_url(url)?;

        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;

        Ok(Self::new(pool, dialect, dir))
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Current database version, bootstrapping a fresh database to 0.
    pub async fn version(&self) -> MigResult<i64> {
        match self.ledger.current_version(&self.pool).await {
            Err(MigError::BootstrapNeeded) => {
                info!("no migration history table found, bootstrapping");
                self.ledger.bootstrap(&self.pool).await?;
                Ok(0)
            }
            other => other,
        }
    }

    /// Apply every pending migration in ascending order. Returns the number
    /// applied; zero when the database is already up to date.
    pub async fn up(&self) -> MigResult<usize> {
        let catalog = MigrationCatalog::load(&self.dir, 0, i64::MAX)?;
        let mut count = 0;

        loop {
            let version = self.version().await?;
            let next = match catalog.next(version) {
                Ok(next) => next,
                // Nothing left to run.
                Err(MigError::NoNextVersion) => return Ok(count),
                Err(err) => return Err(err),
            };

            let name = self.apply(next, Direction::Up).await?;
            info!(script = %name, version = next.version(), "applied migration");
            count += 1;
        }
    }

    /// Apply the next pending migration only, returning its script name.
    pub async fn up_one(&self) -> MigResult<String> {
        let version = self.version().await?;
        let catalog = MigrationCatalog::load(&self.dir, 0, i64::MAX)?;
        let next = catalog.next(version).map_err(|_| MigError::NoMigration)?;

        let name = self.apply(next, Direction::Up).await?;
        info!(script = %name, version = next.version(), "applied migration");
        Ok(name)
    }

    /// Revert the migration matching the current version exactly. Current
    /// version 0, or a version with no matching script, is a no-op signal.
    pub async fn down(&self) -> MigResult<String> {
        let version = self.version().await?;
        let catalog = MigrationCatalog::load(&self.dir, 0, i64::MAX)?;
        let current = catalog.current(version).map_err(|_| MigError::NoMigration)?;

        let name = self.apply(current, Direction::Down).await?;
        info!(script = %name, version = current.version(), "reverted migration");
        Ok(name)
    }

    /// Revert until the current version has no matching script. Returns the
    /// number reverted.
    pub async fn down_all(&self) -> MigResult<usize> {
        let catalog = MigrationCatalog::load(&self.dir, 0, i64::MAX)?;
        let mut count = 0;

        loop {
            let version = self.version().await?;
            let current = match catalog.current(version) {
                Ok(current) => current,
                // Nothing left to revert.
                Err(MigError::NoCurrentVersion) => return Ok(count),
                Err(err) => return Err(err),
            };

            let name = self.apply(current, Direction::Down).await?;
            info!(script = %name, version = current.version(), "reverted migration");
            count += 1;
        }
    }

    /// Revert the current migration, then re-apply it. The two halves are
    /// independent transactions: a failure in either leaves the database
    /// where that half stopped.
    pub async fn redo(&self) -> MigResult<String> {
        let version = self.version().await?;
        let catalog = MigrationCatalog::load(&self.dir, 0, i64::MAX)?;
        let current = catalog.current(version).map_err(|_| MigError::NoMigration)?;

        self.apply(current, Direction::Down).await?;
        let name = self.apply(current, Direction::Up).await?;
        info!(script = %name, version = current.version(), "re-applied migration");
        Ok(name)
    }

    /// Applied/pending state for every catalog migration, ascending by
    /// version.
    pub async fn status(&self) -> MigResult<Vec<MigrationStatus>> {
        // First contact with a fresh database bootstraps the history table.
        self.version().await?;

        let catalog = MigrationCatalog::load(&self.dir, 0, i64::MAX)?;
        let mut rows = Vec::with_capacity(catalog.len());
        for migration in catalog.iter() {
            let applied_at = self.ledger.applied_at(&self.pool, migration.version()).await?;
            rows.push(MigrationStatus {
                script: migration.file_name(),
                version: migration.version(),
                applied_at,
            });
        }
        Ok(rows)
    }

    /// Run one migration script in a single transaction and record the
    /// outcome in the history table.
    async fn apply(&self, migration: &Migration, direction: Direction) -> MigResult<String> {
        let name = migration.file_name();

        let script =
            fs::read_to_string(migration.source()).map_err(|source| MigError::Script {
                path: migration.source().to_path_buf(),
                source,
            })?;

        let statements = split_statements(&script, direction).map_err(|source| MigError::Parse {
            script: name.clone(),
            source,
        })?;

        let mut tx = self.pool.begin().await?;
        for statement in &statements {
            debug!(script = %name, %direction, "executing statement");
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                // Dropping the transaction rolls this migration back whole.
                .map_err(|source| MigError::Statement {
                    script: name.clone(),
                    source,
                })?;
        }

        self.ledger.record(tx, migration.version(), direction).await?;
        Ok(name)
    }
}
