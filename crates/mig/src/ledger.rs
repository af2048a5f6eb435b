//! Version ledger
//!
//! The history table is append-only: every apply and every revert inserts a
//! new row, and the current database version is derived from the full
//! history on every read. Nothing is cached between calls; external tools
//! may write to the ledger between invocations, and a fresh read is the
//! only correct answer.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{Any, AnyPool, Row, Transaction};
use tracing::debug;

use crate::dialect::SqlDialect;
use crate::error::{MigError, MigResult};
use crate::script::Direction;

/// Timestamp layout the dialects' status queries normalize to.
const TSTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// One history row, as read back for version resolution. The persisted row
/// also carries the insertion sequence and a server-defaulted timestamp.
#[derive(Debug, Clone)]
pub struct HistoryRecord {
    pub version: i64,
    /// True for an apply, false for a revert.
    pub applied: bool,
}

/// Reads and writes the migration history table through a dialect.
pub struct VersionLedger {
    dialect: Box<dyn SqlDialect>,
}

impl VersionLedger {
    pub fn new(dialect: Box<dyn SqlDialect>) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    /// Current database version, derived from the full history.
    ///
    /// A failed history query signals [`MigError::BootstrapNeeded`]: there
    /// is no portable error code for a missing table across the supported
    /// backends, and a fresh database is the expected cause. Row decoding
    /// failures after a successful query surface as database errors.
    pub async fn current_version(&self, pool: &AnyPool) -> MigResult<i64> {
        let rows = sqlx::query(self.dialect.version_query_sql())
            .fetch_all(pool)
            .await
            .map_err(|_| MigError::BootstrapNeeded)?;

        let mut history = Vec::with_capacity(rows.len());
        for row in &rows {
            let version: i64 = row.try_get(0)?;
            let applied: i64 = row.try_get(1)?;
            history.push(HistoryRecord {
                version,
                applied: applied != 0,
            });
        }

        Ok(resolve_current(&history))
    }

    /// Create the history table and seed it with version 0, in one
    /// transaction. Invoked once per fresh database; serializing racing
    /// bootstraps is the caller's concern.
    pub async fn bootstrap(&self, pool: &AnyPool) -> MigResult<()> {
        debug!(dialect = self.dialect.name(), "creating migration history table");

        let mut tx = pool.begin().await?;
        sqlx::query(self.dialect.create_version_table_sql())
            .execute(&mut *tx)
            .await?;
        sqlx::query(self.dialect.insert_version_sql())
            .bind(0_i64)
            .bind(true)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Append one history row inside the caller's transaction and commit it.
    ///
    /// On insert or commit failure the transaction is dropped, rolling back
    /// the caller's preceding statements together with this row.
    pub async fn record(
        &self,
        mut tx: Transaction<'static, Any>,
        version: i64,
        direction: Direction,
    ) -> MigResult<()> {
        sqlx::query(self.dialect.insert_version_sql())
            .bind(version)
            .bind(direction.is_up())
            .execute(&mut *tx)
            .await
            .map_err(|source| MigError::Record { version, source })?;

        tx.commit()
            .await
            .map_err(|source| MigError::Record { version, source })?;
        Ok(())
    }

    /// Applied timestamp of a version's most recent record, or `None` when
    /// the version was rolled back or never recorded.
    pub async fn applied_at(
        &self,
        pool: &AnyPool,
        version: i64,
    ) -> MigResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(self.dialect.status_query_sql())
            .bind(version)
            .fetch_optional(pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let applied: i64 = row.try_get(1)?;
        if applied == 0 {
            return Ok(None);
        }

        let tstamp: String = row.try_get(0)?;
        let parsed = NaiveDateTime::parse_from_str(&tstamp, TSTAMP_FORMAT).map_err(|source| {
            MigError::Timestamp {
                value: tstamp.clone(),
                source,
            }
        })?;
        Ok(Some(parsed.and_utc()))
    }
}

/// Walk history newest-to-oldest: a version whose latest record is a revert
/// is skipped, and the first applied record wins. An exhausted history
/// resolves to the baseline version 0.
fn resolve_current(history: &[HistoryRecord]) -> i64 {
    let mut skip = HashSet::new();

    for record in history {
        if skip.contains(&record.version) {
            continue;
        }
        if record.applied {
            return record.version;
        }
        // Latest record for this version is a revert.
        skip.insert(record.version);
    }

    0
}
