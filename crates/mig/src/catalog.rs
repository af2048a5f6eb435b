//! Migration discovery and ordering
//!
//! Collects the migration scripts in a directory, extracts their numeric
//! versions, and builds the immutable, doubly-linked sequence the executor
//! walks. One load produces one sequence; links are assigned during the
//! load and never change afterwards.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::{DiscoveryError, MigError, MigResult};

/// Scaffold contents for a new migration script.
const MIGRATION_TEMPLATE: &str = "-- +mig Up\n\n-- +mig Down\n\n";

/// One discovered migration script.
///
/// The `previous`/`next` links are materialized by [`MigrationCatalog::load`]
/// and are `None` exactly at the two ends of the sequence.
#[derive(Debug, Clone)]
pub struct Migration {
    version: i64,
    source: PathBuf,
    previous: Option<i64>,
    next: Option<i64>,
}

impl Migration {
    pub fn version(&self) -> i64 {
        self.version
    }

    /// Path to the script file.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn previous(&self) -> Option<i64> {
        self.previous
    }

    pub fn next(&self) -> Option<i64> {
        self.next
    }

    /// Script file name, for logs and reports.
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }
}

/// The ordered migration sequence for one directory.
#[derive(Debug)]
pub struct MigrationCatalog {
    migrations: Vec<Migration>,
}

impl MigrationCatalog {
    /// Collect the migration scripts in `dir` whose version falls between
    /// `current` and `target`, sorted ascending and linked.
    ///
    /// The range is half-open and oriented: `target > current` keeps
    /// `current < v <= target`, `target < current` keeps
    /// `target < v <= current`, and equal bounds select nothing. Callers
    /// that want every script pass `(0, i64::MAX)`.
    pub fn load(dir: &Path, current: i64, target: i64) -> MigResult<Self> {
        let mut migrations = Vec::new();

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let version = match numeric_component(&path) {
                Ok(version) => version,
                // Not a migration script; leave it alone.
                Err(DiscoveryError::UnrecognizedFile { .. }) => continue,
                Err(err) => return Err(err.into()),
            };
            if version_filter(version, current, target) {
                migrations.push(Migration {
                    version,
                    source: path,
                    previous: None,
                    next: None,
                });
            }
        }

        Self::sort_and_link(migrations)
    }

    /// Sort ascending by version and populate the `previous`/`next` links.
    /// A shared version between two scripts fails the whole load.
    fn sort_and_link(mut migrations: Vec<Migration>) -> MigResult<Self> {
        migrations.sort_by_key(Migration::version);

        if let Some(pair) = migrations
            .windows(2)
            .find(|pair| pair[0].version == pair[1].version)
        {
            return Err(DiscoveryError::DuplicateVersion {
                version: pair[0].version,
                first: pair[0].source.clone(),
                second: pair[1].source.clone(),
            }
            .into());
        }

        let len = migrations.len();
        for i in 0..len {
            let previous = if i > 0 {
                Some(migrations[i - 1].version)
            } else {
                None
            };
            let next = if i + 1 < len {
                Some(migrations[i + 1].version)
            } else {
                None
            };
            migrations[i].previous = previous;
            migrations[i].next = next;
        }

        Ok(Self { migrations })
    }

    /// The migration matching `version` exactly.
    pub fn current(&self, version: i64) -> MigResult<&Migration> {
        self.migrations
            .iter()
            .find(|m| m.version == version)
            .ok_or(MigError::NoCurrentVersion)
    }

    /// The first migration strictly greater than `version`.
    pub fn next(&self, version: i64) -> MigResult<&Migration> {
        self.migrations
            .iter()
            .find(|m| m.version > version)
            .ok_or(MigError::NoNextVersion)
    }

    /// The tail of the sequence.
    pub fn last(&self) -> MigResult<&Migration> {
        self.migrations.last().ok_or(MigError::NoNextVersion)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

/// Extract the numeric version prefix from `XXX_descriptivename.sql`.
fn numeric_component(path: &Path) -> Result<i64, DiscoveryError> {
    if path.extension().map_or(true, |ext| ext != "sql") {
        return Err(DiscoveryError::UnrecognizedFile {
            path: path.to_path_buf(),
        });
    }

    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| DiscoveryError::UnrecognizedFile {
            path: path.to_path_buf(),
        })?;

    let (digits, _) = stem
        .split_once('_')
        .ok_or_else(|| DiscoveryError::MissingSeparator {
            path: path.to_path_buf(),
        })?;

    let version: i64 = digits.parse().map_err(|err: std::num::ParseIntError| {
        DiscoveryError::InvalidVersion {
            path: path.to_path_buf(),
            reason: err.to_string(),
        }
    })?;

    if version <= 0 {
        return Err(DiscoveryError::InvalidVersion {
            path: path.to_path_buf(),
            reason: "migration versions must be greater than zero".to_string(),
        });
    }

    Ok(version)
}

/// True when `v` lies in the half-open interval between `current` and
/// `target`, oriented by direction of travel.
fn version_filter(v: i64, current: i64, target: i64) -> bool {
    if target > current {
        v > current && v <= target
    } else if target < current {
        v > target && v <= current
    } else {
        false
    }
}

/// Create a blank, timestamp-versioned migration script in `dir`.
///
/// The UTC timestamp prefix keeps scaffolded versions strictly positive and
/// monotonically increasing for a single author.
pub fn create_migration(dir: &Path, name: &str) -> MigResult<PathBuf> {
    fs::create_dir_all(dir)?;

    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let name = name.replace(' ', "_").to_lowercase();
    let path = dir.join(format!("{timestamp}_{name}.sql"));

    fs::write(&path, MIGRATION_TEMPLATE)?;
    Ok(path)
}
