//! End-to-end engine tests against SQLite, through the same Any-driver
//! path production uses.

use std::fs;
use std::path::PathBuf;

use mig::{Direction, MigError, Migrator, SqlDialect, SqliteDialect, VersionLedger};
use tempfile::TempDir;

const USERS: &str = "-- +mig Up\n\
                     CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);\n\
                     -- +mig Down\n\
                     DROP TABLE users;\n";

const POSTS: &str = "-- +mig Up\n\
                     CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER);\n\
                     -- +mig Down\n\
                     DROP TABLE posts;\n";

struct Harness {
    // Holds the scratch database and migration scripts for the test's
    // lifetime.
    _tmp: TempDir,
    dir: PathBuf,
    migrator: Migrator,
}

async fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("migrations");
    fs::create_dir(&dir).unwrap();

    let url = format!("sqlite://{}?mode=rwc", tmp.path().join("test.db").display());
    let migrator = Migrator::connect(&url, dir.clone()).await.unwrap();

    Harness {
        _tmp: tmp,
        dir,
        migrator,
    }
}

impl Harness {
    fn write_migration(&self, name: &str, body: &str) {
        fs::write(self.dir.join(name), body).unwrap();
    }
}

#[tokio::test]
async fn fresh_database_bootstraps_to_version_zero() {
    let h = harness().await;

    // Before bootstrap the ledger reports that history storage is missing.
    let ledger = VersionLedger::new(Box::new(SqliteDialect));
    assert!(matches!(
        ledger.current_version(h.migrator.pool()).await,
        Err(MigError::BootstrapNeeded)
    ));

    assert_eq!(h.migrator.version().await.unwrap(), 0);

    // The bootstrap is durable, not re-derived per call.
    assert_eq!(ledger.current_version(h.migrator.pool()).await.unwrap(), 0);
}

#[tokio::test]
async fn up_applies_pending_migrations_in_order_and_is_idempotent() {
    let h = harness().await;
    h.write_migration("1_users.sql", USERS);
    h.write_migration("2_posts.sql", POSTS);

    assert_eq!(h.migrator.up().await.unwrap(), 2);
    assert_eq!(h.migrator.version().await.unwrap(), 2);

    // The schema really exists.
    sqlx::query("INSERT INTO users (name) VALUES ('ada')")
        .execute(h.migrator.pool())
        .await
        .unwrap();

    // Nothing pending is a zero-count success, never an error.
    assert_eq!(h.migrator.up().await.unwrap(), 0);
    assert_eq!(h.migrator.version().await.unwrap(), 2);
}

#[tokio::test]
async fn up_one_applies_exactly_one() {
    let h = harness().await;
    h.write_migration("1_users.sql", USERS);
    h.write_migration("2_posts.sql", POSTS);

    assert_eq!(h.migrator.up_one().await.unwrap(), "1_users.sql");
    assert_eq!(h.migrator.version().await.unwrap(), 1);

    assert_eq!(h.migrator.up_one().await.unwrap(), "2_posts.sql");
    assert_eq!(h.migrator.version().await.unwrap(), 2);

    assert!(matches!(
        h.migrator.up_one().await,
        Err(MigError::NoMigration)
    ));
}

#[tokio::test]
async fn down_then_up_round_trips_the_version() {
    let h = harness().await;
    h.write_migration("1_users.sql", USERS);
    h.write_migration("2_posts.sql", POSTS);

    h.migrator.up().await.unwrap();
    assert_eq!(h.migrator.down().await.unwrap(), "2_posts.sql");
    assert_eq!(h.migrator.version().await.unwrap(), 1);

    // Up again lands on the same version as applying it once.
    assert_eq!(h.migrator.up().await.unwrap(), 1);
    assert_eq!(h.migrator.version().await.unwrap(), 2);
}

#[tokio::test]
async fn down_with_nothing_applied_is_a_noop_signal() {
    let h = harness().await;
    h.write_migration("1_users.sql", USERS);

    // Current version is 0; there is nothing to revert.
    assert!(matches!(h.migrator.down().await, Err(MigError::NoMigration)));
    assert_eq!(h.migrator.version().await.unwrap(), 0);
}

#[tokio::test]
async fn down_all_reverts_everything_and_stops() {
    let h = harness().await;
    h.write_migration("1_users.sql", USERS);
    h.write_migration("2_posts.sql", POSTS);

    h.migrator.up().await.unwrap();
    assert_eq!(h.migrator.down_all().await.unwrap(), 2);
    assert_eq!(h.migrator.version().await.unwrap(), 0);

    assert_eq!(h.migrator.down_all().await.unwrap(), 0);
}

#[tokio::test]
async fn redo_reverts_and_reapplies_the_current_migration() {
    let h = harness().await;
    h.write_migration("1_users.sql", USERS);
    h.write_migration("2_posts.sql", POSTS);

    h.migrator.up().await.unwrap();
    assert_eq!(h.migrator.redo().await.unwrap(), "2_posts.sql");
    assert_eq!(h.migrator.version().await.unwrap(), 2);

    let status = h.migrator.status().await.unwrap();
    assert!(status.iter().all(|row| row.applied_at.is_some()));
}

#[tokio::test]
async fn failed_statement_rolls_back_its_migration_only() {
    let h = harness().await;
    h.write_migration("1_users.sql", USERS);
    h.write_migration(
        "2_broken.sql",
        "-- +mig Up\n\
         CREATE TABLE good (id INTEGER);\n\
         INSERT INTO missing_table VALUES (1);\n\
         -- +mig Down\n\
         DROP TABLE good;\n",
    );

    match h.migrator.up().await {
        Err(MigError::Statement { script, .. }) => assert_eq!(script, "2_broken.sql"),
        other => panic!("expected statement failure, got {other:?}"),
    }

    // Migration 1 committed before the failure and stays applied.
    assert_eq!(h.migrator.version().await.unwrap(), 1);
    sqlx::query("SELECT count(*) FROM users")
        .fetch_one(h.migrator.pool())
        .await
        .unwrap();

    // The failing migration's earlier statement rolled back with it.
    assert!(sqlx::query("SELECT count(*) FROM good")
        .fetch_one(h.migrator.pool())
        .await
        .is_err());
}

#[tokio::test]
async fn rolled_back_history_resolves_to_the_prior_version() {
    let h = harness().await;
    h.migrator.version().await.unwrap();

    // Records inserted oldest-first: version 2 ends rolled back.
    for (version, applied) in [(1_i64, true), (2, true), (2, false)] {
        sqlx::query(SqliteDialect.insert_version_sql())
            .bind(version)
            .bind(applied)
            .execute(h.migrator.pool())
            .await
            .unwrap();
    }

    let ledger = VersionLedger::new(Box::new(SqliteDialect));
    assert_eq!(ledger.current_version(h.migrator.pool()).await.unwrap(), 1);
}

#[tokio::test]
async fn status_reports_applied_and_pending() {
    let h = harness().await;
    h.write_migration("1_users.sql", USERS);
    h.write_migration("2_posts.sql", POSTS);

    h.migrator.up_one().await.unwrap();

    let status = h.migrator.status().await.unwrap();
    assert_eq!(status.len(), 2);

    assert_eq!(status[0].script, "1_users.sql");
    assert_eq!(status[0].version, 1);
    assert!(status[0].applied_at.is_some());

    assert_eq!(status[1].script, "2_posts.sql");
    assert_eq!(status[1].version, 2);
    assert!(status[1].applied_at.is_none());

    // Status rows serialize for machine consumption.
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json[0]["script"], "1_users.sql");
    assert!(json[1]["applied_at"].is_null());
}

#[tokio::test]
async fn status_on_a_fresh_database_bootstraps_and_reports_pending() {
    let h = harness().await;
    h.write_migration("1_users.sql", USERS);

    let status = h.migrator.status().await.unwrap();
    assert_eq!(status.len(), 1);
    assert!(status[0].applied_at.is_none());
    assert_eq!(h.migrator.version().await.unwrap(), 0);
}

#[tokio::test]
async fn statement_span_executes_as_one_statement() {
    let h = harness().await;
    h.write_migration(
        "1_audit.sql",
        "-- +mig Up\n\
         CREATE TABLE audit (id INTEGER PRIMARY KEY, note TEXT);\n\
         -- +mig StatementBegin\n\
         CREATE TRIGGER audit_note AFTER INSERT ON audit\n\
         BEGIN\n\
           UPDATE audit SET note = 'seen' WHERE id = NEW.id;\n\
         END;\n\
         -- +mig StatementEnd\n\
         -- +mig Down\n\
         DROP TRIGGER audit_note;\n\
         DROP TABLE audit;\n",
    );

    assert_eq!(h.migrator.up().await.unwrap(), 1);

    use sqlx::Row;
    sqlx::query("INSERT INTO audit (note) VALUES ('new')")
        .execute(h.migrator.pool())
        .await
        .unwrap();
    let row = sqlx::query("SELECT note FROM audit")
        .fetch_one(h.migrator.pool())
        .await
        .unwrap();
    let note: String = row.try_get(0).unwrap();
    assert_eq!(note, "seen");

    // The trigger's own semicolons stay inside the span for Down too.
    assert_eq!(h.migrator.down_all().await.unwrap(), 1);
    assert_eq!(h.migrator.version().await.unwrap(), 0);
}

#[tokio::test]
async fn unparsable_script_fails_without_touching_the_ledger() {
    let h = harness().await;
    h.write_migration("1_bad.sql", "CREATE TABLE t (id INTEGER);\n");

    match h.migrator.up().await {
        Err(MigError::Parse { script, .. }) => assert_eq!(script, "1_bad.sql"),
        other => panic!("expected parse failure, got {other:?}"),
    }
    assert_eq!(h.migrator.version().await.unwrap(), 0);

    // A split for one direction never loses the other direction's check.
    assert!(mig::split_statements("CREATE TABLE t (id INTEGER);", Direction::Down).is_err());
}
