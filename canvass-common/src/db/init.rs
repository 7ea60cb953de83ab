//! Database initialization
//!
//! Opens (or creates) the SQLite database and bootstraps the schema. Every
//! statement is idempotent, so this is safe to run on each startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Initialize database connection pool and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Foreign keys and busy timeout are per-connection, so they go on the
    // connect options rather than a one-off PRAGMA.
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables, indexes and triggers (idempotent)
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    create_submissions_table(pool).await?;
    add_missing_columns(pool, "submissions", LATER_SUBMISSION_COLUMNS).await?;
    create_submission_photos_table(pool).await?;
    create_mirror_rows_table(pool).await?;
    create_marker_guards(pool).await?;
    Ok(())
}

async fn create_submissions_table(pool: &SqlitePool) -> Result<()> {
    // The CHECK keeps FS-only markers off non-FS submissions even if a caller
    // bypasses SubmissionStore.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS submissions (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            salesperson TEXT NOT NULL,
            customer_name TEXT NOT NULL,
            customer_address TEXT NOT NULL,
            house_number TEXT NOT NULL,
            locality TEXT NOT NULL,
            postal_code TEXT,
            village TEXT,
            district TEXT,
            city TEXT,
            province TEXT,
            coordinates TEXT NOT NULL,
            latitude TEXT,
            longitude TEXT,
            building_type TEXT NOT NULL,
            operators TEXT NOT NULL,
            includes_fs INTEGER NOT NULL DEFAULT 0,
            remarks TEXT NOT NULL DEFAULT '',
            all_mirror_written_at TEXT,
            fs_mirror_written_at TEXT,
            coverage_bot_id TEXT,
            coverage_bot_finished INTEGER NOT NULL DEFAULT 0,
            lease_until INTEGER,
            lease_token TEXT,
            last_attempt_at INTEGER,
            CHECK (includes_fs = 1 OR (fs_mirror_written_at IS NULL AND coverage_bot_id IS NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_submissions_coverage ON submissions (includes_fs, coverage_bot_id, coverage_bot_finished)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_submissions_created ON submissions (created_at)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Columns added after the first release, as (name, type)
const LATER_SUBMISSION_COLUMNS: &[(&str, &str)] =
    &[("lease_token", "TEXT"), ("last_attempt_at", "INTEGER")];

/// Bring a table created by an older release up to date via ALTER TABLE ADD COLUMN
async fn add_missing_columns(
    pool: &SqlitePool,
    table: &str,
    columns: &[(&str, &str)],
) -> Result<()> {
    let existing: Vec<String> = sqlx::query(&format!("PRAGMA table_info({})", table))
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| row.try_get::<String, _>("name"))
        .collect::<std::result::Result<_, _>>()?;

    for (name, sql_type) in columns {
        if existing.iter().any(|c| c == name) {
            continue;
        }
        info!("Adding column {}.{} ({})", table, name, sql_type);
        match sqlx::query(&format!("ALTER TABLE {} ADD COLUMN {} {}", table, name, sql_type))
            .execute(pool)
            .await
        {
            Ok(_) => {}
            // Another process got there first
            Err(sqlx::Error::Database(e)) if e.message().contains("duplicate column") => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(())
}

async fn create_submission_photos_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS submission_photos (
            submission_id TEXT NOT NULL REFERENCES submissions(id),
            position INTEGER NOT NULL,
            filename TEXT NOT NULL,
            PRIMARY KEY (submission_id, position)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Submission id -> spreadsheet row index, filled from append responses and
/// from bulk identifier-column reads.
async fn create_mirror_rows_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS mirror_rows (
            submission_id TEXT NOT NULL REFERENCES submissions(id),
            sheet TEXT NOT NULL,
            row_number INTEGER NOT NULL,
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (submission_id, sheet)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_marker_guards(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS coverage_finished_is_monotonic
        BEFORE UPDATE OF coverage_bot_finished ON submissions
        WHEN OLD.coverage_bot_finished = 1 AND NEW.coverage_bot_finished = 0
        BEGIN
            SELECT RAISE(ABORT, 'coverage_bot_finished cannot be reset');
        END
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS coverage_bot_id_is_write_once
        BEFORE UPDATE OF coverage_bot_id ON submissions
        WHEN OLD.coverage_bot_id IS NOT NULL AND NEW.coverage_bot_id IS NOT OLD.coverage_bot_id
        BEGIN
            SELECT RAISE(ABORT, 'coverage_bot_id is already set');
        END
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
