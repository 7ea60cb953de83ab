//! Database initialization tests

use canvass_common::db::init::init_database;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("canvass.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("canvass.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    // Schema bootstrap is idempotent
    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_schema_tables_exist() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("canvass.db")).await.unwrap();

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&pool)
    .await
    .unwrap();

    assert_eq!(tables, vec!["mirror_rows", "submission_photos", "submissions"]);

    let triggers: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger'")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(triggers, 2);
}

#[tokio::test]
async fn test_marker_columns_default_unset() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("canvass.db")).await.unwrap();

    let defaults: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT name, dflt_value FROM pragma_table_info('submissions')")
            .fetch_all(&pool)
            .await
            .unwrap();

    let default_of = |column: &str| {
        defaults
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, d)| d.clone())
            .unwrap_or_else(|| panic!("missing column {}", column))
    };

    assert_eq!(default_of("all_mirror_written_at"), None);
    assert_eq!(default_of("fs_mirror_written_at"), None);
    assert_eq!(default_of("coverage_bot_id"), None);
    assert_eq!(default_of("coverage_bot_finished").as_deref(), Some("0"));
}

#[tokio::test]
async fn test_older_database_gains_claim_columns() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("canvass.db");

    // Submissions table as the first release created it
    let options = SqliteConnectOptions::new().filename(&db_path).create_if_missing(true);
    let old = SqlitePool::connect_with(options).await.unwrap();
    sqlx::query(
        r#"
        CREATE TABLE submissions (
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
            lease_until INTEGER
        )
        "#,
    )
    .execute(&old)
    .await
    .unwrap();
    old.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('submissions')")
        .fetch_all(&pool)
        .await
        .unwrap();

    assert!(columns.iter().any(|c| c == "lease_token"));
    assert!(columns.iter().any(|c| c == "last_attempt_at"));

    // Running the bootstrap again is a no-op
    pool.close().await;
    assert!(init_database(&db_path).await.is_ok());
}
