//! Tests for database initialization, migrations and bootstrap account

use flock_common::auth::{verify_password, Role};
use flock_common::db::init::{bootstrap_admin, init_database};
use flock_common::db::migrations::{get_schema_version, CURRENT_SCHEMA_VERSION};
use flock_common::db::models::User;
use flock_common::db::settings::{get_setting, set_setting};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("nested").join("flock.db");

    let result = init_database(&db_path).await;

    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("flock.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_all_tables_created() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("flock.db")).await.unwrap();

    for table in [
        "users",
        "sessions",
        "settings",
        "departments",
        "members",
        "shepherd_assignments",
        "follow_ups",
        "services",
        "attendance",
        "tithes",
        "offerings",
        "expenses",
        "sms_messages",
        "sms_recipients",
        "sync_runs",
        "sync_issues",
    ] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists, "table {} missing", table);
    }
}

#[tokio::test]
async fn test_schema_version_recorded() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("flock.db")).await.unwrap();

    assert_eq!(get_schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
}

#[tokio::test]
async fn test_default_settings_initialized() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("flock.db")).await.unwrap();

    assert_eq!(get_setting(&pool, "currency").await.unwrap().as_deref(), Some("GHS"));

    set_setting(&pool, "church_name", "Grace Chapel").await.unwrap();
    assert_eq!(
        get_setting(&pool, "church_name").await.unwrap().as_deref(),
        Some("Grace Chapel")
    );

    assert!(set_setting(&pool, "not_a_setting", "x").await.is_err());
}

#[tokio::test]
async fn test_settings_survive_reinit() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("flock.db");

    let pool = init_database(&db_path).await.unwrap();
    set_setting(&pool, "church_name", "Bethel").await.unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    assert_eq!(get_setting(&pool, "church_name").await.unwrap().as_deref(), Some("Bethel"));
}

#[tokio::test]
async fn test_bootstrap_admin_only_once() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("flock.db")).await.unwrap();

    let first = bootstrap_admin(&pool, Some("letmein123")).await.unwrap();
    assert_eq!(first.as_deref(), Some("letmein123"));

    let second = bootstrap_admin(&pool, Some("other")).await.unwrap();
    assert!(second.is_none());

    let admin: User = sqlx::query_as("SELECT * FROM users WHERE username = 'admin'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(admin.role, Role::Admin);
    assert!(admin.active);
    assert!(verify_password("letmein123", &admin.password_salt, &admin.password_hash));
}

#[tokio::test]
async fn test_bootstrap_generates_password() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("flock.db")).await.unwrap();

    let generated = bootstrap_admin(&pool, None).await.unwrap().unwrap();
    assert_eq!(generated.len(), 16);
}

#[tokio::test]
async fn test_member_constraints_enforced() {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("flock.db")).await.unwrap();

    let bad_status = sqlx::query(
        "INSERT INTO members (id, first_name, last_name, status, created_at, updated_at)
         VALUES ('m1', 'Ama', 'Mensah', 'deacon', '2024-01-01', '2024-01-01')",
    )
    .execute(&pool)
    .await;
    assert!(bad_status.is_err(), "CHECK on status should reject unknown value");

    let bad_department = sqlx::query(
        "INSERT INTO members (id, first_name, last_name, department_id, created_at, updated_at)
         VALUES ('m2', 'Kofi', 'Boateng', 'no-such-dept', '2024-01-01', '2024-01-01')",
    )
    .execute(&pool)
    .await;
    assert!(bad_department.is_err(), "foreign key should reject unknown department");
}
