//! Database initialization
//!
//! Creates the database on first run, applies the schema and seeds default
//! settings. Every step is idempotent so startup can run it unconditionally.

use crate::auth::{self, Role};
use crate::db::models::new_id;
use crate::time::now;
use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::{info, warn};

/// Settings operators may edit through the dashboard, with their defaults
pub const DEFAULT_SETTINGS: &[(&str, &str)] = &[
    ("church_name", "Our Church"),
    ("currency", "GHS"),
    ("sms_signature", ""),
];

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .min_connections(1)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // PRAGMA foreign_keys is per-connection; sqlx's SQLite driver enables it
    // on every pooled connection by default, this covers the first one
    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;

    crate::db::migrations::run_migrations(&pool).await?;

    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create every table (CREATE TABLE IF NOT EXISTS)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_settings_table(pool).await?;
    create_users_table(pool).await?;
    create_sessions_table(pool).await?;

    // Congregation
    create_departments_table(pool).await?;
    create_members_table(pool).await?;
    create_shepherd_assignments_table(pool).await?;
    create_follow_ups_table(pool).await?;

    // Services and giving
    create_services_table(pool).await?;
    create_attendance_table(pool).await?;
    create_tithes_table(pool).await?;
    create_offerings_table(pool).await?;
    create_expenses_table(pool).await?;

    // Messaging and sync bookkeeping
    create_sms_tables(pool).await?;
    create_sync_tables(pool).await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the settings table
///
/// Stores operator-editable key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_users_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            display_name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            password_salt TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('admin', 'pastor', 'finance', 'secretary', 'viewer')),
            active INTEGER NOT NULL DEFAULT 1,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sessions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            token_hash TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TIMESTAMP NOT NULL,
            expires_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_departments_table(pool: &SqlitePool) -> Result<()> {
    // leader_id references members, which is created afterwards; SQLite
    // resolves foreign keys at statement time so ordering is fine
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS departments (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            description TEXT,
            leader_id TEXT REFERENCES members(id) ON DELETE SET NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_members_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS members (
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            phone TEXT UNIQUE,
            email TEXT,
            gender TEXT CHECK (gender IN ('male', 'female')),
            date_of_birth DATE,
            address TEXT,
            occupation TEXT,
            status TEXT NOT NULL DEFAULT 'active'
                CHECK (status IN ('active', 'inactive', 'visitor', 'new_convert')),
            department_id TEXT REFERENCES departments(id) ON DELETE SET NULL,
            is_shepherd INTEGER NOT NULL DEFAULT 0,
            photo_url TEXT,
            joined_on DATE,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_members_department ON members(department_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_members_status ON members(status)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_members_name ON members(last_name, first_name)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_shepherd_assignments_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shepherd_assignments (
            member_id TEXT PRIMARY KEY REFERENCES members(id) ON DELETE CASCADE,
            shepherd_id TEXT NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            assigned_on DATE NOT NULL,
            CHECK (member_id <> shepherd_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_shepherd_assignments_shepherd ON shepherd_assignments(shepherd_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_follow_ups_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS follow_ups (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            shepherd_id TEXT REFERENCES members(id) ON DELETE SET NULL,
            kind TEXT NOT NULL CHECK (kind IN ('call', 'visit', 'prayer', 'counselling', 'other')),
            status TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'in_progress', 'completed', 'cancelled')),
            due_on DATE NOT NULL,
            notes TEXT,
            outcome TEXT,
            completed_at TIMESTAMP,
            created_by TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_follow_ups_status_due ON follow_ups(status, due_on)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_services_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS services (
            id TEXT PRIMARY KEY,
            service_date DATE NOT NULL,
            service_type TEXT NOT NULL COLLATE NOCASE,
            visitor_count INTEGER NOT NULL DEFAULT 0 CHECK (visitor_count >= 0),
            notes TEXT,
            created_at TIMESTAMP NOT NULL,
            UNIQUE (service_date, service_type)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_attendance_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attendance (
            service_id TEXT NOT NULL REFERENCES services(id) ON DELETE CASCADE,
            member_id TEXT NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            PRIMARY KEY (service_id, member_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_tithes_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tithes (
            id TEXT PRIMARY KEY,
            member_id TEXT NOT NULL REFERENCES members(id) ON DELETE CASCADE,
            amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
            paid_on DATE NOT NULL,
            method TEXT NOT NULL DEFAULT 'cash'
                CHECK (method IN ('cash', 'mobile_money', 'bank', 'cheque', 'other')),
            reference TEXT,
            notes TEXT,
            recorded_by TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tithes_member_date ON tithes(member_id, paid_on)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_offerings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS offerings (
            id TEXT PRIMARY KEY,
            service_date DATE NOT NULL,
            offering_type TEXT NOT NULL,
            amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
            notes TEXT,
            recorded_by TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_expenses_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS expenses (
            id TEXT PRIMARY KEY,
            category TEXT NOT NULL,
            description TEXT,
            amount_cents INTEGER NOT NULL CHECK (amount_cents > 0),
            spent_on DATE NOT NULL,
            recorded_by TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sms_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sms_messages (
            id TEXT PRIMARY KEY,
            body TEXT NOT NULL,
            audience TEXT NOT NULL,
            segments INTEGER NOT NULL,
            recipient_count INTEGER NOT NULL DEFAULT 0,
            sent_count INTEGER NOT NULL DEFAULT 0,
            failed_count INTEGER NOT NULL DEFAULT 0,
            skipped_count INTEGER NOT NULL DEFAULT 0,
            sent_by TEXT REFERENCES users(id) ON DELETE SET NULL,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sms_recipients (
            message_id TEXT NOT NULL REFERENCES sms_messages(id) ON DELETE CASCADE,
            phone TEXT NOT NULL,
            member_id TEXT REFERENCES members(id) ON DELETE SET NULL,
            status TEXT NOT NULL CHECK (status IN ('sent', 'failed')),
            provider_ref TEXT,
            error TEXT,
            PRIMARY KEY (message_id, phone)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_sync_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_runs (
            id TEXT PRIMARY KEY,
            dataset TEXT NOT NULL CHECK (dataset IN ('members', 'tithes', 'attendance')),
            source TEXT NOT NULL,
            started_at TIMESTAMP NOT NULL,
            finished_at TIMESTAMP,
            total_rows INTEGER NOT NULL DEFAULT 0,
            inserted INTEGER NOT NULL DEFAULT 0,
            duplicates INTEGER NOT NULL DEFAULT 0,
            invalid INTEGER NOT NULL DEFAULT 0,
            failed INTEGER NOT NULL DEFAULT 0,
            started_by TEXT REFERENCES users(id) ON DELETE SET NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_issues (
            id TEXT PRIMARY KEY,
            run_id TEXT NOT NULL REFERENCES sync_runs(id) ON DELETE CASCADE,
            dataset TEXT NOT NULL CHECK (dataset IN ('members', 'tithes', 'attendance')),
            row_number INTEGER NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('duplicate', 'invalid', 'failed')),
            reason TEXT NOT NULL,
            payload TEXT NOT NULL,
            existing_id TEXT,
            status TEXT NOT NULL DEFAULT 'open'
                CHECK (status IN ('open', 'overwritten', 'created', 'dismissed')),
            resolved_by TEXT REFERENCES users(id) ON DELETE SET NULL,
            resolved_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sync_issues_status ON sync_issues(status, dataset)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Initialize default settings
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    for (key, value) in DEFAULT_SETTINGS {
        ensure_setting(pool, key, value).await?;
    }
    Ok(())
}

/// Ensure a setting exists, inserting its default when missing
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let result = sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
        .bind(key)
        .bind(default_value)
        .execute(pool)
        .await?;

    if result.rows_affected() > 0 {
        info!("Initialized setting '{}' with default value: {}", key, default_value);
    }

    Ok(())
}

/// Create the initial `admin` account when the users table is empty
///
/// Returns the password that was set, or `None` when users already exist.
/// A generated password is logged once at WARN so the operator can sign in.
pub async fn bootstrap_admin(pool: &SqlitePool, password: Option<&str>) -> Result<Option<String>> {
    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
        .fetch_one(pool)
        .await?;

    if user_count > 0 {
        return Ok(None);
    }

    let password = match password {
        Some(p) => p.to_string(),
        None => {
            let generated = auth::generate_password();
            warn!(
                "Created bootstrap account 'admin' with generated password: {} (change it after first login)",
                generated
            );
            generated
        }
    };

    let salt = auth::generate_salt();
    let hash = auth::hash_password(&password, &salt);
    let ts = now();

    sqlx::query(
        r#"
        INSERT INTO users (id, username, display_name, password_hash, password_salt, role, active, created_at, updated_at)
        VALUES (?, 'admin', 'Administrator', ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(new_id())
    .bind(&hash)
    .bind(&salt)
    .bind(Role::Admin)
    .bind(ts)
    .bind(ts)
    .execute(pool)
    .await?;

    info!("Bootstrap admin account created");
    Ok(Some(password))
}
