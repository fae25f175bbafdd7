//! Dashboard accounts and login sessions

use chrono::{DateTime, Duration, Utc};
use flock_common::auth::{self, Role};
use flock_common::db::models::{new_id, User};
use flock_common::time::now;
use serde::Deserialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub display_name: Option<String>,
    pub password: String,
    pub role: Role,
}

/// A freshly issued bearer token; only its digest is stored
#[derive(Debug)]
pub struct IssuedSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

const MIN_PASSWORD_LEN: usize = 8;

fn validate_username(username: &str) -> ApiResult<String> {
    let username = username.trim().to_ascii_lowercase();
    let valid_len = (3..=32).contains(&username.len());
    let valid_chars = username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'));
    if !valid_len || !valid_chars {
        return Err(ApiError::BadRequest(
            "username must be 3-32 characters of a-z, 0-9, '.', '_' or '-'".to_string(),
        ));
    }
    Ok(username)
}

pub async fn list_users(pool: &SqlitePool) -> ApiResult<Vec<User>> {
    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY username")
        .fetch_all(pool)
        .await?;
    Ok(users)
}

pub async fn get_user(pool: &SqlitePool, id: &str) -> ApiResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {}", id)))
}

pub async fn create_user(pool: &SqlitePool, input: NewUser) -> ApiResult<User> {
    let username = validate_username(&input.username)?;
    if input.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    let display_name = input
        .display_name
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| username.clone());

    let id = new_id();
    let salt = auth::generate_salt();
    let hash = auth::hash_password(&input.password, &salt);
    let ts = now();

    sqlx::query(
        r#"
        INSERT INTO users (id, username, display_name, password_hash, password_salt, role, active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&username)
    .bind(&display_name)
    .bind(&hash)
    .bind(&salt)
    .bind(input.role)
    .bind(ts)
    .bind(ts)
    .execute(pool)
    .await
    .map_err(|e| {
        if flock_common::error::is_unique_violation(&e) {
            ApiError::Conflict(format!("username '{}' is taken", username))
        } else {
            e.into()
        }
    })?;

    info!(username = %username, role = %input.role, "Created user");
    get_user(pool, &id).await
}

async fn other_active_admins(conn: &mut SqliteConnection, user_id: &str) -> ApiResult<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = 'admin' AND active = 1 AND id <> ?")
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(count)
}

/// Change a user's role
///
/// `acting_user_id` may not demote themself, and the last active admin keeps the role.
pub async fn set_role(pool: &SqlitePool, acting_user_id: &str, id: &str, role: Role) -> ApiResult<User> {
    let mut tx = pool.begin().await?;
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {}", id)))?;

    if user.role == Role::Admin && role != Role::Admin {
        if user.id == acting_user_id {
            return Err(ApiError::Conflict("you cannot remove your own admin role".to_string()));
        }
        if user.active && other_active_admins(&mut tx, id).await? == 0 {
            return Err(ApiError::Conflict("the last active admin cannot be demoted".to_string()));
        }
    }

    sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
        .bind(role)
        .bind(now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(username = %user.username, from = %user.role, to = %role, "Changed user role");
    get_user(pool, id).await
}

/// Activate or deactivate a user; deactivation revokes their sessions
pub async fn set_active(pool: &SqlitePool, acting_user_id: &str, id: &str, active: bool) -> ApiResult<User> {
    let mut tx = pool.begin().await?;
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {}", id)))?;

    if !active {
        if user.id == acting_user_id {
            return Err(ApiError::Conflict("you cannot deactivate yourself".to_string()));
        }
        if user.role == Role::Admin && user.active && other_active_admins(&mut tx, id).await? == 0 {
            return Err(ApiError::Conflict("the last active admin cannot be deactivated".to_string()));
        }
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("UPDATE users SET active = ?, updated_at = ? WHERE id = ?")
        .bind(active)
        .bind(now())
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(username = %user.username, active, "Changed user active flag");
    get_user(pool, id).await
}

// ========================================
// Sessions
// ========================================

/// Check credentials and open a session
///
/// Unknown user, wrong password and inactive account all fail the same way.
pub async fn login(pool: &SqlitePool, username: &str, password: &str, ttl_hours: i64) -> ApiResult<(User, IssuedSession)> {
    let invalid = || ApiError::Unauthorized("invalid username or password".to_string());

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
        .bind(username.trim().to_ascii_lowercase())
        .fetch_optional(pool)
        .await?
        .ok_or_else(invalid)?;

    if !user.active || !auth::verify_password(password, &user.password_salt, &user.password_hash) {
        return Err(invalid());
    }

    let token = auth::generate_token();
    let created_at = now();
    let expires_at = created_at + Duration::hours(ttl_hours);

    sqlx::query("INSERT INTO sessions (token_hash, user_id, created_at, expires_at) VALUES (?, ?, ?, ?)")
        .bind(auth::hash_token(&token))
        .bind(&user.id)
        .bind(created_at)
        .bind(expires_at)
        .execute(pool)
        .await?;

    // Expired sessions are pruned on each login
    sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
        .bind(created_at)
        .execute(pool)
        .await?;

    info!(username = %user.username, "User logged in");
    Ok((user, IssuedSession { token, expires_at }))
}

/// Resolve a bearer token to its active, unexpired user
pub async fn user_for_token(pool: &SqlitePool, token: &str) -> ApiResult<Option<User>> {
    let user = sqlx::query_as::<_, User>(
        r#"
        SELECT u.* FROM sessions s
        JOIN users u ON u.id = s.user_id
        WHERE s.token_hash = ? AND s.expires_at > ? AND u.active = 1
        "#,
    )
    .bind(auth::hash_token(token))
    .bind(now())
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn revoke_token(pool: &SqlitePool, token: &str) -> ApiResult<()> {
    sqlx::query("DELETE FROM sessions WHERE token_hash = ?")
        .bind(auth::hash_token(token))
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_username() {
        assert_eq!(validate_username(" Ama.Owusu ").unwrap(), "ama.owusu");
        assert!(validate_username("ab").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"x".repeat(33)).is_err());
    }
}
