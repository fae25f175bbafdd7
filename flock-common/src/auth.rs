//! Password hashing, session tokens and role permissions
//!
//! # Pure Functions
//!
//! This module contains ONLY pure functions and types.
//! No HTTP framework dependencies - the middleware lives in flock-dash.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::Error;

// ========================================
// Roles and permissions
// ========================================

/// Dashboard user role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Pastor,
    Finance,
    Secretary,
    Viewer,
}

/// Action a handler may require of the current user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ReadMembers,
    WriteMembers,
    WriteAttendance,
    ReadFinance,
    WriteFinance,
    WriteShepherding,
    SendSms,
    RunSync,
    ReadReports,
    ManageUsers,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Admin,
        Role::Pastor,
        Role::Finance,
        Role::Secretary,
        Role::Viewer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Pastor => "pastor",
            Role::Finance => "finance",
            Role::Secretary => "secretary",
            Role::Viewer => "viewer",
        }
    }

    /// Whether this role grants the permission
    ///
    /// Every role can read members and reports.
    pub fn allows(self, permission: Permission) -> bool {
        use Permission::*;

        if matches!(permission, ReadMembers | ReadReports) {
            return true;
        }

        match self {
            Role::Admin => true,
            Role::Pastor => matches!(
                permission,
                WriteMembers | WriteShepherding | ReadFinance | SendSms
            ),
            Role::Finance => matches!(permission, ReadFinance | WriteFinance | RunSync),
            Role::Secretary => matches!(
                permission,
                WriteMembers | WriteAttendance | SendSms | RunSync
            ),
            Role::Viewer => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| Error::InvalidInput(format!("unknown role '{}'", s)))
    }
}

// ========================================
// Password hashing
// ========================================

/// Generate a random 16-byte salt as 32 hex characters
pub fn generate_salt() -> String {
    random_hex(16)
}

/// Hash a password with its salt (SHA-256 of salt + password, 64 hex chars)
pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Verify a password against a stored hash and salt
///
/// Accounts with an empty stored hash can never log in.
pub fn verify_password(password: &str, salt: &str, stored_hash: &str) -> bool {
    if stored_hash.is_empty() {
        return false;
    }
    constant_time_eq(hash_password(password, salt).as_bytes(), stored_hash.as_bytes())
}

// ========================================
// Session tokens
// ========================================

/// Generate a new bearer token (32 random bytes, 64 hex chars)
pub fn generate_token() -> String {
    random_hex(32)
}

/// Digest stored in the sessions table in place of the raw token
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Generate a readable random password for bootstrap accounts
pub fn generate_password() -> String {
    random_hex(8)
}

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    buf.iter().map(|b| format!("{:02x}", b)).collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_round_trip() {
        let salt = generate_salt();
        let hash = hash_password("correct horse", &salt);
        assert_eq!(hash.len(), 64);
        assert!(verify_password("correct horse", &salt, &hash));
        assert!(!verify_password("wrong horse", &salt, &hash));
    }

    #[test]
    fn test_salt_changes_hash() {
        let a = hash_password("secret", "salt-a");
        let b = hash_password("secret", "salt-b");
        assert_ne!(a, b);
    }

    #[test]
    fn test_empty_hash_never_verifies() {
        assert!(!verify_password("", "", ""));
    }

    #[test]
    fn test_tokens_are_unique_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
        assert_ne!(hash_token(&a), a);
        assert_eq!(hash_token(&a), hash_token(&a));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Finance".parse::<Role>().unwrap(), Role::Finance);
        assert!("bishop".parse::<Role>().is_err());
    }

    #[test]
    fn test_permission_matrix() {
        assert!(Role::Admin.allows(Permission::ManageUsers));
        assert!(!Role::Pastor.allows(Permission::ManageUsers));

        assert!(Role::Viewer.allows(Permission::ReadMembers));
        assert!(!Role::Viewer.allows(Permission::WriteMembers));
        assert!(!Role::Viewer.allows(Permission::ReadFinance));

        assert!(Role::Finance.allows(Permission::WriteFinance));
        assert!(!Role::Finance.allows(Permission::WriteMembers));

        assert!(Role::Secretary.allows(Permission::RunSync));
        assert!(!Role::Secretary.allows(Permission::ReadFinance));

        assert!(Role::Pastor.allows(Permission::WriteShepherding));
        assert!(!Role::Pastor.allows(Permission::WriteFinance));
    }
}
