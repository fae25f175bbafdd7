//! # Flock Common Library
//!
//! Shared code for the Flock church-management service:
//! - Database schema, migrations and row models
//! - Configuration loading and root folder resolution
//! - Password / session-token hashing and role permissions
//! - Phone number, money and date helpers

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod money;
pub mod phone;
pub mod time;

pub use error::{Error, Result};
