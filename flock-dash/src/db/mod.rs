//! Query layer for the dashboard API
//!
//! Each submodule owns the SQL for one area. Functions take the pool (or a
//! transaction connection) and return `ApiResult`, so handlers stay thin.

pub mod attendance;
pub mod departments;
pub mod finance;
pub mod members;
pub mod reports;
pub mod shepherding;
pub mod sms;
pub mod sync;
pub mod users;
