//! HTTP API handlers for flock-dash
//!
//! One module per resource; each exposes a `*_routes()` builder merged by
//! [`crate::build_router`].

pub mod attendance;
pub mod auth;
pub mod departments;
pub mod finance;
pub mod health;
pub mod members;
pub mod reports;
pub mod settings;
pub mod shepherding;
pub mod sms;
pub mod sync;
pub mod ui;
pub mod users;

pub use attendance::attendance_routes;
pub use auth::{auth_middleware, login_routes, session_routes, CurrentUser};
pub use departments::departments_routes;
pub use finance::finance_routes;
pub use health::health_routes;
pub use members::members_routes;
pub use reports::reports_routes;
pub use settings::settings_routes;
pub use shepherding::shepherding_routes;
pub use sms::sms_routes;
pub use sync::sync_routes;
pub use ui::{serve_app_js, serve_index};
pub use users::users_routes;
