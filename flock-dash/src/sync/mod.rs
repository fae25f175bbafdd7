//! One-way spreadsheet import with duplicate and invalid-row reporting

pub mod columns;
pub mod engine;
pub mod matcher;
pub mod rows;

pub use engine::{resolve_issue, run_sync, ResolveAction, ResolveOutcome, ResolveRequest, SyncContext, SyncSummary};
