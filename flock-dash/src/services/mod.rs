//! Third-party integrations
//!
//! Each integration sits behind a trait so handlers and tests can swap in
//! in-memory implementations.

pub mod broadcast;
pub mod photo_store;
pub mod sheets;
pub mod sms_gateway;

pub use photo_store::{PhotoStore, StorageError};
pub use sheets::{SheetError, SheetSource};
pub use sms_gateway::{SmsError, SmsGateway};

use crate::error::ApiError;

impl From<SmsError> for ApiError {
    fn from(err: SmsError) -> Self {
        ApiError::Upstream(format!("SMS gateway: {}", err))
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::UnsupportedType(t) => ApiError::BadRequest(format!(
                "unsupported image type '{}' (use image/jpeg, image/png or image/webp)",
                t
            )),
            other => ApiError::Upstream(format!("photo storage: {}", other)),
        }
    }
}

impl From<SheetError> for ApiError {
    fn from(err: SheetError) -> Self {
        ApiError::Upstream(format!("spreadsheet: {}", err))
    }
}
