//! Member photo storage
//!
//! Objects are content-addressed: the key is `members/<sha256>.<ext>`, so
//! re-uploading the same image is idempotent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use flock_common::config::{StorageBackend, StorageConfig};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

/// URL prefix under which the local store is served
pub const LOCAL_PHOTOS_ROUTE: &str = "/photos";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Storage rejected request {0}: {1}")]
    ApiError(u16, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[async_trait]
pub trait PhotoStore: Send + Sync {
    /// Store `bytes` under `key`, returning the public URL
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Recover the object key from a URL this store produced
    fn key_for_url(&self, url: &str) -> Option<String>;
}

/// File extension for an accepted image content type
pub fn extension_for(content_type: &str) -> Result<&'static str, StorageError> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "image/jpeg" | "image/jpg" => Ok("jpg"),
        "image/png" => Ok("png"),
        "image/webp" => Ok("webp"),
        _ => Err(StorageError::UnsupportedType(content_type.to_string())),
    }
}

/// Content-addressed key for a member photo
pub fn photo_key(bytes: &[u8], extension: &str) -> String {
    let digest = Sha256::digest(bytes);
    format!("members/{:x}.{}", digest, extension)
}

fn valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('/')
        && key
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..")
}

// ========================================
// Local filesystem
// ========================================

/// Writes photos under `<root>/photos`, served at `/photos/*`
pub struct LocalPhotoStore {
    dir: PathBuf,
}

impl LocalPhotoStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        if !valid_key(key) {
            return Err(StorageError::Config(format!("invalid object key '{}'", key)));
        }
        Ok(self.dir.join(key))
    }
}

#[async_trait]
impl PhotoStore for LocalPhotoStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, _content_type: &str) -> Result<String, StorageError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;
        debug!("Stored photo {}", path.display());
        Ok(format!("{}/{}", LOCAL_PHOTOS_ROUTE, key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(LOCAL_PHOTOS_ROUTE)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(str::to_string)
    }
}

// ========================================
// Object bucket
// ========================================

/// Storage-bucket REST API (`/storage/v1/object/{bucket}/{key}`)
pub struct BucketPhotoStore {
    http_client: reqwest::Client,
    base_url: String,
    bucket: String,
    service_key: String,
    public_base_url: String,
}

impl BucketPhotoStore {
    pub fn new(
        base_url: &str,
        bucket: &str,
        service_key: &str,
        public_base_url: Option<&str>,
    ) -> Result<Self, StorageError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| StorageError::NetworkError(e.to_string()))?;

        let base_url = base_url.trim_end_matches('/').to_string();
        let public_base_url = public_base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| format!("{}/storage/v1/object/public/{}", base_url, bucket));

        Ok(Self {
            http_client,
            base_url,
            bucket: bucket.to_string(),
            service_key: service_key.to_string(),
            public_base_url,
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key)
    }
}

#[async_trait]
impl PhotoStore for BucketPhotoStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String, StorageError> {
        if !valid_key(key) {
            return Err(StorageError::Config(format!("invalid object key '{}'", key)));
        }

        let response = self
            .http_client
            .put(self.object_url(key))
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("apikey", &self.service_key)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| StorageError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorageError::ApiError(status.as_u16(), body));
        }

        info!(key, "Uploaded photo to bucket");
        Ok(format!("{}/{}", self.public_base_url, key))
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let response = self
            .http_client
            .delete(self.object_url(key))
            .header("Authorization", format!("Bearer {}", self.service_key))
            .header("apikey", &self.service_key)
            .send()
            .await
            .map_err(|e| StorageError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status.is_success() || status == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(StorageError::ApiError(status.as_u16(), body))
        }
    }

    fn key_for_url(&self, url: &str) -> Option<String> {
        url.strip_prefix(&self.public_base_url)
            .and_then(|rest| rest.strip_prefix('/'))
            .map(str::to_string)
    }
}

/// Build the store described by `[storage]`
pub fn from_config(config: &StorageConfig, local_dir: &Path) -> Result<Box<dyn PhotoStore>, StorageError> {
    match config.backend {
        StorageBackend::Local => Ok(Box::new(LocalPhotoStore::new(local_dir))),
        StorageBackend::Bucket => {
            let base_url = config
                .bucket_url
                .as_deref()
                .ok_or_else(|| StorageError::Config("storage.bucket_url is required".to_string()))?;
            let key = config
                .service_key
                .as_deref()
                .ok_or_else(|| StorageError::Config("storage.service_key is required".to_string()))?;
            Ok(Box::new(BucketPhotoStore::new(
                base_url,
                &config.bucket,
                key,
                config.public_base_url.as_deref(),
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for() {
        assert_eq!(extension_for("image/jpeg").unwrap(), "jpg");
        assert_eq!(extension_for("IMAGE/PNG; charset=binary").unwrap(), "png");
        assert_eq!(extension_for("image/webp").unwrap(), "webp");
        assert!(extension_for("image/gif").is_err());
        assert!(extension_for("application/octet-stream").is_err());
    }

    #[test]
    fn test_photo_key_is_content_addressed() {
        let a = photo_key(b"same bytes", "png");
        let b = photo_key(b"same bytes", "png");
        let c = photo_key(b"other bytes", "png");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("members/"));
        assert!(a.ends_with(".png"));
        // "members/" + 64 hex chars + ".png"
        assert_eq!(a.len(), 8 + 64 + 4);
    }

    #[test]
    fn test_valid_key_rejects_traversal() {
        assert!(valid_key("members/abc.png"));
        assert!(!valid_key("../etc/passwd"));
        assert!(!valid_key("/abs.png"));
        assert!(!valid_key("members//x.png"));
    }

    #[tokio::test]
    async fn test_local_store_put_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalPhotoStore::new(dir.path());

        let key = photo_key(b"img", "jpg");
        let url = store.put(&key, b"img".to_vec(), "image/jpeg").await.unwrap();
        assert_eq!(url, format!("/photos/{}", key));
        assert!(dir.path().join(&key).exists());
        assert_eq!(store.key_for_url(&url).as_deref(), Some(key.as_str()));

        store.delete(&key).await.unwrap();
        assert!(!dir.path().join(&key).exists());
        // Deleting again is not an error
        store.delete(&key).await.unwrap();
    }

    #[test]
    fn test_bucket_public_url_default() {
        let store = BucketPhotoStore::new("https://abc.example.co/", "photos", "k", None).unwrap();
        assert_eq!(
            store.object_url("members/x.png"),
            "https://abc.example.co/storage/v1/object/photos/members/x.png"
        );
        assert_eq!(
            store.key_for_url("https://abc.example.co/storage/v1/object/public/photos/members/x.png").as_deref(),
            Some("members/x.png")
        );
    }
}
