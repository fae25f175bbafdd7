//! Configuration loading and root folder resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "FLOCK_ROOT";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "flock.db";

/// Service configuration file name inside the root folder
pub const SERVICE_CONFIG_FILE: &str = "flock.toml";

/// Root folder resolution, priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file (`root_folder` key)
/// 4. OS-dependent compiled default (fallback)
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = locate_config_file() {
        if let Ok(toml_content) = std::fs::read_to_string(&config_path) {
            match toml::from_str::<toml::Value>(&toml_content) {
                Ok(config) => {
                    if let Some(root_folder) = config.get("root_folder").and_then(|v| v.as_str()) {
                        return PathBuf::from(root_folder);
                    }
                }
                Err(e) => warn!("Ignoring malformed {}: {}", config_path.display(), e),
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Locate the per-user or system-wide config file
fn locate_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("flock").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/flock/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("flock"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/flock"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("flock"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/flock"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("flock"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\flock"))
    } else {
        PathBuf::from("./flock_data")
    }
}

/// Paths derived from the resolved root folder
#[derive(Debug, Clone)]
pub struct RootFolder {
    root: PathBuf,
}

impl RootFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root folder (and the local photo folder) if missing
    pub fn ensure_exists(&self) -> Result<()> {
        if !self.root.exists() {
            info!("Creating root folder: {}", self.root.display());
        }
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.photos_dir())?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join(DATABASE_FILE)
    }

    pub fn service_config_path(&self) -> PathBuf {
        self.root.join(SERVICE_CONFIG_FILE)
    }

    pub fn photos_dir(&self) -> PathBuf {
        self.root.join("photos")
    }
}

// ========================================
// Service configuration (flock.toml)
// ========================================

/// Full service configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FlockConfig {
    pub server: ServerConfig,
    pub sms: SmsConfig,
    pub storage: StorageConfig,
    pub sheets: SheetsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub session_ttl_hours: i64,
    /// Password for the initial `admin` account; generated when absent
    pub bootstrap_admin_password: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5780".to_string(),
            session_ttl_hours: 12,
            bootstrap_admin_password: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub endpoint: String,
    /// No key means broadcasts are logged instead of sent
    pub api_key: Option<String>,
    pub sender_id: String,
    pub default_country_code: String,
    pub batch_size: usize,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://sms.arkesel.com/api/v2/sms/send".to_string(),
            api_key: None,
            sender_id: "CHURCH".to_string(),
            default_country_code: "233".to_string(),
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Local,
    Bucket,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub bucket_url: Option<String>,
    pub bucket: String,
    pub service_key: Option<String>,
    pub public_base_url: Option<String>,
    pub max_photo_bytes: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            bucket_url: None,
            bucket: "member-photos".to_string(),
            service_key: None,
            public_base_url: None,
            max_photo_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    pub base_url: String,
    pub spreadsheet_id: Option<String>,
    pub api_key: Option<String>,
    pub members_range: String,
    pub tithes_range: String,
    pub attendance_range: String,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sheets.googleapis.com".to_string(),
            spreadsheet_id: None,
            api_key: None,
            members_range: "Members!A1:Z".to_string(),
            tithes_range: "Tithes!A1:Z".to_string(),
            attendance_range: "Attendance!A1:Z".to_string(),
        }
    }
}

impl FlockConfig {
    /// Load `flock.toml` if present, then apply environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config = Self::from_toml_str(&content)?;
            info!("Loaded service config: {}", path.display());
            config
        } else {
            info!("No service config at {} (using defaults)", path.display());
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid flock.toml: {}", e)))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("FLOCK_BIND") {
            self.server.bind = bind;
        }
        if let Ok(key) = std::env::var("FLOCK_SMS_API_KEY") {
            self.sms.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("FLOCK_SHEETS_API_KEY") {
            self.sheets.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("FLOCK_STORAGE_KEY") {
            self.storage.service_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.session_ttl_hours <= 0 {
            return Err(Error::Config("server.session_ttl_hours must be positive".to_string()));
        }
        if self.sms.batch_size == 0 {
            return Err(Error::Config("sms.batch_size must be at least 1".to_string()));
        }
        if self.sms.default_country_code.is_empty()
            || !self.sms.default_country_code.chars().all(|c| c.is_ascii_digit())
        {
            return Err(Error::Config(
                "sms.default_country_code must be digits only".to_string(),
            ));
        }
        if self.storage.backend == StorageBackend::Bucket
            && (self.storage.bucket_url.is_none() || self.storage.service_key.is_none())
        {
            return Err(Error::Config(
                "storage.backend = \"bucket\" requires bucket_url and service_key".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_arg_wins() {
        let path = resolve_root_folder(Some("/tmp/flock-cli"), "FLOCK_TEST_UNSET_VAR");
        assert_eq!(path, PathBuf::from("/tmp/flock-cli"));
    }

    #[test]
    fn test_defaults_when_empty() {
        let config = FlockConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:5780");
        assert_eq!(config.sms.batch_size, 100);
        assert_eq!(config.storage.backend, StorageBackend::Local);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_sections() {
        let config = FlockConfig::from_toml_str(
            r#"
            [sms]
            sender_id = "GRACECH"
            default_country_code = "234"

            [sheets]
            spreadsheet_id = "abc123"
            "#,
        )
        .unwrap();
        assert_eq!(config.sms.sender_id, "GRACECH");
        assert_eq!(config.sms.default_country_code, "234");
        assert_eq!(config.sms.batch_size, 100);
        assert_eq!(config.sheets.spreadsheet_id.as_deref(), Some("abc123"));
        assert_eq!(config.sheets.members_range, "Members!A1:Z");
    }

    #[test]
    fn test_bucket_requires_credentials() {
        let config = FlockConfig::from_toml_str(
            r#"
            [storage]
            backend = "bucket"
            bucket_url = "https://example.supabase.co"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_country_code() {
        let mut config = FlockConfig::default();
        config.sms.default_country_code = "+233".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_root_folder_paths() {
        let root = RootFolder::new("/srv/flock");
        assert_eq!(root.database_path(), PathBuf::from("/srv/flock/flock.db"));
        assert_eq!(root.service_config_path(), PathBuf::from("/srv/flock/flock.toml"));
        assert_eq!(root.photos_dir(), PathBuf::from("/srv/flock/photos"));
    }
}
