use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub ingest: IngestConfig,
    /// Upper bound on a single blob store upload
    pub transfer_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Directory holding the metadata database
    pub data_dir: String,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Directory where uploads are staged before transfer
    pub upload_dir: String,
    /// Maximum upload size in bytes
    pub max_upload_size: u64,
    /// Lowercase extensions without the dot. Empty allows everything.
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Gcs,
    Local,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for the local blob backend
    pub local_storage_path: String,
    /// URL prefix for local blobs (defaults to a file:// URL of the directory)
    pub local_base_url: Option<String>,
    /// GCS bucket name (required when backend is gcs)
    pub gcs_bucket: Option<String>,
    /// Path to GCS service account JSON (optional, defaults to the metadata server)
    pub gcs_credentials_file: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            data_dir: "./data".to_string(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            upload_dir: "./uploads".to_string(),
            max_upload_size: 50 * 1024 * 1024, // 50MB
            allowed_extensions: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            local_storage_path: "./blobs".to_string(),
            local_base_url: None,
            gcs_bucket: None,
            gcs_credentials_file: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            ingest: IngestConfig::default(),
            transfer_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let bind_address = lookup("BIND_ADDRESS").unwrap_or(defaults.server.bind_address);
        let data_dir = lookup("DATA_DIR").unwrap_or(defaults.server.data_dir);
        let upload_dir = lookup("UPLOAD_DIR").unwrap_or(defaults.ingest.upload_dir);

        let max_upload_size = lookup("MAX_UPLOAD_SIZE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.ingest.max_upload_size);

        let allowed_extensions = lookup("ALLOWED_EXTENSIONS")
            .map(|list| parse_extensions(&list))
            .unwrap_or_default();

        let transfer_timeout = match lookup("TRANSFER_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    ConfigError::ValidationError(format!(
                        "TRANSFER_TIMEOUT_SECS must be a whole number of seconds, got '{raw}'"
                    ))
                })?;
                Duration::from_secs(secs)
            }
            None => defaults.transfer_timeout,
        };

        let backend = match lookup("STORAGE_BACKEND")
            .unwrap_or_else(|| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "gcs" => StorageBackend::Gcs,
            "local" => StorageBackend::Local,
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "unknown STORAGE_BACKEND '{other}' (expected local or gcs)"
                )))
            }
        };

        let config = Config {
            server: ServerConfig {
                bind_address,
                data_dir,
            },
            storage: StorageConfig {
                backend,
                local_storage_path: lookup("LOCAL_STORAGE_PATH")
                    .unwrap_or(defaults.storage.local_storage_path),
                local_base_url: lookup("LOCAL_BLOB_BASE_URL"),
                gcs_bucket: lookup("GCS_BUCKET"),
                gcs_credentials_file: lookup("GCS_CREDENTIALS_FILE"),
            },
            ingest: IngestConfig {
                upload_dir,
                max_upload_size,
                allowed_extensions,
            },
            transfer_timeout,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.data_dir.is_empty() {
            return Err(ConfigError::ValidationError(
                "DATA_DIR cannot be empty".to_string(),
            ));
        }

        if self.ingest.upload_dir.is_empty() {
            return Err(ConfigError::ValidationError(
                "UPLOAD_DIR cannot be empty".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::Gcs && self.storage.gcs_bucket.is_none() {
            return Err(ConfigError::ValidationError(
                "GCS_BUCKET is required when STORAGE_BACKEND=gcs".to_string(),
            ));
        }

        if self.transfer_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "TRANSFER_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether an extension (any case, with or without the dot) may be uploaded.
    pub fn extension_allowed(&self, extension: &str) -> bool {
        if self.ingest.allowed_extensions.is_empty() {
            return true;
        }
        let ext = extension.trim_start_matches('.').to_lowercase();
        self.ingest.allowed_extensions.iter().any(|a| *a == ext)
    }
}

fn parse_extensions(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}
