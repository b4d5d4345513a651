//! Shared test helpers for in-crate API tests.

use std::sync::Arc;
use std::time::Duration;

use crate::blob_store::LocalBlobStore;
use crate::config::{Config, IngestConfig, ServerConfig, StorageConfig};
use crate::lifecycle::LifecycleController;
use crate::storage::Database;
use crate::AppState;

/// Create a test AppState with a temporary database, upload directory and
/// local blob store.
pub fn test_state(temp_dir: &tempfile::TempDir) -> Arc<AppState> {
    test_state_with(temp_dir, |_| {})
}

/// Like `test_state`, with a hook to adjust the configuration first.
pub fn test_state_with(
    temp_dir: &tempfile::TempDir,
    configure: impl FnOnce(&mut Config),
) -> Arc<AppState> {
    let data_dir = temp_dir.path().join("data");
    let upload_dir = temp_dir.path().join("uploads");
    let blob_dir = temp_dir.path().join("blobs");

    let mut config = Config {
        server: ServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            data_dir: data_dir.to_string_lossy().to_string(),
        },
        storage: StorageConfig {
            local_storage_path: blob_dir.to_string_lossy().to_string(),
            local_base_url: Some("https://blobs.test".to_string()),
            ..Default::default()
        },
        ingest: IngestConfig {
            upload_dir: upload_dir.to_string_lossy().to_string(),
            max_upload_size: 1024 * 1024, // 1MB for tests
            allowed_extensions: Vec::new(),
        },
        transfer_timeout: Duration::from_secs(5),
    };
    configure(&mut config);

    let db = Database::open(&data_dir).expect("Failed to open test database");
    let blob_store = LocalBlobStore::new(&blob_dir, config.storage.local_base_url.as_deref())
        .expect("Failed to create test blob store");
    let lifecycle = LifecycleController::new(db, Arc::new(blob_store), config.transfer_timeout);

    Arc::new(AppState { config, lifecycle })
}
