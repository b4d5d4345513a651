use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use doc_ingest::blob_store::{BlobStore, BlobStoreError};
use doc_ingest::lifecycle::{DocumentProcessor, LifecycleController, LifecycleError};
use doc_ingest::providers::IdGenerator;
use doc_ingest::storage::models::{DocumentRecord, DocumentStatus, NewDocument};
use doc_ingest::storage::Database;

// ============================================================================
// Stubs
// ============================================================================

/// In-memory blob store that answers every put with a fixed URL.
struct StubStore {
    url: String,
    fail: bool,
    delay: Option<Duration>,
    puts: AtomicUsize,
    objects: Mutex<HashMap<String, Bytes>>,
}

impl StubStore {
    fn returning(url: &str) -> Self {
        Self {
            url: url.to_string(),
            fail: false,
            delay: None,
            puts: AtomicUsize::new(0),
            objects: Mutex::new(HashMap::new()),
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::returning("unused")
        }
    }

    fn slow(url: &str, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::returning(url)
        }
    }

    fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    fn object_names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStore for StubStore {
    async fn put(&self, object_name: &str, data: Bytes) -> Result<String, BlobStoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(BlobStoreError::Backend("network unreachable".to_string()));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(object_name.to_string(), data);
        Ok(self.url.clone())
    }

    async fn get(&self, object_name: &str) -> Result<Bytes, BlobStoreError> {
        self.objects
            .lock()
            .unwrap()
            .get(object_name)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(object_name.to_string()))
    }
}

/// Fails the first call, succeeds afterwards.
#[derive(Default)]
struct FlakyProcessor {
    failed_once: AtomicBool,
    seen: Mutex<Vec<DocumentRecord>>,
}

#[async_trait]
impl DocumentProcessor for FlakyProcessor {
    async fn process(&self, document: &DocumentRecord) -> Result<(), anyhow::Error> {
        self.seen.lock().unwrap().push(document.clone());
        if !self.failed_once.swap(true, Ordering::SeqCst) {
            anyhow::bail!("extractor crashed");
        }
        Ok(())
    }
}

struct FixedIds(&'static str);

impl IdGenerator for FixedIds {
    fn next_id(&self) -> String {
        self.0.to_string()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn controller(dir: &Path, store: Arc<StubStore>, timeout: Duration) -> LifecycleController {
    let db = Database::open(dir.join("data")).unwrap();
    LifecycleController::new(db, store, timeout)
}

fn stage_file(dir: &Path, name: &str, data: &[u8]) -> NewDocument {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    NewDocument {
        name: name.to_string(),
        author: Some("alice".to_string()),
        type_file: "application/pdf".to_string(),
        local_path: path.to_string_lossy().to_string(),
        byte_size: data.len() as u64,
    }
}

fn assert_invariants(record: &DocumentRecord) {
    match record.status {
        DocumentStatus::Uploaded => {
            assert!(record.blob_url.is_none());
            assert!(!record.local_path.is_empty());
        }
        DocumentStatus::Transferred | DocumentStatus::Processed => {
            assert!(record.blob_url.is_some());
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_ingest_transfer_process_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StubStore::returning("https://store/abc123"));
    let lifecycle = controller(dir.path(), store.clone(), Duration::from_secs(5));

    let doc = lifecycle
        .ingest(stage_file(dir.path(), "report.pdf", b"%PDF"))
        .unwrap();
    assert_eq!(doc.status, DocumentStatus::Uploaded);
    assert_eq!(doc.blob_url, None);
    assert_invariants(&doc);

    let transferred = lifecycle.transfer(&doc.id).await.unwrap();
    assert_eq!(transferred.status, DocumentStatus::Transferred);
    assert_eq!(transferred.blob_url.as_deref(), Some("https://store/abc123"));
    assert!(transferred.modified_at >= doc.modified_at);
    assert_invariants(&transferred);

    let processed = lifecycle.process(&doc.id).await.unwrap();
    assert_eq!(processed.status, DocumentStatus::Processed);
    assert_invariants(&processed);

    let again = lifecycle.transfer(&doc.id).await;
    assert!(matches!(
        again,
        Err(LifecycleError::InvalidState {
            actual: DocumentStatus::Processed,
            ..
        })
    ));
    assert_eq!(store.put_count(), 1);

    let stored = lifecycle.get(&doc.id).unwrap();
    assert_eq!(stored.status, DocumentStatus::Processed);
    assert_eq!(stored.blob_url.as_deref(), Some("https://store/abc123"));
}

#[tokio::test]
async fn test_transfer_failure_keeps_document_uploaded() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StubStore::failing());
    let lifecycle = controller(dir.path(), store.clone(), Duration::from_secs(5));

    let doc = lifecycle
        .ingest(stage_file(dir.path(), "report.pdf", b"%PDF"))
        .unwrap();

    let result = lifecycle.transfer(&doc.id).await;
    assert!(matches!(result, Err(LifecycleError::Transfer(_))));

    let stored = lifecycle.get(&doc.id).unwrap();
    assert_eq!(stored.status, DocumentStatus::Uploaded);
    assert_eq!(stored.blob_url, None);
    assert_eq!(stored.modified_at, doc.modified_at);
}

#[tokio::test]
async fn test_transfer_timeout_is_transfer_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StubStore::slow(
        "https://store/late",
        Duration::from_secs(2),
    ));
    let lifecycle = controller(dir.path(), store, Duration::from_millis(50));

    let doc = lifecycle
        .ingest(stage_file(dir.path(), "slow.pdf", b"data"))
        .unwrap();

    match lifecycle.transfer(&doc.id).await {
        Err(LifecycleError::Transfer(message)) => assert!(message.contains("timed out")),
        other => panic!("expected Transfer error, got {other:?}"),
    }
    assert_eq!(
        lifecycle.get(&doc.id).unwrap().status,
        DocumentStatus::Uploaded
    );
}

#[tokio::test]
async fn test_transfer_missing_staged_file() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StubStore::returning("https://store/x"));
    let lifecycle = controller(dir.path(), store.clone(), Duration::from_secs(5));

    let new = stage_file(dir.path(), "gone.pdf", b"data");
    std::fs::remove_file(&new.local_path).unwrap();
    let doc = lifecycle.ingest(new).unwrap();

    let result = lifecycle.transfer(&doc.id).await;
    assert!(matches!(result, Err(LifecycleError::Transfer(_))));
    assert_eq!(store.put_count(), 0);
    assert_eq!(
        lifecycle.get(&doc.id).unwrap().status,
        DocumentStatus::Uploaded
    );
}

#[tokio::test]
async fn test_process_before_transfer_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StubStore::returning("https://store/x"));
    let lifecycle = controller(dir.path(), store, Duration::from_secs(5));

    let doc = lifecycle
        .ingest(stage_file(dir.path(), "early.pdf", b"data"))
        .unwrap();

    let result = lifecycle.process(&doc.id).await;
    assert!(matches!(
        result,
        Err(LifecycleError::InvalidState {
            expected: DocumentStatus::Transferred,
            actual: DocumentStatus::Uploaded,
            ..
        })
    ));
    assert_eq!(lifecycle.get(&doc.id).unwrap(), doc);
}

#[tokio::test]
async fn test_unknown_document_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StubStore::returning("https://store/x"));
    let lifecycle = controller(dir.path(), store.clone(), Duration::from_secs(5));

    assert!(matches!(
        lifecycle.get("missing"),
        Err(LifecycleError::NotFound(_))
    ));
    assert!(matches!(
        lifecycle.transfer("missing").await,
        Err(LifecycleError::NotFound(_))
    ));
    assert!(matches!(
        lifecycle.process("missing").await,
        Err(LifecycleError::NotFound(_))
    ));
    assert_eq!(store.put_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_transfers_have_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StubStore::slow(
        "https://store/race",
        Duration::from_millis(20),
    ));
    let lifecycle = Arc::new(controller(dir.path(), store.clone(), Duration::from_secs(5)));

    let doc = lifecycle
        .ingest(stage_file(dir.path(), "race.pdf", b"data"))
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let lifecycle = Arc::clone(&lifecycle);
            let id = doc.id.clone();
            tokio::spawn(async move { lifecycle.transfer(&id).await })
        })
        .collect();

    let mut successes = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(record) => {
                successes += 1;
                assert_eq!(record.status, DocumentStatus::Transferred);
            }
            Err(LifecycleError::InvalidState { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(successes, 1);

    // Losers that uploaded before losing leave orphans; nothing is retried.
    assert!(store.put_count() >= 1);
    assert!(store.put_count() <= 8);

    let stored = lifecycle.get(&doc.id).unwrap();
    assert_eq!(stored.status, DocumentStatus::Transferred);
    let blob_name = stored.blob_location().unwrap().name;
    assert!(store.object_names().contains(&blob_name));
}

#[tokio::test]
async fn test_failed_processing_stays_transferred_and_can_retry() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StubStore::returning("https://store/p"));
    let processor = Arc::new(FlakyProcessor::default());
    let lifecycle = controller(dir.path(), store, Duration::from_secs(5))
        .with_processor(processor.clone());

    let doc = lifecycle
        .ingest(stage_file(dir.path(), "p.pdf", b"data"))
        .unwrap();
    lifecycle.transfer(&doc.id).await.unwrap();

    let first = lifecycle.process(&doc.id).await;
    assert!(matches!(first, Err(LifecycleError::Processing(_))));
    assert_eq!(
        lifecycle.get(&doc.id).unwrap().status,
        DocumentStatus::Transferred
    );

    let second = lifecycle.process(&doc.id).await.unwrap();
    assert_eq!(second.status, DocumentStatus::Processed);

    let seen = processor.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(seen
        .iter()
        .all(|d| d.status == DocumentStatus::Transferred && d.blob_url.is_some()));
}

#[tokio::test]
async fn test_object_name_is_prefixed_and_content_follows_the_blob() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StubStore::returning("https://store/c"));
    let lifecycle = controller(dir.path(), store.clone(), Duration::from_secs(5))
        .with_id_generator(Arc::new(FixedIds("fixed-id")));

    let new = stage_file(dir.path(), "content.pdf", b"original bytes");
    let staged_path = new.local_path.clone();
    let doc = lifecycle.ingest(new).unwrap();

    let (_, before) = lifecycle.content(&doc.id).await.unwrap();
    assert_eq!(before, Bytes::from("original bytes"));

    let transferred = lifecycle.transfer(&doc.id).await.unwrap();
    assert_eq!(
        transferred.blob_location().unwrap().name,
        "fixed-id_content.pdf"
    );
    assert_eq!(store.object_names(), vec!["fixed-id_content.pdf".to_string()]);

    // Once transferred, the staged copy is no longer needed to serve content.
    std::fs::remove_file(&staged_path).unwrap();
    let (record, after) = lifecycle.content(&doc.id).await.unwrap();
    assert_eq!(record.status, DocumentStatus::Transferred);
    assert_eq!(after, Bytes::from("original bytes"));
}

#[tokio::test]
async fn test_content_with_missing_blob() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StubStore::returning("https://store/m"));
    let lifecycle = controller(dir.path(), store.clone(), Duration::from_secs(5));

    let doc = lifecycle
        .ingest(stage_file(dir.path(), "m.pdf", b"data"))
        .unwrap();
    lifecycle.transfer(&doc.id).await.unwrap();
    store.objects.lock().unwrap().clear();

    let result = lifecycle.content(&doc.id).await;
    match result {
        Err(LifecycleError::BlobMissing { id, name }) => {
            assert_eq!(id, doc.id);
            assert!(name.ends_with("_m.pdf"));
        }
        other => panic!("expected BlobMissing, got {other:?}"),
    }
    assert_eq!(
        lifecycle.get(&doc.id).unwrap().status,
        DocumentStatus::Transferred
    );
}

#[tokio::test]
async fn test_status_never_moves_backwards() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(StubStore::returning("https://store/f"));
    let lifecycle = controller(dir.path(), store, Duration::from_secs(5));

    let doc = lifecycle
        .ingest(stage_file(dir.path(), "f.pdf", b"data"))
        .unwrap();

    let mut history = vec![doc.status];
    for _ in 0..3 {
        let _ = lifecycle.process(&doc.id).await;
        history.push(lifecycle.get(&doc.id).unwrap().status);
        let _ = lifecycle.transfer(&doc.id).await;
        history.push(lifecycle.get(&doc.id).unwrap().status);
        assert_invariants(&lifecycle.get(&doc.id).unwrap());
    }

    for pair in history.windows(2) {
        assert!(pair[0] == pair[1] || pair[0].can_advance_to(pair[1]));
    }
    assert_eq!(history.last(), Some(&DocumentStatus::Processed));
}
