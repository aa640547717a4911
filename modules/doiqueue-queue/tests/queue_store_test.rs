//! Integration tests for QueueStore and Exporter.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use doiqueue_queue::{
    CorpusTable, ExportDestination, Exporter, ObjectStore, QueueError, QueueStore,
    RealtimeScrape, UpdateStrategy,
};
use flate2::read::GzDecoder;
use serde_json::json;
use sqlx::PgPool;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Every test rebuilds the same tables, so they take turns.
static DB_LOCK: Mutex<()> = Mutex::new(());

const CORPUS: &str = "crossref_test";

/// Get a test database pool with an empty queue, or skip if no test DB is available.
async fn test_pool() -> Option<PgPool> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {CORPUS} (
            id                    TEXT  PRIMARY KEY,
            response_with_hybrid  JSONB,
            api                   JSONB
        )
        "#
    ))
    .execute(&pool)
    .await
    .ok()?;

    sqlx::query(&format!("TRUNCATE {CORPUS}"))
        .execute(&pool)
        .await
        .ok()?;

    let store = QueueStore::new(pool.clone());
    store.ensure_schema().await.ok()?;
    store.truncate().await.ok()?;

    Some(pool)
}

async fn seed_corpus(pool: &PgPool, ids: &[&str]) {
    for id in ids {
        sqlx::query(&format!(
            "INSERT INTO {CORPUS} (id, response_with_hybrid, api) VALUES ($1, $2, $3)"
        ))
        .bind(id)
        .bind(json!({"evidence": "open (via free pdf)", "oa_color_long": "green", "year": "2016"}))
        .bind(json!({"_source": {"journal": "Journal\nof Tests", "publisher": "ACME"}}))
        .execute(pool)
        .await
        .unwrap();
    }
}

fn corpus() -> CorpusTable {
    CorpusTable::parse(CORPUS).unwrap()
}

#[derive(Default)]
struct CapturingStore {
    uploads: Mutex<Vec<(String, String, Vec<u8>)>>,
}

#[async_trait]
impl ObjectStore for CapturingStore {
    async fn upload_file(&self, bucket: &str, key: &str, path: &Path) -> anyhow::Result<()> {
        let bytes = std::fs::read(path)?;
        self.uploads
            .lock()
            .unwrap()
            .push((bucket.to_string(), key.to_string(), bytes));
        Ok(())
    }
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn populate_claim_and_export_end_to_end() {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let Some(pool) = test_pool().await else {
        return;
    };
    seed_corpus(&pool, &["10.1/a", "10.1/b", "10.1/c"]).await;
    let store = QueueStore::new(pool.clone());

    let count = store.populate(&corpus()).await.unwrap();
    assert_eq!(count, 3);

    let status = store.status().await.unwrap();
    assert_eq!(status.total, 3);
    assert_eq!(status.waiting, 3);
    assert_eq!(status.processed(), 0);

    let claimed = store.claim_chunk(2).await.unwrap();
    assert_eq!(claimed.len(), 2);

    let status = store.status().await.unwrap();
    assert_eq!(status.waiting, 1);

    let dir = tempfile::tempdir().unwrap();
    let exporter = Exporter::new(
        store.clone(),
        corpus(),
        ExportDestination {
            bucket: "test-bucket".to_string(),
            key: "data/export_queue.csv.gz".to_string(),
            local_dir: dir.path().to_path_buf(),
        },
    );
    let sink = CapturingStore::default();
    let report = exporter.export(&sink).await.unwrap();
    assert_eq!(report.rows, 2);
    assert_eq!(report.url, "s3://test-bucket/data/export_queue.csv.gz");

    let uploads = sink.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    let mut text = String::new();
    GzDecoder::new(uploads[0].2.as_slice())
        .read_to_string(&mut text)
        .unwrap();

    let exported: HashSet<String> = text
        .lines()
        .skip(1)
        .map(|line| line.split(',').next().unwrap().to_string())
        .collect();
    let claimed: HashSet<String> = claimed.into_iter().collect();
    assert_eq!(exported, claimed);
    assert!(!text.contains("Journal\nof"), "newlines are stripped from journal");
}

#[tokio::test]
async fn populate_assigns_rank_keys_and_unclaimed_defaults() {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let Some(pool) = test_pool().await else {
        return;
    };
    seed_corpus(&pool, &["10.2/x"]).await;
    let store = QueueStore::new(pool.clone());
    store.populate(&corpus()).await.unwrap();

    let item = store.get("10.2/X").await.unwrap().unwrap();
    assert!(!item.claimed);
    assert!((0.0..1.0).contains(&item.rank_key));
}

#[tokio::test]
async fn status_on_empty_queue_is_an_error() {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = QueueStore::new(pool);
    assert!(matches!(store.status().await, Err(QueueError::EmptyQueue)));
}

// =========================================================================
// File loads
// =========================================================================

#[tokio::test]
async fn load_from_file_lowercases() {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = QueueStore::new(pool);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "10.5555/ABC").unwrap();
    writeln!(file, "10.5555/Def|extra").unwrap();

    let inserted = store.load_from_file(file.path()).await.unwrap();
    assert_eq!(inserted, 2);
    assert!(store.get("10.5555/abc").await.unwrap().is_some());
    assert_eq!(store.status().await.unwrap().waiting, 2);
}

#[tokio::test]
async fn duplicate_load_fails_without_partial_writes() {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = QueueStore::new(pool);
    store
        .load_identifiers(&["10.9/existing".to_string()])
        .await
        .unwrap();

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "10.9/new-one").unwrap();
    writeln!(file, "10.9/EXISTING").unwrap();

    let err = store.load_from_file(file.path()).await.unwrap_err();
    assert!(matches!(err, QueueError::DuplicateIdentifier(_)));

    let status = store.status().await.unwrap();
    assert_eq!(status.total, 1, "the failed load must not leave rows behind");
    assert!(store.get("10.9/new-one").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_within_file_after_lowercasing_fails() {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = QueueStore::new(pool);

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "10.7/Same").unwrap();
    writeln!(file, "10.7/SAME").unwrap();

    assert!(matches!(
        store.load_from_file(file.path()).await,
        Err(QueueError::DuplicateIdentifier(_))
    ));
}

// =========================================================================
// Claims
// =========================================================================

#[tokio::test]
async fn reset_claims_is_idempotent() {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = QueueStore::new(pool);
    let ids: Vec<String> = (0..5).map(|i| format!("10.3/{i}")).collect();
    store.load_identifiers(&ids).await.unwrap();
    store.claim_chunk(3).await.unwrap();

    assert_eq!(store.reset_claims().await.unwrap(), 3);
    let once = store.status().await.unwrap();
    assert_eq!(store.reset_claims().await.unwrap(), 0);
    let twice = store.status().await.unwrap();

    assert_eq!(once, twice);
    assert_eq!(twice.waiting, 5);
}

#[tokio::test]
async fn concurrent_claims_never_overlap() {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = QueueStore::new(pool);
    let ids: Vec<String> = (0..200).map(|i| format!("10.4/{i}")).collect();
    store.load_identifiers(&ids).await.unwrap();

    let workers = 8;
    let chunk = 20;
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.claim_chunk(chunk).await.unwrap() })
        })
        .collect();

    let mut all = Vec::new();
    for handle in handles {
        let claimed = handle.await.unwrap();
        assert_eq!(claimed.len(), chunk);
        all.extend(claimed);
    }

    let unique: HashSet<&String> = all.iter().collect();
    assert_eq!(unique.len(), all.len(), "a row was claimed twice");
    assert_eq!(all.len(), workers * chunk);

    let status = store.status().await.unwrap();
    assert_eq!(status.waiting as usize, 200 - workers * chunk);
}

#[tokio::test]
async fn claim_chunk_on_drained_queue_returns_nothing() {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = QueueStore::new(pool);
    store
        .load_identifiers(&["10.6/only".to_string()])
        .await
        .unwrap();

    assert_eq!(store.claim_chunk(10).await.unwrap(), vec!["10.6/only"]);
    assert!(store.claim_chunk(10).await.unwrap().is_empty());
    assert!(store.claim_chunk(0).await.unwrap().is_empty());
}

// =========================================================================
// Realtime scrape
// =========================================================================

/// Answer every incoming request with the same JSON body.
async fn serve_json(body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = vec![0u8; 8192];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn realtime_scrape_stores_fresh_response_on_corpus_row() {
    let _guard = DB_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let Some(pool) = test_pool().await else {
        return;
    };
    seed_corpus(&pool, &["10.1/a", "10.1/b"]).await;
    let fresh = r#"{"evidence": "open (via page says license)", "oa_color_long": "gold"}"#;
    let base = serve_json(fresh).await;
    let scrape = RealtimeScrape::new(pool.clone(), corpus(), &base, None).unwrap();

    scrape.update("10.1/a").await.unwrap();
    // No row for this DOI: logged, not an error.
    scrape.update("10.1/unknown").await.unwrap();

    let rows: Vec<(String, Option<String>)> = sqlx::query_as(&format!(
        "SELECT id, response_with_hybrid->>'oa_color_long' FROM {CORPUS} ORDER BY id"
    ))
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(
        rows,
        vec![
            ("10.1/a".to_string(), Some("gold".to_string())),
            ("10.1/b".to_string(), Some("green".to_string())),
        ]
    );
}
