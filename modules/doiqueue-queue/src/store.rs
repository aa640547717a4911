//! QueueStore: the `doi_queue` table and its export view.
//!
//! Claiming is a single `UPDATE ... FROM (SELECT ... FOR UPDATE SKIP LOCKED)`
//! statement, so concurrent workers always receive disjoint rows. Draw order
//! across concurrent claimants is only approximately `rank_key` order.

use sqlx::{PgPool, Postgres, Transaction};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{QueueError, Result};
use crate::types::{CorpusTable, QueueItem, QueueStatus};

/// Identifiers inserted per statement during a file load.
const LOAD_BATCH: usize = 10_000;

const CREATE_QUEUE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS doi_queue (
        id        TEXT             PRIMARY KEY,
        rank_key  DOUBLE PRECISION NOT NULL DEFAULT random(),
        claimed   BOOLEAN          NOT NULL DEFAULT false
    )
"#;

const QUEUE_INDEXES: [&str; 3] = [
    "CREATE INDEX IF NOT EXISTS doi_queue_claimed_idx ON doi_queue USING btree (claimed)",
    "CREATE INDEX IF NOT EXISTS doi_queue_rank_key_claimed_idx ON doi_queue USING btree (rank_key, claimed)",
    "CREATE INDEX IF NOT EXISTS doi_queue_rank_key_idx ON doi_queue USING btree (rank_key)",
];

fn export_view_sql(corpus: &CorpusTable) -> String {
    format!(
        r#"
        CREATE OR REPLACE VIEW export_queue AS
        SELECT c.id AS doi,
            c.response_with_hybrid ->> 'evidence' AS evidence,
            c.response_with_hybrid ->> 'oa_color_long' AS oa_color,
            c.response_with_hybrid ->> 'free_fulltext_url' AS best_open_url,
            c.response_with_hybrid ->> 'year' AS year,
            c.response_with_hybrid ->> 'found_hybrid' AS found_hybrid,
            c.response_with_hybrid ->> 'found_green' AS found_green,
            c.response_with_hybrid ->> 'error' AS error,
            c.response_with_hybrid ->> 'is_boai_license' AS is_boai_license,
            replace((c.api -> '_source') ->> 'journal', E'\n', '') AS journal,
            replace((c.api -> '_source') ->> 'publisher', E'\n', '') AS publisher,
            (c.api -> '_source') ->> 'subject' AS subject,
            c.response_with_hybrid ->> 'green_base_collections' AS green_base_collections,
            c.response_with_hybrid ->> 'license' AS license
        FROM {corpus} c
        JOIN doi_queue q ON c.id = q.id
        WHERE q.claimed = true
        "#
    )
}

/// Handle on the queue table. Cheap to clone.
#[derive(Clone)]
pub struct QueueStore {
    pool: PgPool,
}

impl QueueStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the queue table and its indexes if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(CREATE_QUEUE_TABLE).execute(&self.pool).await?;
        for index in QUEUE_INDEXES {
            sqlx::query(index).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// (Re)define the `export_queue` view over claimed rows joined to the corpus.
    pub async fn ensure_export_view(&self, corpus: &CorpusTable) -> Result<()> {
        sqlx::query(&export_view_sql(corpus))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove every row. Claims and rank keys are lost.
    pub async fn truncate(&self) -> Result<()> {
        sqlx::query("TRUNCATE TABLE doi_queue").execute(&self.pool).await?;
        info!("Queue truncated");
        Ok(())
    }

    /// Drop and rebuild the queue from the full corpus, one row per corpus id.
    ///
    /// Destructive: all prior queue state is gone. Must not run while workers
    /// are claiming. Runs in one transaction, so a failure leaves the old
    /// queue in place.
    pub async fn populate(&self, corpus: &CorpusTable) -> Result<i64> {
        info!(corpus = %corpus, "Repopulating queue from corpus, this may take a while");
        let start = Instant::now();

        let mut tx = self.pool.begin().await?;

        let recreate = [
            "DROP TABLE IF EXISTS doi_queue CASCADE".to_string(),
            format!(
                "CREATE TABLE doi_queue AS (SELECT id, random() AS rank_key, false AS claimed FROM {corpus})"
            ),
            "ALTER TABLE doi_queue ALTER COLUMN rank_key SET DEFAULT random()".to_string(),
            "ALTER TABLE doi_queue ALTER COLUMN rank_key SET NOT NULL".to_string(),
            "ALTER TABLE doi_queue ALTER COLUMN claimed SET DEFAULT false".to_string(),
            "ALTER TABLE doi_queue ALTER COLUMN claimed SET NOT NULL".to_string(),
        ];
        for statement in &recreate {
            run_in_tx(&mut tx, statement).await?;
        }

        // Fails on duplicate corpus ids, rolling the whole rebuild back.
        sqlx::query("ALTER TABLE doi_queue ADD PRIMARY KEY (id)")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_unique_violation(e, "corpus"))?;

        for index in QUEUE_INDEXES {
            run_in_tx(&mut tx, index).await?;
        }
        run_in_tx(&mut tx, &export_view_sql(corpus)).await?;

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM doi_queue")
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(count, elapsed_secs = start.elapsed().as_secs_f64(), "Queue populated");
        Ok(count)
    }

    /// Bulk-load identifiers from a pipe-delimited file (first column).
    ///
    /// Identifiers are lowercased. The caller truncates first; any identifier
    /// already present (or repeated in the file) fails the whole load with
    /// [`QueueError::DuplicateIdentifier`] and nothing is committed.
    pub async fn load_from_file(&self, path: &Path) -> Result<u64> {
        let start = Instant::now();
        let ids = read_identifiers(path)?;
        let inserted = self.load_identifiers(&ids).await?;
        info!(
            path = %path.display(),
            inserted,
            elapsed_secs = start.elapsed().as_secs_f64(),
            "Identifiers loaded"
        );
        Ok(inserted)
    }

    /// Insert already-normalized identifiers in a single transaction.
    pub async fn load_identifiers(&self, ids: &[String]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for batch in ids.chunks(LOAD_BATCH) {
            let result = sqlx::query("INSERT INTO doi_queue (id) SELECT * FROM UNNEST($1::text[])")
                .bind(batch)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_unique_violation(e, "file"))?;
            inserted += result.rows_affected();
            debug!(inserted, "Inserted identifier batch");
        }

        tx.commit().await?;
        Ok(inserted)
    }

    /// Mark every row unclaimed so a new pass can start without reloading.
    pub async fn reset_claims(&self) -> Result<u64> {
        let result = sqlx::query("UPDATE doi_queue SET claimed = false WHERE claimed = true")
            .execute(&self.pool)
            .await?;
        info!(reset = result.rows_affected(), "Claims reset");
        Ok(result.rows_affected())
    }

    /// Total and waiting counts. An empty queue is [`QueueError::EmptyQueue`].
    pub async fn status(&self) -> Result<QueueStatus> {
        let (total, waiting): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE claimed = false) FROM doi_queue",
        )
        .fetch_one(&self.pool)
        .await?;

        if total == 0 {
            return Err(QueueError::EmptyQueue);
        }
        Ok(QueueStatus { total, waiting })
    }

    /// Atomically claim up to `n` unclaimed rows in rank order.
    pub async fn claim_chunk(&self, n: usize) -> Result<Vec<String>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let ids = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE doi_queue q
            SET claimed = true
            FROM (
                SELECT id FROM doi_queue
                WHERE claimed = false
                ORDER BY rank_key
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            ) picked
            WHERE q.id = picked.id
            RETURNING q.id
            "#,
        )
        .bind(n as i64)
        .fetch_all(&self.pool)
        .await?;

        debug!(requested = n, claimed = ids.len(), "Claimed chunk");
        Ok(ids)
    }

    /// Look up a single row.
    pub async fn get(&self, id: &str) -> Result<Option<QueueItem>> {
        let item = sqlx::query_as::<_, QueueItem>(
            "SELECT id, rank_key, claimed FROM doi_queue WHERE id = $1",
        )
        .bind(id.to_lowercase())
        .fetch_optional(&self.pool)
        .await?;
        Ok(item)
    }

    /// Rows currently visible through the export view.
    pub async fn export_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(doi) FROM export_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

async fn run_in_tx(tx: &mut Transaction<'_, Postgres>, statement: &str) -> Result<()> {
    debug!(statement, "Running");
    sqlx::query(statement).execute(&mut **tx).await?;
    Ok(())
}

fn map_unique_violation(err: sqlx::Error, source: &str) -> QueueError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            let detail = db
                .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
                .and_then(|pg| pg.detail())
                .unwrap_or(source)
                .to_string();
            QueueError::DuplicateIdentifier(detail)
        }
        _ => QueueError::Database(err),
    }
}

/// Read the first column of a pipe-delimited file, trimmed and lowercased.
/// Blank lines are skipped.
pub fn read_identifiers(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'|')
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut ids = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(id) = record.get(0).map(str::trim).filter(|s| !s.is_empty()) {
            ids.push(id.to_lowercase());
        }
    }
    Ok(ids)
}
