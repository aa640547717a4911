use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::TryStreamExt;
use sqlx::Row;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{QueueError, Result};
use crate::store::QueueStore;
use crate::types::CorpusTable;

/// Column order of the export file, matching the `export_queue` view.
pub const EXPORT_COLUMNS: [&str; 14] = [
    "doi",
    "evidence",
    "oa_color",
    "best_open_url",
    "year",
    "found_hybrid",
    "found_green",
    "error",
    "is_boai_license",
    "journal",
    "publisher",
    "subject",
    "green_base_collections",
    "license",
];

const EXPORT_FILE: &str = "export_queue.csv.gz";

/// Destination for the compressed export.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload_file(&self, bucket: &str, key: &str, path: &Path) -> anyhow::Result<()>;
}

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
}

impl S3ObjectStore {
    /// Build a client from the standard AWS environment/profile chain.
    pub async fn from_env() -> Self {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        Self {
            client: aws_sdk_s3::Client::new(&config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload_file(&self, bucket: &str, key: &str, path: &Path) -> anyhow::Result<()> {
        let body = ByteStream::from_path(path).await?;
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .content_type("text/csv")
            .content_encoding("gzip")
            .body(body)
            .send()
            .await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ExportDestination {
    pub bucket: String,
    pub key: String,
    /// Local directory the compressed file is written to before upload.
    pub local_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ExportReport {
    pub rows: u64,
    pub local_path: PathBuf,
    pub url: String,
}

/// Streams the export view into a gzipped CSV and uploads it. Read-only
/// against the queue.
pub struct Exporter {
    store: QueueStore,
    corpus: CorpusTable,
    destination: ExportDestination,
}

impl Exporter {
    pub fn new(store: QueueStore, corpus: CorpusTable, destination: ExportDestination) -> Self {
        Self {
            store,
            corpus,
            destination,
        }
    }

    pub async fn export(&self, object_store: &dyn ObjectStore) -> Result<ExportReport> {
        self.store.ensure_export_view(&self.corpus).await?;

        let ready = self.store.export_count().await?;
        info!(ready, "DOIs ready to be exported");

        std::fs::create_dir_all(&self.destination.local_dir).map_err(export_err)?;
        let local_path = self.destination.local_dir.join(EXPORT_FILE);
        let file = File::create(&local_path).map_err(export_err)?;
        let mut writer = CsvGzWriter::new(file)?;

        let select = format!("SELECT {} FROM export_queue", EXPORT_COLUMNS.join(", "));
        let mut rows = sqlx::query(&select).fetch(self.store.pool());
        while let Some(row) = rows.try_next().await? {
            let values = (0..EXPORT_COLUMNS.len())
                .map(|i| row.try_get::<Option<String>, _>(i))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            writer.write_row(&values)?;
        }
        let written = writer.finish()?;
        info!(rows = written, path = %local_path.display(), "Export file written");

        object_store
            .upload_file(&self.destination.bucket, &self.destination.key, &local_path)
            .await
            .map_err(|e| QueueError::Export(e.to_string()))?;

        let url = format!("s3://{}/{}", self.destination.bucket, self.destination.key);
        info!(%url, "Export uploaded");

        Ok(ExportReport {
            rows: written,
            local_path,
            url,
        })
    }
}

/// CSV writer with a header row, gzip-compressed on the fly.
pub struct CsvGzWriter<W: Write> {
    inner: csv::Writer<GzEncoder<W>>,
    rows: u64,
}

impl<W: Write> CsvGzWriter<W> {
    pub fn new(sink: W) -> Result<Self> {
        let mut inner = csv::Writer::from_writer(GzEncoder::new(sink, Compression::default()));
        inner.write_record(EXPORT_COLUMNS)?;
        Ok(Self { inner, rows: 0 })
    }

    pub fn write_row(&mut self, values: &[Option<String>]) -> Result<()> {
        self.inner
            .write_record(values.iter().map(|v| v.as_deref().unwrap_or("")))?;
        self.rows += 1;
        Ok(())
    }

    /// Flush and close the gzip stream. Returns the number of data rows.
    pub fn finish(self) -> Result<u64> {
        let encoder = self
            .inner
            .into_inner()
            .map_err(|e| QueueError::Export(e.error().to_string()))?;
        encoder.finish().map_err(export_err)?;
        Ok(self.rows)
    }
}

fn export_err(err: std::io::Error) -> QueueError {
    QueueError::Export(err.to_string())
}
