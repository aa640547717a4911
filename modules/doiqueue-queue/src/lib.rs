//! DOI work queue backed by Postgres.
//!
//! A corpus snapshot is loaded into `doi_queue` with a random `rank_key` per
//! row. Workers claim unclaimed rows in rank order, hand each identifier to an
//! update strategy, and never release the claim. Claimed rows can be exported
//! joined against their corpus-side results.

pub mod drain;
pub mod error;
pub mod export;
pub mod realtime;
pub mod scaler;
pub mod store;
pub mod strategy;
pub mod types;

pub use drain::{ClaimQueue, QueueRunner, RunOptions, RunStats};
pub use error::{QueueError, Result};
pub use export::{
    CsvGzWriter, ExportDestination, ExportReport, Exporter, ObjectStore, S3ObjectStore,
    EXPORT_COLUMNS,
};
pub use realtime::{RealtimeScrape, REALTIME_SCRAPE};
pub use scaler::{ControlPlane, HerokuControlPlane, ScaleReport, WorkerScaler};
pub use store::{read_identifiers, QueueStore};
pub use strategy::{StrategyRegistry, UpdateStrategy};
pub use types::{CorpusTable, QueueItem, QueueStatus};
