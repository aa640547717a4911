use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use altmetric_client::AltmetricClient;
use doiqueue_common::{telemetry, AppConfig};
use doiqueue_profiles::{add_or_overwrite_profile, PersonStore, ProfileRefresher};
use doiqueue_queue::{
    CorpusTable, ExportDestination, Exporter, HerokuControlPlane, QueueError, QueueRunner,
    QueueStore, RealtimeScrape, RunOptions, S3ObjectStore, StrategyRegistry, UpdateStrategy,
    WorkerScaler, REALTIME_SCRAPE,
};
use heroku_client::HerokuClient;
use orcid_client::OrcidClient;

/// Steps run in declaration order when several flags are combined.
#[derive(Parser, Debug)]
#[command(name = "doi-queue", about = "Load, drain, scale and export the DOI queue")]
struct Cli {
    /// File with DOIs, one per line (pipe-delimited, first column). Replaces the queue.
    #[arg(long)]
    filename: Option<PathBuf>,

    /// Scale the worker process to this many dynos (0 stops them)
    #[arg(long)]
    dynos: Option<usize>,

    /// Replace the queue with every DOI in the corpus table
    #[arg(long)]
    addall: bool,

    /// Mark every queued DOI as unclaimed
    #[arg(long)]
    reset: bool,

    /// Print how many DOIs are still waiting
    #[arg(long)]
    status: bool,

    /// Export claimed DOIs with their results to S3
    #[arg(long)]
    export: bool,

    /// Drain the queue
    #[arg(long)]
    run: bool,

    /// How many DOIs to process before stopping
    #[arg(long, short = 'l')]
    limit: Option<usize>,

    /// How many DOIs to claim at once
    #[arg(long, short = 'c', default_value_t = 10)]
    chunk: usize,

    /// Update this one DOI instead of draining the queue
    #[arg(long)]
    id: Option<String>,

    /// Update strategy applied to each DOI
    #[arg(long, default_value = REALTIME_SCRAPE)]
    strategy: String,

    /// Refresh and save the profile for this ORCID iD
    #[arg(long)]
    profile: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let corpus = CorpusTable::parse(&config.corpus_table)?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;

    let store = QueueStore::new(pool.clone());
    store.ensure_schema().await?;

    // Resolved up front so a bad name fails before any queue work.
    let strategy = if cli.run || cli.id.is_some() {
        Some(build_strategies(&pool, &corpus, &config)?.resolve(&cli.strategy)?)
    } else {
        None
    };

    if let Some(path) = &cli.filename {
        store.truncate().await?;
        let inserted = store.load_from_file(path).await?;
        info!(inserted, path = %path.display(), "Loaded DOIs from file");
        print_status(&store).await?;
    }

    if let Some(n) = cli.dynos {
        scale_workers(&config, n).await?;
    }

    if cli.addall {
        store.truncate().await?;
        let count = store.populate(&corpus).await?;
        info!(count, corpus = %corpus, "Queue populated from corpus");
    }

    if cli.reset {
        let reset = store.reset_claims().await?;
        info!(reset, "Claims reset");
    }

    if cli.status {
        print_status(&store).await?;
    }

    if cli.export {
        let destination = ExportDestination {
            bucket: config.export_bucket.clone(),
            key: config.export_key.clone(),
            local_dir: PathBuf::from(&config.export_dir),
        };
        let object_store = S3ObjectStore::from_env().await;
        let report = Exporter::new(store.clone(), corpus.clone(), destination)
            .export(&object_store)
            .await?;
        info!(rows = report.rows, url = %report.url, "Export complete");
    }

    if let Some(strategy) = strategy {
        let runner = QueueRunner::new(store.clone(), strategy);
        let stats = match &cli.id {
            Some(id) => runner.run_single(id).await,
            None => {
                runner
                    .run(RunOptions {
                        limit: cli.limit,
                        chunk_size: cli.chunk,
                    })
                    .await?
            }
        };
        info!(%stats, "Run complete");
    }

    if let Some(orcid_id) = &cli.profile {
        refresh_profile(&pool, &config, orcid_id).await?;
    }

    Ok(())
}

fn build_strategies(
    pool: &PgPool,
    corpus: &CorpusTable,
    config: &AppConfig,
) -> Result<StrategyRegistry> {
    let realtime: Arc<dyn UpdateStrategy> = Arc::new(RealtimeScrape::new(
        pool.clone(),
        corpus.clone(),
        &config.oadoi_api_url,
        config.contact_email.clone(),
    )?);
    Ok(StrategyRegistry::new().register(realtime))
}

async fn print_status(store: &QueueStore) -> Result<()> {
    match store.status().await {
        Ok(status) => info!("{status}"),
        Err(QueueError::EmptyQueue) => info!("The queue is empty"),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn scale_workers(config: &AppConfig, n: usize) -> Result<()> {
    let api_key = config
        .heroku_api_key
        .clone()
        .context("HEROKU_API_KEY is required for --dynos")?;
    let plane = HerokuControlPlane::new(
        HerokuClient::new(api_key)?,
        &config.heroku_app,
        &config.worker_process,
    );
    let report = WorkerScaler::new(plane).set_worker_count(n).await?;
    info!(before = report.before, after = report.after, "Scaling done");
    Ok(())
}

async fn refresh_profile(pool: &PgPool, config: &AppConfig, orcid_id: &str) -> Result<()> {
    let people = PersonStore::new(pool.clone());
    people.ensure_schema().await?;

    let refresher = ProfileRefresher::new(
        Arc::new(OrcidClient::new()?),
        Arc::new(AltmetricClient::new(config.altmetric_api_key.clone())?),
    );
    let person = add_or_overwrite_profile(&people, &refresher, orcid_id).await?;

    info!(
        id = %person.id,
        name = %person.full_name(),
        products = person.num_products,
        t_index = person.t_index,
        error = person.error.as_deref().unwrap_or(""),
        "Profile saved"
    );
    info!("{}", serde_json::to_string(&person.orcid_view())?);
    Ok(())
}
