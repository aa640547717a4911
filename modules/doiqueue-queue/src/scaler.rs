use async_trait::async_trait;
use heroku_client::HerokuClient;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{QueueError, Result};

/// Time given to the control plane before re-reading the worker count.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(2);

/// Process-concurrency control for one worker process class.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Workers currently running. A process class with no workers reports zero.
    async fn worker_count(&self) -> anyhow::Result<usize>;

    async fn request_worker_count(&self, n: usize) -> anyhow::Result<()>;
}

/// Heroku dynos of one process type within one app.
pub struct HerokuControlPlane {
    client: HerokuClient,
    app: String,
    process_type: String,
}

impl HerokuControlPlane {
    pub fn new(client: HerokuClient, app: &str, process_type: &str) -> Self {
        Self {
            client,
            app: app.to_string(),
            process_type: process_type.to_string(),
        }
    }
}

#[async_trait]
impl ControlPlane for HerokuControlPlane {
    async fn worker_count(&self) -> anyhow::Result<usize> {
        Ok(self.client.dyno_count(&self.app, &self.process_type).await?)
    }

    async fn request_worker_count(&self, n: usize) -> anyhow::Result<()> {
        self.client.scale(&self.app, &self.process_type, n).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleReport {
    pub before: usize,
    pub requested: usize,
    pub after: usize,
}

impl ScaleReport {
    pub fn confirmed(&self) -> bool {
        self.after == self.requested
    }
}

pub struct WorkerScaler<P> {
    plane: P,
    settle: Duration,
}

impl<P: ControlPlane> WorkerScaler<P> {
    pub fn new(plane: P) -> Self {
        Self {
            plane,
            settle: DEFAULT_SETTLE,
        }
    }

    pub fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Request `n` workers, wait, and re-read. A mismatch is reported, not corrected.
    pub async fn set_worker_count(&self, n: usize) -> Result<ScaleReport> {
        let before = self.plane.worker_count().await.map_err(control_plane)?;
        info!(before, requested = n, "Scaling workers");

        self.plane
            .request_worker_count(n)
            .await
            .map_err(control_plane)?;

        info!(settle_secs = self.settle.as_secs_f64(), "Waiting for scaling to kick in");
        tokio::time::sleep(self.settle).await;

        let after = self.plane.worker_count().await.map_err(control_plane)?;
        let report = ScaleReport {
            before,
            requested: n,
            after,
        };

        if report.confirmed() {
            info!(after, "Worker count confirmed");
        } else {
            warn!(after, requested = n, "Worker count not yet at requested level");
        }
        Ok(report)
    }
}

fn control_plane(err: anyhow::Error) -> QueueError {
    QueueError::ControlPlane(err.to_string())
}
