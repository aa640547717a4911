use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::store::QueueStore;
use crate::strategy::UpdateStrategy;

/// Source of claimable identifiers. Each call must return rows no other
/// caller has received.
#[async_trait]
pub trait ClaimQueue: Send + Sync {
    async fn claim_chunk(&self, n: usize) -> Result<Vec<String>>;
}

#[async_trait]
impl ClaimQueue for QueueStore {
    async fn claim_chunk(&self, n: usize) -> Result<Vec<String>> {
        QueueStore::claim_chunk(self, n).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Stop after this many identifiers have been claimed. `None` drains the queue.
    pub limit: Option<usize>,
    pub chunk_size: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            limit: None,
            chunk_size: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub claimed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "claimed={} succeeded={} failed={}",
            self.claimed, self.succeeded, self.failed
        )
    }
}

/// Worker-side loop: claim a chunk, update each id in turn, repeat.
pub struct QueueRunner<Q> {
    queue: Q,
    strategy: Arc<dyn UpdateStrategy>,
}

impl<Q: ClaimQueue> QueueRunner<Q> {
    pub fn new(queue: Q, strategy: Arc<dyn UpdateStrategy>) -> Self {
        Self { queue, strategy }
    }

    /// Drain until the queue is empty or `limit` ids have been claimed.
    ///
    /// A failed update is logged and counted; the id stays claimed and is not
    /// retried. Only claim errors abort the run.
    pub async fn run(&self, options: RunOptions) -> Result<RunStats> {
        let start = Instant::now();
        let chunk_size = options.chunk_size.max(1);
        let mut stats = RunStats::default();

        info!(
            strategy = self.strategy.name(),
            limit = ?options.limit,
            chunk_size,
            "Starting queue run"
        );

        loop {
            let want = match options.limit {
                Some(limit) => chunk_size.min(limit.saturating_sub(stats.claimed)),
                None => chunk_size,
            };
            if want == 0 {
                debug!("Run limit reached");
                break;
            }

            let ids = self.queue.claim_chunk(want).await?;
            if ids.is_empty() {
                info!("No unclaimed identifiers left");
                break;
            }
            stats.claimed += ids.len();

            for id in &ids {
                self.dispatch(id, &mut stats).await;
            }
        }

        info!(%stats, elapsed_secs = start.elapsed().as_secs_f64(), "Finished queue run");
        Ok(stats)
    }

    /// Update one identifier directly, bypassing claims.
    pub async fn run_single(&self, id: &str) -> RunStats {
        let mut stats = RunStats {
            claimed: 1,
            ..RunStats::default()
        };
        self.dispatch(&id.to_lowercase(), &mut stats).await;
        stats
    }

    async fn dispatch(&self, id: &str, stats: &mut RunStats) {
        match self.strategy.update(id).await {
            Ok(()) => {
                debug!(doi = %id, "Updated");
                stats.succeeded += 1;
            }
            Err(e) => {
                warn!(doi = %id, error = %e, "Update failed, leaving claimed");
                stats.failed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct MemoryQueue {
        waiting: Mutex<VecDeque<String>>,
    }

    impl MemoryQueue {
        fn with(n: usize) -> Self {
            Self {
                waiting: Mutex::new((0..n).map(|i| format!("10.1/{i}")).collect()),
            }
        }
    }

    #[async_trait]
    impl ClaimQueue for MemoryQueue {
        async fn claim_chunk(&self, n: usize) -> Result<Vec<String>> {
            let mut waiting = self.waiting.lock().unwrap();
            let take = n.min(waiting.len());
            Ok(waiting.drain(..take).collect())
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl UpdateStrategy for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn update(&self, id: &str) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(id.to_string());
            if id.ends_with('3') {
                bail!("upstream 500 for {id}");
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn drains_everything_without_limit() {
        let recorder = Arc::new(Recorder::default());
        let runner = QueueRunner::new(MemoryQueue::with(25), recorder.clone());

        let stats = runner
            .run(RunOptions {
                limit: None,
                chunk_size: 10,
            })
            .await
            .unwrap();

        assert_eq!(stats.claimed, 25);
        assert_eq!(recorder.seen.lock().unwrap().len(), 25);
    }

    #[tokio::test]
    async fn failures_do_not_stop_the_batch() {
        let recorder = Arc::new(Recorder::default());
        let runner = QueueRunner::new(MemoryQueue::with(10), recorder.clone());

        let stats = runner.run(RunOptions::default()).await.unwrap();

        // Only "10.1/3" ends in 3.
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.succeeded, 9);
        assert_eq!(stats.claimed, 10);
    }

    #[tokio::test]
    async fn limit_shrinks_last_chunk() {
        let queue = MemoryQueue::with(50);
        let recorder = Arc::new(Recorder::default());
        let runner = QueueRunner::new(queue, recorder.clone());

        let stats = runner
            .run(RunOptions {
                limit: Some(12),
                chunk_size: 5,
            })
            .await
            .unwrap();

        assert_eq!(stats.claimed, 12);
        assert_eq!(runner.queue.waiting.lock().unwrap().len(), 38);
    }

    #[tokio::test]
    async fn zero_chunk_size_still_progresses() {
        let recorder = Arc::new(Recorder::default());
        let runner = QueueRunner::new(MemoryQueue::with(3), recorder);
        let stats = runner
            .run(RunOptions {
                limit: None,
                chunk_size: 0,
            })
            .await
            .unwrap();
        assert_eq!(stats.claimed, 3);
    }

    #[tokio::test]
    async fn single_id_is_lowercased() {
        let recorder = Arc::new(Recorder::default());
        let runner = QueueRunner::new(MemoryQueue::with(0), recorder.clone());
        let stats = runner.run_single("10.1/ABC").await;
        assert_eq!(stats.succeeded, 1);
        assert_eq!(recorder.seen.lock().unwrap().as_slice(), ["10.1/abc"]);
    }
}
