use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{QueueError, Result};

/// Per-identifier update run by the drain loop.
///
/// Implementations own their error handling; the drain loop only logs a
/// returned error and moves on.
#[async_trait]
pub trait UpdateStrategy: Send + Sync {
    /// Name used to select this strategy from the command line.
    fn name(&self) -> &'static str;

    async fn update(&self, id: &str) -> anyhow::Result<()>;
}

/// Strategies known to this binary, keyed by name. Resolved once at startup.
#[derive(Default, Clone)]
pub struct StrategyRegistry {
    strategies: BTreeMap<&'static str, Arc<dyn UpdateStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, strategy: Arc<dyn UpdateStrategy>) -> Self {
        self.strategies.insert(strategy.name(), strategy);
        self
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn UpdateStrategy>> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| QueueError::UnknownStrategy(name.to_string()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.keys().copied().collect()
    }
}
