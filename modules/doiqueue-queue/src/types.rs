use std::fmt;

use crate::error::{QueueError, Result};

/// One row of `doi_queue`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct QueueItem {
    pub id: String,
    /// Uniform random value fixed at load time; claims are drawn in this order.
    pub rank_key: f64,
    pub claimed: bool,
}

/// Row counts reported by [`crate::QueueStore::status`]. Never built for an empty queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStatus {
    pub total: i64,
    pub waiting: i64,
}

impl QueueStatus {
    pub fn processed(&self) -> i64 {
        self.total - self.waiting
    }

    /// Whole-number percentage still waiting, rounded down.
    pub fn waiting_percent(&self) -> i64 {
        if self.total == 0 {
            return 0;
        }
        100 * self.waiting / self.total
    }
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "There are {} dois in the queue, of which {} ({}%) are waiting to run",
            self.total,
            self.waiting,
            self.waiting_percent()
        )
    }
}

/// A validated upstream table name, safe to interpolate into DDL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusTable(String);

impl CorpusTable {
    pub fn parse(name: &str) -> Result<Self> {
        let mut chars = name.chars();
        let valid_head = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_tail = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

        if valid_head && valid_tail && name.len() <= 63 {
            Ok(Self(name.to_string()))
        } else {
            Err(QueueError::InvalidCorpus(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorpusTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
