//! Tip-set indexer.
//!
//! Runs the selected tasks over each finalized tip-set and hands the reports to
//! storage. Every task consults the address filter: a block is processed only if
//! its miner passes. The filter slot belongs to the indexer, not to a task run,
//! so a filter published by the config watcher survives task restarts.

use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::chain::filter::{AddressFilter, FilterHandle};
use crate::chain::types::{ChainEpoch, TipSet};

pub const BLOCKS_TASK: &str = "blocks";
pub const MESSAGES_TASK: &str = "messages";
pub const CHAIN_ECONOMICS_TASK: &str = "chaineconomics";
pub const ACTOR_STATES_RAW_TASK: &str = "actorstatesraw";

/// Every task the indexer knows, in default order.
pub const ALL_TASKS: [&str; 4] = [
    BLOCKS_TASK,
    MESSAGES_TASK,
    CHAIN_ECONOMICS_TASK,
    ACTOR_STATES_RAW_TASK,
];

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("unknown task: {0}")]
    UnknownTask(String),

    #[error("no tasks selected")]
    NoTasks,

    #[error("storage error: {0}")]
    Storage(String),
}

/// Outcome of one task on one tip-set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub reporter: String,
    pub task: String,
    pub height: ChainEpoch,
    /// CIDs of the blocks whose miner passed the filter.
    pub processed: Vec<String>,
    pub skipped: usize,
}

/// Sink for task reports.
pub trait Storage: Send + Sync {
    fn persist(&self, reports: &[TaskReport]) -> Result<(), IndexError>;
}

/// Storage that discards everything.
#[derive(Debug, Default)]
pub struct NullStorage;

impl Storage for NullStorage {
    fn persist(&self, _reports: &[TaskReport]) -> Result<(), IndexError> {
        Ok(())
    }
}

/// Storage that keeps reports in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    reports: Mutex<Vec<TaskReport>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<TaskReport> {
        self.reports
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Storage for MemoryStorage {
    fn persist(&self, reports: &[TaskReport]) -> Result<(), IndexError> {
        self.reports
            .lock()
            .map_err(|_| IndexError::Storage("report store poisoned".into()))?
            .extend_from_slice(reports);
        Ok(())
    }
}

pub struct TipSetIndexer {
    name: String,
    tasks: Vec<String>,
    storage: Arc<dyn Storage>,
    filter: FilterHandle,
}

impl TipSetIndexer {
    /// Create an indexer running `tasks`, reporting as `name`.
    ///
    /// Task names are trimmed; empty entries are ignored and unknown ones
    /// rejected. No filter is installed initially, so every block passes.
    pub fn new<S: AsRef<str>>(
        name: impl Into<String>,
        tasks: &[S],
        storage: Arc<dyn Storage>,
    ) -> Result<Self, IndexError> {
        let mut selected: Vec<String> = Vec::new();
        for task in tasks.iter().map(|t| t.as_ref().trim()).filter(|t| !t.is_empty()) {
            if !ALL_TASKS.iter().any(|known| *known == task) {
                return Err(IndexError::UnknownTask(task.to_string()));
            }
            if !selected.iter().any(|s| s == task) {
                selected.push(task.to_string());
            }
        }
        if selected.is_empty() {
            return Err(IndexError::NoTasks);
        }

        Ok(Self {
            name: name.into(),
            tasks: selected,
            storage,
            filter: FilterHandle::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tasks(&self) -> &[String] {
        &self.tasks
    }

    /// Install `filter` for every tip-set indexed from now on.
    ///
    /// Safe to call from any thread while indexing is running.
    pub fn set_address_filter(&self, filter: AddressFilter) {
        self.filter.publish(filter);
    }

    /// Handle to the indexer's filter slot, for publishers that outlive a
    /// borrow of the indexer.
    pub fn filter_handle(&self) -> FilterHandle {
        self.filter.clone()
    }

    /// Run every selected task over `ts` and persist the reports.
    ///
    /// The filter is read once, so all tasks of a tip-set see the same one even
    /// if a new filter is published meanwhile.
    pub fn index_tipset(&self, ts: &TipSet) -> Result<Vec<TaskReport>, IndexError> {
        let filter = self.filter.current();
        let allow = |miner: &str| filter.as_ref().map_or(true, |f| f.allow(miner));

        let (passed, skipped): (Vec<_>, Vec<_>) =
            ts.blocks.iter().partition(|block| allow(&block.miner));
        let processed: Vec<String> = passed.iter().map(|b| b.cid.clone()).collect();

        let reports: Vec<TaskReport> = self
            .tasks
            .iter()
            .map(|task| TaskReport {
                reporter: self.name.clone(),
                task: task.clone(),
                height: ts.height,
                processed: processed.clone(),
                skipped: skipped.len(),
            })
            .collect();

        tracing::debug!(
            height = ts.height,
            processed = processed.len(),
            skipped = skipped.len(),
            "Indexed tip-set"
        );

        self.storage.persist(&reports)?;
        Ok(reports)
    }
}
