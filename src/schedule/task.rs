//! Units of work driven by the scheduler.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::lifecycle::ShutdownSignal;

/// Errors a task run can end with.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Recoverable: subject to the task's restart-on-failure policy.
    #[error("task failed: {0}")]
    Failed(String),

    /// Never restarted; stops the scheduler.
    #[error("fatal task error: {0}")]
    Fatal(String),
}

/// A long-running unit of work.
///
/// `run` returning `Ok(())` is a completion, `Err` a failure. Implementations
/// should return promptly once `shutdown` resolves. State that must outlive a
/// restart belongs in the implementor, not in the future returned by `run`.
pub trait Task: Send + Sync + 'static {
    fn run(&self, shutdown: ShutdownSignal) -> BoxFuture<'_, Result<(), TaskError>>;
}

/// Registration of a task with its restart policy.
#[derive(Clone)]
pub struct TaskConfig {
    pub name: String,
    pub task: Arc<dyn Task>,
    pub restart_on_failure: bool,
    pub restart_on_completion: bool,
    pub restart_delay: Duration,
}

impl fmt::Debug for TaskConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskConfig")
            .field("name", &self.name)
            .field("restart_on_failure", &self.restart_on_failure)
            .field("restart_on_completion", &self.restart_on_completion)
            .field("restart_delay", &self.restart_delay)
            .finish()
    }
}
