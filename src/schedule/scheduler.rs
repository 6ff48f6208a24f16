//! Task scheduler with restart policies.

use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time;

use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::schedule::task::{TaskConfig, TaskError};

/// How long running tasks get to wind down after shutdown before being aborted.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("no tasks registered")]
    NoTasks,

    #[error("task {name} stopped: {source}")]
    Fatal {
        name: String,
        #[source]
        source: TaskError,
    },
}

/// Runs registered tasks and restarts them according to their policy.
pub struct Scheduler {
    task_delay: Duration,
    shutdown_grace: Duration,
    tasks: Vec<TaskConfig>,
}

impl Scheduler {
    /// Create a scheduler. Task `n` (in registration order) starts after
    /// `n * task_delay`.
    pub fn new(task_delay: Duration) -> Self {
        Self {
            task_delay,
            shutdown_grace: SHUTDOWN_GRACE,
            tasks: Vec::new(),
        }
    }

    /// Override how long tasks may keep running after shutdown.
    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn add(&mut self, config: TaskConfig) {
        self.tasks.push(config);
    }

    /// Run all tasks until `shutdown` fires or every task has stopped.
    ///
    /// Returns `Ok(())` on shutdown. A fatal task error aborts the remaining
    /// tasks and is returned. Once this returns no task run is left executing.
    pub async fn run(self, mut shutdown: ShutdownSignal) -> Result<(), ScheduleError> {
        if self.tasks.is_empty() {
            return Err(ScheduleError::NoTasks);
        }
        tracing::info!(tasks = self.tasks.len(), "Starting scheduler");

        let mut set = JoinSet::new();
        for (i, config) in self.tasks.into_iter().enumerate() {
            let start_delay = self.task_delay.saturating_mul(i as u32);
            set.spawn(supervise(config, start_delay, shutdown.clone()));
        }

        loop {
            tokio::select! {
                joined = set.join_next() => match joined {
                    None => break,
                    Some(Ok(Ok(()))) => {}
                    Some(Ok(Err(e))) => {
                        tracing::error!(error = %e, "Stopping scheduler");
                        set.shutdown().await;
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, "Task supervisor aborted");
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!(running = set.len(), "Scheduler received shutdown signal");
                    let drain = async { while set.join_next().await.is_some() {} };
                    if time::timeout(self.shutdown_grace, drain).await.is_err() {
                        tracing::warn!("Tasks did not stop within grace period, aborting");
                        set.shutdown().await;
                    }
                    break;
                }
            }
        }

        tracing::info!("Scheduler stopped");
        Ok(())
    }
}

async fn supervise(
    config: TaskConfig,
    start_delay: Duration,
    mut shutdown: ShutdownSignal,
) -> Result<(), ScheduleError> {
    let TaskConfig {
        name,
        task,
        restart_on_failure,
        restart_on_completion,
        restart_delay,
    } = config;

    if !start_delay.is_zero() {
        tokio::select! {
            _ = time::sleep(start_delay) => {}
            _ = shutdown.recv() => return Ok(()),
        }
    }

    let mut runs = 0u64;
    loop {
        if shutdown.is_triggered() {
            return Ok(());
        }

        runs += 1;
        tracing::info!(task = %name, run = runs, "Starting task");

        // Owned by this supervisor: aborting the supervisor aborts the run.
        let runner = task.clone();
        let signal = shutdown.clone();
        let mut current = JoinSet::new();
        current.spawn(async move { runner.run(signal).await });
        let Some(outcome) = current.join_next().await else {
            return Ok(());
        };

        let restart = match outcome {
            Ok(Ok(())) => {
                tracing::info!(task = %name, "Task completed");
                metrics::record_task_run(&name, "completed");
                restart_on_completion
            }
            Ok(Err(e @ TaskError::Fatal(_))) => {
                tracing::error!(task = %name, error = %e, "Task failed fatally");
                metrics::record_task_run(&name, "fatal");
                return Err(ScheduleError::Fatal { name, source: e });
            }
            Ok(Err(e)) => {
                tracing::error!(task = %name, error = %e, "Task failed");
                metrics::record_task_run(&name, "failed");
                restart_on_failure
            }
            Err(e) => {
                tracing::error!(task = %name, error = %e, "Task panicked");
                metrics::record_task_run(&name, "failed");
                restart_on_failure
            }
        };

        if shutdown.is_triggered() {
            return Ok(());
        }
        if !restart {
            tracing::info!(task = %name, "Task will not be restarted");
            return Ok(());
        }

        tracing::info!(task = %name, delay = ?restart_delay, "Restarting task");
        tokio::select! {
            _ = time::sleep(restart_delay) => {}
            _ = shutdown.recv() => return Ok(()),
        }
    }
}
