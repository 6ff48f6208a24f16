//! Task scheduling subsystem.
//!
//! # Data Flow
//! ```text
//! TaskConfig (name, task, restart policy)
//!     → Scheduler::add
//!     → Scheduler::run
//!         → one supervisor per task
//!             run → completed | failed | panicked | fatal
//!             → restart after delay, or stop
//! ```
//!
//! # Design Decisions
//! - Each run executes in its own tokio task so a panic is just a failure
//! - A fatal error stops the whole scheduler
//! - Shutdown is observed between runs and during restart delays

pub mod scheduler;
pub mod task;

pub use scheduler::{ScheduleError, Scheduler};
pub use task::{Task, TaskConfig, TaskError};
