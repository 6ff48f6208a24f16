//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Ctrl+C → Shutdown::trigger
//!     → every ShutdownSignal resolves
//!     → scheduler stops restarting tasks, config watcher exits
//! ```
//!
//! # Design Decisions
//! - One coordinator per process, subscribers are cheap clones
//! - Subscribing after the trigger still observes it

pub mod shutdown;

pub use shutdown::{Shutdown, ShutdownSignal};
