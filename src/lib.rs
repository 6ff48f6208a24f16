//! Visor: chain head indexing with a hot-reloaded address filter.

pub mod chain;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod schedule;

pub use chain::{AddressFilter, FilterHandle, TipSetIndexer};
pub use config::ConfigWatcher;
pub use lifecycle::Shutdown;
pub use schedule::Scheduler;
