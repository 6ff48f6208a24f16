//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! filter file (JSON)
//!     → loader.rs (read & deserialize)
//!     → FilterConfig
//!     → AddressFilter (immutable)
//!     → atomic swap into the indexer's FilterHandle
//!
//! Reload triggers (watcher.rs):
//!     startup
//!     file modify/create event
//!     periodic reconciliation tick
//! ```
//!
//! # Design Decisions
//! - A filter is immutable once built; changes require a full reload
//! - A failed reload keeps the last good filter
//! - A missing list means deny-all, a missing file means no filter

pub mod loader;
pub mod schema;
pub mod watcher;

pub use loader::ConfigError;
pub use schema::{FilterConfig, WatcherSettings, DEFAULT_CONFIG_FILE};
pub use watcher::{ConfigWatcher, WatchError};
