//! Chain indexing subsystem.
//!
//! # Data Flow
//! ```text
//! HeadSource (lens.rs: Lotus JSON-RPC or channel)
//!     → HeadWatcher (watcher.rs, supervised task)
//!     → TipSetCache (cache.rs, hold `confidence` heads, revert on reorg)
//!     → TipSetIndexer (indexer.rs, consult AddressFilter per block)
//!     → Storage
//!
//! ConfigWatcher
//!     → FilterHandle::publish (filter.rs, atomic swap)
//!     → read by TipSetIndexer on every tip-set
//! ```
//!
//! # Design Decisions
//! - The filter slot belongs to the indexer, which outlives task restarts
//! - "No filter" processes everything, an empty filter processes nothing

pub mod cache;
pub mod filter;
pub mod indexer;
pub mod lens;
pub mod types;
pub mod watcher;

pub use filter::{AddressFilter, FilterHandle};
pub use indexer::TipSetIndexer;
pub use types::TipSet;
pub use watcher::HeadWatcher;
