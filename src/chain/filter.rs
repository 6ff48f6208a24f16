//! Address filtering for the indexer.
//!
//! An [`AddressFilter`] is an allow-list that is **closed by default**: a filter
//! built from an empty list denies every address. "No filtering" is expressed by
//! not installing a filter at all, which is why [`FilterHandle`] distinguishes an
//! empty slot from an installed empty filter.

use std::sync::Arc;
use arc_swap::ArcSwapOption;

use crate::config::schema::FilterConfig;

/// Immutable membership test over a fixed list of addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressFilter {
    addresses: Vec<String>,
}

impl AddressFilter {
    /// Build a filter from the given addresses, verbatim.
    ///
    /// No normalization or deduplication is applied.
    pub fn new<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            addresses: addresses.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true iff `addr` is one of the filter's addresses.
    ///
    /// Exact string comparison: no case folding, no trimming. An empty filter
    /// returns false for every input.
    pub fn allow(&self, addr: &str) -> bool {
        self.addresses.iter().any(|a| a == addr)
    }

    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }
}

impl From<FilterConfig> for AddressFilter {
    fn from(config: FilterConfig) -> Self {
        Self { addresses: config.addresses_filter }
    }
}

/// Shared slot holding the filter currently consulted by the indexer.
///
/// Single writer (the config watcher), many readers. Publishing swaps the whole
/// `Arc`, so a reader holds either the previous filter or the new one, never a
/// partially built value. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct FilterHandle {
    current: Arc<ArcSwapOption<AddressFilter>>,
}

impl FilterHandle {
    /// Create an empty handle (no filter installed).
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `filter` for all subsequent reads.
    pub fn publish(&self, filter: AddressFilter) {
        self.current.store(Some(Arc::new(filter)));
    }

    /// Snapshot of the installed filter, if any.
    pub fn current(&self) -> Option<Arc<AddressFilter>> {
        self.current.load_full()
    }

    pub fn is_installed(&self) -> bool {
        self.current.load().is_some()
    }

    /// Check `addr` against the installed filter.
    ///
    /// With no filter installed every address passes; an installed empty filter
    /// denies everything.
    pub fn allow(&self, addr: &str) -> bool {
        match &*self.current.load() {
            Some(filter) => filter.allow(addr),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    #[test]
    fn test_allow_is_exact_membership() {
        let filter = AddressFilter::new(["f01234", "f05678"]);
        assert!(filter.allow("f01234"));
        assert!(filter.allow("f05678"));
        assert!(!filter.allow("f09999"));
        assert!(!filter.allow("F01234"));
        assert!(!filter.allow(" f01234"));
        assert!(!filter.allow(""));
    }

    #[test]
    fn test_empty_filter_denies_everything() {
        let filter = AddressFilter::new(Vec::<String>::new());
        assert!(filter.is_empty());
        for addr in ["", "f01234", "anything", "*"] {
            assert!(!filter.allow(addr), "empty filter allowed {addr:?}");
        }
    }

    #[test]
    fn test_order_and_duplicates_do_not_matter() {
        let a = AddressFilter::new(["x", "y", "x"]);
        let b = AddressFilter::new(["y", "x"]);
        for addr in ["x", "y", "z"] {
            assert_eq!(a.allow(addr), b.allow(addr));
        }
        // Kept verbatim.
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_handle_without_filter_allows_all() {
        let handle = FilterHandle::new();
        assert!(!handle.is_installed());
        assert!(handle.allow("f01234"));

        handle.publish(AddressFilter::default());
        assert!(handle.is_installed());
        assert!(!handle.allow("f01234"));
    }

    #[test]
    fn test_handle_clones_share_slot() {
        let handle = FilterHandle::new();
        let reader = handle.clone();
        handle.publish(AddressFilter::new(["f1"]));
        assert!(reader.allow("f1"));
        assert!(!reader.allow("f2"));

        handle.publish(AddressFilter::new(["f2"]));
        assert!(!reader.allow("f1"));
        assert!(reader.allow("f2"));
    }

    #[test]
    fn test_concurrent_publish_never_mixes_filters() {
        let handle = FilterHandle::new();
        let old = AddressFilter::new(["a1", "a2", "a3"]);
        let new = AddressFilter::new(["b1", "b2", "b3"]);
        handle.publish(old.clone());

        let done = Arc::new(AtomicBool::new(false));
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let handle = handle.clone();
                let done = done.clone();
                thread::spawn(move || {
                    while !done.load(Ordering::Acquire) {
                        let snapshot = handle.current().expect("filter installed");
                        let olds = ["a1", "a2", "a3"].iter().filter(|a| snapshot.allow(a)).count();
                        let news = ["b1", "b2", "b3"].iter().filter(|a| snapshot.allow(a)).count();
                        assert!(
                            (olds == 3 && news == 0) || (olds == 0 && news == 3),
                            "observed mixed filter: {olds} old, {news} new"
                        );
                    }
                })
            })
            .collect();

        for i in 0..2_000 {
            if i % 2 == 0 {
                handle.publish(new.clone());
            } else {
                handle.publish(old.clone());
            }
        }
        done.store(true, Ordering::Release);

        for reader in readers {
            reader.join().expect("reader panicked");
        }
    }
}
