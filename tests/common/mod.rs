//! Shared utilities for integration tests.

use std::fs;
use std::path::Path;
use std::time::Duration;

/// Write a filter file containing `addresses`.
pub fn write_filter(path: &Path, addresses: &[&str]) {
    let body = serde_json::json!({ "addresses_filter": addresses });
    fs::write(path, body.to_string()).unwrap();
}

/// Atomically replace the filter file, the way editors save.
#[allow(dead_code)]
pub fn replace_filter(path: &Path, addresses: &[&str]) {
    let tmp = path.with_extension("tmp");
    write_filter(&tmp, addresses);
    fs::rename(&tmp, path).unwrap();
}

/// Poll `condition` until it holds, panicking after `timeout`.
pub async fn wait_until<F>(timeout: Duration, what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
