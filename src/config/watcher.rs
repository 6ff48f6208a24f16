//! Configuration file watcher for hot reload.
//!
//! The watcher keeps the indexer's [`FilterHandle`] in sync with the filter file:
//! an initial load at startup, a reload on every file event, and a periodic
//! reconciliation reload in case events were missed or coalesced. A failed
//! reload never touches the installed filter.
//!
//! If the underlying file watch breaks (error or closed channel) it is re-created
//! after a backoff delay. Only the shutdown signal ends the loop.

use std::path::{Path, PathBuf};
use std::time::Duration;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::chain::filter::FilterHandle;
use crate::config::loader::{load_address_filter, ConfigError};
use crate::config::schema::WatcherSettings;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;

/// Failure of the file watch itself (as opposed to a failed reload).
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("file watch error: {0}")]
    Notify(#[from] notify::Error),

    #[error("file event channel closed")]
    ChannelClosed,
}

enum WatchExit {
    Shutdown,
    Failed(WatchError),
}

/// Live feed of file events.
struct Subscription {
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
    // Dropping the notify watcher ends the feed.
    _watcher: Option<RecommendedWatcher>,
}

/// A watcher that monitors the filter file and publishes new filters.
pub struct ConfigWatcher {
    path: PathBuf,
    handle: FilterHandle,
    settings: WatcherSettings,
}

impl ConfigWatcher {
    /// Create a watcher publishing into `handle`.
    pub fn new(path: impl Into<PathBuf>, handle: FilterHandle) -> Self {
        Self {
            path: path.into(),
            handle,
            settings: WatcherSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: WatcherSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Read and parse the file, publishing the resulting filter on success.
    ///
    /// On failure the error is logged and the installed filter (or the absence
    /// of one) is left as is.
    pub async fn reload(&self) -> Result<(), ConfigError> {
        match load_address_filter(&self.path).await {
            Ok(filter) => {
                tracing::info!(
                    path = %self.path.display(),
                    addresses = filter.len(),
                    "Publishing address filter"
                );
                tracing::debug!(addresses = ?filter.addresses(), "Address filter contents");
                metrics::record_filter_reload("ok");
                metrics::record_filter_size(filter.len());
                self.handle.publish(filter);
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    filter_installed = self.handle.is_installed(),
                    "Failed to reload address filter, keeping current filter"
                );
                metrics::record_filter_reload(e.kind());
                Err(e)
            }
        }
    }

    /// Run until `shutdown` fires.
    pub async fn run(self, shutdown: ShutdownSignal) {
        self.run_with(shutdown, Self::subscribe).await
    }

    async fn run_with<F>(self, mut shutdown: ShutdownSignal, mut subscribe: F)
    where
        F: FnMut(&Self) -> Result<Subscription, WatchError> + Send,
    {
        let _ = self.reload().await;

        let mut attempt = 0u32;
        loop {
            let exit = match subscribe(&self) {
                Ok(subscription) => self.watch(subscription, &mut shutdown, &mut attempt).await,
                Err(e) => WatchExit::Failed(e),
            };
            match exit {
                WatchExit::Shutdown => break,
                WatchExit::Failed(e) => {
                    attempt = attempt.saturating_add(1);
                    let delay = self.settings.restart_delay(attempt);
                    tracing::error!(
                        path = %self.path.display(),
                        error = %e,
                        attempt,
                        delay = ?delay,
                        "Config watch failed, restarting"
                    );
                    metrics::record_watch_restart();

                    tokio::select! {
                        _ = time::sleep(delay) => {}
                        _ = shutdown.recv() => break,
                    }
                }
            }
        }

        tracing::info!(path = %self.path.display(), "Config watcher stopped");
    }

    async fn watch(
        &self,
        mut subscription: Subscription,
        shutdown: &mut ShutdownSignal,
        attempt: &mut u32,
    ) -> WatchExit {
        tracing::info!(path = %self.path.display(), "Config watcher started");

        // Changes made while the previous watch was down produced no events.
        if *attempt > 0 {
            let _ = self.reload().await;
        }

        let period = self.settings.reconcile_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = subscription.events.recv() => match event {
                    Some(Ok(event)) => {
                        *attempt = 0;
                        if self.is_relevant(&event) {
                            tracing::debug!(kind = ?event.kind, "Config file change detected");
                            let _ = self.reload().await;
                        }
                    }
                    Some(Err(e)) => return WatchExit::Failed(WatchError::Notify(e)),
                    None => return WatchExit::Failed(WatchError::ChannelClosed),
                },
                _ = ticker.tick() => {
                    *attempt = 0;
                    tracing::debug!("Periodic config reconciliation");
                    let _ = self.reload().await;
                }
                _ = shutdown.recv() => return WatchExit::Shutdown,
            }
        }
    }

    fn subscribe(&self) -> Result<Subscription, WatchError> {
        let (tx, events) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        // Watch the directory: editors that save by rename replace the file's
        // inode, which would silently end a watch on the file itself.
        watcher.watch(self.watch_dir(), RecursiveMode::NonRecursive)?;
        Ok(Subscription {
            events,
            _watcher: Some(watcher),
        })
    }

    fn watch_dir(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn is_relevant(&self, event: &Event) -> bool {
        (event.kind.is_modify() || event.kind.is_create())
            && event
                .paths
                .iter()
                .any(|p| p.file_name().is_some() && p.file_name() == self.path.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::filter::AddressFilter;
    use crate::lifecycle::Shutdown;
    use notify::event::{AccessKind, CreateKind, EventKind, ModifyKind};
    use std::collections::VecDeque;
    use std::fs;
    use std::sync::{Arc, Mutex};

    type EventTx = mpsc::UnboundedSender<notify::Result<Event>>;

    fn event(kind: EventKind, path: &Path) -> Event {
        Event::new(kind).add_path(path.to_path_buf())
    }

    type Feeds = Arc<Mutex<VecDeque<Subscription>>>;

    /// `n` hand-fed subscriptions, handed out in order on each (re)subscribe.
    fn channels(n: usize) -> (Vec<EventTx>, Feeds) {
        let mut senders = Vec::new();
        let mut queue = VecDeque::new();
        for _ in 0..n {
            let (tx, events) = mpsc::unbounded_channel();
            senders.push(tx);
            queue.push_back(Subscription {
                events,
                _watcher: None,
            });
        }
        (senders, Arc::new(Mutex::new(queue)))
    }

    fn spawn_fed(
        watcher: ConfigWatcher,
        shutdown: &Shutdown,
        queue: Feeds,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(watcher.run_with(shutdown.subscribe(), move |_: &ConfigWatcher| {
            queue.lock().unwrap().pop_front().ok_or(WatchError::ChannelClosed)
        }))
    }

    fn settings(reconcile: Duration) -> WatcherSettings {
        WatcherSettings {
            reconcile_interval: reconcile,
            restart_base_ms: 10,
            restart_max_ms: 20,
        }
    }

    async fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !done() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_initial_failure_leaves_no_filter() {
        let dir = tempfile::tempdir().unwrap();
        let handle = FilterHandle::new();
        let watcher = ConfigWatcher::new(dir.path().join("visor.conf"), handle.clone());

        assert!(watcher.reload().await.is_err());
        assert!(!handle.is_installed());
        assert!(handle.allow("f1"));
    }

    #[tokio::test]
    async fn test_malformed_reload_keeps_last_known_good() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visor.conf");
        let handle = FilterHandle::new();
        let watcher = ConfigWatcher::new(&path, handle.clone());

        fs::write(&path, r#"{"addresses_filter": ["f1"]}"#).unwrap();
        watcher.reload().await.unwrap();
        assert!(handle.allow("f1"));
        assert!(!handle.allow("f2"));

        fs::write(&path, r#"{"addresses_filter": ["f2""#).unwrap();
        assert!(matches!(watcher.reload().await, Err(ConfigError::Parse(_))));
        assert!(handle.allow("f1"));
        assert!(!handle.allow("f2"));

        fs::remove_file(&path).unwrap();
        assert!(matches!(watcher.reload().await, Err(ConfigError::Io(_))));
        assert!(handle.allow("f1"));
    }

    #[tokio::test]
    async fn test_missing_field_publishes_deny_all() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visor.conf");
        let handle = FilterHandle::new();
        handle.publish(AddressFilter::new(["f1"]));

        fs::write(&path, r#"{"other": true}"#).unwrap();
        ConfigWatcher::new(&path, handle.clone()).reload().await.unwrap();
        assert!(handle.is_installed());
        assert!(!handle.allow("f1"));
    }

    #[test]
    fn test_event_relevance() {
        let handle = FilterHandle::new();
        let watcher = ConfigWatcher::new("/etc/visor/visor.conf", handle);
        let ours = Path::new("/etc/visor/visor.conf");
        let other = Path::new("/etc/visor/other.conf");

        assert!(watcher.is_relevant(&event(EventKind::Modify(ModifyKind::Any), ours)));
        assert!(watcher.is_relevant(&event(EventKind::Create(CreateKind::File), ours)));
        assert!(!watcher.is_relevant(&event(EventKind::Modify(ModifyKind::Any), other)));
        assert!(!watcher.is_relevant(&event(EventKind::Access(AccessKind::Any), ours)));
    }

    #[test]
    fn test_watch_dir_of_bare_file_name() {
        let watcher = ConfigWatcher::new("visor.conf", FilterHandle::new());
        assert_eq!(watcher.watch_dir(), Path::new("."));
    }

    #[tokio::test]
    async fn test_run_loads_initially_and_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visor.conf");
        fs::write(&path, r#"{"addresses_filter": ["f1"]}"#).unwrap();

        let handle = FilterHandle::new();
        let shutdown = Shutdown::new();
        let watcher = ConfigWatcher::new(&path, handle.clone());
        let task = tokio::spawn(watcher.run(shutdown.subscribe()));

        wait_for("initial filter", || handle.is_installed()).await;
        assert!(handle.allow("f1"));
        assert!(!handle.allow("f2"));

        shutdown.trigger();
        time::timeout(Duration::from_secs(5), task)
            .await
            .expect("watcher should stop on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_relevant_event_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visor.conf");
        fs::write(&path, r#"{"addresses_filter": ["f1"]}"#).unwrap();

        let handle = FilterHandle::new();
        let shutdown = Shutdown::new();
        let (senders, queue) = channels(1);
        let watcher = ConfigWatcher::new(&path, handle.clone())
            .with_settings(settings(Duration::from_secs(3600)));
        let task = spawn_fed(watcher, &shutdown, queue);
        wait_for("initial filter", || handle.allow("f1")).await;

        fs::write(&path, r#"{"addresses_filter": ["f2"]}"#).unwrap();
        let other = dir.path().join("other.conf");
        senders[0].send(Ok(event(EventKind::Modify(ModifyKind::Any), &other))).unwrap();
        time::sleep(Duration::from_millis(50)).await;
        assert!(handle.allow("f1"), "event for another file reloaded the filter");

        senders[0].send(Ok(event(EventKind::Modify(ModifyKind::Any), &path))).unwrap();
        wait_for("reload on event", || handle.allow("f2")).await;

        shutdown.trigger();
        time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_reconciliation_reloads_without_events() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visor.conf");
        fs::write(&path, r#"{"addresses_filter": ["f1"]}"#).unwrap();

        let handle = FilterHandle::new();
        let shutdown = Shutdown::new();
        let (_senders, queue) = channels(1);
        let watcher = ConfigWatcher::new(&path, handle.clone())
            .with_settings(settings(Duration::from_millis(30)));
        let task = spawn_fed(watcher, &shutdown, queue.clone());
        wait_for("initial filter", || handle.allow("f1")).await;

        // No event is ever sent: only the reconciliation timer can see this.
        fs::write(&path, r#"{"addresses_filter": ["f9"]}"#).unwrap();
        wait_for("reconciled filter", || handle.allow("f9")).await;
        assert!(!handle.allow("f1"));
        assert!(queue.lock().unwrap().is_empty());

        shutdown.trigger();
        time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_watch_error_restarts_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visor.conf");
        fs::write(&path, r#"{"addresses_filter": ["f1"]}"#).unwrap();

        let handle = FilterHandle::new();
        let shutdown = Shutdown::new();
        let (senders, queue) = channels(2);
        let watcher = ConfigWatcher::new(&path, handle.clone())
            .with_settings(settings(Duration::from_secs(3600)));
        let task = spawn_fed(watcher, &shutdown, queue.clone());
        wait_for("initial filter", || handle.allow("f1")).await;

        fs::write(&path, r#"{"addresses_filter": ["f2"]}"#).unwrap();
        time::sleep(Duration::from_millis(50)).await;
        assert!(handle.allow("f1"), "nothing should have reloaded yet");

        senders[0].send(Err(notify::Error::generic("inotify queue overflow"))).unwrap();
        wait_for("reload after restart", || handle.allow("f2")).await;
        assert!(queue.lock().unwrap().is_empty(), "watch was not re-created");

        shutdown.trigger();
        time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_closed_channel_restarts_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("visor.conf");
        fs::write(&path, r#"{"addresses_filter": ["f1"]}"#).unwrap();

        let handle = FilterHandle::new();
        let shutdown = Shutdown::new();
        let (mut senders, queue) = channels(2);
        let watcher = ConfigWatcher::new(&path, handle.clone())
            .with_settings(settings(Duration::from_secs(3600)));
        let task = spawn_fed(watcher, &shutdown, queue.clone());
        wait_for("initial filter", || handle.allow("f1")).await;

        fs::write(&path, r#"{"addresses_filter": ["f2"]}"#).unwrap();
        drop(senders.remove(0));
        wait_for("reload after restart", || handle.allow("f2")).await;
        assert!(queue.lock().unwrap().is_empty(), "watch was not re-created");

        shutdown.trigger();
        time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}
