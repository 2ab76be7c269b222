//! Polling change notifier
//!
//! Checks the watcher's current WatchSet on an interval and reports files
//! whose modification time or length changed, or that appeared or vanished.
//! The WatchSet is re-read on every tick, so a reload that swaps in new
//! include files re-arms the poller without extra wiring. A file seen for
//! the first time is compared against the fingerprint its WatchSet took
//! when the configuration was read.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::source::{Fingerprint, WatchSet, fingerprint};
use crate::watcher::ConfigWatcher;

/// Default time between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct PollingWatcherConfig {
    pub interval: Duration,
}

impl Default for PollingWatcherConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollingWatcherConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

/// Background task feeding a [`ConfigWatcher`]
///
/// Stops when [`stop`](Self::stop) is called or the handle is dropped.
#[derive(Debug)]
pub struct PollingWatcher {
    cancel: CancellationToken,
}

impl PollingWatcher {
    pub fn spawn(watcher: ConfigWatcher, config: PollingWatcherConfig, runtime: &Handle) -> Self {
        let cancel = CancellationToken::new();
        // Baseline before spawning so an edit made before the first tick
        // still counts as a change
        let seen = baselines(&watcher.watch_set());
        runtime.spawn(poll_loop(watcher, config.interval, seen, cancel.clone()));
        Self { cancel }
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for PollingWatcher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

type Seen = HashMap<PathBuf, Option<Fingerprint>>;

fn baselines(watch_set: &WatchSet) -> Seen {
    watch_set
        .entries()
        .map(|(path, baseline)| (path.clone(), baseline))
        .collect()
}

async fn poll_loop(
    watcher: ConfigWatcher,
    period: Duration,
    mut seen: Seen,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(interval_ms = period.as_millis() as u64, "config poller started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("config poller stopped");
                break;
            }
            _ = ticker.tick() => {
                poll_once(&watcher, &mut seen);
            }
        }
    }
}

fn poll_once(watcher: &ConfigWatcher, seen: &mut Seen) {
    let watch_set = watcher.watch_set();
    seen.retain(|path, _| watch_set.paths().contains(path));

    for (path, baseline) in watch_set.entries() {
        let current = fingerprint(path);
        let previous = match seen.insert(path.clone(), current) {
            Some(previous) => previous,
            None => {
                trace!(path = %path.display(), "watching config file");
                baseline
            }
        };
        if previous != current {
            watcher.notify_changed(path);
        }
    }
}
