//! Change-event sources
//!
//! Sources produce document-change events; the orchestrator consumes them
//! all uniformly through the same channel, whether they come from host
//! file notifications, feed polling, or programmatic edits. The polling
//! source here is the one the daemon runs itself: it diffs modification
//! times against its last snapshot on an interval.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use eyre::Result;
use tracing::{debug, error, info};

use crate::config::CorpusConfig;
use crate::events::{ChangeEvent, ChangeReason};
use crate::orchestrator::Indexer;

/// A producer of document-change events
#[async_trait]
pub trait Source: Send {
    /// Drive the source until its consumer goes away
    async fn run(self: Box<Self>) -> Result<()>;
}

/// Polls the corpus for modification-time changes
pub struct PollingSource {
    root: PathBuf,
    extensions: Vec<String>,
    interval: Duration,
    indexer: Indexer,
    snapshot: HashMap<PathBuf, i64>,
    primed: bool,
}

impl PollingSource {
    pub fn new(config: &CorpusConfig, indexer: Indexer) -> Self {
        Self {
            root: config.root.clone(),
            extensions: config.extensions.clone(),
            interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            indexer,
            snapshot: HashMap::new(),
            primed: false,
        }
    }

    fn scan(&self) -> HashMap<PathBuf, i64> {
        walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || !(e.file_type().is_dir() && e.file_name().to_string_lossy().starts_with('.'))
            })
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| self.extensions.iter().any(|x| x == e))
            })
            .filter_map(|entry| {
                let mtime_ms = entry
                    .metadata()
                    .ok()
                    .and_then(|m| m.modified().ok())
                    .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as i64)?;
                Some((entry.into_path(), mtime_ms))
            })
            .collect()
    }

    /// Run a single poll cycle (useful for testing)
    ///
    /// The first cycle primes the snapshot and emits nothing; the initial
    /// index state comes from the orchestrator's own initialize scan.
    pub fn check_once(&mut self) -> Vec<ChangeEvent> {
        let current = self.scan();

        if !self.primed {
            debug!(files = current.len(), "Polling source primed");
            self.snapshot = current;
            self.primed = true;
            return Vec::new();
        }

        let mut events = Vec::new();
        for (path, mtime) in &current {
            match self.snapshot.get(path) {
                None => events.push(ChangeEvent::new(path.clone(), ChangeReason::Create)),
                Some(old) if old != mtime => events.push(ChangeEvent::new(path.clone(), ChangeReason::Modify)),
                Some(_) => {}
            }
        }
        for path in self.snapshot.keys() {
            if !current.contains_key(path) {
                events.push(ChangeEvent::new(path.clone(), ChangeReason::Delete));
            }
        }

        self.snapshot = current;
        events
    }
}

#[async_trait]
impl Source for PollingSource {
    async fn run(mut self: Box<Self>) -> Result<()> {
        info!(root = %self.root.display(), interval_secs = self.interval.as_secs(), "PollingSource started");

        loop {
            let events = self.check_once();
            for event in events {
                if let Err(e) = self.indexer.notify_change(event).await {
                    error!(error = %e, "Orchestrator gone, polling source stopping");
                    return Ok(());
                }
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}
