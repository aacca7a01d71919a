//! Event types and bus
//!
//! Two event families flow through the system: `ChangeEvent`s produced by
//! sources (file notifications, polls, programmatic edits) feeding the
//! orchestrator, and `IndexEvent`s emitted by the repository after index
//! mutations. Index notifications carry the origin sequence number of the
//! write that caused them so the orchestrator can recognize its own echoes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Why a document changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
    Create,
    Modify,
    Delete,
    Rename { from: PathBuf },
    Restore,
}

/// A document-change event from a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub reason: ChangeReason,
    pub timestamp_ms: i64,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, reason: ChangeReason) -> Self {
        Self {
            path: path.into(),
            reason,
            timestamp_ms: tiercache::now_ms(),
        }
    }
}

/// Notifications emitted by the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IndexEvent {
    /// The task lists of these documents were replaced
    IndexChanged {
        changed_paths: Vec<PathBuf>,
        origin_seq: u64,
    },
    /// Initialize or rebuild finished and the index is serving
    CacheReady { initial: bool, timestamp_ms: i64 },
}

/// Central broadcast bus for index notifications
///
/// Fire-and-forget: events with no subscribers are dropped, and slow
/// subscribers lose oldest events rather than blocking emitters.
pub struct EventBus {
    tx: broadcast::Sender<IndexEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: IndexEvent) {
        debug!(?event, "EventBus::emit");
        // Ignore send errors (no subscribers is OK)
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.tx.subscribe()
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// Monotonic origin-sequence allocator
///
/// Every orchestrator-initiated write is tagged with a fresh sequence so
/// the resulting notification can be recognized when it comes back around.
#[derive(Debug, Default)]
pub struct SeqAllocator {
    next: AtomicU64,
}

impl SeqAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next sequence number (strictly increasing, starts at 1)
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed) + 1
    }
}
