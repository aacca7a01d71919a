//! Tiered cache storage
//!
//! Facade over the tiercache store with one namespace per tier: raw parse
//! output, augmented records, resolved project data, and the consolidated
//! index snapshot used for fast cold starts. `is_valid` is the single
//! staleness authority - every caller goes through it rather than
//! comparing fingerprints inline.
//!
//! Cache failures are never fatal: a read or write error degrades to a
//! cache miss and the document is re-parsed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use tiercache::{Entry, TierStore, now_ms};

use crate::domain::{HeaderMeta, TaskRecord};
use crate::project::ResolvedProject;

pub const NS_RAW: &str = "raw";
pub const NS_AUGMENTED: &str = "augmented";
pub const NS_PROJECT: &str = "project";
pub const NS_CONSOLIDATED: &str = "consolidated";

const CONSOLIDATED_KEY: &str = "index";
const SLOT_SUPPRESSED_INLINE: &str = "filter:suppressed-inline";
const SLOT_SUPPRESSED_FILE: &str = "filter:suppressed-file-tasks";

/// Raw tier payload: parser output plus the source snapshot and header
/// that produced it, so augmentation can be redone without re-reading a
/// possibly-changed file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPayload {
    pub tasks: Vec<TaskRecord>,
    pub header: HeaderMeta,
    pub snapshot: String,
}

/// Augmented tier payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AugmentedPayload {
    pub tasks: Vec<TaskRecord>,
}

/// Project tier payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectPayload {
    pub project: ResolvedProject,
}

/// Consolidated tier payload: the full index for warm starts
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ConsolidatedPayload {
    pub files: Vec<(PathBuf, Vec<TaskRecord>)>,
}

/// Which suppressed set a path belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuppressedScope {
    Inline,
    FileTask,
}

impl SuppressedScope {
    fn slot(self) -> &'static str {
        match self {
            Self::Inline => SLOT_SUPPRESSED_INLINE,
            Self::FileTask => SLOT_SUPPRESSED_FILE,
        }
    }
}

/// The storage facade
pub struct Storage {
    store: TierStore,
    ttl_ms: i64,
}

impl Storage {
    pub fn open(dir: impl AsRef<Path>, ttl_days: u32) -> eyre::Result<Self> {
        let store = TierStore::open(dir)?;
        Ok(Self {
            store,
            ttl_ms: i64::from(ttl_days) * 24 * 60 * 60 * 1000,
        })
    }

    /// Whether a cached entry may be reused for the current document state
    ///
    /// This is the single source of truth for staleness. An entry is valid
    /// only if both the fingerprint and the modification time match what
    /// produced it, and it has not outlived the configured TTL.
    pub fn is_valid<T>(&self, entry: &Entry<T>, current_fingerprint: u64, current_mtime_ms: i64) -> bool {
        if entry.fingerprint != current_fingerprint || entry.mtime_ms != current_mtime_ms {
            return false;
        }
        if self.ttl_ms > 0 && now_ms() - entry.stored_at_ms > self.ttl_ms {
            return false;
        }
        true
    }

    pub fn load_raw(&self, path: &Path) -> Option<Entry<RawPayload>> {
        self.load(NS_RAW, path)
    }

    pub fn store_raw(&self, path: &Path, payload: &RawPayload, fingerprint: u64, mtime_ms: i64) {
        self.store(NS_RAW, path, payload, fingerprint, mtime_ms);
    }

    pub fn load_augmented(&self, path: &Path) -> Option<Entry<AugmentedPayload>> {
        self.load(NS_AUGMENTED, path)
    }

    pub fn store_augmented(&self, path: &Path, payload: &AugmentedPayload, fingerprint: u64, mtime_ms: i64) {
        self.store(NS_AUGMENTED, path, payload, fingerprint, mtime_ms);
    }

    pub fn load_project(&self, path: &Path) -> Option<Entry<ProjectPayload>> {
        self.load(NS_PROJECT, path)
    }

    pub fn store_project(&self, path: &Path, payload: &ProjectPayload, fingerprint: u64, mtime_ms: i64) {
        self.store(NS_PROJECT, path, payload, fingerprint, mtime_ms);
    }

    pub fn load_consolidated(&self) -> Option<ConsolidatedPayload> {
        match self.store.load::<ConsolidatedPayload>(NS_CONSOLIDATED, CONSOLIDATED_KEY) {
            Ok(entry) => entry.map(|e| e.payload),
            Err(e) => {
                warn!(error = %e, "Failed to load consolidated snapshot, treating as absent");
                None
            }
        }
    }

    pub fn store_consolidated(&self, payload: &ConsolidatedPayload) {
        if let Err(e) = self.store.store(NS_CONSOLIDATED, CONSOLIDATED_KEY, payload, 0, 0) {
            warn!(error = %e, "Failed to persist consolidated snapshot");
        }
    }

    /// Remove a document from the raw, augmented, and project tiers
    pub fn remove_document(&self, path: &Path) {
        let key = path.to_string_lossy();
        for namespace in [NS_RAW, NS_AUGMENTED, NS_PROJECT] {
            if let Err(e) = self.store.remove(namespace, &key) {
                warn!(namespace, path = %path.display(), error = %e, "Failed to remove cache entry");
            }
        }
    }

    pub fn clear_raw(&self) {
        self.clear(NS_RAW);
    }

    pub fn clear_augmented(&self) {
        self.clear(NS_AUGMENTED);
    }

    pub fn clear_project(&self) {
        self.clear(NS_PROJECT);
    }

    pub fn clear_consolidated(&self) {
        self.clear(NS_CONSOLIDATED);
    }

    /// Load a suppressed set, empty when never persisted
    pub fn load_suppressed(&self, scope: SuppressedScope) -> BTreeSet<PathBuf> {
        match self.store.get_meta::<Vec<PathBuf>>(scope.slot()) {
            Ok(Some(paths)) => paths.into_iter().collect(),
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                warn!(slot = scope.slot(), error = %e, "Failed to load suppressed set, starting empty");
                BTreeSet::new()
            }
        }
    }

    /// Persist a suppressed set
    pub fn save_suppressed(&self, scope: SuppressedScope, set: &BTreeSet<PathBuf>) {
        let paths: Vec<&PathBuf> = set.iter().collect();
        if let Err(e) = self.store.put_meta(scope.slot(), &paths) {
            warn!(slot = scope.slot(), error = %e, "Failed to persist suppressed set");
        }
    }

    fn load<T: DeserializeOwned>(&self, namespace: &str, path: &Path) -> Option<Entry<T>> {
        match self.store.load(namespace, &path.to_string_lossy()) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(namespace, path = %path.display(), error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    fn store<T: Serialize>(&self, namespace: &str, path: &Path, payload: &T, fingerprint: u64, mtime_ms: i64) {
        if let Err(e) = self
            .store
            .store(namespace, &path.to_string_lossy(), payload, fingerprint, mtime_ms)
        {
            warn!(namespace, path = %path.display(), error = %e, "Cache write failed");
        }
    }

    fn clear(&self, namespace: &str) {
        if let Err(e) = self.store.clear_namespace(namespace) {
            warn!(namespace, error = %e, "Failed to clear namespace");
        }
    }
}
