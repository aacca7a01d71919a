//! The coordinating state machine
//!
//! An actor owns every mutable piece of the pipeline: the storage tiers,
//! the suppressed sets, the project resolver cache, and the only write
//! path into the repository. Sources, timers, and the write API all talk
//! to it through one command channel; timers are sleeps that post their
//! fire message back onto the same channel.

mod core;
mod debounce;
mod filter;

pub use filter::FilterEngine;

use std::path::PathBuf;
use std::sync::Arc;

use eyre::Result;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::info;

use crate::config::{Config, FilterConfig};
use crate::events::{ChangeEvent, EventBus, IndexEvent};
use crate::repository::Repository;
use crate::storage::Storage;

use self::core::Orchestrator;

/// Commands processed by the orchestrator actor
pub(crate) enum Command {
    Initialize {
        reply: oneshot::Sender<()>,
    },
    Change(ChangeEvent),
    DebounceFired {
        path: PathBuf,
        generation: u64,
    },
    /// Process everything whose debounce fired; queued behind the fires
    /// themselves so near-simultaneous changes coalesce into one batch
    FlushReady,
    FilterChanged(FilterConfig),
    RestoreFired {
        generation: u64,
    },
    SettingsChanged(Box<Config>),
    Rebuild {
        reply: oneshot::Sender<()>,
    },
    Notification(IndexEvent),
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Handle to a running index orchestrator
///
/// Cheap to clone; all methods enqueue commands for the single actor task.
#[derive(Clone)]
pub struct Indexer {
    tx: mpsc::Sender<Command>,
    repository: Arc<Repository>,
    bus: Arc<EventBus>,
}

impl Indexer {
    /// Spawn the orchestrator actor for the given configuration
    ///
    /// Must be called from within a tokio runtime. The index is empty
    /// until [`Indexer::initialize`] completes.
    pub fn spawn(config: Config) -> Result<Self> {
        config.validate()?;

        let bus = Arc::new(EventBus::default());
        let storage = Arc::new(Storage::open(config.cache_dir(), config.cache.ttl_days)?);
        let repository = Arc::new(Repository::new(bus.clone(), storage.clone()));

        let (tx, rx) = mpsc::channel(256);
        let orchestrator = Orchestrator::new(config, storage, repository.clone(), bus.clone(), tx.clone())?;
        tokio::spawn(orchestrator.run(rx));

        // Feed index notifications back into the actor so it can discard
        // its own echoes and re-verify external point writes
        let mut bus_rx = bus.subscribe();
        let notify_tx = tx.clone();
        tokio::spawn(async move {
            loop {
                match bus_rx.recv().await {
                    Ok(event) => {
                        if notify_tx.send(Command::Notification(event)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        info!(skipped, "Notification feedback lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Self { tx, repository, bus })
    }

    /// Load persisted state and, if the cache is cold, run a full scan
    pub async fn initialize(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Initialize { reply: reply_tx })
            .await
            .map_err(|_| eyre::eyre!("Orchestrator channel closed"))?;
        reply_rx.await.map_err(|_| eyre::eyre!("Orchestrator channel closed"))
    }

    /// Deliver a document-change event from a source
    pub async fn notify_change(&self, event: ChangeEvent) -> Result<()> {
        self.tx
            .send(Command::Change(event))
            .await
            .map_err(|_| eyre::eyre!("Orchestrator channel closed"))
    }

    /// Apply new filter rules (prune immediately, restore debounced)
    pub async fn set_filter(&self, filter: FilterConfig) -> Result<()> {
        self.tx
            .send(Command::FilterChanged(filter))
            .await
            .map_err(|_| eyre::eyre!("Orchestrator channel closed"))
    }

    /// Apply a new settings snapshot, clearing affected cache tiers
    pub async fn apply_settings(&self, config: Config) -> Result<()> {
        self.tx
            .send(Command::SettingsChanged(Box::new(config)))
            .await
            .map_err(|_| eyre::eyre!("Orchestrator channel closed"))
    }

    /// Force a full rebuild of the index
    pub async fn rebuild(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Rebuild { reply: reply_tx })
            .await
            .map_err(|_| eyre::eyre!("Orchestrator channel closed"))?;
        reply_rx.await.map_err(|_| eyre::eyre!("Orchestrator channel closed"))
    }

    /// Persist state and stop the actor
    pub async fn shutdown(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| eyre::eyre!("Orchestrator channel closed"))?;
        reply_rx.await.map_err(|_| eyre::eyre!("Orchestrator channel closed"))
    }

    /// Subscribe to index notifications
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.bus.subscribe()
    }

    /// The repository, for read-only snapshot queries
    pub fn repository(&self) -> Arc<Repository> {
        self.repository.clone()
    }
}
