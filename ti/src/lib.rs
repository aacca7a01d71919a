//! taskindex - incremental task index over document corpora
//!
//! taskindex extracts structured task records from plain-text and
//! node-graph documents, keeps the index consistent as documents change,
//! and serves low-latency queries against it. Expensive parsing is
//! offloaded to parallel workers; everything mutable funnels through one
//! orchestrator actor.
//!
//! # Core Concepts
//!
//! - **Deterministic parsing**: identical content always yields identical
//!   records, which is what makes fingerprint-based caching sound
//! - **Tiered caches**: raw parse output, augmented records, and project
//!   data are cached independently and validated by fingerprint + mtime
//! - **Single writer**: only the orchestrator mutates the repository,
//!   storage tiers, and suppressed sets
//! - **Echo suppression**: orchestrator-issued writes carry origin
//!   sequence numbers so their own notifications are never reprocessed
//!
//! # Modules
//!
//! - [`parser`] - pure document-to-records parsing
//! - [`project`] - project identity resolution with cached rules
//! - [`augment`] - metadata inheritance
//! - [`workers`] - parallel parse dispatch with sequential fallback
//! - [`storage`] - tiered persistent cache facade
//! - [`repository`] - the in-memory consolidated index
//! - [`orchestrator`] - the coordinating actor
//! - [`sources`] - change-event producers
//! - [`query`] - read-only snapshot queries
//! - [`edit`] - task mutations as document edits
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod augment;
pub mod cli;
pub mod config;
pub mod domain;
pub mod edit;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod parser;
pub mod project;
pub mod query;
pub mod repository;
pub mod sources;
pub mod storage;
pub mod workers;

// Re-export commonly used types
pub use config::{Config, FilterConfig, FilterMode, FilterRule, FilterScope, ParserConfig};
pub use domain::{DateField, Priority, TaskId, TaskKind, TaskMeta, TaskRecord, TaskStatus};
pub use edit::{TaskDraft, TaskEditor};
pub use error::IndexError;
pub use events::{ChangeEvent, ChangeReason, EventBus, IndexEvent};
pub use orchestrator::Indexer;
pub use query::QueryService;
pub use repository::{BatchOptions, Repository};
pub use sources::{PollingSource, Source};
pub use storage::Storage;
pub use workers::{ParseJob, WorkerOrchestrator};
