//! Parse worker orchestration
//!
//! Dispatches parse work to blocking worker tasks when a batch is large
//! enough to warrant it, and falls back to sequential parsing in the
//! calling context otherwise - or whenever a worker fails. Repository
//! mutation never happens here; workers only ever see job data and return
//! results to be joined by the orchestrator.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::config::WorkerConfig;
use crate::domain::{HeaderMeta, Priority, TaskRecord};
use crate::error::IndexError;
use crate::parser::Parser;

/// One document's parse input, read by the caller beforehand
///
/// Workers stay pure: all I/O happens before a job is built.
#[derive(Debug, Clone)]
pub struct ParseJob {
    pub path: PathBuf,
    pub content: String,
    pub header: HeaderMeta,
}

/// Per-document parse outcomes for a batch
pub type ParseResults = HashMap<PathBuf, Result<Vec<TaskRecord>, IndexError>>;

/// Dispatches parsing to a bounded pool of blocking workers
pub struct WorkerOrchestrator {
    parser: Parser,
    enabled: Arc<AtomicBool>,
    parallel_threshold: usize,
    max_workers: usize,
}

impl WorkerOrchestrator {
    pub fn new(parser: Parser, config: &WorkerConfig) -> Self {
        Self {
            parser,
            enabled: Arc::new(AtomicBool::new(config.enabled)),
            parallel_threshold: config.parallel_threshold,
            max_workers: config.max_workers,
        }
    }

    /// Toggle worker processing at runtime; in-flight work is unaffected
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Swap the parser after a settings change
    pub fn set_parser(&mut self, parser: Parser) {
        self.parser = parser;
    }

    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    /// Parse a single document in the calling context
    pub async fn parse_one(&self, job: ParseJob, priority: Priority) -> Result<Vec<TaskRecord>, IndexError> {
        debug!(path = %job.path.display(), %priority, "parse_one");
        self.parser.parse(&job.content, &job.path, &job.header)
    }

    /// Parse a batch of documents
    ///
    /// Dispatches to workers when the batch reaches the parallel threshold
    /// and worker processing is enabled; a worker failure degrades that
    /// worker's share to sequential parsing instead of failing the batch.
    pub async fn parse_many(&self, jobs: Vec<ParseJob>, priority: Priority) -> ParseResults {
        let parallel = self.is_enabled() && jobs.len() >= self.parallel_threshold;
        debug!(batch = jobs.len(), %priority, parallel, "parse_many");

        if !parallel {
            return jobs
                .into_iter()
                .map(|job| {
                    let result = self.parser.parse(&job.content, &job.path, &job.header);
                    (job.path, result)
                })
                .collect();
        }

        let chunk_size = jobs.len().div_ceil(self.max_workers);
        let chunks: Vec<Vec<ParseJob>> = jobs.chunks(chunk_size).map(|c| c.to_vec()).collect();

        let handles = chunks.into_iter().map(|chunk| {
            let parser = self.parser.clone();
            let retry = chunk.clone();
            let handle = tokio::task::spawn_blocking(move || parse_chunk(&parser, chunk));
            let fallback_parser = self.parser.clone();
            async move {
                match handle.await {
                    Ok(results) => results,
                    Err(e) => {
                        warn!(error = %e, jobs = retry.len(), "Parse worker failed, falling back to sequential");
                        parse_chunk(&fallback_parser, retry)
                    }
                }
            }
        });

        let mut results = ParseResults::new();
        for chunk_results in join_all(handles).await {
            for (path, result) in chunk_results {
                results.insert(path, result);
            }
        }
        results
    }
}

fn parse_chunk(parser: &Parser, jobs: Vec<ParseJob>) -> Vec<(PathBuf, Result<Vec<TaskRecord>, IndexError>)> {
    jobs.into_iter()
        .map(|job| {
            let result = parser.parse(&job.content, &job.path, &job.header);
            (job.path, result)
        })
        .collect()
}
