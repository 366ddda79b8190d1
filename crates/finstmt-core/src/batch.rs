//! Multi-document batch orchestration.
//!
//! Every document is read and parsed on a blocking worker. A semaphore
//! bounds the documents in flight; a single permit gives sequential,
//! in-order processing. Failures stay in their document's slot.

use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::document::DocumentSource;
use crate::error::{ErrorKind, Result};
use crate::models::config::BatchConfig;
use crate::models::statement::StatementResult;
use crate::pipeline::StatementExtractor;

/// How a batch is run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Process documents concurrently.
    pub parallel: bool,
    /// Documents in flight when `parallel` is set.
    pub max_workers: usize,
    /// Total time budget; outstanding documents time out at the deadline.
    pub timeout: Option<Duration>,
}

impl BatchOptions {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            parallel: config.parallel,
            max_workers: config.max_workers.max(1),
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    /// One document at a time, in input order.
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn workers(&self) -> usize {
        if self.parallel {
            self.max_workers.max(1)
        } else {
            1
        }
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from_config(&BatchConfig::default())
    }
}

/// Why a document has no result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentFailure {
    pub kind: ErrorKind,
    pub message: String,
}

/// Outcome for a single document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentOutcome {
    Success(StatementResult),
    Failure(DocumentFailure),
}

impl DocumentOutcome {
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        DocumentOutcome::Failure(DocumentFailure {
            kind,
            message: message.into(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DocumentOutcome::Success(_))
    }

    pub fn statement(&self) -> Option<&StatementResult> {
        match self {
            DocumentOutcome::Success(statement) => Some(statement),
            DocumentOutcome::Failure(_) => None,
        }
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            DocumentOutcome::Success(_) => None,
            DocumentOutcome::Failure(failure) => Some(failure.kind),
        }
    }
}

/// One outcome per distinct document identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BatchOutcome {
    pub outcomes: BTreeMap<String, DocumentOutcome>,
}

impl BatchOutcome {
    pub fn get(&self, id: &str) -> Option<&DocumentOutcome> {
        self.outcomes.get(id)
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DocumentOutcome)> {
        self.outcomes.iter()
    }
}

/// Runs the pipeline over many documents.
#[derive(Clone)]
pub struct BatchOrchestrator {
    extractor: Arc<dyn StatementExtractor>,
    source: Arc<dyn DocumentSource>,
}

impl BatchOrchestrator {
    pub fn new(extractor: Arc<dyn StatementExtractor>, source: Arc<dyn DocumentSource>) -> Self {
        Self { extractor, source }
    }

    /// Process `ids` and collect one outcome per distinct identifier.
    pub async fn run(&self, ids: &[String], options: &BatchOptions) -> BatchOutcome {
        let mut seen = HashSet::new();
        let ids: Vec<String> = ids
            .iter()
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect();
        let workers = options.workers();
        info!(
            "Processing batch of {} documents with {} worker(s)",
            ids.len(),
            workers
        );

        let mut outcomes = BTreeMap::new();
        let work = self.drive(&ids, Arc::new(Semaphore::new(workers)), &mut outcomes);
        let timed_out = match options.timeout {
            Some(limit) => {
                let deadline = tokio::time::Instant::now() + limit;
                tokio::time::timeout_at(deadline, work).await.is_err()
            }
            None => {
                work.await;
                false
            }
        };

        for id in &ids {
            if outcomes.contains_key(id) {
                continue;
            }
            let outcome = if timed_out {
                warn!("{} timed out", id);
                DocumentOutcome::failure(
                    ErrorKind::TimeoutExceeded,
                    "batch deadline passed before the document finished",
                )
            } else {
                DocumentOutcome::failure(ErrorKind::WorkerFailed, "worker did not report a result")
            };
            outcomes.insert(id.clone(), outcome);
        }

        let outcome = BatchOutcome { outcomes };
        info!(
            "Batch finished: {} succeeded, {} failed",
            outcome.succeeded(),
            outcome.failed()
        );
        outcome
    }

    /// Submit documents in order as permits free up, recording outcomes as
    /// workers finish.
    async fn drive(
        &self,
        ids: &[String],
        semaphore: Arc<Semaphore>,
        outcomes: &mut BTreeMap<String, DocumentOutcome>,
    ) {
        let mut tasks: JoinSet<(String, DocumentOutcome)> = JoinSet::new();

        for id in ids {
            let permit = loop {
                tokio::select! {
                    permit = semaphore.clone().acquire_owned() => break permit,
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => record(outcomes, joined),
                }
            };
            let Ok(permit) = permit else {
                break;
            };

            let extractor = Arc::clone(&self.extractor);
            let source = Arc::clone(&self.source);
            let id = id.clone();
            debug!("Submitting {}", id);
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let outcome = process(extractor.as_ref(), source.as_ref(), &id);
                (id, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            record(outcomes, joined);
        }
    }
}

fn record(
    outcomes: &mut BTreeMap<String, DocumentOutcome>,
    joined: std::result::Result<(String, DocumentOutcome), JoinError>,
) {
    match joined {
        Ok((id, outcome)) => {
            debug!("{} finished (success: {})", id, outcome.is_success());
            outcomes.insert(id, outcome);
        }
        Err(e) => warn!("Batch worker did not complete: {}", e),
    }
}

/// Read and parse one document, turning panics into failures.
fn process(
    extractor: &dyn StatementExtractor,
    source: &dyn DocumentSource,
    id: &str,
) -> DocumentOutcome {
    let result = std::panic::catch_unwind(AssertUnwindSafe(|| -> Result<StatementResult> {
        let text = source.read_text(id)?;
        extractor.extract(&text)
    }));

    match result {
        Ok(Ok(statement)) => DocumentOutcome::Success(statement),
        Ok(Err(e)) => {
            warn!("Failed to process {}: {}", id, e);
            DocumentOutcome::failure(e.kind(), e.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!("Worker for {} panicked: {}", id, message);
            DocumentOutcome::failure(ErrorKind::WorkerFailed, message)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
