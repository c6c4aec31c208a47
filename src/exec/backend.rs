// src/exec/backend.rs

//! Pluggable batch backend abstraction.
//!
//! The scheduler hands whole pipelines to a `BatchBackend` instead of
//! running them inline. Submission returns a handle; waiting on the handle
//! yields the run's terminal outcome.
//!
//! - [`LocalBackend`] is the default implementation. It runs each pipeline
//!   as a tokio task on this host and can bound its wall-clock time.
//! - Tests can provide their own `BatchBackend`, for example one that
//!   records submissions or runs jobs inline.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::errors::{Result, SequencerError};
use crate::pipeline::controller::PipelineController;
use crate::pipeline::outcome::{Abort, RunOutcome};
use crate::types::RunId;

/// Future that drives one run's pipeline to its terminal outcome.
pub type PipelineFuture = Pin<Box<dyn Future<Output = RunOutcome> + Send + 'static>>;

/// A unit of work submitted to a backend: one run's whole pipeline.
pub struct PipelineJob {
    pub run_id: RunId,
    future: PipelineFuture,
}

impl PipelineJob {
    pub fn new(run_id: RunId, future: PipelineFuture) -> Self {
        Self { run_id, future }
    }

    pub fn from_controller(controller: PipelineController) -> Self {
        let run_id = controller.context().run().id;
        Self::new(run_id, Box::pin(controller.run()))
    }

    /// Give up the job and return the future that runs it.
    pub fn into_future(self) -> PipelineFuture {
        self.future
    }
}

impl fmt::Debug for PipelineJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineJob")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

/// Opaque reference to a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobHandle {
    pub id: u64,
    pub run_id: RunId,
}

/// Trait abstracting where pipelines are executed.
///
/// Production code uses [`LocalBackend`]; tests can provide their own
/// implementation.
pub trait BatchBackend: Send + Sync {
    /// Start `job` and return a handle to it.
    fn submit(
        &self,
        job: PipelineJob,
    ) -> Pin<Box<dyn Future<Output = Result<JobHandle>> + Send + '_>>;

    /// Wait for the job behind `handle` to reach a terminal state.
    fn wait(
        &self,
        handle: JobHandle,
    ) -> Pin<Box<dyn Future<Output = Result<RunOutcome>> + Send + '_>>;
}

/// Runs pipelines as tokio tasks on the local host.
#[derive(Debug, Default)]
pub struct LocalBackend {
    timeout: Option<Duration>,
    next_id: AtomicU64,
    jobs: Mutex<HashMap<u64, JoinHandle<RunOutcome>>>,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound each job's wall-clock time. A job that runs out of time is
    /// cancelled: its running program is killed and the run is aborted
    /// without a history record for the interrupted step.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn take_job(&self, id: u64) -> Option<JoinHandle<RunOutcome>> {
        let mut jobs = match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        jobs.remove(&id)
    }
}

impl BatchBackend for LocalBackend {
    fn submit(
        &self,
        job: PipelineJob,
    ) -> Pin<Box<dyn Future<Output = Result<JobHandle>> + Send + '_>> {
        Box::pin(async move {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let run_id = job.run_id;
            let timeout = self.timeout;
            let future = job.into_future();

            let task = tokio::spawn(async move {
                match timeout {
                    Some(limit) => match tokio::time::timeout(limit, future).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            warn!(run = run_id, ?limit, "job timed out; cancelled");
                            RunOutcome::aborted(
                                run_id,
                                Abort::cancelled(format!("cancelled after {limit:?}")),
                            )
                        }
                    },
                    None => future.await,
                }
            });

            let mut jobs = match self.jobs.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            jobs.insert(id, task);
            debug!(job = id, run = run_id, "submitted pipeline job");

            Ok(JobHandle { id, run_id })
        })
    }

    fn wait(
        &self,
        handle: JobHandle,
    ) -> Pin<Box<dyn Future<Output = Result<RunOutcome>> + Send + '_>> {
        Box::pin(async move {
            let task = self.take_job(handle.id).ok_or_else(|| {
                SequencerError::Other(anyhow::anyhow!(
                    "unknown job {} for run {}",
                    handle.id,
                    handle.run_id
                ))
            })?;

            match task.await {
                Ok(outcome) => Ok(outcome),
                Err(join_err) => {
                    error!(run = handle.run_id, error = %join_err, "pipeline job did not finish");
                    Ok(RunOutcome::aborted(
                        handle.run_id,
                        Abort::cancelled(format!("job failed: {join_err}")),
                    ))
                }
            }
        })
    }
}
