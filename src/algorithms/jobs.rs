//! Job lifecycle: one optimizer run wrapped as a cancellable, progress-reporting
//! asynchronous task.
//!
//! `Pending -> InProgress -> {Completed | Failed | Cancelled}`. Terminal states
//! never change again.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use hashbrown::HashMap;
use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use super::config::{ConfigRequest, SchedulerConfig};
use super::input::InputModel;
use super::models::{InputSnapshot, ProgressSnapshot, ScheduleResult};
use super::optimizer::{GeneticOptimizer, ProgressReporter, RunOutcome};
use crate::error::{Result, SchedulerError};

pub type JobId = Uuid;
/// Identifies the timetable whose entities a job schedules.
pub type ScopeId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Answer to a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelAck {
    Requested,
    AlreadyFinished,
}

/// Point-in-time copy of a job.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: JobId,
    pub scope_id: ScopeId,
    pub status: JobStatus,
    /// 0 to 100
    pub progress: f32,
    pub error: Option<String>,
    pub result: Option<ScheduleResult>,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub finished_at: Option<SystemTime>,
}

// ============================================================================
// INPUT BOUNDARY
// ============================================================================

/// Source of the entity snapshot for a scope. Called once per job, before
/// the optimization loop starts.
pub trait SnapshotProvider: Send + Sync {
    fn load_snapshot(&self, scope_id: ScopeId) -> Result<InputSnapshot>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshots {
    snapshots: HashMap<ScopeId, InputSnapshot>,
}

impl InMemorySnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scope_id: ScopeId, snapshot: InputSnapshot) {
        self.snapshots.insert(scope_id, snapshot);
    }

    pub fn with(mut self, scope_id: ScopeId, snapshot: InputSnapshot) -> Self {
        self.insert(scope_id, snapshot);
        self
    }
}

impl SnapshotProvider for InMemorySnapshots {
    fn load_snapshot(&self, scope_id: ScopeId) -> Result<InputSnapshot> {
        self.snapshots
            .get(&scope_id)
            .cloned()
            .ok_or_else(|| SchedulerError::InvalidInput(format!("no snapshot for scope {}", scope_id)))
    }
}

// ============================================================================
// JOB MANAGER
// ============================================================================

struct JobEntry {
    view: JobView,
    cancel: Arc<AtomicBool>,
    status_tx: watch::Sender<JobStatus>,
}

/// Registry and supervisor of optimizer jobs. Cheap to clone; clones share
/// the same registry.
#[derive(Clone)]
pub struct JobManager {
    jobs: Arc<RwLock<HashMap<JobId, JobEntry>>>,
    snapshots: Arc<dyn SnapshotProvider>,
}

impl JobManager {
    pub fn new(snapshots: Arc<dyn SnapshotProvider>) -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
            snapshots,
        }
    }

    /// Resolve the configuration and queue a run. Configuration errors are
    /// returned here; input errors fail the job later.
    pub async fn start(&self, scope_id: ScopeId, request: ConfigRequest) -> Result<JobId> {
        let config = SchedulerConfig::resolve(&request)?;
        let id = Uuid::new_v4();
        let cancel = Arc::new(AtomicBool::new(false));
        let (status_tx, _) = watch::channel(JobStatus::Pending);

        self.jobs.write().await.insert(
            id,
            JobEntry {
                view: JobView {
                    id,
                    scope_id,
                    status: JobStatus::Pending,
                    progress: 0.0,
                    error: None,
                    result: None,
                    created_at: SystemTime::now(),
                    started_at: None,
                    finished_at: None,
                },
                cancel: Arc::clone(&cancel),
                status_tx,
            },
        );

        info!(job = %id, scope = scope_id, "job queued");
        tokio::spawn(self.clone().supervise(id, scope_id, config, cancel));
        Ok(id)
    }

    pub async fn status(&self, id: JobId) -> Result<JobView> {
        self.jobs
            .read()
            .await
            .get(&id)
            .map(|entry| entry.view.clone())
            .ok_or(SchedulerError::JobNotFound(id))
    }

    /// Raise the job's cancellation flag. A job that has not started yet is
    /// cancelled immediately.
    pub async fn cancel(&self, id: JobId) -> Result<CancelAck> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&id).ok_or(SchedulerError::JobNotFound(id))?;
        if entry.view.status.is_terminal() {
            return Ok(CancelAck::AlreadyFinished);
        }
        entry.cancel.store(true, Ordering::Relaxed);
        if entry.view.status == JobStatus::Pending {
            set_terminal(entry, JobStatus::Cancelled, None, None);
        }
        info!(job = %id, "cancellation requested");
        Ok(CancelAck::Requested)
    }

    /// Wait until the job reaches a terminal state.
    pub async fn wait(&self, id: JobId) -> Result<JobView> {
        let mut rx = self
            .jobs
            .read()
            .await
            .get(&id)
            .map(|entry| entry.status_tx.subscribe())
            .ok_or(SchedulerError::JobNotFound(id))?;
        rx.wait_for(|status| status.is_terminal())
            .await
            .map_err(|e| SchedulerError::Internal(format!("status channel closed: {}", e)))?;
        self.status(id).await
    }

    /// Remove a finished job from the registry and return its final view.
    /// Jobs that are still pending or running are kept and `None` is returned.
    pub async fn forget(&self, id: JobId) -> Result<Option<JobView>> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get(&id).ok_or(SchedulerError::JobNotFound(id))?;
        if !entry.view.status.is_terminal() {
            return Ok(None);
        }
        Ok(jobs.remove(&id).map(|entry| entry.view))
    }

    /// Remove every job that finished more than `retention` ago. Returns the
    /// number of jobs removed.
    pub async fn purge_finished(&self, retention: Duration) -> usize {
        let Some(cutoff) = SystemTime::now().checked_sub(retention) else {
            return 0;
        };
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, entry| !matches!(entry.view.finished_at, Some(at) if at <= cutoff));
        let removed = before - jobs.len();
        if removed > 0 {
            info!(removed, "purged finished jobs");
        }
        removed
    }

    async fn supervise(self, id: JobId, scope_id: ScopeId, config: SchedulerConfig, cancel: Arc<AtomicBool>) {
        if !self.mark_started(id).await {
            return;
        }

        let (progress_tx, mut progress_rx) = watch::channel(ProgressSnapshot {
            generation: 0,
            best_fitness: 0.0,
            progress: 0.0,
            stagnation: 0,
            mutation_probability: None,
            diversity: None,
        });

        let forwarder = {
            let jobs = Arc::clone(&self.jobs);
            tokio::spawn(async move {
                while progress_rx.changed().await.is_ok() {
                    let progress = progress_rx.borrow_and_update().progress;
                    if let Some(entry) = jobs.write().await.get_mut(&id) {
                        if entry.view.status == JobStatus::InProgress {
                            entry.view.progress = progress;
                        }
                    }
                }
            })
        };

        let snapshots = Arc::clone(&self.snapshots);
        let run = tokio::task::spawn_blocking(move || -> Result<RunOutcome> {
            let snapshot = snapshots.load_snapshot(scope_id)?;
            let model = Arc::new(InputModel::build(snapshot)?);
            let interval = Duration::from_millis(config.progress_interval_ms);
            let optimizer = GeneticOptimizer::new(model, config);
            let mut reporter = ProgressReporter::new(progress_tx, interval);
            optimizer.optimize(&cancel, &mut reporter)
        })
        .await;
        // The reporter is gone, so the forwarder drains and exits
        if let Err(e) = forwarder.await {
            warn!(job = %id, error = %e, "progress forwarder failed");
        }

        let (status, result, error) = match run {
            Ok(Ok(RunOutcome::Completed(result))) => (JobStatus::Completed, Some(result), None),
            Ok(Ok(RunOutcome::Cancelled { .. })) => (JobStatus::Cancelled, None, None),
            Ok(Err(e)) => (JobStatus::Failed, None, Some(e.to_string())),
            Err(e) if e.is_panic() => (
                JobStatus::Failed,
                None,
                Some(SchedulerError::Internal(panic_message(e.into_panic())).to_string()),
            ),
            Err(e) => (
                JobStatus::Failed,
                None,
                Some(SchedulerError::Internal(e.to_string()).to_string()),
            ),
        };

        match &error {
            Some(message) => warn!(job = %id, error = %message, "job failed"),
            None => info!(job = %id, status = ?status, "job finished"),
        }

        if let Some(entry) = self.jobs.write().await.get_mut(&id) {
            set_terminal(entry, status, result, error);
        }
    }

    /// Pending -> InProgress. False when the job was cancelled before a
    /// worker picked it up.
    async fn mark_started(&self, id: JobId) -> bool {
        let mut jobs = self.jobs.write().await;
        let Some(entry) = jobs.get_mut(&id) else {
            return false;
        };
        if entry.view.status != JobStatus::Pending {
            return false;
        }
        entry.view.status = JobStatus::InProgress;
        entry.view.started_at = Some(SystemTime::now());
        entry.status_tx.send_replace(JobStatus::InProgress);
        info!(job = %id, "job started");
        true
    }
}

fn set_terminal(
    entry: &mut JobEntry,
    status: JobStatus,
    result: Option<ScheduleResult>,
    error: Option<String>,
) {
    if entry.view.status.is_terminal() {
        return;
    }
    if status == JobStatus::Completed {
        entry.view.progress = 100.0;
    }
    entry.view.status = status;
    entry.view.result = result;
    entry.view.error = error;
    entry.view.finished_at = Some(SystemTime::now());
    entry.status_tx.send_replace(status);
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "optimizer panicked".to_string()
    }
}
