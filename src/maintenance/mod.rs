//! Periodic maintenance jobs.
//!
//! The [`Scheduler`] owns one descriptor per job. `start` spawns a ticker
//! task for every enabled job; each task wakes on a fixed interval, skips
//! missed ticks, and stops when the scheduler's cancellation token fires.
//! Jobs can also be run on demand with [`Scheduler::trigger`]. Runs of one
//! job never overlap, and a failing or panicking job is logged and recorded
//! without affecting the others.

mod jobs;

pub use jobs::{
    LogRetentionJob, OrphanSweepJob, StorageCompactionJob, LOG_RETENTION, ORPHAN_SWEEP,
    STORAGE_COMPACTION,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use imgrelay_core::config::MaintenanceConfig;
use imgrelay_core::{Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::images::LocalCache;
use crate::store::MetadataStore;

/// A unit of periodic, idempotent housekeeping.
#[async_trait]
pub trait MaintenanceJob: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self) -> Result<JobOutcome>;
}

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobOutcome {
    /// Rows or files affected.
    pub affected: u64,
    pub detail: String,
}

impl JobOutcome {
    pub fn new(affected: u64, detail: impl Into<String>) -> Self {
        Self {
            affected,
            detail: detail.into(),
        }
    }
}

/// Result of the most recent run of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RunResult {
    Succeeded(JobOutcome),
    Failed { error: String },
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        matches!(self, RunResult::Succeeded(_))
    }
}

/// Snapshot of one job for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub name: &'static str,
    pub interval_secs: u64,
    pub enabled: bool,
    pub running: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub last_outcome: Option<RunResult>,
}

struct TaskDescriptor {
    name: &'static str,
    interval: Duration,
    job: Arc<dyn MaintenanceJob>,
    enabled: bool,
    run_lock: tokio::sync::Mutex<()>,
    last: Mutex<(Option<DateTime<Utc>>, Option<RunResult>)>,
}

impl TaskDescriptor {
    async fn execute(&self) -> RunResult {
        let started = Utc::now();
        tracing::info!(job = self.name, "maintenance job started");

        // Run on its own task so a panic is contained to this run.
        let job = self.job.clone();
        let result = match tokio::spawn(async move { job.run().await }).await {
            Ok(Ok(outcome)) => {
                tracing::info!(
                    job = self.name,
                    affected = outcome.affected,
                    detail = %outcome.detail,
                    "maintenance job finished"
                );
                RunResult::Succeeded(outcome)
            }
            Ok(Err(e)) => {
                tracing::error!(job = self.name, error = %e, "maintenance job failed");
                RunResult::Failed {
                    error: e.to_string(),
                }
            }
            Err(e) => {
                tracing::error!(job = self.name, error = %e, "maintenance job panicked");
                RunResult::Failed {
                    error: format!("job panicked: {e}"),
                }
            }
        };

        *self.last.lock() = (Some(started), Some(result.clone()));
        result
    }

    /// Run now, waiting for an in-progress run to finish first.
    async fn run_exclusive(&self) -> RunResult {
        let _running = self.run_lock.lock().await;
        self.execute().await
    }

    /// Scheduled run; skipped if the job is already running.
    async fn run_if_idle(&self) {
        match self.run_lock.try_lock() {
            Ok(_running) => {
                self.execute().await;
            }
            Err(_) => tracing::debug!(job = self.name, "previous run still active, skipping tick"),
        }
    }
}

/// Owns the maintenance jobs and their ticker tasks.
pub struct Scheduler {
    tasks: Vec<Arc<TaskDescriptor>>,
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            cancel: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
        }
    }

    /// Scheduler with the log retention, orphan sweep and compaction jobs.
    pub fn with_default_jobs(
        config: &MaintenanceConfig,
        store: MetadataStore,
        cache: LocalCache,
    ) -> Self {
        let mut scheduler = Self::new();
        scheduler.register(
            Arc::new(LogRetentionJob::new(store.clone(), config.log_retention_days)),
            Duration::from_secs(config.log_retention_interval_secs),
            config.enabled,
        );
        scheduler.register(
            Arc::new(OrphanSweepJob::new(
                store.clone(),
                cache,
                Duration::from_secs(config.orphan_grace_secs),
            )),
            Duration::from_secs(config.orphan_sweep_interval_secs),
            config.enabled,
        );
        scheduler.register(
            Arc::new(StorageCompactionJob::new(store)),
            Duration::from_secs(config.compaction_interval_secs),
            config.enabled,
        );
        scheduler
    }

    /// Add a job. A zero interval keeps it manual-only.
    pub fn register(&mut self, job: Arc<dyn MaintenanceJob>, interval: Duration, enabled: bool) {
        self.tasks.push(Arc::new(TaskDescriptor {
            name: job.name(),
            interval,
            job,
            enabled,
            run_lock: tokio::sync::Mutex::new(()),
            last: Mutex::new((None, None)),
        }));
    }

    pub fn job_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|t| t.name).collect()
    }

    /// Spawn a ticker for every enabled job. Calling it twice is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut handles = self.handles.lock();
        for task in &self.tasks {
            if !task.enabled || task.interval.is_zero() {
                tracing::debug!(job = task.name, "job not scheduled");
                continue;
            }

            tracing::info!(job = task.name, interval_secs = task.interval.as_secs(), "job scheduled");
            let task = task.clone();
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval_at(Instant::now() + task.interval, task.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = ticker.tick() => task.run_if_idle().await,
                    }
                }
                tracing::debug!(job = task.name, "ticker stopped");
            }));
        }
    }

    /// Run a job immediately and return how it went.
    pub async fn trigger(&self, name: &str) -> Result<RunResult> {
        let task = self
            .tasks
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| Error::not_found("job", name))?;
        Ok(task.run_exclusive().await)
    }

    pub fn status(&self) -> Vec<JobStatus> {
        self.tasks
            .iter()
            .map(|t| {
                let (last_run, last_outcome) = t.last.lock().clone();
                JobStatus {
                    name: t.name,
                    interval_secs: t.interval.as_secs(),
                    enabled: t.enabled,
                    running: t.run_lock.try_lock().is_err(),
                    last_run,
                    last_outcome,
                }
            })
            .collect()
    }

    /// Stop all tickers and wait for in-flight runs to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "maintenance task ended abnormally");
            }
        }
        tracing::info!("maintenance scheduler stopped");
    }
}
