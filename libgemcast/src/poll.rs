//! Poll loop
//!
//! Wakes on a fixed cadence, evaluates every job against one `now` captured
//! at cycle start and executes the due ones sequentially: look up the Gem,
//! generate, dispatch, then record `lastRun`.
//!
//! At most one cycle is in flight. A tick that arrives while a cycle is
//! still running is skipped, not queued.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::GenerationError;
use crate::generation::GenerationPipeline;
use crate::poster::{any_success, Dispatcher, PublicationResults};
use crate::scheduling::is_due;
use crate::store::{GemStore, JobStore};
use crate::types::{JobUpdate, ScheduledJob};
use crate::Result;

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

/// `Idle | Running` state token for the poll loop
#[derive(Debug, Default)]
pub struct CycleGuard {
    state: AtomicU8,
}

impl CycleGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move `Idle -> Running`; `None` if a cycle already holds the guard
    pub fn try_begin(&self) -> Option<CycleToken<'_>> {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleToken { guard: self })
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }
}

/// Returns the guard to `Idle` when dropped
#[derive(Debug)]
pub struct CycleToken<'a> {
    guard: &'a CycleGuard,
}

impl Drop for CycleToken<'_> {
    fn drop(&mut self) {
        self.guard.state.store(IDLE, Ordering::Release);
    }
}

/// What happened to one due job
#[derive(Debug, Clone)]
pub enum JobOutcome {
    /// Content was generated and dispatch attempted
    Dispatched {
        results: PublicationResults,
        last_run_saved: bool,
    },
    /// The Gem could not be found or loaded
    Skipped { reason: String },
    /// A caption backend reported an exhausted quota
    RateLimited { error: String },
    GenerationFailed { error: String },
}

#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: String,
    pub gem_id: String,
    pub outcome: JobOutcome,
}

/// Summary of one poll cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub now: DateTime<Utc>,
    pub total_jobs: usize,
    pub due: usize,
    pub jobs: Vec<JobReport>,
}

impl CycleReport {
    pub fn dispatched(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| matches!(j.outcome, JobOutcome::Dispatched { .. }))
            .count()
    }
}

pub struct PollLoop {
    jobs: Arc<dyn JobStore>,
    gems: Arc<dyn GemStore>,
    pipeline: Arc<GenerationPipeline>,
    dispatcher: Arc<Dispatcher>,
    platforms: Vec<String>,
    want_image: bool,
    guard: CycleGuard,
}

impl PollLoop {
    /// Jobs are published to `platforms` (empty means the dispatcher default)
    pub fn new(
        jobs: Arc<dyn JobStore>,
        gems: Arc<dyn GemStore>,
        pipeline: Arc<GenerationPipeline>,
        dispatcher: Arc<Dispatcher>,
        platforms: Vec<String>,
    ) -> Self {
        Self {
            jobs,
            gems,
            pipeline,
            dispatcher,
            platforms,
            want_image: true,
            guard: CycleGuard::new(),
        }
    }

    pub fn with_images(mut self, want_image: bool) -> Self {
        self.want_image = want_image;
        self
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Run one cycle at the current time
    ///
    /// Returns `Ok(None)` when a cycle is already in flight.
    pub async fn tick(&self) -> Result<Option<CycleReport>> {
        self.tick_at(Utc::now()).await
    }

    /// Run one cycle at `now`, subject to the overlap guard
    pub async fn tick_at(&self, now: DateTime<Utc>) -> Result<Option<CycleReport>> {
        let Some(_token) = self.guard.try_begin() else {
            debug!("Previous cycle still running, skipping tick");
            return Ok(None);
        };

        let report = self.run_cycle(now).await?;
        log_report(&report);
        Ok(Some(report))
    }

    async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleReport> {
        let all_jobs = self.jobs.list_jobs().await?;
        let due: Vec<ScheduledJob> = all_jobs
            .iter()
            .filter(|job| is_due(job, now))
            .cloned()
            .collect();

        debug!("{} of {} jobs due at {}", due.len(), all_jobs.len(), now);

        let mut reports = Vec::with_capacity(due.len());
        for job in &due {
            let outcome = self.execute(job, now).await;
            reports.push(JobReport {
                job_id: job.id.clone(),
                gem_id: job.gem_id.clone(),
                outcome,
            });
        }

        Ok(CycleReport {
            now,
            total_jobs: all_jobs.len(),
            due: due.len(),
            jobs: reports,
        })
    }

    async fn execute(&self, job: &ScheduledJob, now: DateTime<Utc>) -> JobOutcome {
        info!("Executing scheduled job {} for Gem {}", job.id, job.gem_id);

        let gem = match self.gems.get_gem(&job.gem_id).await {
            Ok(Some(gem)) => gem,
            Ok(None) => {
                warn!("Gem {} not found for job {}, skipping", job.gem_id, job.id);
                return JobOutcome::Skipped {
                    reason: format!("Gem {} not found", job.gem_id),
                };
            }
            Err(e) => {
                error!("Failed to load Gem {} for job {}: {}", job.gem_id, job.id, e);
                return JobOutcome::Skipped {
                    reason: e.to_string(),
                };
            }
        };

        let artifact = match self.pipeline.generate_for(&gem, self.want_image).await {
            Ok(artifact) => artifact,
            Err(GenerationError::RateLimitExceeded(e)) => {
                warn!(
                    "Rate limit hit for job {} ({}); it stays due and will retry next cycle",
                    job.id, e
                );
                return JobOutcome::RateLimited { error: e };
            }
            Err(e) => {
                error!("Generation failed for job {}: {}", job.id, e);
                return JobOutcome::GenerationFailed {
                    error: e.to_string(),
                };
            }
        };

        let results = self.dispatcher.publish(&artifact, &self.platforms).await;
        if !any_success(&results) {
            warn!("Job {} produced content but no platform accepted it", job.id);
        }

        let last_run_saved = match self
            .jobs
            .update_job(&job.id, &JobUpdate::last_run(now.timestamp_millis()))
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                warn!("Job {} was removed during its run", job.id);
                false
            }
            Err(e) => {
                error!("Failed to record last run for job {}: {}", job.id, e);
                false
            }
        };

        JobOutcome::Dispatched {
            results,
            last_run_saved,
        }
    }

    /// Drive ticks until `shutdown` is set
    ///
    /// The first tick fires after `initial_delay`, then every `period`.
    /// Each tick runs as its own task and the guard turns overlapping ones
    /// into no-ops. On shutdown no new ticks are started and every spawned
    /// tick is awaited.
    pub async fn run(
        self: Arc<Self>,
        period: Duration,
        initial_delay: Duration,
        shutdown: Arc<AtomicBool>,
    ) {
        let mut ticker = interval_at(Instant::now() + initial_delay, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

        info!(
            "Poll loop started (every {}s, first check in {}s)",
            period.as_secs(),
            initial_delay.as_secs()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = wait_for_shutdown(&shutdown) => break,
            }

            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            in_flight.retain(|handle| !handle.is_finished());
            let this = Arc::clone(&self);
            in_flight.push(tokio::spawn(async move {
                if let Err(e) = this.tick().await {
                    error!("Poll cycle failed: {}", e);
                }
            }));
        }

        in_flight.retain(|handle| !handle.is_finished());
        if !in_flight.is_empty() {
            info!("Waiting for the in-flight cycle to finish...");
            for result in join_all(in_flight).await {
                if let Err(e) = result {
                    error!("Poll cycle task failed: {}", e);
                }
            }
        }

        info!("Poll loop stopped");
    }
}

async fn wait_for_shutdown(shutdown: &AtomicBool) {
    while !shutdown.load(Ordering::Relaxed) {
        sleep(Duration::from_millis(250)).await;
    }
}

fn log_report(report: &CycleReport) {
    if report.due == 0 {
        debug!("No jobs due ({} scheduled)", report.total_jobs);
        return;
    }

    for job in &report.jobs {
        match &job.outcome {
            JobOutcome::Dispatched { results, .. } => {
                for (platform, result) in results {
                    match result.post_id() {
                        Some(id) => info!("Job {}: {} -> {}", job.job_id, platform, id),
                        None => warn!("Job {}: {} failed", job.job_id, platform),
                    }
                }
            }
            JobOutcome::Skipped { reason } => warn!("Job {} skipped: {}", job.job_id, reason),
            JobOutcome::RateLimited { .. } => warn!("Job {} deferred by rate limit", job.job_id),
            JobOutcome::GenerationFailed { error } => {
                warn!("Job {} failed: {}", job.job_id, error)
            }
        }
    }

    info!(
        "Cycle complete: {} due, {} dispatched, {} scheduled",
        report.due,
        report.dispatched(),
        report.total_jobs
    );
}
