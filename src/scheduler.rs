//! Running site jobs: once, as a bounded-concurrency batch, or on a cron schedule.
//!
//! A [`Job`] is one site's work: grab its queue, then save the result. When
//! several sites are configured their jobs run through
//! `futures::StreamExt::buffer_unordered`, so at most `concurrency` jobs are
//! in flight and a new one starts as soon as a slot frees up. Each job runs
//! on its own tokio task; a job that fails or panics is logged and counted
//! and its siblings carry on.
//!
//! # Scheduled runs
//!
//! [`Scheduler::schedule`] fires a run at every instant of a cron expression.
//! If the previous run is still going when the next instant arrives, that
//! firing is skipped.

use crate::config::SiteConfig;
use crate::error::{EpgError, Result};
use crate::grab::grab;
use crate::outputs::{SaveOptions, save};
use crate::progress::ProgressObserver;
use crate::queue::Queue;
use crate::scrapers::SiteGrabber;
use crate::utils::format_elapsed;
use chrono::{DateTime, NaiveDate, Utc};
use cron::Schedule;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

/// One site's grab-then-save unit of work.
pub struct Job {
    pub site: String,
    pub config: Arc<SiteConfig>,
    pub queue: Queue,
    /// Output path template.
    pub output: String,
    /// `None` when no grabber could be resolved for the site.
    pub grabber: Option<Arc<dyn SiteGrabber>>,
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("site", &self.site)
            .field("items", &self.queue.len())
            .field("output", &self.output)
            .field("grabber", &self.grabber.is_some())
            .finish()
    }
}

/// Settings shared by every job of a run.
pub struct RunContext {
    pub reference_date: NaiveDate,
    pub gzip: bool,
    pub timeout: Duration,
    pub concurrency: usize,
    pub observer: Arc<dyn ProgressObserver>,
}

/// What a finished job produced.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub site: String,
    pub items: usize,
    pub programs: usize,
    pub files: Vec<PathBuf>,
}

/// Outcome of a batch: finished jobs and failed sites.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<JobReport>,
    pub failed: Vec<(String, EpgError)>,
}

impl Job {
    /// Grab the queue, then save the result.
    #[instrument(level = "info", skip_all, fields(site = %self.site))]
    pub async fn run(&self, ctx: &RunContext) -> Result<JobReport> {
        let grabber = self
            .grabber
            .as_deref()
            .ok_or_else(|| EpgError::UnknownSite(self.site.clone()))?;

        info!(items = self.queue.len(), days = self.config.days, "Grabbing channels...");
        let grabbed = grab(
            &self.queue,
            grabber,
            ctx.timeout,
            ctx.observer.as_ref(),
        )
        .await;

        info!("Saving to XMLTV...");
        let files = save(
            &self.output,
            &grabbed.channels,
            &grabbed.programs,
            SaveOptions {
                date: ctx.reference_date,
                gzip: ctx.gzip,
            },
            ctx.observer.as_ref(),
        )
        .await?;

        Ok(JobReport {
            site: self.site.clone(),
            items: self.queue.len(),
            programs: grabbed.programs.len(),
            files,
        })
    }
}

/// Run a single job directly; its error is returned to the caller.
pub async fn run_single(job: &Job, ctx: &RunContext) -> Result<JobReport> {
    job.run(ctx).await
}

/// Run jobs with at most `ctx.concurrency` in flight.
///
/// A job is spawned only once it holds a slot, and the slot is released when
/// its task ends. A panicking job is reported as [`EpgError::JobAborted`].
#[instrument(level = "info", skip_all, fields(jobs = jobs.len(), concurrency = ctx.concurrency))]
pub async fn run_batch(jobs: &[Arc<Job>], ctx: &Arc<RunContext>) -> BatchReport {
    let results: Vec<(String, Result<JobReport>)> = stream::iter(jobs.iter().cloned())
        .map(|job| {
            let ctx = Arc::clone(ctx);
            async move {
                let site = job.site.clone();
                let result = tokio::spawn(async move { job.run(&ctx).await })
                    .await
                    .unwrap_or_else(|e| Err(EpgError::JobAborted(e.to_string())));
                (site, result)
            }
        })
        .buffer_unordered(ctx.concurrency.max(1))
        .collect()
        .await;

    let mut report = BatchReport::default();
    for (site, result) in results {
        match result {
            Ok(job) => {
                info!(%site, items = job.items, programs = job.programs, files = job.files.len(), "Job completed");
                report.succeeded.push(job);
            }
            Err(e) => {
                error!(%site, error = %e, "Job failed");
                report.failed.push((site, e));
            }
        }
    }
    report
}

/// Run every job once: directly when there is one, as a batch otherwise.
///
/// With one job, its failure is returned. With several, failures are
/// logged and the run still succeeds.
pub async fn run_queues(jobs: &[Arc<Job>], ctx: &Arc<RunContext>) -> Result<()> {
    match jobs {
        [] => warn!("No jobs to run"),
        [job] => {
            run_single(job, ctx).await?;
        }
        jobs => {
            let report = run_batch(jobs, ctx).await;
            info!(
                succeeded = report.succeeded.len(),
                failed = report.failed.len(),
                "Batch finished"
            );
        }
    }
    Ok(())
}

/// First instant of `schedule` after both the previous firing and `now`.
///
/// Instants missed while a firing was late are skipped, not replayed.
pub fn next_instant(
    schedule: &Schedule,
    after: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    schedule.after(&after.max(now)).next()
}

/// Wall-clock time for the schedule loop. It never lags the system clock
/// and moves forward with the tokio clock, which is what paused test
/// runtimes advance.
struct ScheduleClock {
    wall: DateTime<Utc>,
    tick: tokio::time::Instant,
}

impl ScheduleClock {
    fn start() -> Self {
        Self {
            wall: Utc::now(),
            tick: tokio::time::Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.tick.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        (self.wall + elapsed).max(Utc::now())
    }
}

/// Parse a cron expression. Five-field crontab expressions get a leading
/// seconds field of `0`.
pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    let trimmed = expr.trim();
    let normalized = if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    };
    Schedule::from_str(&normalized).map_err(|e| EpgError::Schedule {
        expr: expr.to_string(),
        reason: e.to_string(),
    })
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the jobs of a process and runs them once or on a schedule.
pub struct Scheduler {
    jobs: Vec<Arc<Job>>,
    ctx: Arc<RunContext>,
    runs: AtomicUsize,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(jobs: Vec<Job>, ctx: RunContext) -> Self {
        Self {
            jobs: jobs.into_iter().map(Arc::new).collect(),
            ctx: Arc::new(ctx),
            runs: AtomicUsize::new(0),
            running: AtomicBool::new(false),
        }
    }

    /// Numbered, timed [`run_queues`] over this scheduler's jobs.
    pub async fn run_once(&self) -> Result<()> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        let t0 = Instant::now();
        info!(run, jobs = self.jobs.len(), "run #{}:", run);

        run_queues(&self.jobs, &self.ctx).await?;

        info!(run, "  done in {}", format_elapsed(t0.elapsed()));
        Ok(())
    }

    /// Number of runs started so far.
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    /// Run once unless a run is already in progress.
    ///
    /// Returns `None` when skipped.
    pub async fn try_run(&self) -> Option<Result<()>> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Previous run still in progress; skipping this one");
            return None;
        }
        let _guard = RunningGuard(&self.running);
        Some(self.run_once().await)
    }

    /// Start firing runs at every instant of `expr`.
    ///
    /// Returns once the schedule is registered; the returned task keeps
    /// running until the schedule is exhausted or the handle is aborted.
    pub fn schedule(self: Arc<Self>, expr: &str) -> Result<JoinHandle<()>> {
        let schedule = parse_schedule(expr)?;
        info!(cron = %expr, "Registered schedule");

        Ok(tokio::spawn(async move {
            let clock = ScheduleClock::start();
            let mut after = clock.now();
            loop {
                let Some(next) = next_instant(&schedule, after, clock.now()) else {
                    warn!("Schedule has no upcoming runs");
                    return;
                };
                info!(next = %next, "Next run scheduled");
                let wait = (next - clock.now()).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;
                after = next;

                let this = Arc::clone(&self);
                tokio::spawn(async move {
                    if let Some(Err(e)) = this.try_run().await {
                        error!(error = %e, "Scheduled run failed");
                    }
                });
            }
        }))
    }
}
