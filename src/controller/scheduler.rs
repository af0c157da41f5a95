use chrono::{DateTime, Duration as ChronoDuration, LocalResult, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{error, info, warn};

use super::Pipeline;

/// Run bookkeeping for the daily forecast task
#[derive(Debug, Clone, Default)]
pub struct TaskStatus {
    pub last_run: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_publish_failures: usize,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
}

/// Runs the pipeline once a day at a fixed local time.
///
/// Runs are awaited inline, so a slow fetch delays the next tick instead of
/// overlapping with it.
pub struct DailyScheduler {
    pipeline: Arc<Pipeline>,
    run_at: NaiveTime,
    tz: Tz,
    run_on_startup: bool,
    status: Arc<RwLock<TaskStatus>>,
}

impl DailyScheduler {
    pub fn new(pipeline: Arc<Pipeline>, run_at: NaiveTime, tz: Tz, run_on_startup: bool) -> Self {
        Self {
            pipeline,
            run_at,
            tz,
            run_on_startup,
            status: Arc::new(RwLock::new(TaskStatus::default())),
        }
    }

    pub async fn status(&self) -> TaskStatus {
        self.status.read().await.clone()
    }

    /// Loop forever; callers stop it by dropping the future (e.g. via `select!`)
    pub async fn run(&self) {
        if self.run_on_startup {
            info!("running forecast pipeline on startup");
            self.run_and_record(Utc::now()).await;
        }

        let mut previous = None;
        loop {
            let now = Utc::now();
            let next = self.next_tick(now, previous);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(
                next_run = %next.with_timezone(&self.tz),
                wait_secs = wait.as_secs(),
                "waiting for next scheduled run"
            );
            sleep(wait).await;
            self.run_and_record(Utc::now()).await;
            previous = Some(next);
        }
    }

    /// Next trigger after `now`, never at or before the `previous` one.
    ///
    /// The sleep runs on the monotonic clock, so a wall clock stepped backwards
    /// can wake us before the target as seen by `Utc::now()`.
    pub fn next_tick(&self, now: DateTime<Utc>, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let from = previous.map_or(now, |p| now.max(p));
        next_run_after(from, self.run_at, self.tz)
    }

    /// Run the pipeline once and record the outcome
    pub async fn run_and_record(&self, now: DateTime<Utc>) {
        {
            let mut status = self.status.write().await;
            status.last_run = Some(now);
            status.run_count += 1;
        }

        match self.pipeline.run_once(now).await {
            Ok(report) => {
                let mut status = self.status.write().await;
                status.last_success = Some(now);
                status.success_count += 1;
                status.last_error = None;
                status.last_publish_failures = report.publish_failures;
                if report.publish_failures > 0 {
                    warn!(
                        publish_failures = report.publish_failures,
                        "forecast run completed with publish failures"
                    );
                } else {
                    info!("forecast run completed successfully");
                }
            }
            Err(e) => {
                let mut status = self.status.write().await;
                status.error_count += 1;
                status.last_error = Some(e.to_string());
                error!(error = %e, kind = e.kind(), "forecast run failed; waiting for next tick");
            }
        }
    }
}

/// Next instant strictly after `now` whose local time in `tz` is `at`.
///
/// A time that falls into a DST gap is shifted forward by an hour; an ambiguous
/// time (DST fold) resolves to its first occurrence.
pub fn next_run_after(now: DateTime<Utc>, at: NaiveTime, tz: Tz) -> DateTime<Utc> {
    let today = now.with_timezone(&tz).date_naive();
    (0..3)
        .filter_map(|days| resolve_local(tz, today.and_time(at) + ChronoDuration::days(days)))
        .find(|candidate| *candidate > now)
        .unwrap_or_else(|| now + ChronoDuration::days(1))
}

fn resolve_local(tz: Tz, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(t) => Some(t.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, _) => Some(first.with_timezone(&Utc)),
        LocalResult::None => tz
            .from_local_datetime(&(local + ChronoDuration::hours(1)))
            .earliest()
            .map(|t| t.with_timezone(&Utc)),
    }
}
