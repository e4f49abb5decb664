// serptrace-runner/src/scheduler.rs
// ============================================================================
// Module: Scheduler
// Description: Drives periodic pipeline runs from a cron expression.
// Purpose: Translate a configured cron schedule into repeated calls to
//          `Runner::run_once`, funneling every fire through the runner's own
//          single-flight guard.
// Dependencies: cron, chrono-tz, tokio (sync, time)
// ============================================================================

//! ## Overview
//! [`Scheduler`] wraps a [`crate::runner::Runner`] with a background task
//! that wakes up at each cron fire time and calls [`Scheduler::trigger`].
//! `cron_expression` is configured in the classic 5-field unix form
//! (minute hour day-of-month month day-of-week); a `"0 "` seconds field is
//! prepended before parsing since the [`cron`] crate expects a seconds-first
//! schedule. `start` optionally fires one immediate trigger
//! (`run_on_start`), fire-and-forget, before entering the periodic loop.
//! `stop` signals the background task to exit after its current sleep or
//! run completes; it does not interrupt a run already in progress, since
//! [`crate::runner::Runner`] has no cancellation model.

use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use chrono_tz::Tz;
use cron::Schedule;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::ConfigError;
use crate::runner::Runner;

/// Periodic driver for a [`Runner`].
pub struct Scheduler {
    runner: Arc<Runner>,
    schedule: Schedule,
    timezone: Tz,
    run_on_start: bool,
    stop_notify: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Builds a scheduler from a cron expression (5-field unix form) and an
    /// IANA timezone name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the cron expression or
    /// timezone name cannot be parsed.
    pub fn new(runner: Arc<Runner>, cron_expression: &str, timezone: &str, run_on_start: bool) -> Result<Self, ConfigError> {
        let seconds_prefixed = format!("0 {cron_expression}");
        let schedule = Schedule::from_str(&seconds_prefixed)
            .map_err(|err| ConfigError::Invalid(format!("invalid cron_expression: {err}")))?;
        let tz = Tz::from_str(timezone).map_err(|err| ConfigError::Invalid(format!("invalid timezone: {err}")))?;
        Ok(Self {
            runner,
            schedule,
            timezone: tz,
            run_on_start,
            stop_notify: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        })
    }

    /// Starts the background scheduling loop. Returns immediately; the loop
    /// runs on a spawned task until [`Scheduler::stop`] is called.
    pub fn start(self: &Arc<Self>) {
        if self.run_on_start {
            let runner = Arc::clone(&self.runner);
            tokio::spawn(async move {
                tracing::info!("running pipeline immediately on scheduler start");
                if let Err(err) = runner.run_once().await {
                    tracing::error!(error = %err, "startup pipeline run failed");
                }
            });
        }

        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move { scheduler.run_loop().await });
        if let Ok(mut guard) = self.handle.lock() {
            *guard = Some(handle);
        }
    }

    /// Stops the background loop and waits for it to exit.
    pub async fn stop(&self) {
        self.stop_notify.notify_waiters();
        let handle = self.handle.lock().ok().and_then(|mut guard| guard.take());
        if let Some(handle) = handle {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "scheduler task did not shut down cleanly");
            }
        }
    }

    /// Triggers a pipeline run immediately, outside of the cron schedule.
    /// Errors are logged and swallowed; callers that need the outcome
    /// should call [`Runner::run_once`] directly instead.
    pub async fn trigger(&self) {
        if let Err(err) = self.runner.run_once().await {
            tracing::error!(error = %err, "triggered pipeline run failed");
        }
    }

    async fn run_loop(self: Arc<Self>) {
        loop {
            let Some(next_fire) = self.schedule.upcoming(self.timezone).next() else {
                tracing::error!("cron schedule produced no upcoming fire time, stopping scheduler");
                return;
            };
            let next_fire_utc = next_fire.with_timezone(&Utc);
            let wait = (next_fire_utc - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            let deadline = tokio::time::Instant::now() + wait;

            tokio::select! {
                () = tokio::time::sleep_until(deadline) => {
                    tracing::info!(fire_time = %next_fire_utc, "scheduler firing");
                    self.trigger().await;
                }
                () = self.stop_notify.notified() => {
                    tracing::info!("scheduler stopped");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serptrace_core::InMemoryStore;
    use serptrace_core::storage::Storage;

    use super::*;
    use crate::config::RunnerConfig;
    use crate::ports::NoopStagePort;

    fn test_config() -> RunnerConfig {
        RunnerConfig {
            cron_expression: "* * * * *".to_owned(),
            timezone: "UTC".to_owned(),
            run_on_start: true,
            max_retries: 0,
            retry_delay_ms: 1000,
            collector_output_dir: "data/serp".to_owned(),
            manual_audit_sample_percent: 5,
            storage: crate::config::StorageConfig::default(),
            export: crate::config::ExportConfig::default(),
            report: crate::config::ReportConfig::default(),
            collector_command: None,
            annotation_command: None,
            metrics_command: None,
        }
    }

    #[test]
    fn rejects_invalid_cron_expression() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStore::new());
        let port = Arc::new(NoopStagePort);
        let runner = Arc::new(Runner::new(storage, test_config(), port.clone(), port.clone(), port));
        let result = Scheduler::new(runner, "not a cron expression", "UTC", false);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_invalid_timezone() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStore::new());
        let port = Arc::new(NoopStagePort);
        let runner = Arc::new(Runner::new(storage, test_config(), port.clone(), port.clone(), port));
        let result = Scheduler::new(runner, "* * * * *", "Not/ARealZone", false);
        assert!(result.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn run_on_start_triggers_before_stop() {
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStore::new());
        let port = Arc::new(NoopStagePort);
        let mut config = test_config();
        config.cron_expression = "0 0 1 1 *".to_owned();
        let runner = Arc::new(Runner::new(storage.clone(), config, port.clone(), port.clone(), port));
        let scheduler = Arc::new(Scheduler::new(runner, "0 0 1 1 *", "UTC", true).expect("scheduler"));

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(50)).await;
        scheduler.stop().await;

        let runs = storage.fetch_pipeline_runs(10).await.expect("fetch runs");
        assert_eq!(runs.len(), 1);
    }
}
