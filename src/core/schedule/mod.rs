//! Cron recurrence and the loop that fires a flow on it.

pub mod clock;
pub mod cron;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cron::CronSchedule;

use crate::core::error::FlowError;
use crate::core::flow::{resolve_parameters, FlowGraph, FlowRunner, ParameterValues, RunResult};
use chrono::Utc;
use std::sync::Arc;

/// Upper bound on missed ticks counted after one long run.
const MISSED_TICK_SCAN_LIMIT: usize = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeSummary {
    pub runs: usize,
    pub failed_runs: usize,
    pub missed_ticks: usize,
}

/// Fires a flow on every tick of a schedule, one run at a time.
pub struct Scheduler {
    schedule: CronSchedule,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(schedule: CronSchedule) -> Self {
        Self {
            schedule,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }

    /// Run until `max_runs` runs have completed (forever when `None`).
    ///
    /// Parameters are checked before the first wait so a bad invocation fails fast.
    /// Ticks that elapse while a run is in progress are skipped, not queued.
    pub async fn serve<F>(
        &self,
        graph: &FlowGraph,
        runner: &FlowRunner,
        parameters: ParameterValues,
        max_runs: Option<usize>,
        mut on_result: F,
    ) -> Result<ServeSummary, FlowError>
    where
        F: FnMut(&RunResult),
    {
        resolve_parameters(graph.parameters(), parameters.clone())?;

        let mut summary = ServeSummary::default();
        let mut after = self.clock.now();
        tracing::info!(flow = %graph.name(), schedule = %self.schedule, "scheduler started");

        while max_runs.map_or(true, |max| summary.runs < max) {
            let tick = self.schedule.next_after(&after)?;
            tracing::info!(flow = %graph.name(), next_fire = %tick, "waiting for next tick");
            self.clock.sleep_until(tick).await;

            tracing::info!(flow = %graph.name(), scheduled_time = %tick, "schedule tick fired");
            let result = runner
                .run_scheduled(graph, parameters.clone(), Some(tick.with_timezone(&Utc)))
                .await?;
            summary.runs += 1;
            if !result.is_success() {
                summary.failed_runs += 1;
            }
            on_result(&result);

            let now = self.clock.now();
            let mut missed = 0;
            let mut cursor = tick;
            while missed < MISSED_TICK_SCAN_LIMIT {
                let next = self.schedule.next_after(&cursor)?;
                if next > now {
                    break;
                }
                missed += 1;
                cursor = next;
            }
            if missed > 0 {
                tracing::warn!(
                    flow = %graph.name(),
                    missed,
                    "ticks elapsed during the run were skipped"
                );
                summary.missed_ticks += missed;
            }
            after = if now > tick { now } else { tick };
        }

        tracing::info!(
            flow = %graph.name(),
            runs = summary.runs,
            failed_runs = summary.failed_runs,
            "scheduler stopped"
        );
        Ok(summary)
    }
}
