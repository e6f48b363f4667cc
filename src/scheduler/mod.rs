pub mod stats;

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::emitter::Emitter;
use crate::http_probe::prelude::*;
use stats::PollStats;

/// How a configured poll count ends the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Termination {
    /// Stop once `max_count` polls have completed.
    #[default]
    Ticks,
    /// Stop once `(max_count - 1) * interval` has elapsed since start. A tick
    /// that falls due at the same instant as the budget is dropped, so slow or
    /// perfectly aligned runs can end one poll short.
    Deadline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub interval: Duration,
    /// `None` polls until the process is killed.
    pub max_count: Option<u64>,
    pub termination: Termination,
}

impl ScheduleConfig {
    /// Elapsed-time budget of a counted run. The initial poll is free, hence `n - 1`.
    pub fn budget(&self) -> Option<Duration> {
        self.max_count.map(|n| {
            let ticks = u32::try_from(n.saturating_sub(1)).unwrap_or(u32::MAX);
            self.interval.saturating_mul(ticks)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum SchedulerState {
    Idle = 0,
    Polling = 1,
    Draining = 2,
    Stopped = 3,
}

impl SchedulerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SchedulerState::Idle,
            1 => SchedulerState::Polling,
            2 => SchedulerState::Draining,
            _ => SchedulerState::Stopped,
        }
    }
}

/// Something the scheduler can poll once per tick.
#[allow(async_fn_in_trait)]
pub trait PollTarget {
    async fn poll_once(&mut self) -> PollOutcome;
}

/// Polls one url with a client owned for the whole run.
pub struct TargetProbe {
    client: TraceClient,
    url: String,
}

impl TargetProbe {
    pub fn new(client: TraceClient, url: impl Into<String>) -> Self {
        TargetProbe {
            client,
            url: url.into(),
        }
    }
}

impl PollTarget for TargetProbe {
    async fn poll_once(&mut self) -> PollOutcome {
        self.client.capture(&self.url).await.into()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub polls: u64,
    pub failures: u64,
}

enum Trigger {
    Initial,
    BudgetElapsed,
    Tick,
}

/// Drives polls of one target: one immediately, then one per interval.
///
/// Polls never overlap. A poll that outlasts the interval delays the next tick
/// instead of queueing a burst of them.
pub struct Scheduler<P, W> {
    config: ScheduleConfig,
    target: P,
    emitter: Emitter<W>,
    state: SchedulerState,
    stats: Arc<PollStats>,
}

impl<P: PollTarget, W: Write> Scheduler<P, W> {
    pub fn new(config: ScheduleConfig, target: P, emitter: Emitter<W>) -> Self {
        Scheduler {
            config,
            target,
            emitter,
            state: SchedulerState::Idle,
            stats: Arc::new(PollStats::default()),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn stats(&self) -> Arc<PollStats> {
        Arc::clone(&self.stats)
    }

    pub fn emitter(&self) -> &Emitter<W> {
        &self.emitter
    }

    fn transition(&mut self, next: SchedulerState) {
        log::debug!("scheduler {:?} -> {:?}", self.state, next);
        self.state = next;
        self.stats.set_state(next);
    }

    /// Polls until the count is exhausted; never returns for unbounded runs.
    pub async fn run(&mut self) -> RunSummary {
        // tokio refuses a zero period.
        let interval = self.config.interval.max(Duration::from_millis(1));
        let start = Instant::now();

        let mut ticker = time::interval_at(start + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let deadline = match self.config.termination {
            Termination::Deadline => self.config.budget().map(|budget| start + budget),
            Termination::Ticks => None,
        };
        let budget_elapsed = time::sleep_until(deadline.unwrap_or(start));
        tokio::pin!(budget_elapsed);

        let mut initial_pending = true;
        let mut summary = RunSummary::default();
        self.transition(SchedulerState::Polling);

        loop {
            // The initial poll always wins; the budget then pre-empts any tick
            // that is ready at the same instant.
            let trigger = tokio::select! {
                biased;
                _ = std::future::ready(()), if initial_pending => Trigger::Initial,
                _ = &mut budget_elapsed, if deadline.is_some() => Trigger::BudgetElapsed,
                _ = ticker.tick() => Trigger::Tick,
            };

            match trigger {
                Trigger::Initial => initial_pending = false,
                Trigger::BudgetElapsed => {
                    log::debug!("poll budget of {:?} elapsed", self.config.budget());
                    break;
                }
                Trigger::Tick => {}
            }

            self.poll(&mut summary).await;

            if self.config.termination == Termination::Ticks
                && self.config.max_count.is_some_and(|max| summary.polls >= max)
            {
                break;
            }
        }

        self.transition(SchedulerState::Draining);
        drop(ticker);
        self.transition(SchedulerState::Stopped);
        log::info!(
            "stopped after {} polls ({} failed)",
            summary.polls,
            summary.failures
        );
        summary
    }

    async fn poll(&mut self, summary: &mut RunSummary) {
        let outcome = self.target.poll_once().await;
        let failed = outcome.is_failure();

        summary.polls += 1;
        if failed {
            summary.failures += 1;
        }
        self.stats.record_poll(failed);

        if !self.emitter.emit(&outcome) {
            self.stats.record_emit_failure();
        }
    }
}
