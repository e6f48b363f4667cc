use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::SchedulerState;

/// Live counters of a running scheduler, readable from other tasks.
#[derive(Debug)]
pub struct PollStats {
    state: AtomicU8,
    polls: AtomicU64,
    failures: AtomicU64,
    emit_failures: AtomicU64,
    started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub state: SchedulerState,
    pub polls: u64,
    pub failures: u64,
    pub emit_failures: u64,
    pub started_at: DateTime<Utc>,
}

impl Default for PollStats {
    fn default() -> Self {
        PollStats {
            state: AtomicU8::new(SchedulerState::Idle as u8),
            polls: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            emit_failures: AtomicU64::new(0),
            started_at: Utc::now(),
        }
    }
}

impl PollStats {
    pub(super) fn set_state(&self, state: SchedulerState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    pub(super) fn record_poll(&self, failed: bool) {
        self.polls.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(super) fn record_emit_failure(&self) {
        self.emit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            state: SchedulerState::from_u8(self.state.load(Ordering::Relaxed)),
            polls: self.polls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            emit_failures: self.emit_failures.load(Ordering::Relaxed),
            started_at: self.started_at,
        }
    }
}
