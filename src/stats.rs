use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{Local, NaiveDate};
use human_repr::HumanDuration;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatsCounters {
    pub total: u64,
    pub daily: BTreeMap<NaiveDate, u64>,
}

/// Completion counters for the lifetime of the process. Created once at
/// startup and shared by reference; nothing is persisted.
pub struct StatsRecorder {
    counters: Mutex<StatsCounters>,
    started: Instant,
}

impl StatsRecorder {
    pub fn new() -> Self {
        StatsRecorder {
            counters: Mutex::new(StatsCounters::default()),
            started: Instant::now(),
        }
    }

    pub fn record_completion(&self) {
        self.record_completion_on(Local::now().date_naive());
    }

    pub fn record_completion_on(&self, day: NaiveDate) {
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.total += 1;
        *counters.daily.entry(day).or_insert(0) += 1;
    }

    pub fn snapshot(&self) -> StatsCounters {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn today(&self) -> u64 {
        self.count_on(Local::now().date_naive())
    }

    pub fn count_on(&self, day: NaiveDate) -> u64 {
        self.snapshot().daily.get(&day).copied().unwrap_or(0)
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn render(&self, queue_len: usize) -> String {
        let counters = self.snapshot();
        format!(
            "Total encoded: {}\nToday: {}\nUptime: {}\nQueue: {}",
            counters.total,
            self.today(),
            self.uptime().as_secs_f64().human_duration(),
            queue_len,
        )
    }
}

impl Default for StatsRecorder {
    fn default() -> Self {
        StatsRecorder::new()
    }
}
