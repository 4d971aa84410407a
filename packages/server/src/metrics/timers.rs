//! Shared registry of request latency timers.
//!
//! This is the raw `http.server.requests` series the SLO gauges derive from,
//! and the one genuinely shared mutable resource in the crate. It is
//! internally synchronized; callers only ever record one sample or take a
//! point-in-time read, never hold references into it.

use std::collections::VecDeque;

use dashmap::DashMap;
use parking_lot::Mutex;

/// Metric family name under which request latencies are recorded.
pub const HTTP_SERVER_REQUESTS: &str = "http.server.requests";

/// Recent samples kept per timer for percentile derivation.
const SAMPLE_WINDOW: usize = 1024;

/// Identifies one timer series: route template plus response status.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerKey {
    /// Route template (or raw path when no template matched).
    pub path: String,
    /// Response status code.
    pub status: u16,
}

#[derive(Debug, Default)]
struct TimerState {
    count: u64,
    samples: VecDeque<u64>,
}

/// Point-in-time copy of one timer series.
#[derive(Debug, Clone)]
pub struct TimerReading {
    /// Route template this series belongs to.
    pub path: String,
    /// Response status code this series belongs to.
    pub status: u16,
    /// Total samples ever recorded, including ones rotated out of the window.
    pub count: u64,
    /// Most recent samples, in milliseconds, oldest first.
    pub samples: Vec<u64>,
}

/// Concurrent timer registry keyed by `(path, status)`.
#[derive(Debug, Default)]
pub struct RequestTimerRegistry {
    timers: DashMap<TimerKey, Mutex<TimerState>>,
}

impl RequestTimerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one latency sample. The per-series window is bounded; old
    /// samples rotate out while the total count keeps growing.
    pub fn record(&self, path: &str, status: u16, elapsed_ms: u64) {
        let key = TimerKey {
            path: path.to_owned(),
            status,
        };
        let entry = self.timers.entry(key).or_default();
        let mut state = entry.lock();
        state.count += 1;
        if state.samples.len() == SAMPLE_WINDOW {
            state.samples.pop_front();
        }
        state.samples.push_back(elapsed_ms);
    }

    /// Point-in-time copy of every series. Each series is copied under its
    /// own lock; the set as a whole is not atomic, which is fine for derived
    /// gauges.
    #[must_use]
    pub fn timers(&self) -> Vec<TimerReading> {
        self.timers
            .iter()
            .map(|entry| {
                let state = entry.value().lock();
                TimerReading {
                    path: entry.key().path.clone(),
                    status: entry.key().status,
                    count: state.count,
                    samples: state.samples.iter().copied().collect(),
                }
            })
            .collect()
    }

    /// Number of distinct `(path, status)` series.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// `true` when nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
