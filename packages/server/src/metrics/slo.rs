//! Derived SLO gauges over the request timer family.
//!
//! The aggregator periodically folds every `http.server.requests` series into
//! two numbers: the ratio of 5xx responses to all responses, and the worst
//! p99 latency across routes. Both are republished as gauges so dashboards
//! and alerts read a single value instead of re-aggregating raw timers.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use metrics::gauge;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::metrics::timers::{RequestTimerRegistry, TimerReading};

/// Gauge holding the 5xx-to-total request ratio.
pub const SLO_ERROR_RATIO: &str = "slo.http.error.ratio";
/// Gauge holding the worst per-route p99 latency in milliseconds.
pub const SLO_LATENCY_P99_MS: &str = "slo.http.latency.p99.ms";

/// Point-in-time derived SLO values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SloSnapshot {
    /// 5xx samples divided by total samples. Zero when nothing was recorded.
    pub error_ratio: f64,
    /// Worst p99 across all route timers, in milliseconds. Zero when no
    /// samples exist.
    pub max_p99_ms: u64,
}

/// Folds timer readings into one snapshot.
#[must_use]
pub fn compute(timers: &[TimerReading]) -> SloSnapshot {
    let total: u64 = timers.iter().map(|timer| timer.count).sum();
    if total == 0 {
        return SloSnapshot::default();
    }

    let errors: u64 = timers
        .iter()
        .filter(|timer| (500..600).contains(&timer.status))
        .map(|timer| timer.count)
        .sum();

    let max_p99_ms = timers
        .iter()
        .map(|timer| {
            let mut samples = timer.samples.clone();
            samples.sort_unstable();
            percentile(&samples, 99)
        })
        .max()
        .unwrap_or(0);

    #[allow(clippy::cast_precision_loss)]
    let error_ratio = errors as f64 / total as f64;

    SloSnapshot {
        error_ratio,
        max_p99_ms,
    }
}

/// Nearest-rank percentile over an ascending slice. Empty input reads zero.
fn percentile(sorted: &[u64], p: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (p * sorted.len()).div_ceil(100);
    let idx = rank.saturating_sub(1).min(sorted.len() - 1);
    sorted[idx]
}

/// Periodically recomputes the SLO snapshot and republishes the gauges.
#[derive(Debug)]
pub struct SloAggregator {
    registry: Arc<RequestTimerRegistry>,
    current: ArcSwap<SloSnapshot>,
}

impl SloAggregator {
    /// Creates an aggregator reading from the given registry. The cached
    /// snapshot starts at zero until the first refresh.
    #[must_use]
    pub fn new(registry: Arc<RequestTimerRegistry>) -> Self {
        Self {
            registry,
            current: ArcSwap::from_pointee(SloSnapshot::default()),
        }
    }

    /// Recomputes from the registry, publishes both gauges, and caches the
    /// result for [`SloAggregator::current`].
    pub fn refresh(&self) -> SloSnapshot {
        let snapshot = compute(&self.registry.timers());
        gauge!(SLO_ERROR_RATIO).set(snapshot.error_ratio);
        #[allow(clippy::cast_precision_loss)]
        gauge!(SLO_LATENCY_P99_MS).set(snapshot.max_p99_ms as f64);
        self.current.store(Arc::new(snapshot));
        snapshot
    }

    /// Last published snapshot without recomputing.
    #[must_use]
    pub fn current(&self) -> SloSnapshot {
        **self.current.load()
    }

    /// Spawns a background refresher ticking at the given period. The first
    /// refresh happens one full period after start.
    #[must_use]
    pub fn start_refresher(self: &Arc<Self>, period: Duration) -> RefresherHandle {
        let aggregator = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            // The immediate first tick would refresh an empty registry.
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        aggregator.refresh();
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });
        RefresherHandle {
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

/// Handle owning a spawned refresher task.
#[derive(Debug)]
pub struct RefresherHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RefresherHandle {
    /// Signals the refresher to stop and waits for it to exit.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(path: &str, status: u16, samples: Vec<u64>) -> TimerReading {
        TimerReading {
            path: path.to_owned(),
            status,
            count: samples.len() as u64,
            samples,
        }
    }

    #[test]
    fn empty_registry_yields_zero_snapshot() {
        let snapshot = compute(&[]);
        assert_eq!(snapshot.error_ratio, 0.0);
        assert_eq!(snapshot.max_p99_ms, 0);
    }

    #[test]
    fn error_ratio_counts_only_5xx() {
        let timers = vec![
            reading("/orders", 200, vec![10, 12]),
            reading("/orders", 500, vec![40]),
            reading("/orders", 404, vec![5]),
        ];
        let snapshot = compute(&timers);
        assert!((snapshot.error_ratio - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn two_ok_one_error_reads_one_third() {
        let timers = vec![
            reading("/hello", 200, vec![10, 20]),
            reading("/hello", 500, vec![30]),
        ];
        let snapshot = compute(&timers);
        assert!((snapshot.error_ratio - 1.0 / 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn p99_is_nearest_rank_and_max_across_routes() {
        let fast: Vec<u64> = (1..=100).collect();
        let timers = vec![
            reading("/fast", 200, fast),
            reading("/slow", 200, vec![5, 900, 7]),
        ];
        let snapshot = compute(&timers);
        // Nearest rank p99 of 1..=100 is 99; /slow tops out at 900.
        assert_eq!(snapshot.max_p99_ms, 900);
    }

    #[test]
    fn percentile_handles_small_series() {
        assert_eq!(percentile(&[], 99), 0);
        assert_eq!(percentile(&[42], 99), 42);
        assert_eq!(percentile(&[1, 2], 50), 1);
        assert_eq!(percentile(&[1, 2], 99), 2);
    }

    #[tokio::test]
    async fn refresh_publishes_and_caches() {
        let registry = Arc::new(RequestTimerRegistry::new());
        registry.record("/hello", 200, 10);
        registry.record("/hello", 200, 20);
        registry.record("/hello", 500, 30);

        let aggregator = SloAggregator::new(Arc::clone(&registry));
        assert_eq!(aggregator.current(), SloSnapshot::default());

        let refreshed = aggregator.refresh();
        assert!((refreshed.error_ratio - 1.0 / 3.0).abs() < f64::EPSILON);
        assert_eq!(aggregator.current(), refreshed);
    }

    #[tokio::test]
    async fn refresher_stops_cleanly() {
        let registry = Arc::new(RequestTimerRegistry::new());
        let aggregator = Arc::new(SloAggregator::new(registry));
        let mut handle = aggregator.start_refresher(Duration::from_millis(10));
        handle.stop().await;
    }
}
