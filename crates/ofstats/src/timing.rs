//! Duration tracking for statistics gathering events.

use ofstats_types::StatisticsKind;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Accumulated timings of one event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventTiming {
    pub count: u64,
    pub last: Duration,
    pub total: Duration,
}

impl EventTiming {
    /// Returns the mean duration, or zero if never completed.
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            return Duration::ZERO;
        }
        self.total / u32::try_from(self.count).unwrap_or(u32::MAX)
    }
}

/// Per-kind start/end timer for whole gathering cycles of one device.
#[derive(Debug, Default)]
pub struct EventTimeCounter {
    started: HashMap<StatisticsKind, Instant>,
    timings: HashMap<StatisticsKind, EventTiming>,
}

impl EventTimeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the start of an event, replacing any unfinished one.
    pub fn mark_start(&mut self, kind: StatisticsKind) {
        self.started.insert(kind, Instant::now());
    }

    /// Marks the end of an event.
    ///
    /// Returns the elapsed time, or `None` if no start was marked.
    pub fn mark_end(&mut self, kind: StatisticsKind) -> Option<Duration> {
        let started = self.started.remove(&kind)?;
        let elapsed = started.elapsed();

        let timing = self.timings.entry(kind).or_default();
        timing.count += 1;
        timing.last = elapsed;
        timing.total += elapsed;
        Some(elapsed)
    }

    /// Returns the timings recorded for a kind.
    pub fn timing(&self, kind: StatisticsKind) -> Option<EventTiming> {
        self.timings.get(&kind).copied()
    }

    /// Returns true if an event of this kind is in flight.
    pub fn is_running(&self, kind: StatisticsKind) -> bool {
        self.started.contains_key(&kind)
    }

    /// Human-readable lines, one per kind, sorted by kind.
    pub fn dump(&self) -> Vec<String> {
        let mut kinds: Vec<_> = self.timings.keys().copied().collect();
        kinds.sort();
        kinds
            .into_iter()
            .filter_map(|kind| {
                self.timings.get(&kind).map(|t| {
                    format!(
                        "{}: count={} last={}ms avg={}ms",
                        kind,
                        t.count,
                        t.last.as_millis(),
                        t.average().as_millis()
                    )
                })
            })
            .collect()
    }
}
