//! Reduces collected outcomes into the final report.
//!
//! The summarizer consumes outcomes while the run is still producing them,
//! but percentiles are only computed in [`Summarizer::finish`], over the set
//! frozen at that point. Latency percentiles use the 1-indexed nearest-rank
//! method over the exact sorted durations; payload sizes are tracked with a
//! DDSketch since an estimate is good enough for the size line.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use sketches_ddsketch::DDSketch;

use crate::issuer::Outcome;
use crate::workload::OpKind;

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// Every scheduled operation ran to completion before the time budget.
    Completed,
    /// The run was terminated by the global time budget (or an explicit
    /// early-termination request); the report covers what finished by then.
    DeadlineExceeded,
}

/// Success/failure counts for one operation kind.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KindTally {
    /// Requests that completed with a success status.
    pub successes: u64,
    /// Requests that failed, either with an error status or a transport
    /// error.
    pub failures: u64,
}

/// Nearest-rank latency percentiles of one size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Percentiles {
    /// Value at rank `⌈0.50·n⌉`.
    pub p50: Duration,
    /// Value at rank `⌈0.95·n⌉`.
    pub p95: Duration,
    /// Value at rank `⌈0.99·n⌉`.
    pub p99: Duration,
}

/// The duration distribution of one size class (one named workload).
#[derive(Debug)]
pub struct SizeClass {
    /// Operation kind of the owning workload.
    pub kind: OpKind,
    /// Durations of all successful requests, sorted ascending.
    pub durations: Vec<Duration>,
}

impl SizeClass {
    /// Nearest-rank percentiles over the sorted durations.
    ///
    /// Returns `None` for an empty class: no data is reported as no data,
    /// never as a zero.
    pub fn percentiles(&self) -> Option<Percentiles> {
        if self.durations.is_empty() {
            return None;
        }

        Some(Percentiles {
            p50: nearest_rank(&self.durations, 0.50),
            p95: nearest_rank(&self.durations, 0.95),
            p99: nearest_rank(&self.durations, 0.99),
        })
    }
}

/// The value at 1-indexed rank `⌈q·n⌉` of a sorted, non-empty slice.
fn nearest_rank(sorted: &[Duration], q: f64) -> Duration {
    let n = sorted.len();
    let rank = (q * n as f64).ceil() as usize;
    sorted[rank.clamp(1, n) - 1]
}

/// Distribution of payload sizes observed on successful writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeSummary {
    /// Mean size in bytes.
    pub avg: u64,
    /// Estimated p50 in bytes.
    pub p50: u64,
    /// Estimated p90 in bytes.
    pub p90: u64,
    /// Estimated p99 in bytes.
    pub p99: u64,
}

/// Aggregated view over all collected outcomes.
///
/// Produced once at the end of a run and never mutated afterwards.
#[derive(Debug)]
pub struct Report {
    /// How the run ended.
    pub status: RunStatus,
    /// Wall-clock span of the run.
    pub elapsed: Duration,
    /// Success/failure counts per operation kind.
    pub tallies: BTreeMap<OpKind, KindTally>,
    /// Sorted duration distributions per size class.
    pub classes: BTreeMap<Arc<str>, SizeClass>,
    /// Failure counts keyed by error detail (status code or transport
    /// error).
    pub errors: BTreeMap<String, u64>,
    /// Payload size distribution of successful writes.
    pub payload_sizes: Option<SizeSummary>,
    /// Total bytes uploaded by successful writes.
    pub bytes_written: u64,
    /// Total bytes downloaded by successful reads.
    pub bytes_read: u64,
    /// Outcomes discarded because the sink was at capacity.
    pub dropped: u64,
}

impl Report {
    /// Total successful requests across all kinds.
    pub fn successes(&self) -> u64 {
        self.tallies.values().map(|t| t.successes).sum()
    }

    /// Total failed requests across all kinds.
    pub fn failures(&self) -> u64 {
        self.tallies.values().map(|t| t.failures).sum()
    }

    /// Write throughput in bytes per second over the run's wall-clock span.
    pub fn bytes_per_sec(&self) -> u64 {
        if self.elapsed.is_zero() {
            return 0;
        }
        (self.bytes_written as f64 / self.elapsed.as_secs_f64()) as u64
    }
}

/// Accumulates outcomes as the sink is drained.
#[derive(Default)]
pub(crate) struct Summarizer {
    tallies: BTreeMap<OpKind, KindTally>,
    classes: BTreeMap<Arc<str>, SizeClass>,
    errors: BTreeMap<String, u64>,
    sizes: DDSketch,
    bytes_written: u64,
    bytes_read: u64,
}

impl Summarizer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Folds one outcome into the running aggregates.
    pub(crate) fn observe(&mut self, outcome: Outcome) {
        let tally = self.tallies.entry(outcome.kind).or_default();

        match outcome.error {
            None => {
                tally.successes += 1;
                match outcome.kind {
                    OpKind::Write => {
                        self.bytes_written += outcome.bytes;
                        self.sizes.add(outcome.bytes as f64);
                    }
                    OpKind::Read => self.bytes_read += outcome.bytes,
                    OpKind::List => {}
                }

                self.classes
                    .entry(outcome.workload)
                    .or_insert_with(|| SizeClass {
                        kind: outcome.kind,
                        durations: Vec::new(),
                    })
                    .durations
                    .push(outcome.duration);
            }
            Some(err) => {
                tally.failures += 1;
                *self.errors.entry(err.to_string()).or_default() += 1;
            }
        }
    }

    /// Freezes the collected set and builds the report.
    pub(crate) fn finish(mut self, status: RunStatus, dropped: u64, elapsed: Duration) -> Report {
        for class in self.classes.values_mut() {
            class.durations.sort_unstable();
        }

        let payload_sizes = (self.sizes.count() > 0).then(|| SizeSummary {
            avg: (self.sizes.sum().unwrap_or_default() / self.sizes.count() as f64) as u64,
            p50: quantile_bytes(&self.sizes, 0.5),
            p90: quantile_bytes(&self.sizes, 0.9),
            p99: quantile_bytes(&self.sizes, 0.99),
        });

        Report {
            status,
            elapsed,
            tallies: self.tallies,
            classes: self.classes,
            errors: self.errors,
            payload_sizes,
            bytes_written: self.bytes_written,
            bytes_read: self.bytes_read,
            dropped,
        }
    }
}

fn quantile_bytes(sketch: &DDSketch, q: f64) -> u64 {
    sketch.quantile(q).ok().flatten().unwrap_or_default() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issuer::IssueError;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn class(durations: Vec<Duration>) -> SizeClass {
        SizeClass {
            kind: OpKind::Write,
            durations,
        }
    }

    #[test]
    fn nearest_rank_on_a_known_list() {
        // 1ms..=100ms: ranks are the values themselves
        let class = class((1..=100).map(ms).collect());
        let p = class.percentiles().unwrap();

        assert_eq!(p.p50, ms(50));
        assert_eq!(p.p95, ms(95));
        assert_eq!(p.p99, ms(99));
    }

    #[test]
    fn nearest_rank_on_tiny_lists() {
        let single = class(vec![ms(7)]);
        let p = single.percentiles().unwrap();
        assert_eq!((p.p50, p.p95, p.p99), (ms(7), ms(7), ms(7)));

        let pair = class(vec![ms(1), ms(2)]);
        let p = pair.percentiles().unwrap();
        assert_eq!(p.p50, ms(1));
        assert_eq!(p.p95, ms(2));
        assert_eq!(p.p99, ms(2));
    }

    #[test]
    fn percentiles_are_idempotent() {
        let mut durations = vec![ms(3), ms(9), ms(1), ms(4)];
        durations.sort_unstable();
        let class = class(durations);

        assert_eq!(class.percentiles(), class.percentiles());
    }

    #[test]
    fn empty_class_reports_no_data() {
        assert_eq!(class(Vec::new()).percentiles(), None);
    }

    #[test]
    fn summarizer_tallies_and_throughput() {
        let mut summarizer = Summarizer::new();

        for i in 0..4u64 {
            summarizer.observe(Outcome {
                workload: "writes".into(),
                kind: OpKind::Write,
                worker: 0,
                duration: ms(10 + i),
                bytes: 1000,
                error: None,
            });
        }
        summarizer.observe(Outcome {
            workload: "writes".into(),
            kind: OpKind::Write,
            worker: 1,
            duration: ms(5),
            bytes: 0,
            error: Some(IssueError::Status(reqwest::StatusCode::INTERNAL_SERVER_ERROR)),
        });

        let report = summarizer.finish(RunStatus::Completed, 2, Duration::from_secs(2));

        let tally = report.tallies[&OpKind::Write];
        assert_eq!(tally.successes, 4);
        assert_eq!(tally.failures, 1);
        assert_eq!(report.successes(), 4);
        assert_eq!(report.failures(), 1);
        assert_eq!(report.errors["500"], 1);
        assert_eq!(report.dropped, 2);
        assert_eq!(report.bytes_written, 4000);
        assert_eq!(report.bytes_per_sec(), 2000);

        // failures contribute no durations
        assert_eq!(report.classes["writes"].durations.len(), 4);
        let sizes = report.payload_sizes.unwrap();
        assert!(sizes.avg >= 990 && sizes.avg <= 1010, "avg {}", sizes.avg);
    }
}
