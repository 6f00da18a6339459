//! Drives the worker pool: spawning, cancellation, bounded join, drain.
//!
//! [`run`] spawns one task per worker and a single drain task consuming the
//! outcome sink. Workers observe a shared cancellation token between
//! operations, so cancelling never interrupts an in-flight request; the cost
//! of cancellation is bounded by the per-request timeout instead.
//!
//! The driver itself never waits unboundedly. When the global time budget
//! elapses, outstanding workers get a grace period derived from the
//! per-request timeout to settle; whatever has not reported by then is
//! abandoned and the run proceeds to summarization, marked as terminated by
//! the deadline. The harness therefore always returns within
//! `budget + request_timeout + ε`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::issuer::Issuer;
use crate::sink::{self, OutcomeRecorder, OutcomeSink};
use crate::summary::{Report, RunStatus, Summarizer};
use crate::workload::{OpKind, Operation, Payload, WorkerAssignment, WorkloadSpec};

/// Extra time on top of the per-request timeout that workers get to report
/// completion after cancellation.
const GRACE_MARGIN: Duration = Duration::from_millis(250);

/// Runs the workload spec against the target and returns the report.
pub async fn run(issuer: Issuer, spec: WorkloadSpec) -> Report {
    run_with_cancel(issuer, spec, CancellationToken::new()).await
}

/// Like [`run`], with a caller-owned cancellation token.
///
/// Cancelling the token terminates the run early, with the same drain and
/// grace-period discipline as an elapsed time budget.
pub async fn run_with_cancel(
    issuer: Issuer,
    spec: WorkloadSpec,
    cancel: CancellationToken,
) -> Report {
    let started = Instant::now();
    let spec = Arc::new(spec);

    let (recorder, sink) = sink::channel(spec.sink_capacity);
    let drain = tokio::spawn(drain_sink(sink));

    let mut workers = JoinSet::new();
    for assignment in spec.assignments() {
        workers.spawn(run_worker(
            issuer.clone(),
            Arc::clone(&spec),
            assignment,
            recorder.clone(),
            cancel.clone(),
        ));
    }
    // Workers hold the only remaining recorder clones. The sink observes
    // closure once the last worker is gone, never earlier.
    drop(recorder);

    tracing::info!(
        workers = spec.total_workers(),
        operations = spec.total_operations(),
        budget = ?spec.budget,
        "starting run"
    );

    let completed = tokio::select! {
        _ = join_all(&mut workers) => true,
        _ = tokio::time::sleep(spec.budget) => false,
        _ = cancel.cancelled() => false,
    };

    let status = if completed {
        RunStatus::Completed
    } else {
        cancel.cancel();

        // In-flight requests settle on their own timeout; give them that
        // long, plus a margin for the joins themselves.
        let grace = spec.request_timeout + GRACE_MARGIN;
        if tokio::time::timeout(grace, join_all(&mut workers))
            .await
            .is_err()
        {
            tracing::warn!("workers still outstanding after grace period, abandoning join");
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }

        RunStatus::DeadlineExceeded
    };

    let (summarizer, dropped) = drain.await.expect("outcome drain task panicked");
    summarizer.finish(status, dropped, started.elapsed())
}

/// Joins worker tasks until the set is empty, isolating per-worker faults.
async fn join_all(workers: &mut JoinSet<()>) {
    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined
            && err.is_panic()
        {
            // One faulty worker must not take down the run.
            tracing::warn!("worker panicked: {err}");
        }
    }
}

/// Consumes the sink until every producer is gone.
///
/// Runs concurrently with production; the sink's push/drain contract makes
/// this safe without additional locking.
async fn drain_sink(mut sink: OutcomeSink) -> (Summarizer, u64) {
    let mut summarizer = Summarizer::new();
    while let Some(outcome) = sink.recv().await {
        summarizer.observe(outcome);
    }

    (summarizer, sink.dropped())
}

/// One worker: issues its scheduled operations until exhaustion or
/// cancellation.
async fn run_worker(
    issuer: Issuer,
    spec: Arc<WorkloadSpec>,
    assignment: WorkerAssignment,
    recorder: OutcomeRecorder,
    cancel: CancellationToken,
) {
    let WorkerAssignment { id, role, seed } = assignment;
    let mut rng = SmallRng::seed_from_u64(seed);

    for iteration in 0..role.iterations {
        // Cancellation is observed only between operations; an in-flight
        // request settles on its own per-request timeout.
        if cancel.is_cancelled() {
            tracing::debug!(worker = id, iteration, "cancelled before dispatch");
            return;
        }

        let payload = (role.kind == OpKind::Write).then(|| {
            let len = role.sizes.sample(&mut rng);
            Payload::new(len, rng.next_u64())
        });

        let op = Operation {
            kind: role.kind,
            bucket: spec.bucket.clone(),
            key: spec.object_key(id, iteration),
            payload,
            workload: Arc::clone(&role.name),
            worker: id,
        };

        let outcome = issuer.issue(op).await;
        recorder.record(outcome);
    }
}
