//! Bounded, non-blocking collection of per-request outcomes.
//!
//! Workers push outcomes through an [`OutcomeRecorder`]; a single consumer
//! drains the matching [`OutcomeSink`]. The sink has a fixed capacity and a
//! push never blocks: when the sink is full the outcome is discarded and a
//! drop counter is incremented instead, so an overloaded run keeps
//! generating load at full speed and the overload stays visible in the
//! report.
//!
//! Closing is structural. Every worker owns a clone of the recorder, and the
//! channel only reports closure to the consumer once all clones are dropped.
//! There is no `close()` to call at the wrong time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

use crate::issuer::Outcome;

/// Creates a connected recorder/sink pair with the given capacity.
pub fn channel(capacity: usize) -> (OutcomeRecorder, OutcomeSink) {
    let (tx, rx) = mpsc::channel(capacity);
    let dropped = Arc::new(AtomicU64::new(0));

    let recorder = OutcomeRecorder {
        tx,
        dropped: Arc::clone(&dropped),
    };
    let sink = OutcomeSink { rx, dropped };

    (recorder, sink)
}

/// Producer handle held by every worker.
#[derive(Debug, Clone)]
pub struct OutcomeRecorder {
    tx: mpsc::Sender<Outcome>,
    dropped: Arc<AtomicU64>,
}

impl OutcomeRecorder {
    /// Records an outcome without ever blocking the caller.
    ///
    /// A full sink and a sink whose run has already been abandoned both
    /// count as drops.
    pub fn record(&self, outcome: Outcome) {
        if self.tx.try_send(outcome).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Consumer side of the outcome channel.
#[derive(Debug)]
pub struct OutcomeSink {
    rx: mpsc::Receiver<Outcome>,
    dropped: Arc<AtomicU64>,
}

impl OutcomeSink {
    /// Receives the next outcome.
    ///
    /// Returns `None` once every recorder clone has been dropped and the
    /// buffered outcomes are exhausted.
    pub async fn recv(&mut self) -> Option<Outcome> {
        self.rx.recv().await
    }

    /// Number of outcomes discarded because the sink was at capacity.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
