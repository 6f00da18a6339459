//! The operation model and per-role schedules of a run.
//!
//! A [`WorkloadSpec`] is built once from configuration and is read-only for
//! the duration of a run. It carries a list of named [`RoleSpec`]s, each of
//! which contributes a number of workers issuing a fixed number of
//! operations of a single kind.
//!
//! Payload sizes for write operations are drawn from a *LogNormal*
//! distribution defined by the `p50` and `p99` of file sizes. This models a
//! real-world distribution of many small files with a long tail of larger
//! ones.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use std::{io, task};

use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};
use rand_distr::{Distribution, LogNormal};
use tokio::io::{AsyncRead, ReadBuf};

/// The kind of request a worker issues against the target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OpKind {
    /// `PUT {base}/{bucket}/{key}` with a generated payload.
    Write,
    /// `GET {base}/{bucket}/{key}`.
    Read,
    /// `GET {base}/{bucket}`, listing the bucket.
    List,
}

impl OpKind {
    /// Uppercase name for report output.
    pub fn as_str(&self) -> &'static str {
        match self {
            OpKind::Write => "WRITE",
            OpKind::Read => "READ",
            OpKind::List => "LIST",
        }
    }
}

/// One logical request against the target, owned by a single worker.
#[derive(Debug)]
pub struct Operation {
    /// What to do.
    pub kind: OpKind,
    /// Target bucket.
    pub bucket: String,
    /// Target key within the bucket. Unused for [`OpKind::List`].
    pub key: String,
    /// The body to upload. Present only for [`OpKind::Write`].
    pub payload: Option<Payload>,
    /// Name of the workload this operation belongs to.
    pub workload: Arc<str>,
    /// Index of the worker issuing this operation.
    pub worker: usize,
}

/// Payload sizes drawn from a log-normal distribution parameterized by its
/// p50 and p99.
#[derive(Debug, Clone, Copy)]
pub struct SizeDistribution {
    inner: LogNormal<f64>,
}

impl SizeDistribution {
    /// Creates a distribution with the given percentiles, in bytes.
    ///
    /// Requires `0 < p50 <= p99`; configuration validation upholds this.
    pub fn new(p50: u64, p99: u64) -> Self {
        // Inspired by <https://stats.stackexchange.com/a/649432>
        let mu = (p50 as f64).ln();
        let sigma = ((p99 as f64).ln() - mu) / 2.3263;

        Self {
            inner: LogNormal::new(mu, sigma).expect("validated percentiles"),
        }
    }

    /// Samples a payload size in bytes.
    pub fn sample(&self, rng: &mut SmallRng) -> u64 {
        self.inner.sample(rng) as u64
    }
}

/// Deterministic pseudo-random contents of an object.
///
/// Payloads constructed from the same seed and length produce identical
/// bytes, so contents never need to be buffered in memory.
#[derive(Debug, Clone)]
pub struct Payload {
    /// The number of bytes remaining in this payload.
    pub len: u64,
    rng: SmallRng,
}

impl Payload {
    /// Creates a payload of `len` bytes generated from `seed`.
    pub fn new(len: u64, seed: u64) -> Self {
        Self {
            len,
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl io::Read for Payload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len_to_fill = (buf.len() as u64).min(self.len) as usize;

        let fill_buf = &mut buf[..len_to_fill];
        self.rng.fill_bytes(fill_buf);

        self.len -= len_to_fill as u64;
        Ok(len_to_fill)
    }
}

impl AsyncRead for Payload {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut task::Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> task::Poll<io::Result<()>> {
        let len_to_fill = (buf.remaining() as u64).min(self.len) as usize;

        let fill_buf = buf.initialize_unfilled_to(len_to_fill);
        self.rng.fill_bytes(fill_buf);

        self.len -= len_to_fill as u64;
        buf.advance(len_to_fill);

        task::Poll::Ready(Ok(()))
    }
}

/// One named workload within a run.
#[derive(Debug, Clone)]
pub struct RoleSpec {
    /// Name for identification in logs and the report.
    pub name: Arc<str>,
    /// The kind of operation every worker of this role issues.
    pub kind: OpKind,
    /// Number of concurrent workers.
    pub workers: usize,
    /// Operations issued per worker.
    pub iterations: u64,
    /// Distribution of payload sizes. Only sampled for write roles.
    pub sizes: SizeDistribution,
}

/// Frozen description of a full run, built once from configuration.
#[derive(Debug, Clone)]
pub struct WorkloadSpec {
    /// Target bucket all operations address.
    pub bucket: String,
    /// Key prefix under which workers place their objects.
    pub prefix: String,
    /// The named workloads making up the run.
    pub roles: Vec<RoleSpec>,
    /// Global time budget for the whole run.
    pub budget: Duration,
    /// Per-request timeout, distinct from the global budget.
    pub request_timeout: Duration,
    /// Capacity of the outcome sink.
    pub sink_capacity: usize,
    /// Seed for all payload and size randomness.
    pub seed: u64,
}

impl WorkloadSpec {
    /// Total number of workers across all roles.
    pub fn total_workers(&self) -> usize {
        self.roles.iter().map(|role| role.workers).sum()
    }

    /// Total number of operations scheduled for dispatch.
    pub fn total_operations(&self) -> u64 {
        self.roles
            .iter()
            .map(|role| role.workers as u64 * role.iterations)
            .sum()
    }

    /// Flattens the roles into one assignment per worker.
    ///
    /// Worker ids are unique across the whole run, so keys written by
    /// different workers never collide.
    pub(crate) fn assignments(&self) -> Vec<WorkerAssignment> {
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut assignments = Vec::with_capacity(self.total_workers());

        for role in &self.roles {
            for _ in 0..role.workers {
                assignments.push(WorkerAssignment {
                    id: assignments.len(),
                    role: role.clone(),
                    seed: rng.next_u64(),
                });
            }
        }

        assignments
    }

    /// The key a worker addresses on the given iteration.
    ///
    /// Read and list roles address the same layout as write roles, so a run
    /// with matching geometry can read back what a previous run wrote.
    pub(crate) fn object_key(&self, worker: usize, iteration: u64) -> String {
        format!("{}/{worker}/{iteration}", self.prefix)
    }
}

/// One worker's share of the run: its identity and its operation schedule.
#[derive(Debug, Clone)]
pub(crate) struct WorkerAssignment {
    pub id: usize,
    pub role: RoleSpec,
    pub seed: u64,
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use super::*;

    #[test]
    fn size_distribution_hits_configured_median() {
        let sizes = SizeDistribution::new(16 * 1024, 1024 * 1024);
        let mut rng = SmallRng::seed_from_u64(1);

        let mut samples: Vec<_> = (0..10_000).map(|_| sizes.sample(&mut rng)).collect();
        samples.sort_unstable();

        let median = samples[samples.len() / 2];
        assert!((8 * 1024..32 * 1024).contains(&median), "median {median}");
    }

    #[test]
    fn payload_is_deterministic() {
        let mut a = Vec::new();
        Payload::new(1000, 42).read_to_end(&mut a).unwrap();
        let mut b = Vec::new();
        Payload::new(1000, 42).read_to_end(&mut b).unwrap();

        assert_eq!(a.len(), 1000);
        assert_eq!(a, b);

        let mut c = Vec::new();
        Payload::new(1000, 43).read_to_end(&mut c).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn assignments_cover_all_roles() {
        let spec = WorkloadSpec {
            bucket: "bench".into(),
            prefix: "t".into(),
            roles: vec![
                RoleSpec {
                    name: "writes".into(),
                    kind: OpKind::Write,
                    workers: 2,
                    iterations: 10,
                    sizes: SizeDistribution::new(1024, 4096),
                },
                RoleSpec {
                    name: "reads".into(),
                    kind: OpKind::Read,
                    workers: 3,
                    iterations: 5,
                    sizes: SizeDistribution::new(1024, 4096),
                },
            ],
            budget: Duration::from_secs(10),
            request_timeout: Duration::from_secs(1),
            sink_capacity: 64,
            seed: 7,
        };

        let assignments = spec.assignments();
        assert_eq!(assignments.len(), 5);
        assert_eq!(spec.total_workers(), 5);
        assert_eq!(spec.total_operations(), 2 * 10 + 3 * 5);

        let ids: Vec<_> = assignments.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);

        // distinct worker seeds, so payload streams do not repeat
        let mut seeds: Vec<_> = assignments.iter().map(|a| a.seed).collect();
        seeds.sort_unstable();
        seeds.dedup();
        assert_eq!(seeds.len(), 5);
    }
}
