//! Run configuration, loaded from a YAML file.
//!
//! Example:
//!
//! ```yaml
//! target: http://localhost:8888
//! bucket: bench
//! prefix: blobbench
//!
//! duration: 30s
//! request_timeout: 5s
//!
//! workloads:
//!   - name: uploads
//!     operation: write
//!     workers: 8
//!     iterations: 500
//!     file_sizes:
//!       p50: 16KiB
//!       p99: 1MiB
//!   - name: readback
//!     operation: read
//!     workers: 2
//!     iterations: 500
//! ```

use std::time::Duration;

use anyhow::{Context, ensure};
use bytesize::ByteSize;
use serde::Deserialize;

use crate::workload::{OpKind, RoleSpec, SizeDistribution, WorkloadSpec};

/// Top-level run configuration.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Base URL of the target, e.g. `http://localhost:8888`.
    pub target: String,
    /// Bucket all operations address.
    pub bucket: String,
    /// Key prefix under which objects are placed.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Global time budget for the run.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// Per-request timeout.
    #[serde(with = "humantime_serde", default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Capacity of the outcome sink.
    #[serde(default = "default_sink_capacity")]
    pub sink_capacity: usize,
    /// What to do when the target's health probe fails.
    #[serde(default)]
    pub health_check: HealthCheck,
    /// Seed for payload and size randomness. Random when omitted.
    #[serde(default)]
    pub seed: Option<u64>,

    /// The workloads making up the run.
    pub workloads: Vec<Workload>,
}

/// One named workload entry.
#[derive(Debug, Deserialize)]
pub struct Workload {
    /// Name for identification in logs and the report.
    pub name: String,
    /// Operation kind issued by this workload's workers.
    pub operation: Operation,
    /// Number of concurrent workers.
    pub workers: usize,
    /// Operations issued per worker.
    pub iterations: u64,
    /// Distribution of payload sizes for write workloads.
    #[serde(default)]
    pub file_sizes: FileSizes,
}

/// Operation kind as spelled in the configuration file.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// PUT an object.
    Write,
    /// GET an object.
    Read,
    /// List the bucket.
    List,
}

impl From<Operation> for OpKind {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Write => OpKind::Write,
            Operation::Read => OpKind::Read,
            Operation::List => OpKind::List,
        }
    }
}

/// Payload size distribution, defined by its percentiles.
#[derive(Debug, Deserialize)]
pub struct FileSizes {
    /// Median payload size.
    pub p50: ByteSize,
    /// 99th percentile payload size.
    pub p99: ByteSize,
}

impl Default for FileSizes {
    fn default() -> Self {
        Self {
            p50: ByteSize::kib(16),
            p99: ByteSize::mib(1),
        }
    }
}

/// Policy for a failing pre-run health probe.
#[derive(Debug, Default, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthCheck {
    /// Skip the whole run and exit successfully.
    #[default]
    Skip,
    /// Treat an unreachable target as an error.
    Fail,
    /// Do not probe at all.
    Off,
}

fn default_prefix() -> String {
    "blobbench".to_owned()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_sink_capacity() -> usize {
    1024
}

impl Config {
    /// Validates the configuration and freezes it into a [`WorkloadSpec`].
    pub fn spec(&self) -> anyhow::Result<WorkloadSpec> {
        ensure!(!self.workloads.is_empty(), "no workloads configured");
        ensure!(self.sink_capacity > 0, "sink_capacity must be positive");
        ensure!(!self.duration.is_zero(), "duration must be positive");
        ensure!(
            !self.request_timeout.is_zero(),
            "request_timeout must be positive"
        );

        let roles = self
            .workloads
            .iter()
            .map(|workload| {
                ensure!(workload.workers > 0, "workers must be positive");
                ensure!(workload.iterations > 0, "iterations must be positive");

                let p50 = workload.file_sizes.p50.0;
                let p99 = workload.file_sizes.p99.0;
                ensure!(p50 > 0, "file_sizes.p50 must be positive");
                ensure!(p99 >= p50, "file_sizes.p99 must not be below p50");

                Ok(RoleSpec {
                    name: workload.name.as_str().into(),
                    kind: workload.operation.into(),
                    workers: workload.workers,
                    iterations: workload.iterations,
                    sizes: SizeDistribution::new(p50, p99),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()
            .with_context(|| "invalid workload configuration")?;

        Ok(WorkloadSpec {
            bucket: self.bucket.clone(),
            prefix: self.prefix.clone(),
            roles,
            budget: self.duration,
            request_timeout: self.request_timeout,
            sink_capacity: self.sink_capacity,
            seed: self.seed.unwrap_or_else(rand::random),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
target: http://localhost:8888
bucket: bench
duration: 30s
request_timeout: 2s
workloads:
  - name: uploads
    operation: write
    workers: 8
    iterations: 500
    file_sizes:
      p50: 16KiB
      p99: 1MiB
  - name: listing
    operation: list
    workers: 1
    iterations: 50
"#;

    #[test]
    fn parses_a_realistic_config() {
        let config: Config = serde_yaml::from_str(EXAMPLE).unwrap();
        assert_eq!(config.target, "http://localhost:8888");
        assert_eq!(config.prefix, "blobbench");
        assert_eq!(config.health_check, HealthCheck::Skip);

        let spec = config.spec().unwrap();
        assert_eq!(spec.budget, Duration::from_secs(30));
        assert_eq!(spec.request_timeout, Duration::from_secs(2));
        assert_eq!(spec.roles.len(), 2);
        assert_eq!(spec.roles[0].kind, OpKind::Write);
        assert_eq!(spec.total_workers(), 9);
        assert_eq!(spec.total_operations(), 8 * 500 + 50);
    }

    #[test]
    fn rejects_inverted_size_percentiles() {
        let mut config: Config = serde_yaml::from_str(EXAMPLE).unwrap();
        config.workloads[0].file_sizes = FileSizes {
            p50: ByteSize::mib(1),
            p99: ByteSize::kib(16),
        };

        assert!(config.spec().is_err());
    }

    #[test]
    fn rejects_empty_workloads() {
        let mut config: Config = serde_yaml::from_str(EXAMPLE).unwrap();
        config.workloads.clear();

        assert!(config.spec().is_err());
    }
}
