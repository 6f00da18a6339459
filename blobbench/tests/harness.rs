//! End-to-end harness runs against an in-process scripted target.

use std::time::{Duration, Instant};

use anyhow::Result;
use blobbench::summary::RunStatus;
use blobbench::workload::{OpKind, RoleSpec, SizeDistribution, WorkloadSpec};
use blobbench::{Issuer, run};
use blobbench_test::server::{Behavior, TestServer};

fn role(name: &str, kind: OpKind, workers: usize, iterations: u64) -> RoleSpec {
    RoleSpec {
        name: name.into(),
        kind,
        workers,
        iterations,
        sizes: SizeDistribution::new(1024, 4096),
    }
}

fn spec(roles: Vec<RoleSpec>, budget: Duration, request_timeout: Duration) -> WorkloadSpec {
    WorkloadSpec {
        bucket: "bench".into(),
        prefix: "it".into(),
        roles,
        budget,
        request_timeout,
        sink_capacity: 256,
        seed: 42,
    }
}

#[tokio::test]
async fn writes_against_healthy_target() -> Result<()> {
    blobbench_test::tracing::init();
    let server = TestServer::new().await;
    let issuer = Issuer::new(&server.url("/"), Duration::from_secs(1))?;

    let spec = spec(
        vec![role("writes", OpKind::Write, 3, 10)],
        Duration::from_secs(30),
        Duration::from_secs(1),
    );
    let report = run(issuer, spec).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.successes(), 30);
    assert_eq!(report.failures(), 0);
    assert_eq!(report.dropped, 0);
    assert_eq!(server.requests(), 30);
    assert!(report.bytes_written > 0);

    // with negligible and uniform target latency, the percentiles collapse
    let p = report.classes["writes"].percentiles().unwrap();
    assert!(p.p50 <= p.p95 && p.p95 <= p.p99);
    assert!(p.p99 < Duration::from_secs(1));

    Ok(())
}

#[tokio::test]
async fn mixed_roles_are_tallied_per_kind() -> Result<()> {
    blobbench_test::tracing::init();
    let server = TestServer::new().await;
    let issuer = Issuer::new(&server.url("/"), Duration::from_secs(1))?;

    let spec = spec(
        vec![
            role("writes", OpKind::Write, 1, 5),
            role("reads", OpKind::Read, 1, 5),
            role("listing", OpKind::List, 1, 5),
        ],
        Duration::from_secs(30),
        Duration::from_secs(1),
    );
    let report = run(issuer, spec).await;

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.successes(), 15);
    for kind in [OpKind::Write, OpKind::Read, OpKind::List] {
        assert_eq!(report.tallies[&kind].successes, 5, "{}", kind.as_str());
        assert_eq!(report.tallies[&kind].failures, 0);
    }
    assert!(report.bytes_read > 0);

    Ok(())
}

#[tokio::test]
async fn error_statuses_become_failure_outcomes() -> Result<()> {
    blobbench_test::tracing::init();
    let server = TestServer::with_behavior(Behavior::Status(500)).await;
    let issuer = Issuer::new(&server.url("/"), Duration::from_secs(1))?;

    let spec = spec(
        vec![role("writes", OpKind::Write, 3, 10)],
        Duration::from_secs(30),
        Duration::from_secs(1),
    );
    let report = run(issuer, spec).await;

    // a failed request never aborts the worker loop
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.successes(), 0);
    assert_eq!(report.failures(), 30);
    assert_eq!(report.errors["500"], 30);
    assert_eq!(report.classes.get("writes").map(|c| c.durations.len()), None);

    Ok(())
}

#[tokio::test]
async fn hanging_target_is_bounded_by_budget_plus_timeout() -> Result<()> {
    blobbench_test::tracing::init();
    let server = TestServer::with_behavior(Behavior::Hang).await;
    let issuer = Issuer::new(&server.url("/"), Duration::from_secs(1))?;

    let spec = spec(
        vec![role("writes", OpKind::Write, 2, 5)],
        Duration::from_secs(3),
        Duration::from_secs(1),
    );

    let started = Instant::now();
    let report = run(issuer, spec).await;
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
    assert_eq!(report.status, RunStatus::DeadlineExceeded);
    assert_eq!(report.successes(), 0);

    // only operations that actually timed out before cancellation were
    // recorded; nothing was fabricated
    assert!(report.failures() >= 2);
    assert!(report.failures() <= server.requests());

    Ok(())
}

#[tokio::test]
async fn deadline_freezes_partial_results() -> Result<()> {
    blobbench_test::tracing::init();
    let server = TestServer::with_behavior(Behavior::Ok {
        latency: Duration::from_millis(100),
    })
    .await;
    let issuer = Issuer::new(&server.url("/"), Duration::from_secs(1))?;

    let spec = spec(
        vec![role("writes", OpKind::Write, 2, 1000)],
        Duration::from_millis(500),
        Duration::from_secs(1),
    );
    let report = run(issuer, spec).await;

    assert_eq!(report.status, RunStatus::DeadlineExceeded);
    assert!(report.successes() > 0);
    // outcomes observed never exceed operations dispatched
    assert!(report.successes() + report.failures() + report.dropped <= server.requests());
    assert!(server.requests() < 2000);

    Ok(())
}

#[tokio::test]
async fn health_probe_distinguishes_reachable_targets() -> Result<()> {
    blobbench_test::tracing::init();
    let server = TestServer::new().await;

    let issuer = Issuer::new(&server.url("/"), Duration::from_secs(1))?;
    issuer.health().await?;

    // nothing listens on port 1
    let unreachable = Issuer::new("http://127.0.0.1:1", Duration::from_millis(250))?;
    assert!(unreachable.health().await.is_err());

    Ok(())
}
