//! Console rendering of a finished run report.

use std::time::Duration;

use bytesize::ByteSize;
use yansi::Paint;

use crate::summary::{Report, RunStatus, SizeClass};
use crate::workload::OpKind;

/// Prints the report to stdout.
pub fn print(report: &Report) {
    println!();
    match report.status {
        RunStatus::Completed => println!(
            "{} (completed in {:.2?})",
            "## RUN".bold(),
            report.elapsed
        ),
        RunStatus::DeadlineExceeded => println!(
            "{} ({} after {:.2?})",
            "## RUN".bold(),
            "terminated by deadline".bold().yellow(),
            report.elapsed
        ),
    }

    for (kind, tally) in &report.tallies {
        print!(
            "{} ({} ops",
            format!("{}:", kind.as_str()).bold().green(),
            (tally.successes + tally.failures).bold()
        );
        if tally.failures > 0 {
            print!(", {}", format!("{} FAILURES", tally.failures).bold().red());
        }
        println!(")");

        let ops = tally.successes + tally.failures;
        let ops_ps = ops as f64 / report.elapsed.as_secs_f64();
        print!("  {:.2} operations/s", ops_ps.bold());
        match kind {
            OpKind::Write => print_throughput(report.bytes_written, report.elapsed),
            OpKind::Read => print_throughput(report.bytes_read, report.elapsed),
            OpKind::List => println!(),
        }

        for (name, class) in report.classes.iter().filter(|(_, c)| c.kind == *kind) {
            print_percentiles(name, class);
        }
    }

    if let Some(sizes) = &report.payload_sizes {
        let avg = ByteSize::b(sizes.avg);
        let p50 = ByteSize::b(sizes.p50);
        let p90 = ByteSize::b(sizes.p90);
        let p99 = ByteSize::b(sizes.p99);
        println!(
            "  size avg: {}; p50: {p50:.2}; p90: {p90:.2}; p99: {p99:.2}",
            avg.bold()
        );
    }

    if report.dropped > 0 {
        println!(
            "{}",
            format!("{} OUTCOMES DROPPED (sink at capacity)", report.dropped)
                .bold()
                .red()
        );
    }

    if !report.errors.is_empty() {
        println!("{}", "errors:".bold());
        for (detail, count) in &report.errors {
            println!("  {detail} ({count})");
        }
    }
}

fn print_percentiles(name: &str, class: &SizeClass) {
    match class.percentiles() {
        Some(p) => println!(
            "  {}: p50: {:.2?}; p95: {:.2?}; p99: {:.2?}",
            name.bold().blue(),
            p.p50,
            p.p95,
            p.p99
        ),
        None => println!("  {}: no data", name.bold().blue()),
    }
}

fn print_throughput(total: u64, duration: Duration) {
    let throughput = (total as f64 / duration.as_secs_f64()) as u64;
    println!(", {:.2}/s", ByteSize::b(throughput).bold());
}
