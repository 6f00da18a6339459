//! Binary entry point: load the configuration, probe the target, run, and
//! print the report.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use argh::FromArgs;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use blobbench::config::{Config, HealthCheck};
use blobbench::{Issuer, report};

/// Load generator for bucket/key HTTP object-storage APIs.
#[derive(Debug, FromArgs)]
pub struct Args {
    /// path to the yaml configuration file
    #[argh(option, short = 'c')]
    pub config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args: Args = argh::from_env();

    let config_file = std::fs::File::open(&args.config).context("failed to open config file")?;
    let config: Config =
        serde_yaml::from_reader(config_file).context("failed to parse config YAML")?;

    let spec = config.spec()?;
    let issuer = Issuer::new(&config.target, spec.request_timeout)?;

    if config.health_check != HealthCheck::Off
        && let Err(err) = issuer.health().await
    {
        match config.health_check {
            HealthCheck::Skip => {
                tracing::warn!("target unreachable, skipping run: {err:#}");
                return Ok(());
            }
            _ => return Err(err.context("target health check failed")),
        }
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted, terminating run early");
                cancel.cancel();
            }
        }
    });

    let bar = ProgressBar::new_spinner()
        .with_style(ProgressStyle::with_template("{spinner} {msg} {elapsed}")?)
        .with_message("Running blobbench:");
    bar.enable_steady_tick(Duration::from_millis(100));

    let run_report = blobbench::run_with_cancel(issuer, spec, cancel).await;
    bar.finish_and_clear();

    report::print(&run_report);
    tracing::info!(
        status = ?run_report.status,
        successes = run_report.successes(),
        failures = run_report.failures(),
        dropped = run_report.dropped,
        "run finished"
    );

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("blobbench=info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}
