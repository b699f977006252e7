//! jobpool runner - Main Entry Point
//! Submits `1..=jobs`, closes the input, drains every result, shuts down.

mod logging;
mod settings;

use anyhow::{Context, Result};
use clap::Parser;
use jobpool_core::{JobResult, PoolError, WorkerPool};
use logging::LogFormat;
use settings::Settings;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "jobpool")]
#[command(about = "Run jobs through a bounded worker pool", long_about = None)]
#[command(version)]
struct Cli {
    /// Settings file (TOML, YAML or JSON)
    #[arg(short, long, env = "JOBPOOL_CONFIG")]
    config: Option<PathBuf>,

    /// Number of worker units
    #[arg(short, long)]
    workers: Option<usize>,

    /// Bound on the input queue
    #[arg(long)]
    input_capacity: Option<usize>,

    /// Bound on the output queue
    #[arg(long)]
    output_capacity: Option<usize>,

    /// Number of jobs to submit (values 1..=jobs)
    #[arg(short = 'n', long)]
    jobs: Option<u32>,

    /// Give up draining after this many milliseconds
    #[arg(long)]
    drain_timeout_ms: Option<u64>,

    /// Console log format: pretty or json
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Print results as JSON on stdout
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(workers) = self.workers {
            settings.worker_count = workers;
        }
        if let Some(capacity) = self.input_capacity {
            settings.input_capacity = capacity;
        }
        if let Some(capacity) = self.output_capacity {
            settings.output_capacity = capacity;
        }
        if let Some(jobs) = self.jobs {
            settings.jobs = jobs;
        }
        if let Some(ms) = self.drain_timeout_ms {
            settings.drain_timeout_ms = ms;
        }
        if let Some(format) = self.log_format {
            settings.log_format = format.to_string();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let mut settings = Settings::load(cli.config.as_deref())?;
    cli.apply(&mut settings);

    // 2. Initialize logging
    let log_format: LogFormat = settings
        .log_format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let _log_guard = logging::init(log_format, settings.log_dir.as_deref())?;

    info!("jobpool v{} starting...", VERSION);
    info!(
        worker_count = settings.worker_count,
        input_capacity = settings.input_capacity,
        output_capacity = settings.output_capacity,
        jobs = settings.jobs,
        "Settings loaded"
    );

    // 3. Start the pool
    let pool = Arc::new(WorkerPool::with_defaults(settings.pool_config())?);

    // 4. Cancel on Ctrl+C
    let cancel = pool.cancel_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received Ctrl+C, cancelling");
                cancel.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    });

    // 5. Produce concurrently with draining
    let producer = {
        let pool = Arc::clone(&pool);
        let jobs = settings.jobs;
        tokio::spawn(async move {
            for value in 1..=i64::from(jobs) {
                pool.submit(value).await?;
            }
            pool.close_input()
        })
    };

    let drained = pool
        .collect_results_timeout(settings.jobs as usize, settings.drain_timeout())
        .await;
    if drained.is_err() {
        // Producer may be suspended on a full input queue
        pool.cancel();
    }
    let produced = producer.await.context("Producer task failed")?;

    let mut results = match (drained, produced) {
        (Ok(results), Ok(())) => results,
        (Err(e), _) | (_, Err(e)) => {
            pool.cancel();
            return Err(report_failure(e));
        }
    };
    results.sort_by_key(JobResult::job_id);

    // 6. Report
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_results(&results);
    }

    // 7. Shutdown
    let pool = Arc::try_unwrap(pool)
        .map_err(|_| anyhow::anyhow!("Worker pool still shared at shutdown"))?;
    let reports = pool.shutdown().await?;
    info!(workers = reports.len(), results = results.len(), "Session complete");

    Ok(())
}

fn print_results(results: &[JobResult]) {
    for result in results {
        match &result.output {
            Ok(value) => println!(
                "{} value={} -> {} ({})",
                result.job.id, result.job.value, value, result.worker_id
            ),
            Err(e) => println!(
                "{} value={} -> error: {} ({})",
                result.job.id, result.job.value, e, result.worker_id
            ),
        }
    }
}

fn report_failure(e: PoolError) -> anyhow::Error {
    match &e {
        PoolError::DrainTimeout {
            expected,
            received,
            ..
        } => {
            error!(expected, received, "Results did not arrive in time")
        }
        PoolError::Cancelled => warn!("Session cancelled"),
        _ => error!(error = %e, "Session failed"),
    }
    anyhow::Error::new(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> Settings {
        Settings {
            worker_count: 3,
            input_capacity: 5,
            output_capacity: 5,
            jobs: 5,
            drain_timeout_ms: 5000,
            log_format: "pretty".to_string(),
            log_dir: None,
        }
    }

    #[test]
    fn test_cli_flags_override_settings() {
        let cli = Cli::try_parse_from([
            "jobpool",
            "--workers",
            "10",
            "-n",
            "100",
            "--log-format",
            "json",
        ])
        .unwrap();

        let mut settings = settings();
        cli.apply(&mut settings);
        assert_eq!(settings.worker_count, 10);
        assert_eq!(settings.jobs, 100);
        assert_eq!(settings.log_format, "json");
        assert_eq!(settings.input_capacity, 5);
    }

    #[test]
    fn test_cli_rejects_unknown_log_format() {
        assert!(Cli::try_parse_from(["jobpool", "--log-format", "xml"]).is_err());
    }
}
