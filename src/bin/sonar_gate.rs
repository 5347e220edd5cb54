//! Pipeline step that blocks until the latest analysis is processed and fails
//! the build when the project's quality gate is not `OK`.
//!
//! Run it from the directory the scanner ran in (or point `--reportTaskPath`
//! at it). Exit status is 0 only when the task succeeded and the gate passed.

use anyhow::{Result, bail};
use clap::Parser;
use sonar_gate::{GateConfig, PollOptions, logging};
use std::path::PathBuf;
use std::time::Duration;
use tracing::error;

#[derive(Debug, Parser)]
#[command(name = "sonar-gate", version, about)]
struct Cli {
    /// Directory to search for report-task.txt, or the file itself.
    #[arg(
        long = "reportTaskPath",
        env = "SONAR_GATE_REPORT_TASK_PATH",
        default_value = "."
    )]
    report_task_path: PathBuf,

    /// Seconds to wait for the analysis task to finish.
    #[arg(long = "waitSeconds", env = "SONAR_GATE_WAIT_SECONDS", default_value_t = 300)]
    wait_seconds: u64,

    /// Seconds between task status requests.
    #[arg(
        long = "pollIntervalSeconds",
        env = "SONAR_GATE_POLL_INTERVAL_SECONDS",
        default_value_t = 2
    )]
    poll_interval_seconds: u64,

    /// Upper bound for a single HTTP request, in seconds.
    #[arg(
        long = "requestTimeoutSeconds",
        env = "SONAR_GATE_REQUEST_TIMEOUT_SECONDS",
        default_value_t = 30
    )]
    request_timeout_seconds: u64,

    /// How many directory levels below the search root to descend.
    #[arg(long = "maxDepth", default_value_t = sonar_gate::descriptor::DEFAULT_MAX_DEPTH)]
    max_depth: usize,
}

impl Cli {
    fn into_config(self) -> Result<GateConfig> {
        if self.poll_interval_seconds == 0 {
            bail!("--pollIntervalSeconds must be at least 1");
        }
        if self.request_timeout_seconds == 0 {
            bail!("--requestTimeoutSeconds must be at least 1");
        }
        Ok(GateConfig {
            report_task_path: self.report_task_path,
            max_depth: self.max_depth,
            poll: PollOptions {
                wait: Duration::from_secs(self.wait_seconds),
                interval: Duration::from_secs(self.poll_interval_seconds),
            },
            request_timeout: Duration::from_secs(self.request_timeout_seconds),
        })
    }
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = Cli::parse().into_config()?;
    sonar_gate::run(&config)?;
    Ok(())
}
