//! Library side of the `sonar-gate` pipeline check.
//!
//! A run finds the scanner's `report-task.txt`, waits for the analysis task it
//! points at, then asks the server whether the project passed its quality
//! gate. Every failure comes back to the caller as an error; only the binary
//! turns that into a process exit status, so the whole flow can be exercised
//! from tests against a mock server.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub mod client;
pub mod descriptor;
pub mod error;
pub mod gate;
pub mod logging;
pub mod poller;

pub use client::{ServerClient, project_status_url};
pub use descriptor::{DESCRIPTOR_FILE_NAME, ReportDescriptor, find_descriptor};
pub use error::GateError;
pub use gate::{GateResult, GateVerdict, check_project_status, evaluate};
pub use poller::{Clock, PollOptions, SystemClock, TaskState, TaskStatus, wait_for_task};

#[derive(Debug, Clone)]
/// Inputs for one gate run.
pub struct GateConfig {
    /// Directory searched for the descriptor, or the descriptor file itself.
    pub report_task_path: PathBuf,
    pub max_depth: usize,
    pub poll: PollOptions,
    /// Upper bound for any single HTTP request.
    pub request_timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            report_task_path: PathBuf::from("."),
            max_depth: descriptor::DEFAULT_MAX_DEPTH,
            poll: PollOptions::default(),
            request_timeout: client::DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
/// Everything a passing run learned along the way.
pub struct Verdict {
    pub descriptor_path: PathBuf,
    pub descriptor: ReportDescriptor,
    pub task: TaskStatus,
    pub gate: GateVerdict,
}

/// Locate and parse the descriptor under `root`.
pub fn load_descriptor(root: &Path, max_depth: usize) -> Result<(PathBuf, ReportDescriptor)> {
    let path = find_descriptor(root, max_depth)?.ok_or_else(|| GateError::DescriptorNotFound {
        root: root.to_path_buf(),
    })?;
    info!("detect report file: {}", path.display());
    let descriptor = ReportDescriptor::load(&path)?;
    Ok((path, descriptor))
}

/// Run the full check with the wall clock.
pub fn run(config: &GateConfig) -> Result<Verdict> {
    run_with_clock(config, &SystemClock)
}

/// Descriptor, then task wait, then gate query. The first failure ends the run.
pub fn run_with_clock<C: Clock>(config: &GateConfig, clock: &C) -> Result<Verdict> {
    let (descriptor_path, descriptor) =
        load_descriptor(&config.report_task_path, config.max_depth)?;
    descriptor.validate_for_gate(&descriptor_path)?;
    info!("DashboardUrl: {}", descriptor.dashboard_url);

    let client = ServerClient::new(config.request_timeout)?;

    info!("CeTaskUrl: {}", descriptor.ce_task_url);
    let task = wait_for_task(clock, &config.poll, |budget| {
        client
            .fetch_task(&descriptor.ce_task_url, budget)
            .map(|response| response.task)
    })
    .with_context(|| format!("waiting for analysis task {}", descriptor.ce_task_id))?;

    let gate = check_project_status(&client, &descriptor)
        .with_context(|| format!("quality gate for project {}", descriptor.project_key))?;

    Ok(Verdict {
        descriptor_path,
        descriptor,
        task,
        gate,
    })
}
