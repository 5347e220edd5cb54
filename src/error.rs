//! Domain failures that end a gate run.
//!
//! Transport and decode problems travel as plain `anyhow` context chains; the
//! variants here are the outcomes a pipeline operator needs to tell apart.
//! They are raised with `bail!`/`Err(..)?` and can be recovered from an
//! `anyhow::Error` with `downcast_ref::<GateError>()`.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GateError {
    #[error("cannot find report-task.txt under {}", root.display())]
    DescriptorNotFound { root: PathBuf },

    #[error("malformed line {line} in {}: expected 'key = value', got {content:?}", path.display())]
    MalformedDescriptor {
        path: PathBuf,
        line: usize,
        content: String,
    },

    #[error("report descriptor {} has an empty '{key}'", path.display())]
    MissingDescriptorField { path: PathBuf, key: &'static str },

    #[error("analysis task failed with status {status}")]
    TaskFailed { status: String },

    #[error("task timeout after {wait_seconds} seconds")]
    TaskTimedOut { wait_seconds: u64 },

    #[error("quality gate check failed with status {status} ({failing} failing condition(s))")]
    GateFailed { status: String, failing: usize },
}
