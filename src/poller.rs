//! Wait loop for the server-side analysis task.
//!
//! The scanner uploads a report and returns immediately; the server processes
//! it asynchronously as a compute-engine task. [`wait_for_task`] polls the
//! task URL until the task succeeds, fails, or the wait budget runs out.
//! Time is read through [`Clock`] so the loop can be driven without sleeping.

use crate::error::GateError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub const DEFAULT_WAIT: Duration = Duration::from_secs(300);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Deserialize)]
/// Envelope returned by `GET {ceTaskUrl}`.
pub struct TaskResponse {
    pub task: TaskStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub component_key: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Polling,
    Succeeded,
    Failed,
    TimedOut,
}

impl TaskState {
    /// Map a reported task status onto the poll state machine.
    ///
    /// Only `PENDING` and `IN_PROGRESS` keep polling; anything other than
    /// `SUCCESS` (`FAILED`, `CANCELED`, or a value this tool does not know)
    /// is terminal.
    pub fn from_status(status: &str) -> Self {
        match status {
            "SUCCESS" => TaskState::Succeeded,
            "PENDING" | "IN_PROGRESS" => TaskState::Polling,
            _ => TaskState::Failed,
        }
    }
}

pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollOptions {
    /// Total budget measured from the first call to [`wait_for_task`].
    pub wait: Duration,
    /// Pause between a non-terminal response and the next request.
    pub interval: Duration,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            wait: DEFAULT_WAIT,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Poll until the task reports `SUCCESS`.
///
/// `fetch` performs one request and receives the time left before the
/// deadline so it can bound its own I/O. A fetch error is returned as-is
/// unless the deadline has passed by the time it fails, in which case the
/// run is reported as a timeout. The deadline is checked before every
/// request; sleeps are clipped so they never run past it. A wait too large
/// to represent as an `Instant` never expires.
pub fn wait_for_task<C, F>(clock: &C, options: &PollOptions, mut fetch: F) -> Result<TaskStatus>
where
    C: Clock,
    F: FnMut(Duration) -> Result<TaskStatus>,
{
    let deadline = clock.now().checked_add(options.wait);
    let remaining = || match deadline {
        Some(deadline) => deadline.saturating_duration_since(clock.now()),
        None => Duration::MAX,
    };

    let (state, last) = loop {
        let budget = remaining();
        if budget.is_zero() {
            break (TaskState::TimedOut, None);
        }

        let task = match fetch(budget) {
            Ok(task) => task,
            Err(err) if remaining().is_zero() => {
                warn!("last task request failed at the deadline: {err:#}");
                break (TaskState::TimedOut, None);
            }
            Err(err) => return Err(err),
        };

        match TaskState::from_status(&task.status) {
            TaskState::Polling => {
                info!(status = %task.status, "WAITING......");
                clock.sleep(options.interval.min(remaining()));
            }
            state => break (state, Some(task)),
        }
    };

    match (state, last) {
        (TaskState::Succeeded, Some(task)) => {
            info!(task_id = %task.id, "ce task completed");
            Ok(task)
        }
        (TaskState::TimedOut, _) | (_, None) => Err(GateError::TaskTimedOut {
            wait_seconds: options.wait.as_secs(),
        }
        .into()),
        (_, Some(task)) => Err(GateError::TaskFailed {
            status: task.status,
        }
        .into()),
    }
}
