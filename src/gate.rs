//! Quality-gate evaluation for a project.
//!
//! The server has already computed the gate; this module only reads its
//! verdict and picks out the conditions responsible for a failure so they can
//! be listed before the run fails.

use crate::client::{ServerClient, project_status_url};
use crate::descriptor::ReportDescriptor;
use crate::error::GateError;
use anyhow::Result;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::{error, info};

pub const GATE_OK: &str = "OK";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Envelope returned by `GET /api/qualitygates/project_status`.
pub struct ProjectStatusResponse {
    pub project_status: GateResult,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateResult {
    #[serde(default)]
    pub status: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub conditions: Vec<Map<String, Value>>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub periods: Vec<Map<String, Value>>,
    #[serde(default)]
    pub ignored_conditions: bool,
}

// The server omits or nulls these lists when a gate has no conditions.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Map<String, Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateVerdict {
    pub status: String,
    /// Conditions whose own `status` is not `OK`, in server order. Empty when
    /// the gate passed.
    pub failing_conditions: Vec<Map<String, Value>>,
}

impl GateVerdict {
    pub fn passed(&self) -> bool {
        self.status == GATE_OK
    }
}

/// Apply the pass/fail rule to a gate result.
///
/// An `OK` gate passes regardless of its conditions. Otherwise every condition
/// without a string `status` of `OK` is reported, including conditions that
/// carry no status at all.
pub fn evaluate(result: &GateResult) -> GateVerdict {
    let failing_conditions = if result.status == GATE_OK {
        Vec::new()
    } else {
        result
            .conditions
            .iter()
            .filter(|condition| condition.get("status").and_then(Value::as_str) != Some(GATE_OK))
            .cloned()
            .collect()
    };
    GateVerdict {
        status: result.status.clone(),
        failing_conditions,
    }
}

/// Query the gate once for the descriptor's project and fail unless it is `OK`.
///
/// Each failing condition is logged as compact JSON before the
/// [`GateError::GateFailed`] is returned.
pub fn check_project_status(
    client: &ServerClient,
    descriptor: &ReportDescriptor,
) -> Result<GateVerdict> {
    let url = project_status_url(&descriptor.server_url, &descriptor.project_key)?;
    info!("ProjectStatusUrl: {url}");
    let response = client.fetch_project_status(&url)?;
    let verdict = evaluate(&response.project_status);
    if verdict.passed() {
        info!("PASS SONAR GATEWAY CHECK");
        return Ok(verdict);
    }

    for condition in &verdict.failing_conditions {
        let rendered = Value::Object(condition.clone());
        error!("failed metric: {rendered}");
    }
    Err(GateError::GateFailed {
        status: verdict.status,
        failing: verdict.failing_conditions.len(),
    }
    .into())
}
