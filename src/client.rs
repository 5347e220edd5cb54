//! Blocking HTTP access to the two analysis-server endpoints the gate needs.
//!
//! Every request carries its own timeout so an unresponsive server cannot hold
//! the process past the caller's wait budget. Callers may shorten a single
//! request further with [`ServerClient::get_json_within`].

use crate::gate::ProjectStatusResponse;
use crate::poller::TaskResponse;
use anyhow::{Context, Result, bail};
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_REDIRECTS: usize = 5;
const ERROR_BODY_SNIPPET: usize = 512;

pub struct ServerClient {
    http: Client,
    request_timeout: Duration,
}

impl ServerClient {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(request_timeout)
            .user_agent(concat!("sonar-gate/", env!("CARGO_PKG_VERSION")))
            .redirect(Policy::limited(MAX_REDIRECTS))
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            http,
            request_timeout,
        })
    }

    /// Fetch the compute-engine task document at `ce_task_url`.
    pub fn fetch_task(&self, ce_task_url: &str, budget: Duration) -> Result<TaskResponse> {
        self.get_json_within(ce_task_url, budget)
            .context("get ce task result")
    }

    /// Fetch the quality-gate status for `project_key`.
    pub fn fetch_project_status(&self, url: &Url) -> Result<ProjectStatusResponse> {
        self.get_json_within(url.as_str(), self.request_timeout)
            .context("get project status result")
    }

    /// GET `url` and decode a JSON body, bounded by `min(budget, request_timeout)`.
    ///
    /// Non-2xx responses are errors carrying the status and the start of the
    /// body; nothing is retried.
    pub fn get_json_within<T: DeserializeOwned>(&self, url: &str, budget: Duration) -> Result<T> {
        let timeout = budget.min(self.request_timeout);
        debug!(url, timeout_ms = timeout.as_millis() as u64, "GET");
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .with_context(|| format!("request {url}"))?;
        let status = response.status();
        let body = response
            .bytes()
            .with_context(|| format!("read response body from {url}"))?;
        if !status.is_success() {
            let snippet = String::from_utf8_lossy(&body[..body.len().min(ERROR_BODY_SNIPPET)]);
            bail!("{url} responded with HTTP {status}: {}", snippet.trim());
        }
        serde_json::from_slice(&body).with_context(|| format!("decode JSON from {url}"))
    }
}

/// Build `{server_url}/api/qualitygates/project_status?projectKey=<key>`.
///
/// The key is percent-encoded and a trailing `/` on the server URL is
/// tolerated, so servers hosted under a context path keep their prefix.
pub fn project_status_url(server_url: &str, project_key: &str) -> Result<Url> {
    let base = if server_url.ends_with('/') {
        server_url.to_string()
    } else {
        format!("{server_url}/")
    };
    let mut url = Url::parse(&base)
        .with_context(|| format!("invalid serverUrl {server_url:?}"))?
        .join("api/qualitygates/project_status")
        .context("build project status URL")?;
    url.query_pairs_mut().append_pair("projectKey", project_key);
    Ok(url)
}
