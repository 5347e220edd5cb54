use anyhow::{Context, Result};
use sonar_gate::DESCRIPTOR_FILE_NAME;
use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use tiny_http::{Header, Response, Server};
use tracing_subscriber::fmt::MakeWriter;

pub const TASK_PATH: &str = "/api/ce/task";
pub const GATE_PATH: &str = "/api/qualitygates/project_status";

/// Canned reply for one endpoint.
#[derive(Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn json(body: serde_json::Value) -> Self {
        Self {
            status: 200,
            body: body.to_string(),
        }
    }

    pub fn raw(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn task(status: &str) -> Self {
        Self::json(serde_json::json!({
            "task": {"id": "abc", "componentKey": "my-proj", "status": status}
        }))
    }
}

#[derive(Default)]
struct Script {
    task: VecDeque<Reply>,
    gate: Option<Reply>,
    seen: Vec<String>,
}

/// In-process stand-in for the analysis server.
///
/// Task replies are served in order; the last one repeats once the queue
/// drains. Every request URL is recorded for assertions.
pub struct MockSonar {
    server: Arc<Server>,
    addr: SocketAddr,
    script: Arc<Mutex<Script>>,
    worker: Option<JoinHandle<()>>,
}

impl MockSonar {
    pub fn start(task: Vec<Reply>, gate: Reply) -> Result<Self> {
        let server = Server::http("127.0.0.1:0")
            .map_err(|err| anyhow::anyhow!("start mock server: {err}"))?;
        let addr = server
            .server_addr()
            .to_ip()
            .context("mock server is not listening on TCP")?;
        let server = Arc::new(server);
        let script = Arc::new(Mutex::new(Script {
            task: task.into(),
            gate: Some(gate),
            seen: Vec::new(),
        }));

        let worker = {
            let server = Arc::clone(&server);
            let script = Arc::clone(&script);
            thread::spawn(move || {
                for request in server.incoming_requests() {
                    let reply = {
                        let mut script = script.lock().unwrap_or_else(|err| err.into_inner());
                        script.seen.push(request.url().to_string());
                        let path = request.url().split('?').next().unwrap_or_default();
                        match path {
                            TASK_PATH => {
                                if script.task.len() > 1 {
                                    script.task.pop_front()
                                } else {
                                    script.task.front().cloned()
                                }
                            }
                            GATE_PATH => script.gate.clone(),
                            _ => None,
                        }
                    };
                    let reply = reply.unwrap_or_else(|| Reply::raw(404, "{}"));
                    let header =
                        Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
                            .expect("static header");
                    let response = Response::from_string(reply.body)
                        .with_status_code(reply.status)
                        .with_header(header);
                    let _ = request.respond(response);
                }
            })
        };

        Ok(Self {
            server,
            addr,
            script,
            worker: Some(worker),
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn task_url(&self) -> String {
        format!("{}{TASK_PATH}?id=abc", self.base_url())
    }

    /// Request URLs (path and query) in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.script
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .seen
            .clone()
    }

    /// Write a descriptor under `dir/sub` that points at this server.
    pub fn descriptor_in(&self, dir: &Path, sub: &str, project_key: &str) -> Result<PathBuf> {
        write_descriptor(dir, sub, project_key, &self.base_url(), &self.task_url())
    }

    pub fn count(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|url| url.starts_with(path))
            .count()
    }
}

impl Drop for MockSonar {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Write a descriptor pointing at `server_url`/`ce_task_url` under `dir/sub`.
pub fn write_descriptor(
    dir: &Path,
    sub: &str,
    project_key: &str,
    server_url: &str,
    ce_task_url: &str,
) -> Result<PathBuf> {
    let target_dir = dir.join(sub);
    std::fs::create_dir_all(&target_dir)?;
    let path = target_dir.join(DESCRIPTOR_FILE_NAME);
    let body = format!(
        "projectKey = {project_key}\n\
         serverUrl = {server_url}\n\
         serverVersion = 9.9.1.69595\n\
         dashboardUrl = {server_url}/dashboard?id={project_key}\n\
         ceTaskId = abc\n\
         ceTaskUrl = {ce_task_url}\n"
    );
    std::fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

/// Collects formatted log output so tests can assert on what was logged.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Run `f` with a plain-text subscriber writing into this capture.
    pub fn record<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        let buf = self.0.lock().unwrap_or_else(|err| err.into_inner());
        String::from_utf8_lossy(&buf)
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
