//! Discovery and parsing of the scanner's `report-task.txt` descriptor.
//!
//! The scanner writes the descriptor somewhere under its working directory
//! (`.scannerwork/`, `target/sonar/`, `build/sonar/` depending on the build
//! tool). Discovery walks a bounded tree in sorted order so the first match is
//! stable across runs; parsing is a strict `key = value` reader that rejects
//! lines it cannot split instead of guessing.

use crate::error::GateError;
use anyhow::{Context, Result};
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DESCRIPTOR_FILE_NAME: &str = "report-task.txt";

/// Default depth limit for [`find_descriptor`]; the root itself is depth 0.
pub const DEFAULT_MAX_DEPTH: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Metadata the scanner records about one analysis upload.
///
/// Keys absent from the file stay empty. Only `ce_task_url`, `server_url` and
/// `project_key` are needed downstream; see
/// [`ReportDescriptor::validate_for_gate`].
pub struct ReportDescriptor {
    pub project_key: String,
    pub server_url: String,
    pub server_version: String,
    pub dashboard_url: String,
    pub ce_task_id: String,
    pub ce_task_url: String,
}

impl ReportDescriptor {
    /// Read and parse the descriptor at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("open report descriptor {}", path.display()))?;
        Self::parse(BufReader::new(file), path)
    }

    /// Parse descriptor text. `origin` only labels error messages.
    ///
    /// Blank lines are skipped, keys and values are trimmed, the first `=`
    /// splits a line, and later duplicates overwrite earlier ones. Unknown keys
    /// are ignored.
    pub fn parse<R: BufRead>(reader: R, origin: &Path) -> Result<Self> {
        let mut descriptor = ReportDescriptor::default();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.with_context(|| {
                format!("read line {} of {}", idx + 1, origin.display())
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(GateError::MalformedDescriptor {
                    path: origin.to_path_buf(),
                    line: idx + 1,
                    content: line.trim_end().to_string(),
                }
                .into());
            };
            descriptor.assign(key.trim(), value.trim());
        }
        Ok(descriptor)
    }

    fn assign(&mut self, key: &str, value: &str) {
        let slot = match key {
            "projectKey" => &mut self.project_key,
            "serverUrl" => &mut self.server_url,
            "serverVersion" => &mut self.server_version,
            "dashboardUrl" => &mut self.dashboard_url,
            "ceTaskId" => &mut self.ce_task_id,
            "ceTaskUrl" => &mut self.ce_task_url,
            other => {
                debug!(key = other, "ignoring unrecognized descriptor key");
                return;
            }
        };
        *slot = value.to_string();
    }

    /// Fail early when a field the poll or gate request needs is empty.
    pub fn validate_for_gate(&self, origin: &Path) -> Result<(), GateError> {
        let required = [
            ("ceTaskUrl", &self.ce_task_url),
            ("serverUrl", &self.server_url),
            ("projectKey", &self.project_key),
        ];
        for (key, value) in required {
            if value.is_empty() {
                return Err(GateError::MissingDescriptorField {
                    path: origin.to_path_buf(),
                    key,
                });
            }
        }
        Ok(())
    }
}

/// Locate `report-task.txt` under `root`.
///
/// A `root` that is itself a regular file is returned as-is. Otherwise the
/// tree is walked depth-first to at most `max_depth` levels below `root`,
/// checking the files of a directory before its subdirectories, both in
/// file-name order. Directory symlinks are not followed. Any unreadable
/// directory or entry aborts the search with an error naming the path.
pub fn find_descriptor(root: &Path, max_depth: usize) -> Result<Option<PathBuf>> {
    let meta = fs::metadata(root)
        .with_context(|| format!("access report search root {}", root.display()))?;
    if meta.is_file() {
        return Ok(Some(root.to_path_buf()));
    }
    search_dir(root, 0, max_depth)
}

fn search_dir(dir: &Path, depth: usize, max_depth: usize) -> Result<Option<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let file_type = entry
            .file_type()
            .with_context(|| format!("inspect {}", entry.path().display()))?;
        entries.push((entry.file_name(), entry.path(), file_type));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, path, file_type) in &entries {
        if name.as_os_str() != DESCRIPTOR_FILE_NAME {
            continue;
        }
        if file_type.is_file() {
            return Ok(Some(path.clone()));
        }
        if file_type.is_symlink() {
            let target = fs::metadata(path)
                .with_context(|| format!("follow symlink {}", path.display()))?;
            if target.is_file() {
                return Ok(Some(path.clone()));
            }
        }
    }

    if depth >= max_depth {
        return Ok(None);
    }
    for (_, path, file_type) in &entries {
        if !file_type.is_dir() {
            continue;
        }
        if let Some(found) = search_dir(path, depth + 1, max_depth)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}
