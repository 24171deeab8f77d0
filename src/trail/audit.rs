use crate::trail::paths::TrailPaths;
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

const AUDIT_FILE: &str = "audit.log";

/// One line of `logs/audit.log`.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry<'a> {
    pub at: String,
    pub command: &'a str,
    pub status: &'a str,
    pub detail: &'a str,
}

impl<'a> AuditEntry<'a> {
    pub fn now(command: &'a str, status: &'a str, detail: &'a str) -> Self {
        Self {
            at: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            command,
            status,
            detail,
        }
    }
}

pub fn audit_path(paths: &TrailPaths) -> PathBuf {
    paths.logs_dir.join(AUDIT_FILE)
}

fn write_entry(path: &PathBuf, entry: &AuditEntry<'_>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut line = serde_json::to_vec(entry)?;
    line.push(b'\n');
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut file| file.write_all(&line))
        .with_context(|| format!("failed to append to {}", path.display()))
}

/// Audit failures never fail the sync they describe.
pub fn record(paths: &TrailPaths, command: &str, status: &str, detail: &str) {
    let path = audit_path(paths);
    if let Err(err) = write_entry(&path, &AuditEntry::now(command, status, detail)) {
        tracing::debug!("audit append failed: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_append_as_json_lines() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("logs").join(AUDIT_FILE);
        for status in ["ok", "failed"] {
            write_entry(&path, &AuditEntry::now("capture", status, "session=s1")).expect("append");
        }
        let raw = fs::read_to_string(&path).expect("read");
        let lines = raw.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).expect("json");
        assert_eq!(second["status"], "failed");
        assert_eq!(second["command"], "capture");
        assert!(second["at"].as_str().is_some_and(|at| at.ends_with('Z')));
    }
}
