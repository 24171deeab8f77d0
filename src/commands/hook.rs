use anyhow::{Context, Result};
use serde::Deserialize;
use std::io::Read;
use std::path::PathBuf;

use crate::commands::capture::{self, CaptureOptions};
use crate::commands::{CommandReport, Runtime};

/// Event payload the assistant host writes to the hook's stdin.
#[derive(Debug, Clone, Deserialize)]
pub struct HookEvent {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<PathBuf>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub hook_event_name: Option<String>,
}

pub fn parse_event<R: Read>(mut input: R) -> Result<HookEvent> {
    let mut raw = String::new();
    input
        .read_to_string(&mut raw)
        .context("failed to read hook event from stdin")?;
    serde_json::from_str(raw.trim()).context("hook event is not valid JSON")
}

pub fn run<R: Read>(input: R, project: Option<String>) -> Result<CommandReport> {
    let event = parse_event(input)?;
    let mut report = CommandReport::new("hook");
    report.detail(format!(
        "event={} session={} cwd={}",
        event.hook_event_name.as_deref().unwrap_or("unknown"),
        event.session_id.as_deref().unwrap_or("unknown"),
        event.cwd.as_deref().unwrap_or("unknown")
    ));

    let Some(transcript) = event.transcript_path.filter(|p| !p.as_os_str().is_empty()) else {
        report.issue("hook event carries no transcript_path");
        return Ok(report);
    };

    let rt = Runtime::load()?;
    let opts = CaptureOptions {
        transcript,
        last: None,
        project,
        dry_run: false,
    };
    report.merge(capture::run_with(&rt, &opts)?);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_event_decodes() {
        let raw = r#"{"session_id":"abc","transcript_path":"/tmp/abc.jsonl","cwd":"/src/web","hook_event_name":"Stop","stop_hook_active":false}"#;
        let event = parse_event(raw.as_bytes()).expect("event");
        assert_eq!(event.session_id.as_deref(), Some("abc"));
        assert_eq!(event.transcript_path, Some(PathBuf::from("/tmp/abc.jsonl")));
        assert_eq!(event.hook_event_name.as_deref(), Some("Stop"));
    }

    #[test]
    fn event_without_transcript_is_reported_not_synced() {
        let report = run(r#"{"hook_event_name":"SessionEnd"}"#.as_bytes(), None).expect("report");
        assert!(!report.ok);
        assert_eq!(report.issues, vec!["hook event carries no transcript_path"]);
    }

    #[test]
    fn garbage_input_is_an_error() {
        assert!(parse_event("not json".as_bytes()).is_err());
    }
}
