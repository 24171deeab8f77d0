use crate::error::{ErrorCode, error_code};
use crate::remote::{EncryptionMode, ProjectInfo, SessionService};
use crate::trail::project::{self, ProjectHint};
use crate::trail::quota::{self, GateDecision, QuotaExceededReport};
use crate::trail::sync::{BulkAppendResult, SyncClient};
use crate::trail::transcript::{
    InteractionKind, ParseOptions, parse_transcript_file, peek_cwd, session_id_from_path,
};
use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SUBAGENT_PREFIX: &str = "agent-";

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub project_name: Option<String>,
    pub parse: ParseOptions,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileResult {
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<bool>,
    pub interaction_count: usize,
    pub interactions_added: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bulk: Option<BulkAppendResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub success: bool,
    pub dry_run: bool,
    pub project: ProjectHint,
    pub total_files: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub was_limited: bool,
    pub results: Vec<FileResult>,
}

impl ImportReport {
    fn new(project: ProjectHint, total_files: usize, dry_run: bool) -> Self {
        Self {
            success: true,
            dry_run,
            project,
            total_files,
            processed: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            was_limited: false,
            results: Vec::new(),
        }
    }

    fn push(&mut self, result: FileResult) {
        self.processed += 1;
        if result.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.success = self.failed == 0;
        self.results.push(result);
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ImportOutcome {
    Completed(ImportReport),
    QuotaExceeded(QuotaExceededReport),
}

fn is_candidate(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    path.extension().is_some_and(|ext| ext == "jsonl") && !name.starts_with(SUBAGENT_PREFIX)
}

/// Main-session transcripts in `dir`, sorted by file name.
pub fn list_transcripts(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && is_candidate(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

fn detect_hint(dir: &Path, files: &[PathBuf], opts: &ImportOptions) -> ProjectHint {
    let cwd = files.iter().find_map(|f| peek_cwd(f));
    project::detect_project(opts.project_name.as_deref(), cwd.as_deref(), dir)
}

fn failed_result(path: &Path, session_id: Option<String>, err: &anyhow::Error) -> FileResult {
    FileResult {
        path: path.display().to_string(),
        session_id,
        success: false,
        error: Some(format!("{err:#}")),
        error_code: Some(error_code(err).as_str()),
        ..FileResult::default()
    }
}

/// Parse every candidate without contacting the remote service.
pub fn dry_run_import(dir: &Path, opts: &ImportOptions) -> Result<ImportReport> {
    let files = list_transcripts(dir)?;
    let mut report = ImportReport::new(detect_hint(dir, &files, opts), files.len(), true);

    for path in &files {
        let result = match parse_transcript_file(path, &opts.parse) {
            Ok(session) => FileResult {
                path: path.display().to_string(),
                session_id: Some(session.session_id.clone()),
                success: true,
                interaction_count: session.interactions.len(),
                ..FileResult::default()
            },
            Err(err) => failed_result(path, Some(session_id_from_path(path)), &err),
        };
        report.push(result);
    }
    Ok(report)
}

fn import_file(client: &SyncClient<'_>, project: &ProjectInfo, path: &Path, opts: &ParseOptions) -> FileResult {
    let session = match parse_transcript_file(path, opts) {
        Ok(session) => session,
        Err(err) => return failed_result(path, Some(session_id_from_path(path)), &err),
    };
    let session_id = session.session_id.clone();
    debug!(
        session = %session_id,
        prompts = session.count(InteractionKind::Prompt),
        responses = session.count(InteractionKind::Response),
        "parsed transcript"
    );

    let outcome = match client.sync_session(project, session) {
        Ok(outcome) => outcome,
        Err(err) => return failed_result(path, Some(session_id), &err),
    };

    // Dropped chunks fail the file so a rerun picks it up again.
    let dropped = outcome.bulk.as_ref().map_or(0, |b| b.failed);
    let (error, error_code) = if dropped > 0 {
        (
            Some(format!(
                "{dropped} of {} interactions were not appended",
                outcome.interaction_count
            )),
            Some(ErrorCode::PartialAppend.as_str()),
        )
    } else {
        (None, None)
    };
    FileResult {
        path: path.display().to_string(),
        session_id: Some(outcome.session_id),
        success: dropped == 0,
        created: Some(outcome.created),
        interaction_count: outcome.interaction_count,
        interactions_added: outcome.interactions_added,
        bulk: outcome.bulk,
        error,
        error_code,
    }
}

/// Sync a whole transcripts directory into one project. A failing file never
/// stops the files after it.
pub fn run_import(
    service: &dyn SessionService,
    client: &SyncClient<'_>,
    dir: &Path,
    opts: &ImportOptions,
    default_mode: EncryptionMode,
) -> Result<ImportOutcome> {
    let files = list_transcripts(dir)?;
    let hint = detect_hint(dir, &files, opts);
    if files.is_empty() {
        return Ok(ImportOutcome::Completed(ImportReport::new(hint, 0, false)));
    }

    let project = project::ensure_project(service, &hint, default_mode)?;
    let snapshot = service
        .get_quota()
        .context("failed to fetch session quota")?;

    let total_files = files.len();
    let (attempt, skipped) = match quota::apply_gate(&snapshot, files) {
        GateDecision::Exceeded { .. } => {
            info!(current = snapshot.current_count, limit = snapshot.limit, "session quota exhausted");
            return Ok(ImportOutcome::QuotaExceeded(QuotaExceededReport::new(
                &snapshot,
                total_files,
            )));
        }
        GateDecision::Proceed { attempt, skipped } => (attempt, skipped),
    };

    let mut report = ImportReport::new(hint, total_files, false);
    report.skipped = skipped.len();
    report.was_limited = !skipped.is_empty();

    for path in &attempt {
        let result = import_file(client, &project, path, &opts.parse);
        report.push(result);
    }

    info!(
        project = %project.id,
        succeeded = report.succeeded,
        failed = report.failed,
        skipped = report.skipped,
        "import finished"
    );
    Ok(ImportOutcome::Completed(report))
}
