use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::commands::{CommandReport, Runtime};
use crate::trail::transcript::{
    InteractionKind, ParseOptions, ParsedSession, parse_transcript_file,
};
use crate::trail::{audit, project, quota};

#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    pub transcript: PathBuf,
    pub last: Option<usize>,
    pub project: Option<String>,
    pub dry_run: bool,
}

fn describe(report: &mut CommandReport, session: &ParsedSession) {
    report.detail(format!("session_id={}", session.session_id));
    report.detail(format!("source={}", session.source_path.display()));
    report.detail(format!("start_time={}", session.start_time));
    report.detail(format!("end_time={}", session.end_time));
    report.detail(format!(
        "interactions={} prompts={} responses={} tool_calls={}",
        session.interactions.len(),
        session.count(InteractionKind::Prompt),
        session.count(InteractionKind::Response),
        session.count(InteractionKind::ToolCall),
    ));
    report.detail(format!(
        "tokens input={} output={} cache_create={} cache_read={}",
        session.tokens.input,
        session.tokens.output,
        session.tokens.cache_create,
        session.tokens.cache_read,
    ));
    if !session.progress_snapshots.is_empty()
        || !session.sub_sessions.is_empty()
        || !session.attachments.is_empty()
    {
        report.detail(format!(
            "progress_snapshots={} sub_sessions={} attachments={}",
            session.progress_snapshots.len(),
            session.sub_sessions.len(),
            session.attachments.len(),
        ));
    }
}

fn sync(
    rt: &Runtime,
    opts: &CaptureOptions,
    session: ParsedSession,
    report: &mut CommandReport,
) -> Result<()> {
    let service = rt.service()?;
    quota::check_advisory(&service, &session.session_id);

    let fallback_dir = opts.transcript.parent().unwrap_or(Path::new("."));
    let hint = project::detect_project(opts.project.as_deref(), session.cwd.as_deref(), fallback_dir);
    let project = project::ensure_project(&service, &hint, rt.config.default_encryption_mode())?;
    report.detail(format!(
        "project={} id={} mode={}",
        project.name,
        project.id,
        project.encryption_mode.as_str()
    ));

    let client = rt.sync_client(&service);
    let outcome = client.sync_session(&project, session)?;
    report.detail(format!(
        "{} interactions_added={} encrypted={}",
        if outcome.created { "created" } else { "updated" },
        outcome.interactions_added,
        outcome.encrypted
    ));
    if let Some(bulk) = outcome.bulk {
        report.detail(format!(
            "bulk chunks={} processed={} failed={}",
            bulk.chunks, bulk.processed, bulk.failed
        ));
        if bulk.failed > 0 {
            report.issue(format!(
                "{} of {} interactions were not appended (batches {:?})",
                bulk.failed, outcome.interaction_count, bulk.failed_batches
            ));
        }
    }
    Ok(())
}

pub fn run(opts: &CaptureOptions) -> Result<CommandReport> {
    let rt = Runtime::load()?;
    run_with(&rt, opts)
}

pub fn run_with(rt: &Runtime, opts: &CaptureOptions) -> Result<CommandReport> {
    let parse = ParseOptions {
        last_exchanges: opts.last.unwrap_or(rt.config.sync.last_exchanges),
        tool_name: rt.config.sync.tool_name.clone(),
    };
    let session = parse_transcript_file(&opts.transcript, &parse)?;

    let mut report = CommandReport::new("capture");
    describe(&mut report, &session);
    if opts.dry_run {
        report.detail("dry_run=true");
        return Ok(report);
    }

    let session_id = session.session_id.clone();
    match sync(rt, opts, session, &mut report) {
        Ok(()) => {
            let status = if report.ok { "ok" } else { "partial" };
            audit::record(&rt.paths, "capture", status, &format!("session={session_id}"));
            Ok(report)
        }
        Err(err) => {
            audit::record(
                &rt.paths,
                "capture",
                "failed",
                &format!("session={session_id} err={err:#}"),
            );
            Err(err)
        }
    }
}
