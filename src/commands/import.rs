use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

use crate::commands::Runtime;
use crate::error::TrailError;
use crate::trail::audit;
use crate::trail::import::{self, ImportOptions, ImportOutcome};
use crate::trail::transcript::ParseOptions;

#[derive(Debug, Clone, Default)]
pub struct ImportArgs {
    pub dir: Option<PathBuf>,
    pub project: Option<String>,
    pub last: Option<usize>,
    pub dry_run: bool,
}

/// Transcript directories are named after the project path with every
/// non-alphanumeric character replaced by `-`.
pub fn encode_project_dir(cwd: &Path) -> String {
    cwd.to_string_lossy()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

fn resolve_dir(rt: &Runtime, args: &ImportArgs) -> Result<PathBuf> {
    if let Some(dir) = &args.dir {
        return Ok(dir.clone());
    }
    let cwd = env::current_dir()?;
    Ok(rt.paths.transcripts_root.join(encode_project_dir(&cwd)))
}

/// Returns the outcome for printing; unsuccessful outcomes are reported by
/// the caller after the JSON is written.
pub fn run(args: &ImportArgs) -> Result<ImportOutcome> {
    let rt = Runtime::load()?;
    let dir = resolve_dir(&rt, args)?;
    let opts = ImportOptions {
        project_name: args.project.clone(),
        parse: ParseOptions {
            last_exchanges: args.last.unwrap_or(rt.config.sync.last_exchanges),
            tool_name: rt.config.sync.tool_name.clone(),
        },
    };

    if args.dry_run {
        return Ok(ImportOutcome::Completed(import::dry_run_import(&dir, &opts)?));
    }

    let service = rt.service()?;
    let client = rt.sync_client(&service);
    let outcome = import::run_import(
        &service,
        &client,
        &dir,
        &opts,
        rt.config.default_encryption_mode(),
    );

    let (status, message) = match &outcome {
        Ok(ImportOutcome::Completed(r)) => (
            if r.success { "ok" } else { "partial" },
            format!(
                "dir={} succeeded={} failed={} skipped={}",
                dir.display(),
                r.succeeded,
                r.failed,
                r.skipped
            ),
        ),
        Ok(ImportOutcome::QuotaExceeded(q)) => (
            "rejected",
            format!("dir={} quota={}/{}", dir.display(), q.current_count, q.limit),
        ),
        Err(err) => ("failed", format!("dir={} err={err:#}", dir.display())),
    };
    audit::record(&rt.paths, "import", status, &message);
    outcome
}

/// Exit status for an outcome already printed to stdout.
pub fn outcome_result(outcome: &ImportOutcome) -> Result<()> {
    match outcome {
        ImportOutcome::Completed(report) if report.success => Ok(()),
        ImportOutcome::Completed(report) => anyhow::bail!(
            "{} of {} transcripts failed",
            report.failed,
            report.processed
        ),
        ImportOutcome::QuotaExceeded(q) => Err(TrailError::QuotaExceeded {
            current_count: q.current_count,
            limit: q.limit,
            upgrade_url: q.upgrade_url.clone(),
        }
        .into()),
    }
}
