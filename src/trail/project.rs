use crate::remote::{CreateProjectRequest, EncryptionMode, ProjectInfo, SessionService};
use crate::trail::util::output_within;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tracing::{debug, info};

const GIT_DEADLINE: Duration = Duration::from_secs(5);

/// Locally detected identity of the destination project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectHint {
    pub name: String,
    pub path: Option<String>,
    pub git_remote: Option<String>,
}

fn basename(path: &Path) -> Option<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().trim().to_string())
        .filter(|n| !n.is_empty())
}

/// Name comes from the explicit flag, then the session cwd, then the
/// transcript directory.
pub fn detect_project(explicit: Option<&str>, cwd: Option<&str>, fallback_dir: &Path) -> ProjectHint {
    let cwd = cwd.map(str::trim).filter(|c| !c.is_empty());
    let name = explicit
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(ToOwned::to_owned)
        .or_else(|| cwd.and_then(|c| basename(Path::new(c))))
        .or_else(|| basename(fallback_dir))
        .unwrap_or_else(|| "default".to_string());

    let git_remote = cwd.and_then(|c| detect_git_remote(Path::new(c)));
    ProjectHint {
        name,
        path: cwd.map(ToOwned::to_owned),
        git_remote,
    }
}

pub fn detect_git_remote(dir: &Path) -> Option<String> {
    if !dir.is_dir() {
        return None;
    }
    let git = which::which("git").ok()?;
    let mut cmd = Command::new(git);
    cmd.arg("-C")
        .arg(dir)
        .args(["config", "--get", "remote.origin.url"]);
    let output = match output_within(&mut cmd, GIT_DEADLINE) {
        Ok(output) => output,
        Err(err) => {
            debug!(dir = %dir.display(), "git remote lookup failed: {err:#}");
            return None;
        }
    };
    if !output.status.success() {
        return None;
    }
    let remote = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!remote.is_empty()).then_some(remote)
}

/// Look the project up by name, creating it when absent.
pub fn ensure_project(
    service: &dyn SessionService,
    hint: &ProjectHint,
    default_mode: EncryptionMode,
) -> Result<ProjectInfo> {
    let projects = service.get_projects().context("failed to list projects")?;
    if let Some(existing) = projects.into_iter().find(|p| p.name == hint.name) {
        debug!(project = %existing.id, mode = existing.encryption_mode.as_str(), "using existing project");
        return Ok(existing);
    }

    let created = service
        .create_project(&CreateProjectRequest {
            name: hint.name.clone(),
            path: hint.path.clone(),
            git_remote: hint.git_remote.clone(),
            encryption_mode: default_mode,
        })
        .with_context(|| format!("failed to create project `{}`", hint.name))?;
    info!(project = %created.id, name = %created.name, "created project");
    Ok(created)
}
