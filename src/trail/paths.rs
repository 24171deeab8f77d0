use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct TrailPaths {
    pub trail_home: PathBuf,
    pub state_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub locks_dir: PathBuf,
    pub config_file: PathBuf,
    pub transcripts_root: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<TrailPaths> {
    let home = required_home_dir()?;
    let trail_home = env_or_default_path("TRAIL_HOME", home.join(".trail"));

    let state_dir = env_or_default_path("TRAIL_STATE_DIR", trail_home.join("state"));
    let logs_dir = env_or_default_path("TRAIL_LOGS_DIR", trail_home.join("logs"));
    let locks_dir = state_dir.join("locks");
    let config_file = env_or_default_path("TRAIL_CONFIG_PATH", trail_home.join("config.toml"));
    let transcripts_root =
        env_or_default_path("TRAIL_TRANSCRIPTS_DIR", home.join(".claude/projects"));

    Ok(TrailPaths {
        trail_home,
        state_dir,
        logs_dir,
        locks_dir,
        config_file,
        transcripts_root,
    })
}
