use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive advisory lock on one session; released on drop.
#[derive(Debug)]
pub struct SessionLock {
    file: File,
    path: PathBuf,
}

impl SessionLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn lock_file_name(session_id: &str) -> String {
    let safe: String = session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{safe}.lock")
}

pub fn acquire(locks_dir: &Path, session_id: &str, timeout: Duration) -> Result<SessionLock> {
    fs::create_dir_all(locks_dir)
        .with_context(|| format!("failed to create {}", locks_dir.display()))?;
    let path = locks_dir.join(lock_file_name(session_id));
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let started = Instant::now();
    loop {
        if FileExt::try_lock_exclusive(&file).is_ok() {
            return Ok(SessionLock { file, path });
        }
        if started.elapsed() >= timeout {
            anyhow::bail!(
                "timed out after {}s waiting for session lock {}",
                timeout.as_secs(),
                path.display()
            );
        }
        thread::sleep(POLL_INTERVAL);
    }
}
