use std::env;
use std::path::{Path, PathBuf};

fn home_dotenv(trail_home: Option<PathBuf>, home_dir: Option<PathBuf>) -> Option<PathBuf> {
    match trail_home {
        Some(dir) => Some(dir.join(".env")),
        None => home_dir.map(|home| home.join(".trail").join(".env")),
    }
}

fn load_file(path: &Path) -> bool {
    path.is_file() && dotenvy::from_path(path).is_ok()
}

/// Load `./.env`, then the trail home `.env`. Variables already present
/// (from the process or an earlier file) are never overwritten.
pub fn load_dotenv() -> Vec<PathBuf> {
    let mut loaded = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        let local = cwd.join(".env");
        if load_file(&local) {
            loaded.push(local);
        }
    }

    // TRAIL_HOME may itself come from the local file.
    let trail_home = env::var_os("TRAIL_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from);
    if let Some(path) = home_dotenv(trail_home, dirs::home_dir())
        && !loaded.contains(&path)
        && load_file(&path)
    {
        loaded.push(path);
    }
    loaded
}
