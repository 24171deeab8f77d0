use crate::error::TrailError;
use crate::remote::EncryptionMode;
use crate::trail::paths::TrailPaths;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.trailsync.dev";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    #[serde(default)]
    pub token: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Exchanges kept by `capture`/`hook`; 0 keeps the whole transcript.
    pub last_exchanges: usize,
    pub chunk_size: usize,
    pub inline_interaction_limit: usize,
    pub tool_name: String,
    #[serde(default = "default_encryption_mode")]
    pub encryption_mode: String,
}

fn default_encryption_mode() -> String {
    EncryptionMode::Enhanced.as_str().to_string()
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            last_exchanges: 0,
            chunk_size: 500,
            inline_interaction_limit: 1000,
            tool_name: "claude-code".to_string(),
            encryption_mode: default_encryption_mode(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub light_secs: u64,
    pub heavy_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            light_secs: 10,
            heavy_secs: 60,
        }
    }
}

impl TimeoutConfig {
    pub fn light(&self) -> Duration {
        Duration::from_secs(self.light_secs)
    }

    pub fn heavy(&self) -> Duration {
        Duration::from_secs(self.heavy_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptionConfig {
    pub team_key_ttl_secs: u64,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            team_key_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrailConfig {
    pub api: ApiConfig,
    pub sync: SyncConfig,
    pub timeouts: TimeoutConfig,
    pub encryption: EncryptionConfig,
}

impl TrailConfig {
    pub fn default_encryption_mode(&self) -> EncryptionMode {
        EncryptionMode::parse(&self.sync.encryption_mode).unwrap_or(EncryptionMode::Enhanced)
    }

    pub fn team_key_ttl(&self) -> Duration {
        Duration::from_secs(self.encryption.team_key_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialTrailConfig {
    api: Option<ApiConfig>,
    sync: Option<SyncConfig>,
    timeouts: Option<TimeoutConfig>,
    encryption: Option<EncryptionConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn env_non_empty(var: &str) -> Option<String> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

fn validate(cfg: &TrailConfig) -> Result<(), TrailError> {
    if cfg.api.base_url.trim().is_empty() {
        return Err(TrailError::InvalidConfig(
            "api base url cannot be empty".to_string(),
        ));
    }
    if cfg.sync.chunk_size == 0 {
        return Err(TrailError::InvalidConfig(
            "sync chunk size must be >= 1".to_string(),
        ));
    }
    if cfg.sync.inline_interaction_limit == 0 {
        return Err(TrailError::InvalidConfig(
            "inline interaction limit must be >= 1".to_string(),
        ));
    }
    if cfg.sync.tool_name.trim().is_empty() {
        return Err(TrailError::InvalidConfig(
            "tool name cannot be empty".to_string(),
        ));
    }
    if EncryptionMode::parse(&cfg.sync.encryption_mode).is_none() {
        return Err(TrailError::InvalidConfig(format!(
            "unknown encryption mode `{}`; use `enhanced`, `e2e`, or `zero_knowledge`",
            cfg.sync.encryption_mode
        )));
    }
    if cfg.timeouts.light_secs == 0 || cfg.timeouts.heavy_secs == 0 {
        return Err(TrailError::InvalidConfig(
            "call deadlines must be >= 1 second".to_string(),
        ));
    }
    if cfg.encryption.team_key_ttl_secs == 0 {
        return Err(TrailError::InvalidConfig(
            "team key ttl must be >= 1 second".to_string(),
        ));
    }
    Ok(())
}

fn merge_raw_config(base: &mut TrailConfig, raw: &str, origin: &Path) -> Result<(), TrailError> {
    let parsed: PartialTrailConfig = toml::from_str(raw).map_err(|err| {
        TrailError::InvalidConfig(format!("failed to parse {}: {err}", origin.display()))
    })?;
    if let Some(api) = parsed.api {
        base.api = api;
    }
    if let Some(sync) = parsed.sync {
        base.sync = sync;
    }
    if let Some(timeouts) = parsed.timeouts {
        base.timeouts = timeouts;
    }
    if let Some(encryption) = parsed.encryption {
        base.encryption = encryption;
    }
    Ok(())
}

fn merge_file_config(base: &mut TrailConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path).map_err(|err| {
        TrailError::InvalidConfig(format!("failed to read {}: {err}", path.display()))
    })?;
    merge_raw_config(base, &raw, path)?;
    Ok(())
}

pub fn load_config(paths: &TrailPaths) -> Result<TrailConfig> {
    let mut cfg = TrailConfig::default();
    merge_file_config(&mut cfg, &paths.config_file)?;

    cfg.api.base_url = env_or_string("TRAIL_API_URL", &cfg.api.base_url);
    if let Some(token) = env_non_empty("TRAIL_API_TOKEN") {
        cfg.api.token = Some(token);
    }
    cfg.sync.last_exchanges = env_or_usize("TRAIL_LAST_EXCHANGES", cfg.sync.last_exchanges);
    cfg.sync.chunk_size = env_or_usize("TRAIL_CHUNK_SIZE", cfg.sync.chunk_size);
    cfg.sync.inline_interaction_limit =
        env_or_usize("TRAIL_INLINE_LIMIT", cfg.sync.inline_interaction_limit);
    cfg.sync.tool_name = env_or_string("TRAIL_TOOL_NAME", &cfg.sync.tool_name);
    cfg.sync.encryption_mode = env_or_string("TRAIL_ENCRYPTION_MODE", &cfg.sync.encryption_mode);
    cfg.timeouts.light_secs = env_or_u64("TRAIL_LIGHT_TIMEOUT_SECS", cfg.timeouts.light_secs);
    cfg.timeouts.heavy_secs = env_or_u64("TRAIL_HEAVY_TIMEOUT_SECS", cfg.timeouts.heavy_secs);
    cfg.encryption.team_key_ttl_secs =
        env_or_u64("TRAIL_TEAM_KEY_TTL_SECS", cfg.encryption.team_key_ttl_secs);

    validate(&cfg)?;
    Ok(cfg)
}
