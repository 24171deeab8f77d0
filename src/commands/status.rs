use anyhow::Result;
use std::env;

use crate::commands::{CommandReport, Runtime};
use crate::remote::SessionService;

include!(concat!(env!("OUT_DIR"), "/trail_env_keys.rs"));

const SECRET_KEYS: &[&str] = &["TRAIL_API_TOKEN"];

/// Names of recognised variables currently set; secret values are masked.
pub fn env_overrides() -> Vec<String> {
    GENERATED_TRAIL_ENV_KEYS
        .iter()
        .filter_map(|key| {
            let value = env::var(key).ok().filter(|v| !v.trim().is_empty())?;
            if SECRET_KEYS.contains(key) {
                Some(format!("{key}=<set>"))
            } else {
                Some(format!("{key}={value}"))
            }
        })
        .collect()
}

fn remote_checks(service: &dyn SessionService, report: &mut CommandReport) {
    match service.validate_credential() {
        Ok(info) => report.detail(format!(
            "credential user={} plan={}",
            info.user_id,
            info.plan.as_deref().unwrap_or("unknown")
        )),
        Err(err) => {
            report.issue(format!("credential check failed: {err:#}"));
            return;
        }
    }

    match service.get_quota() {
        Ok(q) if q.is_unlimited() => report.detail(format!("quota used={} unlimited", q.current_count)),
        Ok(q) => {
            report.detail(format!(
                "quota used={} limit={} remaining={}",
                q.current_count, q.limit, q.remaining
            ));
            if q.remaining <= 0 {
                report.issue(format!("session limit reached; upgrade at {}", q.upgrade_url()));
            }
        }
        Err(err) => report.issue(format!("quota lookup failed: {err:#}")),
    }
}

pub fn run(offline: bool) -> Result<CommandReport> {
    let rt = Runtime::load()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("trail_home={}", rt.paths.trail_home.display()));
    report.detail(format!("state_dir={}", rt.paths.state_dir.display()));
    report.detail(format!("logs_dir={}", rt.paths.logs_dir.display()));
    report.detail(format!("config_file={}", rt.paths.config_file.display()));
    report.detail(format!(
        "transcripts_root={}",
        rt.paths.transcripts_root.display()
    ));
    report.detail(format!("api_url={}", rt.config.api.base_url));
    report.detail(format!(
        "encryption_mode={}",
        rt.config.default_encryption_mode().as_str()
    ));
    for line in env_overrides() {
        report.detail(format!("env {line}"));
    }

    if !rt.paths.transcripts_root.exists() {
        report.detail("transcripts_root does not exist yet");
    }
    if rt.config.api.token.is_none() {
        report.issue("no API token configured (TRAIL_API_TOKEN or [api].token)");
        return Ok(report);
    }
    if offline {
        report.detail("offline=true");
        return Ok(report);
    }

    let service = rt.service()?;
    remote_checks(&service, &mut report);
    Ok(report)
}
