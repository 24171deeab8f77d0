use crate::remote::SessionService;
use crate::trail::warn;
use serde::{Deserialize, Serialize};

/// `limit` sentinel for tenants without a session cap.
pub const UNLIMITED: i64 = -1;
pub const DEFAULT_UPGRADE_URL: &str = "https://trailsync.dev/pricing";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaSnapshot {
    pub current_count: i64,
    pub limit: i64,
    pub remaining: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade_url: Option<String>,
}

impl QuotaSnapshot {
    pub fn is_unlimited(&self) -> bool {
        self.limit == UNLIMITED
    }

    pub fn upgrade_url(&self) -> &str {
        self.upgrade_url.as_deref().unwrap_or(DEFAULT_UPGRADE_URL)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision<T> {
    Proceed { attempt: Vec<T>, skipped: Vec<T> },
    Exceeded { current_count: i64, limit: i64 },
}

/// Decide which candidates a bulk run may attempt. Order is preserved, so the
/// kept prefix is deterministic for a given listing.
pub fn apply_gate<T>(snapshot: &QuotaSnapshot, mut candidates: Vec<T>) -> GateDecision<T> {
    if snapshot.is_unlimited() {
        return GateDecision::Proceed {
            attempt: candidates,
            skipped: Vec::new(),
        };
    }

    let remaining = usize::try_from(snapshot.remaining.max(0)).unwrap_or(usize::MAX);
    if remaining == 0 {
        return GateDecision::Exceeded {
            current_count: snapshot.current_count,
            limit: snapshot.limit,
        };
    }

    if remaining >= candidates.len() {
        return GateDecision::Proceed {
            attempt: candidates,
            skipped: Vec::new(),
        };
    }

    let skipped = candidates.split_off(remaining);
    GateDecision::Proceed {
        attempt: candidates,
        skipped,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaExceededReport {
    pub success: bool,
    pub error: String,
    pub current_count: i64,
    pub limit: i64,
    pub upgrade_url: String,
    pub total_files: usize,
}

impl QuotaExceededReport {
    pub fn new(snapshot: &QuotaSnapshot, total_files: usize) -> Self {
        Self {
            success: false,
            error: "session_limit_exceeded".to_string(),
            current_count: snapshot.current_count,
            limit: snapshot.limit,
            upgrade_url: snapshot.upgrade_url().to_string(),
            total_files,
        }
    }
}

/// Single captures are never blocked; a full quota or a failed lookup only warns.
pub fn check_advisory(service: &dyn SessionService, session_id: &str) {
    match service.get_quota() {
        Ok(snapshot) if !snapshot.is_unlimited() && snapshot.remaining <= 0 => {
            warn::emit(
                warn::WarnEvent::new("QUOTA_FULL", "capture", "continue")
                    .session(session_id)
                    .reason(&format!(
                        "session limit {}/{} reached",
                        snapshot.current_count, snapshot.limit
                    )),
            );
        }
        Ok(_) => {}
        Err(err) => {
            warn::emit(
                warn::WarnEvent::new("QUOTA_LOOKUP", "capture", "ignore")
                    .session(session_id)
                    .err(&format!("{err:#}")),
            );
        }
    }
}
