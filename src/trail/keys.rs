use crate::error::TrailError;
use crate::remote::{EncryptionMode, ProjectInfo, PublicKeyInfo, SessionService};
use crate::trail::warn;
use anyhow::Result;
use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::debug;

/// Anything shorter cannot be a PEM-wrapped RSA public key.
pub const MIN_PUBLIC_KEY_CHARS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScope {
    Team,
    User,
}

impl KeyScope {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Team => "team",
            Self::User => "user",
        }
    }
}

/// A validated public key ready for wrapping envelope keys.
#[derive(Debug, Clone)]
pub struct RecipientKey {
    pub public_key: RsaPublicKey,
    pub key_version: u32,
    pub scope: KeyScope,
}

pub fn parse_public_key(pem: &str) -> Option<RsaPublicKey> {
    let trimmed = pem.trim();
    if trimmed.len() < MIN_PUBLIC_KEY_CHARS {
        return None;
    }
    RsaPublicKey::from_public_key_pem(trimmed).ok()
}

fn validate(info: &PublicKeyInfo, scope: KeyScope) -> Option<RecipientKey> {
    parse_public_key(&info.public_key).map(|public_key| RecipientKey {
        public_key,
        key_version: info.key_version,
        scope,
    })
}

#[derive(Debug, Clone)]
struct CachedKey {
    info: PublicKeyInfo,
    fetched_at: Instant,
}

/// Team keys by team id. Entries expire purely by age.
#[derive(Debug)]
pub struct TeamKeyCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CachedKey>>,
}

impl TeamKeyCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_or_refresh<F>(&self, team_id: &str, fetch: F) -> Result<Option<PublicKeyInfo>>
    where
        F: FnOnce() -> Result<Option<PublicKeyInfo>>,
    {
        self.get_or_refresh_at(team_id, Instant::now(), fetch)
    }

    pub fn get_or_refresh_at<F>(
        &self,
        team_id: &str,
        now: Instant,
        fetch: F,
    ) -> Result<Option<PublicKeyInfo>>
    where
        F: FnOnce() -> Result<Option<PublicKeyInfo>>,
    {
        if let Ok(entries) = self.entries.read()
            && let Some(entry) = entries.get(team_id)
            && now.saturating_duration_since(entry.fetched_at) < self.ttl
        {
            return Ok(Some(entry.info.clone()));
        }

        let fetched = fetch()?;
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match &fetched {
            Some(info) => {
                entries.insert(
                    team_id.to_string(),
                    CachedKey {
                        info: info.clone(),
                        fetched_at: now,
                    },
                );
            }
            None => {
                entries.remove(team_id);
            }
        }
        Ok(fetched)
    }
}

/// Resolves the recipient key for a project: team key first, then the
/// caller's personal key.
pub struct KeyResolver {
    cache: TeamKeyCache,
}

impl KeyResolver {
    pub fn new(team_key_ttl: Duration) -> Self {
        Self {
            cache: TeamKeyCache::new(team_key_ttl),
        }
    }

    /// `Ok(None)` for plaintext projects; end-to-end projects without a
    /// usable key fail here, before anything is sent.
    pub fn resolve_for(
        &self,
        service: &dyn SessionService,
        project: &ProjectInfo,
        mode: EncryptionMode,
    ) -> Result<Option<RecipientKey>, TrailError> {
        if !mode.requires_envelope() {
            return Ok(None);
        }
        match self.resolve(service, project) {
            Some(key) => {
                debug!(scope = key.scope.as_str(), version = key.key_version, "resolved key");
                Ok(Some(key))
            }
            None => Err(TrailError::EncryptionKeyUnavailable {
                mode: mode.as_str().to_string(),
            }),
        }
    }

    pub fn resolve(
        &self,
        service: &dyn SessionService,
        project: &ProjectInfo,
    ) -> Option<RecipientKey> {
        if let Some(team_id) = team_for(service, project)
            && let Some(key) = self.team_key(service, &team_id)
        {
            return Some(key);
        }

        match service.get_user_public_key() {
            Ok(Some(info)) => {
                let key = validate(&info, KeyScope::User);
                if key.is_none() {
                    warn::emit(
                        warn::WarnEvent::new("KEY_INVALID", "key", "skip")
                            .source("user")
                            .reason("personal key is not a valid RSA public key"),
                    );
                }
                key
            }
            Ok(None) => None,
            Err(err) => {
                warn::emit(
                    warn::WarnEvent::new("KEY_LOOKUP", "key", "skip")
                        .source("user")
                        .err(&format!("{err:#}")),
                );
                None
            }
        }
    }

    fn team_key(&self, service: &dyn SessionService, team_id: &str) -> Option<RecipientKey> {
        let fetched = self
            .cache
            .get_or_refresh(team_id, || service.get_team_public_key(team_id));
        match fetched {
            Ok(Some(info)) => {
                let key = validate(&info, KeyScope::Team);
                if key.is_none() {
                    warn::emit(
                        warn::WarnEvent::new("KEY_INVALID", "key", "fallback_user")
                            .source(team_id)
                            .reason("team key is not a valid RSA public key"),
                    );
                }
                key
            }
            Ok(None) => None,
            Err(err) => {
                warn::emit(
                    warn::WarnEvent::new("KEY_LOOKUP", "key", "fallback_user")
                        .source(team_id)
                        .err(&format!("{err:#}")),
                );
                None
            }
        }
    }
}

fn team_for(service: &dyn SessionService, project: &ProjectInfo) -> Option<String> {
    if let Some(team_id) = project.team_id.as_deref().filter(|t| !t.is_empty()) {
        return Some(team_id.to_string());
    }
    match service.list_teams() {
        Ok(teams) => teams.into_iter().next().map(|t| t.id),
        Err(err) => {
            warn::emit(
                warn::WarnEvent::new("TEAM_LOOKUP", "key", "fallback_user").err(&format!("{err:#}")),
            );
            None
        }
    }
}
