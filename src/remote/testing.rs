use crate::error::TrailError;
use crate::remote::{
    AppendBatchResponse, AppendInteractionsRequest, CreateProjectRequest, CredentialInfo,
    ProjectInfo, PublicKeyInfo, SessionPayload, SessionService, TeamInfo, UpsertSessionRequest,
    UpsertSessionResponse,
};
use crate::trail::quota::QuotaSnapshot;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// In-memory `SessionService` that records every call.
#[derive(Default)]
pub struct FakeService {
    pub projects: Mutex<Vec<ProjectInfo>>,
    pub quota: Option<QuotaSnapshot>,
    pub user_key: Option<PublicKeyInfo>,
    pub team_keys: BTreeMap<String, PublicKeyInfo>,
    pub teams: Vec<TeamInfo>,
    pub fail_sessions: BTreeSet<String>,
    pub fail_batches: BTreeSet<usize>,
    pub fail_key_lookups: bool,
    /// Interactions per batch the service claims it already holds.
    pub already_recorded_per_batch: usize,
    pub calls: Mutex<Vec<String>>,
    pub upserts: Mutex<Vec<UpsertSessionRequest>>,
    pub batches: Mutex<Vec<AppendInteractionsRequest>>,
    seen_sessions: Mutex<BTreeSet<String>>,
}

impl FakeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    fn record(&self, call: &str) {
        self.calls.lock().expect("calls lock").push(call.to_string());
    }

    fn unavailable(call: &str) -> anyhow::Error {
        TrailError::Remote {
            call: call.to_string(),
            status: "unavailable".to_string(),
            message: "injected failure".to_string(),
        }
        .into()
    }
}

impl SessionService for FakeService {
    fn validate_credential(&self) -> Result<CredentialInfo> {
        self.record("ValidateCredential");
        Ok(CredentialInfo {
            user_id: "user-1".into(),
            email: Some("dev@example.com".into()),
            plan: Some("free".into()),
        })
    }

    fn get_projects(&self) -> Result<Vec<ProjectInfo>> {
        self.record("GetProjects");
        Ok(self.projects.lock().expect("projects lock").clone())
    }

    fn create_project(&self, req: &CreateProjectRequest) -> Result<ProjectInfo> {
        self.record("CreateProject");
        let mut projects = self.projects.lock().expect("projects lock");
        let project = ProjectInfo {
            id: format!("proj-{}", projects.len() + 1),
            name: req.name.clone(),
            path: req.path.clone(),
            git_remote: req.git_remote.clone(),
            team_id: None,
            encryption_mode: req.encryption_mode,
        };
        projects.push(project.clone());
        Ok(project)
    }

    fn upsert_session(&self, req: &UpsertSessionRequest) -> Result<UpsertSessionResponse> {
        self.record("UpsertSession");
        if self.fail_sessions.contains(&req.session_id) {
            return Err(Self::unavailable("UpsertSession"));
        }
        self.upserts.lock().expect("upserts lock").push(req.clone());
        let inline = match &req.payload {
            SessionPayload::Plaintext(fields) => fields.interactions.len(),
            SessionPayload::Encrypted(fields) if fields.interactions.is_some() => {
                req.interaction_count
            }
            SessionPayload::Encrypted(_) => 0,
        };
        let created = self
            .seen_sessions
            .lock()
            .expect("seen lock")
            .insert(req.session_id.clone());
        Ok(UpsertSessionResponse {
            id: Some(format!("remote-{}", req.session_id)),
            created,
            interactions_added: inline as u64,
        })
    }

    fn append_interactions_batch(
        &self,
        req: &AppendInteractionsRequest,
    ) -> Result<AppendBatchResponse> {
        self.record("AppendInteractionsBatch");
        if self.fail_batches.contains(&req.batch_index) {
            return Err(Self::unavailable("AppendInteractionsBatch"));
        }
        self.batches.lock().expect("batches lock").push(req.clone());
        Ok(AppendBatchResponse {
            added: req.count.saturating_sub(self.already_recorded_per_batch) as u64,
        })
    }

    fn get_quota(&self) -> Result<QuotaSnapshot> {
        self.record("GetQuota");
        self.quota
            .clone()
            .ok_or_else(|| Self::unavailable("GetQuota"))
    }

    fn get_user_public_key(&self) -> Result<Option<PublicKeyInfo>> {
        self.record("GetUserPublicKey");
        if self.fail_key_lookups {
            return Err(Self::unavailable("GetUserPublicKey"));
        }
        Ok(self.user_key.clone())
    }

    fn get_team_public_key(&self, team_id: &str) -> Result<Option<PublicKeyInfo>> {
        self.record("GetTeamPublicKey");
        if self.fail_key_lookups {
            return Err(Self::unavailable("GetTeamPublicKey"));
        }
        Ok(self.team_keys.get(team_id).cloned())
    }

    fn list_teams(&self) -> Result<Vec<TeamInfo>> {
        self.record("ListTeams");
        Ok(self.teams.clone())
    }
}
