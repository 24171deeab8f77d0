pub mod http;
#[cfg(test)]
pub mod testing;

use crate::trail::quota::QuotaSnapshot;
use crate::trail::tokens::TokenCounters;
use crate::trail::transcript::{AttachmentRef, Interaction, ProgressSnapshot, SubSession};
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionMode {
    #[default]
    #[serde(rename = "enhanced")]
    Enhanced,
    #[serde(rename = "e2e")]
    E2e,
    #[serde(rename = "zero_knowledge")]
    ZeroKnowledge,
}

impl EncryptionMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "enhanced" | "plaintext" | "standard" => Some(Self::Enhanced),
            "e2e" | "end_to_end" | "end-to-end" => Some(Self::E2e),
            "zero_knowledge" | "zero-knowledge" | "zk" => Some(Self::ZeroKnowledge),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enhanced => "enhanced",
            Self::E2e => "e2e",
            Self::ZeroKnowledge => "zero_knowledge",
        }
    }

    pub fn requires_envelope(self) -> bool {
        !matches!(self, Self::Enhanced)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialInfo {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub git_remote: Option<String>,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub encryption_mode: EncryptionMode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: String,
    pub path: Option<String>,
    pub git_remote: Option<String>,
    pub encryption_mode: EncryptionMode,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaintextFields {
    pub interactions: Vec<Interaction>,
    pub progress_snapshots: Vec<ProgressSnapshot>,
    pub sub_sessions: Vec<SubSession>,
    pub attachments: Vec<AttachmentRef>,
}

/// Each present field is one serialized envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedFields {
    pub interactions: Option<String>,
    pub progress_snapshots: Option<String>,
    pub sub_sessions: Option<String>,
    pub attachments: Option<String>,
    pub key_version: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPayload {
    Plaintext(PlaintextFields),
    Encrypted(EncryptedFields),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSessionRequest {
    pub project_id: String,
    pub session_id: String,
    pub tool_name: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_ms: Option<i64>,
    pub cwd: Option<String>,
    pub git_branch: Option<String>,
    pub plan_slug: Option<String>,
    pub interaction_count: usize,
    pub tokens: TokenCounters,
    pub payload: SessionPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSessionResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub created: bool,
    #[serde(default)]
    pub interactions_added: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InteractionBatch {
    Plaintext(Vec<Interaction>),
    Encrypted { envelope: String, key_version: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendInteractionsRequest {
    pub project_id: String,
    pub session_id: String,
    pub batch_index: usize,
    pub count: usize,
    pub batch: InteractionBatch,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendBatchResponse {
    #[serde(default)]
    pub added: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyInfo {
    pub public_key: String,
    #[serde(default)]
    pub key_version: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// The remote session-tracking service. Every call is bounded by its own
/// deadline inside the implementation.
pub trait SessionService {
    fn validate_credential(&self) -> Result<CredentialInfo>;
    fn get_projects(&self) -> Result<Vec<ProjectInfo>>;
    fn create_project(&self, req: &CreateProjectRequest) -> Result<ProjectInfo>;
    fn upsert_session(&self, req: &UpsertSessionRequest) -> Result<UpsertSessionResponse>;
    fn append_interactions_batch(
        &self,
        req: &AppendInteractionsRequest,
    ) -> Result<AppendBatchResponse>;
    fn get_quota(&self) -> Result<QuotaSnapshot>;
    fn get_user_public_key(&self) -> Result<Option<PublicKeyInfo>>;
    fn get_team_public_key(&self, team_id: &str) -> Result<Option<PublicKeyInfo>>;
    fn list_teams(&self) -> Result<Vec<TeamInfo>>;
}
