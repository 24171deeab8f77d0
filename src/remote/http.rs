use crate::error::TrailError;
use crate::remote::{
    AppendBatchResponse, AppendInteractionsRequest, CreateProjectRequest, CredentialInfo,
    ProjectInfo, PublicKeyInfo, SessionService, TeamInfo, UpsertSessionRequest,
    UpsertSessionResponse,
};
use crate::trail::config::TrailConfig;
use crate::trail::quota::QuotaSnapshot;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const SERVICE_PATH: &str = "trail.v1.SessionService";

#[derive(Debug, Deserialize)]
struct ProjectsResponse {
    #[serde(default)]
    projects: Vec<ProjectInfo>,
}

#[derive(Debug, Deserialize)]
struct TeamsResponse {
    #[serde(default)]
    teams: Vec<TeamInfo>,
}

#[derive(Debug, Deserialize)]
struct KeyResponse {
    #[serde(default)]
    key: Option<PublicKeyInfo>,
}

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    project: ProjectInfo,
}

#[derive(Debug, Deserialize)]
struct QuotaResponse {
    quota: QuotaSnapshot,
}

pub struct HttpSessionService {
    client: Client,
    base_url: String,
    token: String,
    light: Duration,
    heavy: Duration,
}

fn parse_error_body(raw: &str, status: StatusCode) -> (String, String) {
    let parsed: Option<Value> = serde_json::from_str(raw).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| status.as_u16().to_string());
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("unknown").to_string()
            } else {
                trimmed.to_string()
            }
        });
    (code, message)
}

fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<TrailError>(),
        Some(TrailError::Remote { status, .. }) if status == "not_found" || status == "404"
    )
}

impl HttpSessionService {
    pub fn new(cfg: &TrailConfig) -> Result<Self> {
        let token = cfg
            .api
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .ok_or(TrailError::MissingCredential)?;
        Self::with_token(&cfg.api.base_url, &token, cfg.timeouts.light(), cfg.timeouts.heavy())
    }

    pub fn with_token(
        base_url: &str,
        token: &str,
        light: Duration,
        heavy: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("trail-sync/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
            light,
            heavy,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{SERVICE_PATH}/{method}", self.base_url)
    }

    fn transport_error(method: &str, deadline: Duration, err: reqwest::Error) -> TrailError {
        if err.is_timeout() {
            return TrailError::Deadline {
                call: method.to_string(),
                secs: deadline.as_secs(),
            };
        }
        TrailError::Remote {
            call: method.to_string(),
            status: "unavailable".to_string(),
            message: err.to_string(),
        }
    }

    fn call<Req, Resp>(&self, method: &str, body: &Req, deadline: Duration) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        debug!(method, deadline_secs = deadline.as_secs(), "remote call");
        let response = self
            .client
            .post(self.endpoint(method))
            .bearer_auth(&self.token)
            .timeout(deadline)
            .json(body)
            .send()
            .map_err(|err| Self::transport_error(method, deadline, err))?;

        let status = response.status();
        if !status.is_success() {
            let raw = response.text().unwrap_or_default();
            let (code, message) = parse_error_body(&raw, status);
            return Err(TrailError::Remote {
                call: method.to_string(),
                status: code,
                message,
            }
            .into());
        }

        let parsed = response
            .json::<Resp>()
            .map_err(|err| Self::transport_error(method, deadline, err))?;
        Ok(parsed)
    }

    fn optional_key(&self, method: &str, body: &Value) -> Result<Option<PublicKeyInfo>> {
        match self.call::<_, KeyResponse>(method, body, self.light) {
            Ok(resp) => Ok(resp.key),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

impl SessionService for HttpSessionService {
    fn validate_credential(&self) -> Result<CredentialInfo> {
        self.call("ValidateCredential", &json!({}), self.light)
    }

    fn get_projects(&self) -> Result<Vec<ProjectInfo>> {
        let resp: ProjectsResponse = self.call("GetProjects", &json!({}), self.light)?;
        Ok(resp.projects)
    }

    fn create_project(&self, req: &CreateProjectRequest) -> Result<ProjectInfo> {
        let resp: ProjectResponse = self.call("CreateProject", req, self.light)?;
        Ok(resp.project)
    }

    fn upsert_session(&self, req: &UpsertSessionRequest) -> Result<UpsertSessionResponse> {
        self.call("UpsertSession", req, self.heavy)
    }

    fn append_interactions_batch(
        &self,
        req: &AppendInteractionsRequest,
    ) -> Result<AppendBatchResponse> {
        self.call("AppendInteractionsBatch", req, self.heavy)
    }

    fn get_quota(&self) -> Result<QuotaSnapshot> {
        let resp: QuotaResponse = self.call("GetQuota", &json!({}), self.light)?;
        Ok(resp.quota)
    }

    fn get_user_public_key(&self) -> Result<Option<PublicKeyInfo>> {
        self.optional_key("GetUserPublicKey", &json!({}))
    }

    fn get_team_public_key(&self, team_id: &str) -> Result<Option<PublicKeyInfo>> {
        self.optional_key("GetTeamPublicKey", &json!({ "teamId": team_id }))
    }

    fn list_teams(&self) -> Result<Vec<TeamInfo>> {
        let resp: TeamsResponse = self.call("ListTeams", &json!({}), self.light)?;
        Ok(resp.teams)
    }
}
