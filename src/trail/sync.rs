use crate::remote::{
    AppendInteractionsRequest, EncryptionMode, PlaintextFields, ProjectInfo, SessionService,
    UpsertSessionRequest,
};
use crate::trail::config::TrailConfig;
use crate::trail::envelope;
use crate::trail::keys::{KeyResolver, RecipientKey};
use crate::trail::lock;
use crate::trail::paths::TrailPaths;
use crate::trail::transcript::{Interaction, ParsedSession};
use crate::trail::warn;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub chunk_size: usize,
    pub inline_interaction_limit: usize,
    pub locks_dir: PathBuf,
    pub lock_timeout: Duration,
}

impl SyncSettings {
    pub fn new(cfg: &TrailConfig, paths: &TrailPaths) -> Self {
        Self {
            chunk_size: cfg.sync.chunk_size.max(1),
            inline_interaction_limit: cfg.sync.inline_interaction_limit,
            locks_dir: paths.locks_dir.clone(),
            lock_timeout: cfg.timeouts.heavy(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkAppendResult {
    pub processed: usize,
    pub failed: usize,
    pub chunks: usize,
    /// Net-new interactions as reported by the service.
    pub added: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_batches: Vec<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub created: bool,
    pub interaction_count: usize,
    pub interactions_added: u64,
    pub encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bulk: Option<BulkAppendResult>,
}

pub struct SyncClient<'a> {
    service: &'a dyn SessionService,
    keys: KeyResolver,
    settings: SyncSettings,
}

impl<'a> SyncClient<'a> {
    pub fn new(service: &'a dyn SessionService, keys: KeyResolver, settings: SyncSettings) -> Self {
        Self {
            service,
            keys,
            settings,
        }
    }

    /// Create or update one session. Oversized sessions are upserted bare and
    /// their interactions appended in chunks afterwards.
    pub fn sync_session(&self, project: &ProjectInfo, session: ParsedSession) -> Result<SyncOutcome> {
        let mode = project.encryption_mode;
        let recipient = self.keys.resolve_for(self.service, project, mode)?;

        let guard = lock::acquire(
            &self.settings.locks_dir,
            &session.session_id,
            self.settings.lock_timeout,
        )?;
        debug!(session = %session.session_id, lock = %guard.path().display(), "session locked");

        let duration_ms = session.duration_ms();
        let ParsedSession {
            session_id,
            start_time,
            end_time,
            cwd,
            git_branch,
            tool_name,
            plan_slug,
            interactions,
            tokens,
            progress_snapshots,
            sub_sessions,
            attachments,
            ..
        } = session;

        let interaction_count = interactions.len();
        let (inline, deferred) = if interaction_count > self.settings.inline_interaction_limit {
            (Vec::new(), interactions)
        } else {
            (interactions, Vec::new())
        };

        let payload = envelope::build_payload(
            mode,
            recipient.as_ref(),
            PlaintextFields {
                interactions: inline,
                progress_snapshots,
                sub_sessions,
                attachments,
            },
        )?;

        let request = UpsertSessionRequest {
            project_id: project.id.clone(),
            session_id: session_id.clone(),
            tool_name,
            start_time,
            end_time,
            duration_ms,
            cwd,
            git_branch,
            plan_slug,
            interaction_count,
            tokens,
            payload,
        };
        let response = self
            .service
            .upsert_session(&request)
            .with_context(|| format!("failed to upsert session {session_id}"))?;

        let bulk = (!deferred.is_empty()).then(|| {
            self.append_interactions_bulk(
                &project.id,
                &session_id,
                mode,
                recipient.as_ref(),
                deferred,
            )
        });
        let appended = bulk.as_ref().map_or(0, |b| b.added);

        info!(
            session = %session_id,
            created = response.created,
            interactions = interaction_count,
            "session synced"
        );
        Ok(SyncOutcome {
            session_id,
            remote_id: response.id,
            created: response.created,
            interaction_count,
            interactions_added: response.interactions_added + appended,
            encrypted: recipient.is_some(),
            bulk,
        })
    }

    /// Every chunk is attempted; a failed chunk only counts against `failed`.
    pub fn append_interactions_bulk(
        &self,
        project_id: &str,
        session_id: &str,
        mode: EncryptionMode,
        recipient: Option<&RecipientKey>,
        interactions: Vec<Interaction>,
    ) -> BulkAppendResult {
        let mut result = BulkAppendResult::default();

        for (batch_index, chunk) in interactions.chunks(self.settings.chunk_size).enumerate() {
            result.chunks += 1;
            let count = chunk.len();

            let batch = match envelope::build_batch(mode, recipient, chunk.to_vec()) {
                Ok(batch) => batch,
                Err(err) => {
                    result.failed += count;
                    result.failed_batches.push(batch_index);
                    warn::emit(
                        warn::WarnEvent::new("BATCH_SEAL", "append", "skip_chunk")
                            .session(session_id)
                            .source(&batch_index.to_string())
                            .err(&err.to_string()),
                    );
                    continue;
                }
            };

            let request = AppendInteractionsRequest {
                project_id: project_id.to_string(),
                session_id: session_id.to_string(),
                batch_index,
                count,
                batch,
            };
            match self.service.append_interactions_batch(&request) {
                Ok(resp) => {
                    result.processed += count;
                    result.added += resp.added;
                }
                Err(err) => {
                    result.failed += count;
                    result.failed_batches.push(batch_index);
                    warn::emit(
                        warn::WarnEvent::new("BATCH_FAILED", "append", "skip_chunk")
                            .session(session_id)
                            .source(&batch_index.to_string())
                            .err(&format!("{err:#}")),
                    );
                }
            }
        }

        result
    }
}
