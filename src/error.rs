use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrailError {
    #[error("transcript has no timestamped records: {0}")]
    EmptyTranscript(String),
    #[error("no usable encryption key for {mode} project; refusing to send plaintext")]
    EncryptionKeyUnavailable { mode: String },
    #[error("session limit reached ({current_count}/{limit}); upgrade at {upgrade_url}")]
    QuotaExceeded {
        current_count: i64,
        limit: i64,
        upgrade_url: String,
    },
    #[error("{call} exceeded its {secs}s deadline")]
    Deadline { call: String, secs: u64 },
    #[error("{call} failed ({status}): {message}")]
    Remote {
        call: String,
        status: String,
        message: String,
    },
    #[error("envelope operation failed: {0}")]
    Envelope(String),
    #[error("config file invalid or unreadable: {0}")]
    InvalidConfig(String),
    #[error("no API token configured; set TRAIL_API_TOKEN or [api].token")]
    MissingCredential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    EmptyTranscript,
    EncryptionKeyUnavailable,
    SessionLimitExceeded,
    DeadlineExceeded,
    RemoteError,
    EnvelopeError,
    InvalidConfig,
    MissingCredential,
    PartialAppend,
    Internal,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyTranscript => "empty_transcript",
            Self::EncryptionKeyUnavailable => "encryption_key_unavailable",
            Self::SessionLimitExceeded => "session_limit_exceeded",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::RemoteError => "remote_error",
            Self::EnvelopeError => "envelope_error",
            Self::InvalidConfig => "invalid_config",
            Self::MissingCredential => "missing_credential",
            Self::PartialAppend => "partial_append",
            Self::Internal => "internal",
        }
    }
}

impl TrailError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::EmptyTranscript(_) => ErrorCode::EmptyTranscript,
            Self::EncryptionKeyUnavailable { .. } => ErrorCode::EncryptionKeyUnavailable,
            Self::QuotaExceeded { .. } => ErrorCode::SessionLimitExceeded,
            Self::Deadline { .. } => ErrorCode::DeadlineExceeded,
            Self::Remote { .. } => ErrorCode::RemoteError,
            Self::Envelope(_) => ErrorCode::EnvelopeError,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
            Self::MissingCredential => ErrorCode::MissingCredential,
        }
    }
}

/// Classify an arbitrary pipeline error for machine-readable reports.
pub fn error_code(err: &anyhow::Error) -> ErrorCode {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<TrailError>())
        .map(TrailError::code)
        .unwrap_or(ErrorCode::Internal)
}
