pub mod capture;
pub mod hook;
pub mod import;
pub mod status;

use anyhow::Result;
use serde::Serialize;

use crate::remote::http::HttpSessionService;
use crate::trail::config::{TrailConfig, load_config};
use crate::trail::keys::KeyResolver;
use crate::trail::paths::{TrailPaths, resolve_paths};
use crate::trail::sync::{SyncClient, SyncSettings};

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub issues: Vec<String>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            issues: Vec::new(),
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn merge(&mut self, mut other: CommandReport) {
        self.ok &= other.ok;
        self.details.append(&mut other.details);
        self.issues.append(&mut other.issues);
    }
}

/// Paths and validated config shared by every command.
pub struct Runtime {
    pub paths: TrailPaths,
    pub config: TrailConfig,
}

impl Runtime {
    pub fn load() -> Result<Self> {
        let paths = resolve_paths()?;
        let config = load_config(&paths)?;
        Ok(Self { paths, config })
    }

    pub fn service(&self) -> Result<HttpSessionService> {
        HttpSessionService::new(&self.config)
    }

    pub fn sync_client<'a>(&self, service: &'a HttpSessionService) -> SyncClient<'a> {
        SyncClient::new(
            service,
            KeyResolver::new(self.config.team_key_ttl()),
            SyncSettings::new(&self.config, &self.paths),
        )
    }
}
