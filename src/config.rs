use std::time::Duration;

use crate::sync::{Envelope, SyncClient};

pub const DEFAULT_DATABASE_URL: &str = "sqlite://iep-tracker.db";

/// Process-wide settings, resolved from flags and environment once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub sync_timeout: Duration,
    pub envelope: Envelope,
    pub verbose: bool,
}

impl AppConfig {
    pub fn sync_client(&self) -> anyhow::Result<SyncClient> {
        SyncClient::new(self.sync_timeout, self.envelope)
    }

    pub fn log_filter(&self) -> String {
        let level = if self.verbose { "debug" } else { "warn" };
        format!("iep_minutes={level}")
    }
}
