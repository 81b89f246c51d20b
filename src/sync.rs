use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::models::LogEntry;

/// Body shape for pushed logs. Spreadsheet scripts differ in what they expect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Envelope {
    /// `[ {...}, {...} ]`
    #[default]
    Bare,
    /// `{ "data": [ {...}, {...} ] }`
    Wrapped,
}

#[derive(Serialize)]
struct WrappedOut<'a> {
    data: &'a [LogEntry],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PulledLogs {
    Bare(Vec<LogEntry>),
    Wrapped { data: Vec<LogEntry> },
}

#[derive(Debug, Clone)]
pub struct SyncClient {
    client: reqwest::Client,
    envelope: Envelope,
}

impl SyncClient {
    pub fn new(timeout: Duration, envelope: Envelope) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build sync http client")?;
        Ok(Self { client, envelope })
    }

    async fn try_push(&self, url: &str, logs: &[LogEntry]) -> anyhow::Result<()> {
        let request = self.client.post(url);
        let request = match self.envelope {
            Envelope::Bare => request.json(logs),
            Envelope::Wrapped => request.json(&WrappedOut { data: logs }),
        };
        request.send().await?.error_for_status()?;
        Ok(())
    }

    /// Best effort. Failures are logged and dropped; the caller has already
    /// persisted locally.
    pub async fn push_logs(&self, url: &str, logs: &[LogEntry]) {
        let url = url.trim();
        if url.is_empty() || logs.is_empty() {
            return;
        }

        match self.try_push(url, logs).await {
            Ok(()) => tracing::info!(count = logs.len(), url, "pushed logs to sync endpoint"),
            Err(err) => tracing::warn!(error = %err, url, "cloud sync failed"),
        }
    }

    /// Fetches the remote log collection. The caller replaces local logs with it.
    pub async fn pull_logs(&self, url: &str) -> anyhow::Result<Vec<LogEntry>> {
        let response = self
            .client
            .get(url.trim())
            .send()
            .await
            .with_context(|| format!("failed to reach {url}"))?
            .error_for_status()?;

        let pulled: PulledLogs = response
            .json()
            .await
            .context("sync endpoint did not return a log array")?;

        Ok(match pulled {
            PulledLogs::Bare(logs) => logs,
            PulledLogs::Wrapped { data } => data,
        })
    }
}
