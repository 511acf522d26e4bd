//! Webhook notifications for ticks that restarted or failed to restart apps.
//!
//! The payload carries a human-readable `content` line (accepted as-is by
//! chat webhooks) plus the structured events for anything else.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::config::defaults;
use crate::types::{RecoveryAttempt, RecoveryOutcome};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook returned status {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: String,
    tick: u64,
    events: &'a [RecoveryAttempt],
}

/// Receives the attempts of every finished tick.
#[async_trait]
pub trait TickNotifier: Send + Sync {
    /// Returns `Ok(false)` when there was nothing worth sending.
    async fn notify_tick(&self, tick: u64, events: &[RecoveryAttempt]) -> Result<bool, NotifyError>;
}

/// Posts tick events to a configured URL.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(defaults::WEBHOOK_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TickNotifier for WebhookNotifier {
    /// Send the noteworthy events of one tick. Nothing is sent when `events`
    /// only contains healthy apps.
    async fn notify_tick(&self, tick: u64, events: &[RecoveryAttempt]) -> Result<bool, NotifyError> {
        let Some(content) = render_summary(tick, events) else {
            return Ok(false);
        };
        let noteworthy: Vec<RecoveryAttempt> = events
            .iter()
            .filter(|a| is_noteworthy(a))
            .cloned()
            .collect();

        let payload = WebhookPayload {
            content,
            tick,
            events: &noteworthy,
        };

        let resp = self.client.post(&self.url).json(&payload).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body,
            });
        }
        debug!(tick, events = noteworthy.len(), "Webhook delivered");
        Ok(true)
    }
}

fn is_noteworthy(attempt: &RecoveryAttempt) -> bool {
    !attempt.replayed && !matches!(attempt.outcome, RecoveryOutcome::Running)
}

/// One line per noteworthy event, or `None` when there is nothing to report.
pub fn render_summary(tick: u64, events: &[RecoveryAttempt]) -> Option<String> {
    let lines: Vec<String> = events
        .iter()
        .filter(|a| is_noteworthy(a))
        .map(|a| {
            let mut line = format!("{} / {} ({}): {}", a.device_id, a.app_name, a.package, a.outcome);
            if let Some(ref detail) = a.detail {
                line.push_str(" - ");
                line.push_str(detail);
            }
            line
        })
        .collect();
    if lines.is_empty() {
        return None;
    }
    Some(format!("vsphone-guardian check #{tick}\n{}", lines.join("\n")))
}
