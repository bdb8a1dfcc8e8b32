//! Outbound notifications for approvals and finished runs.
//!
//! Delivery is at-least-once: every notification carries an idempotency key
//! that stays the same across retries, so receivers can drop duplicates.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::models::{FailureKind, HitlRequest, RunState, RunStatus};
use crate::phase::Phase;
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    ApprovalRequested {
        run_id: String,
        request_id: String,
        checkpoint: String,
        phase: Phase,
        recommended_option: String,
        evidence_summary: String,
    },
    RunFinished {
        run_id: String,
        status: RunStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        failure_kind: Option<FailureKind>,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
        evidence_summary: String,
    },
}

impl Notification {
    pub fn approval_requested(run: &RunState, request: &HitlRequest) -> Self {
        Notification::ApprovalRequested {
            run_id: run.id.clone(),
            request_id: request.id.clone(),
            checkpoint: request.checkpoint_name.clone(),
            phase: request.phase,
            recommended_option: request.recommended_option.clone(),
            evidence_summary: run.evidence_summary(),
        }
    }

    pub fn run_finished(run: &RunState) -> Self {
        Notification::RunFinished {
            run_id: run.id.clone(),
            status: run.status,
            failure_kind: run.failure.as_ref().map(|f| f.kind),
            reason: run.failure.as_ref().map(|f| f.message.clone()),
            evidence_summary: run.evidence_summary(),
        }
    }

    pub fn event(&self) -> &'static str {
        match self {
            Notification::ApprovalRequested { .. } => "approval_requested",
            Notification::RunFinished { .. } => "run_finished",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Notification::ApprovalRequested { run_id, .. }
            | Notification::RunFinished { run_id, .. } => run_id,
        }
    }

    /// Stable per logical event: one per approval request, one per run end.
    pub fn idempotency_key(&self) -> String {
        match self {
            Notification::ApprovalRequested { request_id, .. } => {
                format!("approval_requested:{}", request_id)
            }
            Notification::RunFinished { run_id, .. } => format!("run_finished:{}", run_id),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        info!(
            event = notification.event(),
            run_id = notification.run_id(),
            key = %notification.idempotency_key(),
            "Notification"
        );
        Ok(())
    }
}

/// POSTs notifications as JSON to a webhook, retrying transient failures.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    retry: RetryPolicy,
}

impl WebhookNotifier {
    pub fn new(url: &str, timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self {
            client,
            url: url.to_string(),
            retry,
        })
    }

    async fn post_once(&self, notification: &Notification) -> Result<(), (bool, anyhow::Error)> {
        let resp = self
            .client
            .post(&self.url)
            .header("Idempotency-Key", notification.idempotency_key())
            .json(notification)
            .send()
            .await
            .map_err(|e| (true, anyhow::Error::new(e).context("Webhook request failed")))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        // 4xx other than 408/429 will not succeed on retry.
        let retryable = status.is_server_error()
            || status == reqwest::StatusCode::REQUEST_TIMEOUT
            || status == reqwest::StatusCode::TOO_MANY_REQUESTS;
        Err((retryable, anyhow::anyhow!("Webhook returned {}", status)))
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        let mut attempt = 1;
        loop {
            match self.post_once(notification).await {
                Ok(()) => return Ok(()),
                Err((retryable, err)) if retryable && attempt < self.retry.max_attempts() => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        event = notification.event(),
                        run_id = notification.run_id(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Webhook delivery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err((_, err)) => return Err(err),
            }
        }
    }
}

/// Collects notifications in memory.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryNotifier {
    pub sent: std::sync::Mutex<Vec<Notification>>,
}

#[cfg(test)]
impl MemoryNotifier {
    pub fn events(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
