//! Slack incoming-webhook notification sink

use crate::error::{DriftError, DriftResult};
use crate::http;
use crate::notification::Notification;
use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const SINK: &str = "slack";

/// Payload accepted by Slack incoming webhooks
#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    text: &'a str,
}

/// Posts findings to a Slack incoming webhook
#[derive(Clone)]
pub struct SlackWebhook {
    webhook_url: String,
    agent: ureq::Agent,
}

impl SlackWebhook {
    /// Create a sink; `None` when no URL is configured
    pub fn new(webhook_url: &str) -> Option<Self> {
        if webhook_url.is_empty() {
            return None;
        }
        Some(Self {
            webhook_url: webhook_url.to_string(),
            agent: http::agent(),
        })
    }

    /// Render the message text for a finding
    fn format(title: &str, dir: &str, workspace: &str) -> String {
        format!("{}\nDirectory: {}\nWorkspace: {}", title, dir, workspace)
    }

    async fn send(&self, cancel: &CancellationToken, text: String) -> DriftResult<()> {
        let body = serde_json::to_string(&WebhookMessage { text: &text })?;
        let agent = self.agent.clone();
        let url = self.webhook_url.clone();

        let response = http::run_blocking(cancel, move || {
            http::post_json(&agent, &url, &[], &body).map_err(|e| DriftError::notify(SINK, e))
        })
        .await?;

        if response.status != 200 {
            return Err(DriftError::notify(
                SINK,
                format!(
                    "webhook answered {}: {}",
                    response.status,
                    response.body.trim()
                ),
            ));
        }
        debug!("Slack notification delivered");
        Ok(())
    }
}

#[async_trait]
impl Notification for SlackWebhook {
    async fn extra_workspace_in_remote(
        &self,
        cancel: &CancellationToken,
        dir: &str,
        workspace: &str,
    ) -> DriftResult<()> {
        self.send(cancel, Self::format("Extra workspace in remote", dir, workspace))
            .await
    }

    async fn missing_workspace_in_remote(
        &self,
        cancel: &CancellationToken,
        dir: &str,
        workspace: &str,
    ) -> DriftResult<()> {
        self.send(cancel, Self::format("Missing workspace in remote", dir, workspace))
            .await
    }

    async fn plan_drift(
        &self,
        cancel: &CancellationToken,
        dir: &str,
        workspace: &str,
    ) -> DriftResult<()> {
        self.send(
            cancel,
            Self::format("Plan Drift workspace in remote", dir, workspace),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_url_disables_sink() {
        assert!(SlackWebhook::new("").is_none());
        assert!(SlackWebhook::new("https://hooks.slack.com/services/T/B/X").is_some());
    }

    #[test]
    fn message_layout() {
        assert_eq!(
            SlackWebhook::format("Plan Drift workspace in remote", "env/a", "prod"),
            "Plan Drift workspace in remote\nDirectory: env/a\nWorkspace: prod"
        );
    }

    #[test]
    fn payload_shape() {
        let body = serde_json::to_value(WebhookMessage { text: "hi" }).unwrap();
        assert_eq!(body, serde_json::json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn cancelled_delivery_fails() {
        let sink = SlackWebhook::new("http://127.0.0.1:9/hook").unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = sink.plan_drift(&cancel, "env/a", "default").await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
