//! Chat webhook channel

use super::{Notifier, SLACK_CHANNEL};
use crate::config::SlackConfig;
use crate::error::{ConfigError, NotificationError};
use crate::models::TriggeredAlert;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

pub struct SlackNotifier {
    enabled: bool,
    webhook_url: Option<String>,
    webhook_env: String,
    channel: Option<String>,
    client: Client,
}

#[derive(Debug, Serialize)]
struct SlackPayload {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
}

impl SlackNotifier {
    pub fn from_config(config: &SlackConfig) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            enabled: config.enabled,
            webhook_url: config.webhook_url.clone().filter(|u| !u.is_empty()),
            webhook_env: config.webhook_env.clone(),
            channel: config.channel.clone(),
            client,
        })
    }

    /// Message text for an alert
    pub fn format_message(alert: &TriggeredAlert) -> String {
        format!(
            "Cost Alert: ${:.2} exceeds ${:.2}",
            alert.actual, alert.threshold
        )
    }

    /// Inline URL first, then the configured environment variable
    fn webhook(&self) -> Result<String, NotificationError> {
        if let Some(url) = &self.webhook_url {
            return Ok(url.clone());
        }
        match std::env::var(&self.webhook_env) {
            Ok(url) if !url.trim().is_empty() => Ok(url),
            _ => Err(NotificationError::missing(SLACK_CHANNEL, &self.webhook_env)),
        }
    }
}

#[async_trait]
impl Notifier for SlackNotifier {
    fn channel(&self) -> &str {
        SLACK_CHANNEL
    }

    async fn send(&self, alert: &TriggeredAlert) -> Result<(), NotificationError> {
        if !self.enabled {
            return Err(NotificationError::Disabled(SLACK_CHANNEL.to_string()));
        }

        let payload = SlackPayload {
            text: Self::format_message(alert),
            channel: self.channel.clone(),
        };

        let response = self
            .client
            .post(self.webhook()?)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(NotificationError::Http(format!(
                "webhook returned {}: {}",
                status, body
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn alert() -> TriggeredAlert {
        TriggeredAlert {
            rule_name: "daily_threshold_1".to_string(),
            kind: "threshold".to_string(),
            threshold: 100.0,
            actual: 150.5,
            period: "daily".to_string(),
            channels: vec!["slack".to_string()],
            scoped_services: Vec::new(),
            triggered_at: Utc::now(),
        }
    }

    fn config(url: Option<String>) -> SlackConfig {
        SlackConfig {
            webhook_url: url,
            webhook_env: "COST_TRACKER_TEST_UNSET_WEBHOOK".to_string(),
            ..SlackConfig::default()
        }
    }

    #[test]
    fn test_message_format() {
        assert_eq!(
            SlackNotifier::format_message(&alert()),
            "Cost Alert: $150.50 exceeds $100.00"
        );
    }

    #[tokio::test]
    async fn test_posts_text_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hooks/cost")
            .match_body(mockito::Matcher::Json(serde_json::json!({
                "text": "Cost Alert: $150.50 exceeds $100.00"
            })))
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let webhook = format!("{}/hooks/cost", server.url());
        let notifier = SlackNotifier::from_config(&config(Some(webhook))).unwrap();
        notifier.send(&alert()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/hooks/cost")
            .with_status(500)
            .with_body("invalid_token")
            .create_async()
            .await;

        let webhook = format!("{}/hooks/cost", server.url());
        let notifier = SlackNotifier::from_config(&config(Some(webhook))).unwrap();
        let err = notifier.send(&alert()).await.unwrap_err();

        assert!(matches!(err, NotificationError::Http(ref msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn test_unset_webhook_is_missing_setting() {
        let notifier = SlackNotifier::from_config(&config(None)).unwrap();
        let err = notifier.send(&alert()).await.unwrap_err();
        assert!(matches!(err, NotificationError::MissingSetting { .. }));
    }

    #[tokio::test]
    async fn test_disabled() {
        let mut cfg = config(Some("http://127.0.0.1:9/".to_string()));
        cfg.enabled = false;
        let notifier = SlackNotifier::from_config(&cfg).unwrap();

        let err = notifier.send(&alert()).await.unwrap_err();
        assert!(matches!(err, NotificationError::Disabled(_)));
    }
}
