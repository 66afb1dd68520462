//! Per-channel alert fan-out

use super::{EmailNotifier, SlackNotifier};
use crate::config::NotificationsConfig;
use crate::error::{ConfigError, NotificationError};
use crate::models::TriggeredAlert;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A delivery channel
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name alert rules refer to
    fn channel(&self) -> &str;

    /// Deliver one alert. Returning [`NotificationError::Disabled`] marks the delivery skipped.
    async fn send(&self, alert: &TriggeredAlert) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum DeliveryStatus {
    Delivered,
    Skipped(String),
    Failed(String),
}

/// Result of delivering one alert through one channel
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryOutcome {
    pub rule_name: String,
    pub channel: String,
    #[serde(flatten)]
    pub status: DeliveryStatus,
    pub sent_at: DateTime<Utc>,
}

impl DeliveryOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, DeliveryStatus::Failed(_))
    }
}

/// Routes alerts to registered notifiers by channel name
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    notifiers: HashMap<String, Arc<dyn Notifier>>,
}

impl NotificationDispatcher {
    /// Create a dispatcher with no channels
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dispatcher with the built-in `slack` and `email` channels
    pub fn from_config(config: &NotificationsConfig) -> Result<Self, ConfigError> {
        let mut dispatcher = Self::new();
        dispatcher.register(Arc::new(SlackNotifier::from_config(&config.slack)?));
        dispatcher.register(Arc::new(EmailNotifier::from_config(&config.email)));
        Ok(dispatcher)
    }

    /// Register a notifier, replacing any previous one with the same channel name
    pub fn register(&mut self, notifier: Arc<dyn Notifier>) {
        let channel = notifier.channel().to_lowercase();
        debug!(channel = %channel, "Registered notification channel");
        self.notifiers.insert(channel, notifier);
    }

    pub fn channels(&self) -> Vec<&str> {
        let mut channels: Vec<&str> = self.notifiers.keys().map(String::as_str).collect();
        channels.sort_unstable();
        channels
    }

    /// Deliver an alert through each of its channels, in order.
    ///
    /// Every channel is attempted regardless of earlier failures. Nothing is retried.
    pub async fn dispatch(&self, alert: &TriggeredAlert) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(alert.channels.len());

        for channel in &alert.channels {
            let result = match self.notifiers.get(channel.as_str()) {
                Some(notifier) => notifier.send(alert).await,
                None => Err(NotificationError::UnknownChannel(channel.clone())),
            };

            let status = match result {
                Ok(()) => {
                    info!(rule = %alert.rule_name, channel = %channel, "Alert delivered");
                    DeliveryStatus::Delivered
                }
                Err(NotificationError::Disabled(_)) => {
                    debug!(
                        rule = %alert.rule_name,
                        channel = %channel,
                        "Channel disabled, skipping"
                    );
                    DeliveryStatus::Skipped("channel disabled".to_string())
                }
                Err(e) => {
                    warn!(
                        rule = %alert.rule_name,
                        channel = %channel,
                        error = %e,
                        "Alert delivery failed"
                    );
                    DeliveryStatus::Failed(e.to_string())
                }
            };

            outcomes.push(DeliveryOutcome {
                rule_name: alert.rule_name.clone(),
                channel: channel.clone(),
                status,
                sent_at: Utc::now(),
            });
        }

        outcomes
    }

    /// Dispatch several alerts sequentially
    pub async fn dispatch_all(&self, alerts: &[TriggeredAlert]) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::new();
        for alert in alerts {
            outcomes.extend(self.dispatch(alert).await);
        }
        outcomes
    }
}
