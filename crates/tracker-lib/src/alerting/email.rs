//! SMTP channel (STARTTLS with login)

use super::{Notifier, EMAIL_CHANNEL};
use crate::config::EmailConfig;
use crate::error::NotificationError;
use crate::models::TriggeredAlert;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;

pub const SUBJECT: &str = "Cloud Cost Alert";

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct EmailNotifier {
    config: EmailConfig,
}

impl EmailNotifier {
    pub fn from_config(config: &EmailConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn format_body(alert: &TriggeredAlert) -> String {
        format!("Cost: ${:.2} > ${:.2}", alert.actual, alert.threshold)
    }

    /// Build the message for an alert without sending it
    pub fn build_message(&self, alert: &TriggeredAlert) -> Result<Message, NotificationError> {
        let from = self
            .config
            .from
            .as_deref()
            .ok_or_else(|| NotificationError::missing(EMAIL_CHANNEL, "from"))?;
        if self.config.to.is_empty() {
            return Err(NotificationError::missing(EMAIL_CHANNEL, "to"));
        }

        let mut builder = Message::builder()
            .from(parse_mailbox(from)?)
            .subject(SUBJECT)
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.config.to {
            builder = builder.to(parse_mailbox(recipient)?);
        }

        builder
            .body(Self::format_body(alert))
            .map_err(|e| NotificationError::Message(e.to_string()))
    }

    fn password(&self) -> Option<String> {
        self.config.password.clone().or_else(|| {
            self.config
                .password_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok())
        })
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotificationError> {
        let host = self
            .config
            .smtp_host
            .as_deref()
            .ok_or_else(|| NotificationError::missing(EMAIL_CHANNEL, "smtp_host"))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| NotificationError::Smtp(e.to_string()))?
            .port(self.config.smtp_port)
            .timeout(Some(SMTP_TIMEOUT));

        if let Some(username) = &self.config.username {
            let password = self
                .password()
                .ok_or_else(|| NotificationError::missing(EMAIL_CHANNEL, "password"))?;
            builder = builder.credentials(Credentials::new(username.clone(), password));
        }

        Ok(builder.build())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotificationError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| NotificationError::Address {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn channel(&self) -> &str {
        EMAIL_CHANNEL
    }

    async fn send(&self, alert: &TriggeredAlert) -> Result<(), NotificationError> {
        if !self.config.enabled {
            return Err(NotificationError::Disabled(EMAIL_CHANNEL.to_string()));
        }

        let message = self.build_message(alert)?;
        let transport = self.transport()?;

        transport
            .send(message)
            .await
            .map_err(|e| NotificationError::Smtp(e.to_string()))?;

        tracing::debug!(recipients = self.config.to.len(), "Alert email sent");
        Ok(())
    }
}
