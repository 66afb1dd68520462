//! Error types surfaced by the cost tracker
//!
//! Provider fetch failures never leave the provider client and notification failures never
//! leave the dispatcher. Configuration and report persistence faults reach the caller.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration or schema fault, raised before any cycle runs
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration source could not be read or deserialized
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// An alert rule is malformed
    #[error("invalid alert rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    /// A provider names a backend this build does not support
    #[error("unsupported provider kind '{kind}' for provider '{name}'")]
    UnsupportedProvider { name: String, kind: String },

    /// An enabled provider lacks a setting its adapter needs
    #[error("provider '{name}' is missing required setting '{setting}'")]
    MissingSetting { name: String, setting: String },

    /// A provider setting is present but unusable
    #[error("provider '{name}' has invalid setting '{setting}': {reason}")]
    InvalidSetting {
        name: String,
        setting: String,
        reason: String,
    },

    /// The shared HTTP client could not be constructed
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl ConfigError {
    pub fn invalid_rule(rule: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule: rule.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(name: impl Into<String>, setting: impl Into<String>) -> Self {
        Self::MissingSetting {
            name: name.into(),
            setting: setting.into(),
        }
    }
}

/// Failure to persist a requested report
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to create report directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write report {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure to deliver an alert through one channel
///
/// Always contained by the dispatcher; it shows up as a failed or skipped delivery outcome.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("channel '{channel}' is missing setting '{setting}'")]
    MissingSetting { channel: String, setting: String },

    #[error("channel '{0}' is disabled")]
    Disabled(String),

    #[error("no notifier registered for channel '{0}'")]
    UnknownChannel(String),

    #[error("invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Message(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

impl NotificationError {
    pub fn missing(channel: impl Into<String>, setting: impl Into<String>) -> Self {
        Self::MissingSetting {
            channel: channel.into(),
            setting: setting.into(),
        }
    }
}
