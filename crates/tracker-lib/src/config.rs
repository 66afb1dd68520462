//! Tracker configuration
//!
//! Configuration is read once at startup from a YAML/JSON/TOML file layered with
//! `COST_TRACKER__*` environment overrides. Provider entries may be written either as a
//! mapping keyed by provider name or as a list of entries carrying a `name` field; both
//! shapes are normalized here so the rest of the crate only sees the mapping.
//!
//! Mapping keys are case-insensitive and come back lowercased, so a provider keyed
//! `ProdAWS` is named `prodaws` in readings and metric labels. The list shape keeps the
//! `name` value exactly as written.

use crate::error::ConfigError;
use crate::models::AlertRule;
use crate::provider::ProviderKind;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

/// File name looked up in the home directory when no path is given
pub const DEFAULT_CONFIG_FILE: &str = ".cost_tracker.yaml";

/// Prefix for environment overrides, e.g. `COST_TRACKER__PROVIDERS__AWS__ENABLED=true`
pub const ENV_PREFIX: &str = "COST_TRACKER";

/// Fully resolved tracker configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Provider settings keyed by provider name
    #[serde(default, deserialize_with = "deserialize_providers")]
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Alert rules in declaration order
    #[serde(default)]
    pub alerts: Vec<AlertConfig>,

    /// Per-channel notification settings
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

/// Settings for a single billing provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Backend discriminant; defaults to the provider's name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// AWS region used for request signing
    pub region: Option<String>,

    /// GCP project that runs the billing export query
    pub project_id: Option<String>,

    /// Fully qualified BigQuery billing export table (`dataset.table`)
    pub billing_table: Option<String>,

    /// Azure subscription to query
    pub subscription_id: Option<String>,

    /// Override for the provider API base URL
    pub endpoint: Option<String>,

    /// HTTP timeout for a single fetch
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,

    /// Readings returned verbatim by the `static` backend
    #[serde(default)]
    pub readings: Vec<StaticReadingConfig>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: None,
            region: None,
            project_id: None,
            billing_table: None,
            subscription_id: None,
            endpoint: None,
            timeout_secs: default_provider_timeout(),
            readings: Vec::new(),
        }
    }
}

impl ProviderConfig {
    /// Backend name for this entry, falling back to the provider's own name
    pub fn kind_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.kind.as_deref().unwrap_or(name)
    }
}

/// A reading declared directly in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticReadingConfig {
    pub service: String,
    #[serde(alias = "cost")]
    pub amount: f64,
    pub region: Option<String>,
    pub resource_id: Option<String>,
    pub currency: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// One alert rule as written in configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub name: Option<String>,

    #[serde(rename = "type", default = "default_alert_kind")]
    pub kind: String,

    #[serde(default = "default_threshold")]
    pub threshold: f64,

    #[serde(default = "default_period")]
    pub period: String,

    #[serde(default)]
    pub services: Vec<String>,

    #[serde(default)]
    pub notification_channels: Vec<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl AlertConfig {
    fn to_rule(&self, position: usize) -> Result<AlertRule, ConfigError> {
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| format!("{}_threshold_{}", self.period, position + 1));

        if !self.threshold.is_finite() || self.threshold <= 0.0 {
            return Err(ConfigError::invalid_rule(
                name,
                format!("threshold must be a positive amount, got {}", self.threshold),
            ));
        }

        let mut channels: Vec<String> = Vec::with_capacity(self.notification_channels.len());
        for channel in &self.notification_channels {
            let channel = channel.trim().to_lowercase();
            if channel.is_empty() {
                return Err(ConfigError::invalid_rule(name, "empty notification channel"));
            }
            if !channels.contains(&channel) {
                channels.push(channel);
            }
        }

        Ok(AlertRule {
            name,
            kind: self.kind.clone(),
            threshold: self.threshold,
            period: self.period.clone(),
            scoped_services: self.services.clone(),
            channels,
        })
    }
}

/// Notification channel settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default)]
    pub slack: SlackConfig,
    #[serde(default)]
    pub email: EmailConfig,
}

/// Chat webhook settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Inline webhook URL; takes precedence over `webhook_env`
    pub webhook_url: Option<String>,

    /// Environment variable holding the webhook URL
    #[serde(default = "default_webhook_env")]
    pub webhook_env: String,

    pub channel: Option<String>,

    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: None,
            webhook_env: default_webhook_env(),
            channel: None,
            timeout_secs: default_webhook_timeout(),
        }
    }
}

/// SMTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    /// Environment variable holding the SMTP password
    pub password_env: Option<String>,
    pub from: Option<String>,
    #[serde(default)]
    pub to: Vec<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: None,
            smtp_port: default_smtp_port(),
            username: None,
            password: None,
            password_env: None,
            from: None,
            to: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_provider_timeout() -> u64 {
    30
}

fn default_alert_kind() -> String {
    "threshold".to_string()
}

fn default_threshold() -> f64 {
    100.0
}

fn default_period() -> String {
    "daily".to_string()
}

fn default_webhook_env() -> String {
    "SLACK_WEBHOOK".to_string()
}

fn default_webhook_timeout() -> u64 {
    10
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ProvidersShape {
    Map(BTreeMap<String, ProviderConfig>),
    List(Vec<NamedProviderConfig>),
}

#[derive(Deserialize)]
struct NamedProviderConfig {
    name: String,
    #[serde(flatten)]
    config: ProviderConfig,
}

fn deserialize_providers<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, ProviderConfig>, D::Error>
where
    D: Deserializer<'de>,
{
    let providers = match Option::<ProvidersShape>::deserialize(deserializer)? {
        None => BTreeMap::new(),
        Some(ProvidersShape::Map(map)) => map,
        Some(ProvidersShape::List(list)) => list
            .into_iter()
            .map(|entry| (entry.name, entry.config))
            .collect(),
    };
    Ok(providers)
}

impl TrackerConfig {
    /// Default configuration file location (`~/.cost_tracker.yaml`)
    pub fn default_path() -> PathBuf {
        dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DEFAULT_CONFIG_FILE)
    }

    /// Load and validate configuration from `path` (or the default location).
    ///
    /// A missing file is not an error: the built-in default configuration, with every
    /// provider disabled and no alert rules, is returned instead.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        if !path.exists() {
            warn!(path = %path.display(), "Config file not found, using default configuration");
            return Ok(Self::default());
        }

        info!(path = %path.display(), "Loading configuration");

        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_path()))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check rule and backend settings that would otherwise fail mid-cycle
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, provider) in self.enabled_providers() {
            let kind = provider.kind_name(name);
            ProviderKind::from_str(kind).map_err(|_| ConfigError::UnsupportedProvider {
                name: name.to_string(),
                kind: kind.to_string(),
            })?;
        }

        self.alert_rules()?;
        Ok(())
    }

    /// Enabled provider entries in name order
    pub fn enabled_providers(&self) -> impl Iterator<Item = (&str, &ProviderConfig)> {
        self.providers
            .iter()
            .filter(|(_, provider)| provider.enabled)
            .map(|(name, provider)| (name.as_str(), provider))
    }

    /// Instantiate the enabled alert rules, preserving declaration order
    pub fn alert_rules(&self) -> Result<Vec<AlertRule>, ConfigError> {
        self.alerts
            .iter()
            .enumerate()
            .filter(|(_, alert)| alert.enabled)
            .map(|(position, alert)| alert.to_rule(position))
            .collect()
    }
}
