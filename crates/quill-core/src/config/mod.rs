//! Configuration system for quill.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{QuillError, QuillResult};

/// Public-facing site settings used in links and notification text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Short site name, used as the notification subject prefix.
    pub name: String,
    /// Absolute base URL without a trailing slash.
    pub base_url: String,
    /// Number of posts on the front page.
    pub latest_posts: usize,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "quill".to_string(),
            base_url: "http://localhost:8080".to_string(),
            latest_posts: 3,
        }
    }
}

/// SMTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtpConfig {
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_smtp_port() -> u16 {
    25
}

/// Outbound mail settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// Sender mailbox for notifications, e.g. `Quill <noreply@example.com>`.
    pub from: String,
    /// SMTP server; when absent mail is only logged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtp: Option<SmtpConfig>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from: "Quill <noreply@localhost>".to_string(),
            smtp: None,
        }
    }
}

/// Main quill configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuillConfig {
    /// Path to the SQLite database.
    pub database_path: PathBuf,
    pub site: SiteConfig,
    pub mail: MailConfig,
    /// Bearer token required for writes and privileged reads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Default for QuillConfig {
    fn default() -> Self {
        let quill_dir = dirs::home_dir()
            .map(|h| h.join(".quill"))
            .unwrap_or_else(|| PathBuf::from(".quill"));

        Self {
            database_path: quill_dir.join("quill.db"),
            site: SiteConfig::default(),
            mail: MailConfig::default(),
            api_key: None,
        }
    }
}

impl QuillConfig {
    /// Load configuration from a file (TOML, JSON, or YAML).
    pub fn from_file(path: impl AsRef<std::path::Path>) -> QuillResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let ext = path.as_ref().extension().and_then(|e| e.to_str());

        match ext {
            Some("toml") => {
                toml::from_str(&content).map_err(|e| QuillError::Configuration(e.to_string()))
            }
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| QuillError::Configuration(e.to_string())),
            Some("yaml" | "yml") => serde_yaml::from_str(&content)
                .map_err(|e| QuillError::Configuration(e.to_string())),
            _ => Err(QuillError::Configuration(
                "Unsupported config file format. Use .toml, .json, or .yaml".to_string(),
            )),
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> QuillResult<Self> {
        Self::default().apply_env(|key| std::env::var(key).ok())
    }

    /// Overlay `QUILL_*` variables looked up through `lookup`.
    pub fn apply_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> QuillResult<Self> {
        if let Some(path) = lookup("QUILL_DATABASE_PATH") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(name) = lookup("QUILL_SITE_NAME") {
            self.site.name = name;
        }
        if let Some(url) = lookup("QUILL_BASE_URL") {
            self.site.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(latest) = lookup("QUILL_LATEST_POSTS") {
            self.site.latest_posts = latest.parse().map_err(|_| {
                QuillError::Configuration(format!("QUILL_LATEST_POSTS is not a number: {}", latest))
            })?;
        }
        if let Some(from) = lookup("QUILL_MAIL_FROM") {
            self.mail.from = from;
        }
        if let Some(host) = lookup("QUILL_SMTP_HOST") {
            let port = match lookup("QUILL_SMTP_PORT") {
                Some(port) => port.parse().map_err(|_| {
                    QuillError::Configuration(format!("QUILL_SMTP_PORT is not a port: {}", port))
                })?,
                None => default_smtp_port(),
            };
            self.mail.smtp = Some(SmtpConfig {
                host,
                port,
                username: lookup("QUILL_SMTP_USER"),
                password: lookup("QUILL_SMTP_PASSWORD"),
            });
        }
        if let Some(key) = lookup("QUILL_API_KEY") {
            self.api_key = Some(key).filter(|k| !k.is_empty());
        }
        Ok(self)
    }

    /// Build configuration using builder pattern.
    pub fn builder() -> QuillConfigBuilder {
        QuillConfigBuilder::default()
    }
}

/// Builder for QuillConfig.
#[derive(Default)]
pub struct QuillConfigBuilder {
    config: QuillConfig,
}

impl QuillConfigBuilder {
    /// Set database path.
    pub fn database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.database_path = path.into();
        self
    }

    /// Set site settings.
    pub fn site(mut self, site: SiteConfig) -> Self {
        self.config.site = site;
        self
    }

    /// Set mail settings.
    pub fn mail(mut self, mail: MailConfig) -> Self {
        self.config.mail = mail;
        self
    }

    /// Set the API key.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> QuillConfig {
        self.config
    }
}
