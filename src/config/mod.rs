use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub otp: OtpConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            static_dir: default_static_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static/dist")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret used to sign user bearer tokens.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Lifetime of user bearer tokens, in days.
    #[serde(default = "default_token_ttl_days")]
    pub token_ttl_days: i64,
    /// Secret for service-to-service tokens. Falls back to `jwt_secret`.
    #[serde(default)]
    pub service_jwt_secret: Option<String>,
    /// Default lifetime of service tokens, in seconds.
    #[serde(default = "default_service_token_ttl_secs")]
    pub service_token_ttl_secs: i64,
}

impl AuthConfig {
    /// The secret that signs service tokens.
    pub fn service_secret(&self) -> &str {
        self.service_jwt_secret.as_deref().unwrap_or(&self.jwt_secret)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_ttl_days: default_token_ttl_days(),
            service_jwt_secret: None,
            service_token_ttl_secs: default_service_token_ttl_secs(),
        }
    }
}

fn default_jwt_secret() -> String {
    // Generate a random secret if not provided. Tokens will not survive a
    // restart in this mode; set auth.jwt_secret in production.
    uuid::Uuid::new_v4().to_string()
}

fn default_token_ttl_days() -> i64 {
    30
}

fn default_service_token_ttl_secs() -> i64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    /// Number of characters in a verification code.
    #[serde(default = "default_otp_length")]
    pub length: usize,
    /// Alphabet the code is drawn from.
    #[serde(default = "default_otp_alphabet")]
    pub alphabet: String,
    /// How long a code stays valid, in seconds.
    #[serde(default = "default_otp_ttl_secs")]
    pub ttl_secs: i64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            length: default_otp_length(),
            alphabet: default_otp_alphabet(),
            ttl_secs: default_otp_ttl_secs(),
        }
    }
}

fn default_otp_length() -> usize {
    6
}

fn default_otp_alphabet() -> String {
    "0123456789".to_string()
}

fn default_otp_ttl_secs() -> i64 {
    300
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Retention of session records, in days.
    #[serde(default = "default_session_retention_days")]
    pub retention_days: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            retention_days: default_session_retention_days(),
        }
    }
}

fn default_session_retention_days() -> i64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default = "default_smtp_tls")]
    pub smtp_tls: bool,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub from_address: Option<String>,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    #[serde(default = "default_registration_subject")]
    pub registration_subject: String,
    #[serde(default = "default_vendor_subject")]
    pub vendor_subject: String,
}

impl EmailConfig {
    /// Email sending requires at least a host and a from address.
    pub fn is_configured(&self) -> bool {
        self.smtp_host.is_some() && self.from_address.is_some()
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_tls: default_smtp_tls(),
            smtp_username: None,
            smtp_password: None,
            from_address: None,
            from_name: default_from_name(),
            registration_subject: default_registration_subject(),
            vendor_subject: default_vendor_subject(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_tls() -> bool {
    true
}

fn default_from_name() -> String {
    "Cartr".to_string()
}

fn default_registration_subject() -> String {
    "Email Verification - Cartr".to_string()
}

fn default_vendor_subject() -> String {
    "Vendor Verification - Cartr".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}
