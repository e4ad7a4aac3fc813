//! Configuration for amplink consumers.
//!
//! TOML device profiles plus a `[manager]` table, credential resolution
//! (env + keyring + plaintext), and translation to
//! `amplink_core::ManagerConfig` and `DeviceAddress`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use amplink_api::{CatcherConfig, CatcherTls};
use amplink_core::config::DEFAULT_TOPICS;
use amplink_core::list_codec::{self, DEFAULT_DELIMITER};
use amplink_core::registry::AMP_PROVIDER_ID;
use amplink_core::{
    AmpVersion, CoreError, Credentials, DeviceAddress, ErrorKind, ManagerConfig, TlsVerification,
};
use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use url::Url;

/// Keyring service name for stored device passwords.
pub const KEYRING_SERVICE: &str = "amplink";

/// Environment prefix. Nested keys use a double underscore, e.g.
/// `AMPLINK_MANAGER__TIMEOUT=45`.
pub const ENV_PREFIX: &str = "AMPLINK_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for device '{device}'")]
    NoCredentials { device: String },

    #[error("no device profile named '{device}'")]
    UnknownDevice { device: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Manager(#[from] CoreError),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoCredentials { .. } => ErrorKind::InvalidCredentials,
            Self::UnknownDevice { .. } => ErrorKind::NotFound,
            Self::Io(_) => ErrorKind::IoFailure,
            Self::Manager(e) => e.kind(),
            Self::Validation { .. } | Self::Serialization(_) | Self::Figment(_) => {
                ErrorKind::InvalidRequest
            }
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "amp.config.invalid",
            Self::NoCredentials { .. } => "amp.config.no_credentials",
            Self::UnknownDevice { .. } => "amp.config.unknown_device",
            Self::Serialization(_) => "amp.config.serialize",
            Self::Figment(_) => "amp.config.load",
            Self::Io(_) => "amp.config.io",
            Self::Manager(e) => e.key(),
        }
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when a caller names no device.
    pub default_device: Option<String>,

    #[serde(default)]
    pub manager: ManagerSection,

    /// Named device profiles.
    #[serde(default)]
    pub devices: HashMap<String, DeviceProfile>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ManagerSection {
    /// Connect deadline in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Deadline for firmware and domain image transfers, in seconds.
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout: u64,

    #[serde(default = "default_amp_version")]
    pub amp_version: AmpVersion,

    /// Skip certificate checks on outbound calls. Defaults to on unless
    /// `ca_cert` is set: appliances ship with self-signed certificates.
    pub insecure: Option<bool>,

    pub ca_cert: Option<PathBuf>,

    #[serde(default = "default_subscription_id")]
    pub subscription_id: String,

    /// Either a TOML array or a comma-delimited string.
    #[serde(default = "default_topics", deserialize_with = "topic_list")]
    pub topics: Vec<String>,

    /// Keep-alive ping interval in seconds; 0 disables it.
    #[serde(default = "default_keepalive")]
    pub keepalive: u64,

    #[serde(default = "default_provider")]
    pub channel_provider: String,

    #[serde(default = "default_provider")]
    pub catcher_provider: String,

    #[serde(default)]
    pub catcher: CatcherSection,
}

impl Default for ManagerSection {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            transfer_timeout: default_transfer_timeout(),
            amp_version: default_amp_version(),
            insecure: None,
            ca_cert: None,
            subscription_id: default_subscription_id(),
            topics: default_topics(),
            keepalive: default_keepalive(),
            channel_provider: default_provider(),
            catcher_provider: default_provider(),
            catcher: CatcherSection::default(),
        }
    }
}

/// Notification listener settings.
#[derive(Debug, Deserialize, Serialize)]
pub struct CatcherSection {
    #[serde(default = "default_bind")]
    pub bind: String,

    /// URL devices post to, when it differs from the bound address.
    pub callback_url: Option<String>,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// TLS material. All three or none.
    pub cert_chain: Option<PathBuf>,
    pub private_key: Option<PathBuf>,
    pub client_ca: Option<PathBuf>,
}

impl Default for CatcherSection {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            callback_url: None,
            workers: default_workers(),
            cert_chain: None,
            private_key: None,
            client_ca: None,
        }
    }
}

fn default_timeout() -> u64 {
    30
}
fn default_transfer_timeout() -> u64 {
    600
}
fn default_amp_version() -> AmpVersion {
    AmpVersion::LATEST
}
fn default_subscription_id() -> String {
    "amplink".into()
}
fn default_topics() -> Vec<String> {
    DEFAULT_TOPICS.iter().map(|t| (*t).to_owned()).collect()
}
fn default_keepalive() -> u64 {
    60
}
fn default_provider() -> String {
    AMP_PROVIDER_ID.into()
}
fn default_bind() -> String {
    CatcherConfig::default().bind.to_string()
}
fn default_workers() -> usize {
    CatcherConfig::default().workers
}

fn topic_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Topics {
        List(Vec<String>),
        Delimited(String),
    }

    let items = match Topics::deserialize(deserializer)? {
        Topics::List(items) => items,
        Topics::Delimited(raw) => list_codec::decode(&raw, DEFAULT_DELIMITER),
    };
    // Topic names never carry surrounding whitespace.
    Ok(items
        .into_iter()
        .map(|t| t.trim().to_owned())
        .filter(|t| !t.is_empty())
        .collect())
}

/// A named appliance.
#[derive(Debug, Deserialize, Serialize)]
pub struct DeviceProfile {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub username: String,

    /// Plaintext password (prefer keyring or env var).
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    /// Overrides `manager.amp_version` for this device.
    pub amp_version: Option<AmpVersion>,
}

fn default_port() -> u16 {
    DeviceAddress::DEFAULT_PORT
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "amplink", "amplink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("amplink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file path + environment. A missing file leaves
/// the defaults in place.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a device password: `password_env`, then the system keyring,
/// then plaintext in the profile.
pub fn resolve_password(
    profile: &DeviceProfile,
    device_name: &str,
) -> Result<SecretString, ConfigError> {
    if let Some(ref env_name) = profile.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, &format!("{device_name}/password")) {
        if let Ok(secret) = entry.get_password() {
            return Ok(SecretString::from(secret));
        }
    }

    if let Some(ref pw) = profile.password {
        return Ok(SecretString::from(pw.clone()));
    }

    Err(ConfigError::NoCredentials {
        device: device_name.into(),
    })
}

/// Store a device password in the system keyring.
pub fn store_password(device_name: &str, password: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{device_name}/password"))
        .and_then(|entry| entry.set_password(password))
        .map_err(|e| ConfigError::Validation {
            field: "keyring".into(),
            reason: e.to_string(),
        })
}

// ── Translation ─────────────────────────────────────────────────────

impl Config {
    /// Profile by name, falling back to `default_device` when `name` is
    /// `None`.
    pub fn device(&self, name: Option<&str>) -> Result<(&str, &DeviceProfile), ConfigError> {
        let name = name
            .or(self.default_device.as_deref())
            .ok_or_else(|| ConfigError::Validation {
                field: "default_device".into(),
                reason: "no device named and no default configured".into(),
            })?;
        self.devices
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownDevice {
                device: name.into(),
            })
    }

    /// Address and credentials for a named device.
    pub fn device_address(&self, name: Option<&str>) -> Result<DeviceAddress, ConfigError> {
        let (name, profile) = self.device(name)?;
        if profile.host.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: format!("devices.{name}.host"),
                reason: "must not be empty".into(),
            });
        }
        let password = resolve_password(profile, name)?;
        Ok(DeviceAddress::new(
            profile.host.trim(),
            profile.port,
            Credentials::new(profile.username.clone(), password),
        ))
    }

    /// AMP version to use for a device: its override or the manager default.
    pub fn amp_version_for(&self, name: &str) -> AmpVersion {
        self.devices
            .get(name)
            .and_then(|p| p.amp_version)
            .unwrap_or(self.manager.amp_version)
    }

    /// Build the runtime manager config. The result has passed
    /// `ManagerConfig::validate`.
    pub fn to_manager_config(&self) -> Result<ManagerConfig, ConfigError> {
        let m = &self.manager;

        let bind: SocketAddr = m.catcher.bind.parse().map_err(|_| ConfigError::Validation {
            field: "manager.catcher.bind".into(),
            reason: format!("invalid socket address: {}", m.catcher.bind),
        })?;
        let callback_url = m
            .catcher
            .callback_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|e| ConfigError::Validation {
                    field: "manager.catcher.callback_url".into(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        let tls = match (&m.catcher.cert_chain, &m.catcher.private_key, &m.catcher.client_ca) {
            (Some(cert_chain), Some(private_key), Some(client_ca)) => Some(CatcherTls {
                cert_chain: cert_chain.clone(),
                private_key: private_key.clone(),
                client_ca: client_ca.clone(),
            }),
            (None, None, None) => None,
            _ => {
                return Err(ConfigError::Validation {
                    field: "manager.catcher".into(),
                    reason: "cert_chain, private_key and client_ca must be set together".into(),
                });
            }
        };

        let outbound_tls = match (&m.ca_cert, m.insecure) {
            (_, Some(true)) => TlsVerification::DangerAcceptInvalid,
            (Some(ca), _) => TlsVerification::CustomCa(ca.clone()),
            (None, Some(false)) => TlsVerification::SystemDefaults,
            (None, None) => TlsVerification::DangerAcceptInvalid,
        };

        let config = ManagerConfig {
            connect_timeout: Duration::from_secs(m.timeout),
            transfer_timeout: Duration::from_secs(m.transfer_timeout),
            amp_version: m.amp_version,
            tls: outbound_tls,
            catcher: CatcherConfig {
                bind,
                callback_url,
                workers: m.catcher.workers,
                tls,
                ..CatcherConfig::default()
            },
            topics: m.topics.clone(),
            subscription_id: m.subscription_id.clone(),
            keepalive_interval: Duration::from_secs(m.keepalive),
            channel_provider: m.channel_provider.clone(),
            catcher_provider: m.catcher_provider.clone(),
            ..ManagerConfig::default()
        };
        config.validate()?;
        Ok(config)
    }
}
