// ── Runtime manager configuration ──
//
// These types describe how the manager talks to devices and how it
// listens for their notifications. They never touch disk: amplink-config
// (or any embedding binary) builds a `ManagerConfig` and hands it in.

use std::time::Duration;

use amplink_api::catcher::CatcherConfig;
use amplink_api::connector::{DEFAULT_POLL_INTERVAL, MIN_CONFIGURED_DEADLINE};
use amplink_api::{AmpVersion, TlsMode, TransportConfig};

use crate::error::CoreError;
use crate::registry::AMP_PROVIDER_ID;

/// TLS verification strategy for outbound management calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification. Appliances ship with self-signed certificates.
    #[default]
    DangerAcceptInvalid,
}

/// Default notification topics requested at subscribe time.
pub const DEFAULT_TOPICS: &[&str] = &[
    "operational-state",
    "configuration",
    "firmware",
    "device-settings",
];

/// Everything the manager needs at runtime.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Deadline for ordinary calls. Raised to the 1 s safety minimum.
    pub connect_timeout: Duration,
    /// Deadline for firmware, domain image and backup transfers.
    pub transfer_timeout: Duration,
    /// Connector completion-check interval. Kept below the deadline.
    pub poll_interval: Duration,
    /// Protocol version spoken to devices.
    pub amp_version: AmpVersion,
    pub tls: TlsVerification,
    /// `https` for appliances, `http` for labs and tests.
    pub scheme: String,
    /// Notification listener settings.
    pub catcher: CatcherConfig,
    /// Topics requested at subscribe time.
    pub topics: Vec<String>,
    /// Subscription id registered with every device.
    pub subscription_id: String,
    /// How often to ping each device's subscription. Zero disables.
    pub keepalive_interval: Duration,
    /// Registry id of the command channel provider.
    pub channel_provider: String,
    /// Registry id of the notification source provider.
    pub catcher_provider: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(600),
            poll_interval: DEFAULT_POLL_INTERVAL,
            amp_version: AmpVersion::LATEST,
            tls: TlsVerification::default(),
            scheme: "https".into(),
            catcher: CatcherConfig::default(),
            topics: DEFAULT_TOPICS.iter().map(|t| (*t).to_owned()).collect(),
            subscription_id: "amplink".into(),
            keepalive_interval: Duration::from_secs(60),
            channel_provider: AMP_PROVIDER_ID.into(),
            catcher_provider: AMP_PROVIDER_ID.into(),
        }
    }
}

impl ManagerConfig {
    /// Transport settings for the AMP client, with the deadline floor applied.
    pub fn transport_config(&self) -> TransportConfig {
        let connect_timeout = self.connect_timeout.max(MIN_CONFIGURED_DEADLINE);
        TransportConfig {
            tls: match &self.tls {
                TlsVerification::SystemDefaults => TlsMode::System,
                TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
                TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
            },
            connect_timeout,
            transfer_timeout: self.transfer_timeout.max(connect_timeout),
            poll_interval: self.poll_interval,
            scheme: self.scheme.clone(),
        }
    }

    /// Reject settings that cannot work. Called once at startup.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.scheme != "https" && self.scheme != "http" {
            return Err(CoreError::Config {
                message: format!("unsupported scheme '{}'", self.scheme),
            });
        }
        if self.catcher.workers == 0 {
            return Err(CoreError::Config {
                message: "catcher needs at least one worker".into(),
            });
        }
        if self.subscription_id.trim().is_empty() {
            return Err(CoreError::Config {
                message: "subscription id must not be empty".into(),
            });
        }
        if self.topics.is_empty() {
            return Err(CoreError::Config {
                message: "at least one notification topic is required".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiny_deadline_is_raised_to_minimum() {
        let config = ManagerConfig {
            connect_timeout: Duration::from_millis(5),
            ..ManagerConfig::default()
        };
        let transport = config.transport_config();
        assert_eq!(transport.connect_timeout, MIN_CONFIGURED_DEADLINE);
        assert!(transport.connector().poll_interval() < transport.connector().deadline());
    }

    #[test]
    fn defaults_validate() {
        assert!(ManagerConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_topics_fail_validation() {
        let config = ManagerConfig {
            topics: vec![],
            ..ManagerConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config { .. })));
    }
}
