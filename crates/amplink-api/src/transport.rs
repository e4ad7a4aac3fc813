// Shared transport configuration for building reqwest::Client instances.
//
// The AMP client and any provider built on top of it share TLS and
// deadline settings through this module.

use std::path::PathBuf;
use std::time::Duration;

use crate::connector::{BoundedConnector, DEFAULT_POLL_INTERVAL};
use crate::error::Error;

/// TLS verification mode for outbound management calls.
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (appliances ship self-signed).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Deadline for ordinary calls, enforced by [`BoundedConnector`].
    pub connect_timeout: Duration,
    /// Deadline for calls that move deployment images (firmware, domain
    /// import/export, backup/restore).
    pub transfer_timeout: Duration,
    /// How often the connector checks for completion.
    pub poll_interval: Duration,
    /// `https` for real appliances; `http` for lab setups and tests.
    pub scheme: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::DangerAcceptInvalid,
            connect_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(600),
            poll_interval: DEFAULT_POLL_INTERVAL,
            scheme: "https".into(),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    ///
    /// No client-level timeout is set: every exchange is bounded by a
    /// [`BoundedConnector`] instead.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            "amplink/",
            env!("CARGO_PKG_VERSION")
        ));

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Connector for ordinary calls.
    pub fn connector(&self) -> BoundedConnector {
        BoundedConnector::new(self.connect_timeout).with_poll_interval(self.poll_interval)
    }

    /// Connector for image transfers.
    pub fn transfer_connector(&self) -> BoundedConnector {
        BoundedConnector::new(self.transfer_timeout).with_poll_interval(self.poll_interval)
    }
}
