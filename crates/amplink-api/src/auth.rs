use std::fmt;

use secrecy::{ExposeSecret, SecretString};

/// Username/password pair presented to a device on every AMP call.
///
/// The password is held as a [`SecretString`] so it never shows up in
/// `Debug` output or logs.
#[derive(Debug, Clone)]
pub struct Credentials {
    username: String,
    password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    pub(crate) fn password_str(&self) -> &str {
        self.password.expose_secret()
    }
}

/// Immutable address of a managed appliance: host, AMP port, credentials.
///
/// Built once by the caller and passed by reference into every command.
/// Two addresses are the same device when host and port match; the
/// credential is deliberately excluded from [`key`](Self::key).
#[derive(Debug, Clone)]
pub struct DeviceAddress {
    host: String,
    port: u16,
    credentials: Credentials,
}

impl DeviceAddress {
    /// Default AMP management port.
    pub const DEFAULT_PORT: u16 = 5550;

    pub fn new(host: impl Into<String>, port: u16, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            port,
            credentials,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// `host:port`, used as the device key in stores and log fields.
    ///
    /// IPv6 literals are bracketed so the key is also a valid authority.
    pub fn key(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.credentials.username, self.key())
    }
}

impl PartialEq for DeviceAddress {
    fn eq(&self, other: &Self) -> bool {
        self.host == other.host
            && self.port == other.port
            && self.credentials.username == other.credentials.username
    }
}

impl Eq for DeviceAddress {}
