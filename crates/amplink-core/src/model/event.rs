// ── Decoded device events ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

/// Message-type codes understood by the manager.
pub mod codes {
    pub const FIRMWARE_CHANGED: &str = "0x8100003f";
    pub const OP_STATE_UP: &str = "0x00330034";
    pub const OP_STATE_DOWN: &str = "0x00330035";
    pub const BOOT_SCHEDULED: &str = "0x8100001f";
    pub const DOMAIN_CONFIG_SAVED: &str = "0x8100000c";
    pub const DOMAIN_CONFIG_MODIFIED: &str = "0x8100000d";
    pub const TEST: &str = "0x8100003b";

    /// Object name the device uses when a configuration change touches
    /// device-wide settings rather than a domain.
    pub const SETTINGS_OBJECT_NAME: &str = "Settings";
}

/// Classification of one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    FirmwareChanged,
    OpStateUp,
    OpStateDown,
    BootScheduled,
    DomainConfigSaved,
    DomainConfigModified,
    /// A configuration-modified event against the settings object.
    SettingsChanged,
    Test,
    /// None of the known kinds. Not an error.
    Unrecognized,
}

impl EventKind {
    /// Classify a message code, given the affected object name.
    pub fn classify(code: &str, object_name: Option<&str>) -> Self {
        let code = code.trim();
        let matches = |known: &str| code.eq_ignore_ascii_case(known);

        if matches(codes::FIRMWARE_CHANGED) {
            Self::FirmwareChanged
        } else if matches(codes::OP_STATE_UP) {
            Self::OpStateUp
        } else if matches(codes::OP_STATE_DOWN) {
            Self::OpStateDown
        } else if matches(codes::BOOT_SCHEDULED) {
            Self::BootScheduled
        } else if matches(codes::DOMAIN_CONFIG_SAVED) {
            Self::DomainConfigSaved
        } else if matches(codes::DOMAIN_CONFIG_MODIFIED) {
            if object_name == Some(codes::SETTINGS_OBJECT_NAME) {
                Self::SettingsChanged
            } else {
                Self::DomainConfigModified
            }
        } else if matches(codes::TEST) {
            Self::Test
        } else {
            Self::Unrecognized
        }
    }

    /// Whether the event changes what is known about a domain's status.
    pub fn affects_domain_status(self) -> bool {
        matches!(
            self,
            Self::OpStateUp | Self::OpStateDown | Self::DomainConfigSaved | Self::DomainConfigModified
        )
    }
}

/// Typed extended attribute carried by an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedAttribute {
    pub name: String,
    /// Declared value type, e.g. `string` or `int`.
    pub kind: String,
    pub values: Vec<String>,
}

/// One decoded push event. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Serial number of the source device.
    pub device_id: String,
    pub sequence_number: u64,
    pub kind: EventKind,
    /// Raw message code, kept for unrecognized events.
    pub code: String,
    pub object_class: Option<String>,
    pub object_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub client_address: Option<String>,
    pub attributes: Vec<ExtendedAttribute>,
}

impl Event {
    /// First value of the named extended attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .and_then(|a| a.values.first())
            .map(String::as_str)
    }

    /// Domain the event refers to, when it refers to one.
    pub fn domain(&self) -> Option<&str> {
        if self
            .object_class
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case("Domain"))
        {
            return self.object_name.as_deref();
        }
        self.attribute("Domain")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_classify() {
        assert_eq!(EventKind::classify(codes::OP_STATE_UP, None), EventKind::OpStateUp);
        assert_eq!(
            EventKind::classify("0X8100003F", Some("x")),
            EventKind::FirmwareChanged
        );
        assert_eq!(EventKind::classify(codes::TEST, None), EventKind::Test);
    }

    #[test]
    fn settings_sentinel_refines_config_modified() {
        assert_eq!(
            EventKind::classify(codes::DOMAIN_CONFIG_MODIFIED, Some("Settings")),
            EventKind::SettingsChanged
        );
        assert_eq!(
            EventKind::classify(codes::DOMAIN_CONFIG_MODIFIED, Some("prod")),
            EventKind::DomainConfigModified
        );
        // Only the modified code is refined.
        assert_eq!(
            EventKind::classify(codes::DOMAIN_CONFIG_SAVED, Some("Settings")),
            EventKind::DomainConfigSaved
        );
    }

    #[test]
    fn unknown_code_is_unrecognized() {
        assert_eq!(EventKind::classify("0xdeadbeef", None), EventKind::Unrecognized);
        assert_eq!(EventKind::classify("", None), EventKind::Unrecognized);
    }
}
