// ── Device identity ──

use amplink_api::AmpVersion;
use serde::{Deserialize, Serialize};

use super::device_type::{DeviceType, ModelType};

/// Identity and capabilities of one appliance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: Option<String>,
    pub serial_number: String,
    pub model: ModelType,
    pub device_type: DeviceType,
    pub firmware_level: Option<String>,
    /// Protocol versions the device advertises, oldest first.
    pub amp_versions: Vec<AmpVersion>,
    pub management_port: Option<u16>,
    pub hardware_options: Vec<String>,
    pub secure_backup_supported: bool,
}

impl DeviceInfo {
    /// Newest protocol version both sides speak.
    pub fn negotiate(&self, ours: AmpVersion) -> Option<AmpVersion> {
        self.amp_versions.iter().copied().filter(|v| *v <= ours).max()
    }
}

/// Mutable device settings. Unset fields are left unchanged.
pub use amplink_api::amp::models::DeviceSettings;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiate_picks_newest_common_version() {
        let info = DeviceInfo {
            name: None,
            serial_number: "0A1B2C".into(),
            model: ModelType::M7199,
            device_type: DeviceType::IDG,
            firmware_level: Some("10.5.0".into()),
            amp_versions: vec![AmpVersion::V1, AmpVersion::V2, AmpVersion::V3],
            management_port: Some(5550),
            hardware_options: vec![],
            secure_backup_supported: true,
        };
        assert_eq!(info.negotiate(AmpVersion::V2), Some(AmpVersion::V2));
        assert_eq!(info.negotiate(AmpVersion::V3), Some(AmpVersion::V3));

        let old = DeviceInfo {
            amp_versions: vec![AmpVersion::V3],
            ..info
        };
        assert_eq!(old.negotiate(AmpVersion::V1), None);
    }
}
