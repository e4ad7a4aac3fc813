// AMP device-level endpoints
//
// Metadata, settings, reboot, diagnostics, SAML tokens and secure
// backup/restore.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde_json::json;
use tracing::{debug, info};

use crate::amp::client::AmpClient;
use crate::amp::dispatch::{Operation, Scope};
use crate::amp::models::{
    BackupOptions, DeviceMetaInfo, DeviceSettings, ErrorReport, RestoreOptions, TokenResponse,
};
use crate::auth::DeviceAddress;
use crate::error::Error;

/// How the device should come back after `Reboot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum RebootMode {
    #[default]
    Reload,
    Reboot,
    Halt,
}

impl AmpClient {
    /// Fetch identity, model and firmware information.
    pub async fn get_device_metadata(&self, device: &DeviceAddress) -> Result<DeviceMetaInfo, Error> {
        self.call(device, Operation::GetDeviceMetadata, Scope::Device, &json!({}))
            .await
    }

    /// Change the mutable device settings. Unset fields are left alone.
    pub async fn set_device_metadata(
        &self,
        device: &DeviceAddress,
        settings: &DeviceSettings,
    ) -> Result<(), Error> {
        debug!(device = %device.key(), ?settings, "updating device settings");
        self.call_unit(device, Operation::SetDeviceMetadata, Scope::Device, settings)
            .await
    }

    /// Reboot the device. All subscriptions are lost.
    pub async fn reboot(&self, device: &DeviceAddress, mode: RebootMode) -> Result<(), Error> {
        info!(device = %device.key(), %mode, "rebooting device");
        let mode: &'static str = mode.into();
        self.call_unit(device, Operation::Reboot, Scope::Device, &json!({ "mode": mode }))
            .await
    }

    /// Generate and fetch the device error report.
    pub async fn get_error_report(&self, device: &DeviceAddress) -> Result<ErrorReport, Error> {
        self.call(device, Operation::GetErrorReport, Scope::Device, &json!({}))
            .await
    }

    /// Fetch a SAML token for the named domain.
    pub async fn get_saml_token(
        &self,
        device: &DeviceAddress,
        domain: &str,
    ) -> Result<TokenResponse, Error> {
        self.call(
            device,
            Operation::GetSamlToken,
            Scope::Domain,
            &json!({ "domain": domain }),
        )
        .await
    }

    /// Take an encrypted full-device backup.
    pub async fn backup_device(
        &self,
        device: &DeviceAddress,
        options: &BackupOptions,
    ) -> Result<Bytes, Error> {
        info!(
            device = %device.key(),
            certificate = %options.crypto_certificate,
            domains = options.domains.len(),
            "taking secure backup"
        );
        self.call_binary(device, Operation::BackupDevice, options).await
    }

    /// Restore an encrypted full-device backup. The device reboots after.
    pub async fn restore_device(
        &self,
        device: &DeviceAddress,
        options: &RestoreOptions,
        backup: Bytes,
    ) -> Result<(), Error> {
        info!(
            device = %device.key(),
            credential = %options.crypto_credential,
            bytes = backup.len(),
            validate_only = options.validate_only,
            "restoring secure backup"
        );
        let part = Part::stream(backup)
            .file_name("backup.zip")
            .mime_str("application/octet-stream")?;
        self.upload(device, Operation::RestoreDevice, options, Form::new().part("backup", part))
            .await
    }
}
