// ── Command contract ──
//
// Every remote operation the manager can issue, bound to a device address.
// Providers implement the subset their protocol version supports; every
// method defaults to `CoreError::Unsupported`, so overlapping partial
// providers are expressible. All effects are remote: implementations keep
// no per-call local state.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use amplink_api::{DeviceAddress, Notification, Operation};
use async_trait::async_trait;
use bytes::Bytes;
use secrecy::SecretString;
use tokio::sync::broadcast;
use url::Url;

use crate::error::CoreError;
use crate::model::{
    BackupOptions, ConfigObjectRef, DeleteServiceResult, DeploymentPolicy, DeviceInfo,
    DeviceSettings, DiffTarget, DomainStatus, ErrorReport, InterDependentServices, QuiesceTarget,
    RebootMode, ReferencedObjects, RestoreOptions, Service, SubscribeOutcome, SubscriptionState,
};

/// The remote command surface of one protocol provider.
///
/// Calls against distinct devices may run concurrently. Calls against the
/// same device are not serialized here: callers serialize subscribe,
/// unsubscribe and other state-changing calls per device.
#[async_trait]
pub trait CommandChannel: Send + Sync {
    /// Registry id of this provider.
    fn provider_id(&self) -> &str;

    /// Whether the provider implements `operation`.
    fn supports(&self, _operation: Operation) -> bool {
        false
    }

    /// Error returned by every operation the provider does not implement.
    fn unsupported(&self, operation: Operation) -> CoreError {
        CoreError::Unsupported {
            operation: operation.to_string(),
            provider: self.provider_id().to_owned(),
        }
    }

    // ── Subscriptions ────────────────────────────────────────────────

    /// Current subscription state. Doubles as keep-alive.
    async fn ping(
        &self,
        _device: &DeviceAddress,
        _subscription_id: &str,
    ) -> Result<SubscriptionState, CoreError> {
        Err(self.unsupported(Operation::Ping))
    }

    async fn subscribe(
        &self,
        _device: &DeviceAddress,
        _subscription_id: &str,
        _topics: &[String],
        _callback_url: &str,
    ) -> Result<SubscribeOutcome, CoreError> {
        Err(self.unsupported(Operation::Subscribe))
    }

    async fn unsubscribe(
        &self,
        _device: &DeviceAddress,
        _subscription_id: &str,
    ) -> Result<(), CoreError> {
        Err(self.unsupported(Operation::Unsubscribe))
    }

    // ── Device ───────────────────────────────────────────────────────

    async fn get_device_metadata(&self, _device: &DeviceAddress) -> Result<DeviceInfo, CoreError> {
        Err(self.unsupported(Operation::GetDeviceMetadata))
    }

    async fn set_device_metadata(
        &self,
        _device: &DeviceAddress,
        _settings: &DeviceSettings,
    ) -> Result<(), CoreError> {
        Err(self.unsupported(Operation::SetDeviceMetadata))
    }

    /// Reboot. The device forgets every subscription.
    async fn reboot(&self, _device: &DeviceAddress, _mode: RebootMode) -> Result<(), CoreError> {
        Err(self.unsupported(Operation::Reboot))
    }

    async fn get_error_report(&self, _device: &DeviceAddress) -> Result<ErrorReport, CoreError> {
        Err(self.unsupported(Operation::GetErrorReport))
    }

    async fn get_saml_token(
        &self,
        _device: &DeviceAddress,
        _domain: &str,
    ) -> Result<SecretString, CoreError> {
        Err(self.unsupported(Operation::GetSamlToken))
    }

    async fn backup_device(
        &self,
        _device: &DeviceAddress,
        _options: &BackupOptions,
    ) -> Result<Bytes, CoreError> {
        Err(self.unsupported(Operation::BackupDevice))
    }

    async fn restore_device(
        &self,
        _device: &DeviceAddress,
        _options: &RestoreOptions,
        _backup: Bytes,
    ) -> Result<(), CoreError> {
        Err(self.unsupported(Operation::RestoreDevice))
    }

    // ── Domains ──────────────────────────────────────────────────────

    async fn get_domain_list(&self, _device: &DeviceAddress) -> Result<Vec<String>, CoreError> {
        Err(self.unsupported(Operation::GetDomainList))
    }

    /// Export a domain as an opaque deployment image.
    async fn get_domain(&self, _device: &DeviceAddress, _domain: &str) -> Result<Bytes, CoreError> {
        Err(self.unsupported(Operation::GetDomain))
    }

    /// Import a deployment image, optionally under a deployment policy.
    async fn set_domain(
        &self,
        _device: &DeviceAddress,
        _domain: &str,
        _image: Bytes,
        _policy: Option<&DeploymentPolicy>,
        _import_all: bool,
    ) -> Result<(), CoreError> {
        Err(self.unsupported(Operation::SetDomain))
    }

    async fn delete_domain(&self, _device: &DeviceAddress, _domain: &str) -> Result<(), CoreError> {
        Err(self.unsupported(Operation::DeleteDomain))
    }

    async fn start_domain(&self, _device: &DeviceAddress, _domain: &str) -> Result<(), CoreError> {
        Err(self.unsupported(Operation::StartDomain))
    }

    async fn stop_domain(&self, _device: &DeviceAddress, _domain: &str) -> Result<(), CoreError> {
        Err(self.unsupported(Operation::StopDomain))
    }

    async fn restart_domain(&self, _device: &DeviceAddress, _domain: &str) -> Result<(), CoreError> {
        Err(self.unsupported(Operation::RestartDomain))
    }

    async fn get_domain_status(
        &self,
        _device: &DeviceAddress,
        _domain: &str,
    ) -> Result<DomainStatus, CoreError> {
        Err(self.unsupported(Operation::GetDomainStatus))
    }

    // ── Firmware ─────────────────────────────────────────────────────

    /// Install a firmware image held in memory.
    async fn set_firmware(
        &self,
        _device: &DeviceAddress,
        _image: Bytes,
        accept_license: bool,
    ) -> Result<(), CoreError> {
        Err(self.unsupported(if accept_license {
            Operation::SetFirmwareAcceptLicense
        } else {
            Operation::SetFirmware
        }))
    }

    /// Install a firmware image streamed from a file.
    async fn set_firmware_stream(
        &self,
        _device: &DeviceAddress,
        _path: &Path,
        accept_license: bool,
    ) -> Result<(), CoreError> {
        Err(self.unsupported(if accept_license {
            Operation::SetFirmwareStreamAcceptLicense
        } else {
            Operation::SetFirmwareStream
        }))
    }

    // ── Key files ────────────────────────────────────────────────────

    async fn get_key_filenames(
        &self,
        _device: &DeviceAddress,
        _domain: &str,
    ) -> Result<Vec<String>, CoreError> {
        Err(self.unsupported(Operation::GetKeyFilenames))
    }

    async fn set_key_file(
        &self,
        _device: &DeviceAddress,
        _domain: &str,
        _filename: &str,
        _contents: Bytes,
    ) -> Result<(), CoreError> {
        Err(self.unsupported(Operation::SetKeyFile))
    }

    async fn delete_key_file(
        &self,
        _device: &DeviceAddress,
        _domain: &str,
        _filename: &str,
    ) -> Result<(), CoreError> {
        Err(self.unsupported(Operation::DeleteKeyFile))
    }

    // ── Configuration diff ───────────────────────────────────────────

    async fn is_different(
        &self,
        _device: &DeviceAddress,
        _from: &DiffTarget,
        _to: &DiffTarget,
    ) -> Result<bool, CoreError> {
        Err(self.unsupported(Operation::IsDifferent))
    }

    async fn get_diff_url(
        &self,
        _device: &DeviceAddress,
        _from: &DiffTarget,
        _to: &DiffTarget,
    ) -> Result<Url, CoreError> {
        Err(self.unsupported(Operation::GetDiffUrl))
    }

    // ── Quiesce ──────────────────────────────────────────────────────

    async fn quiesce(
        &self,
        _device: &DeviceAddress,
        _target: &QuiesceTarget,
        _timeout_secs: u32,
    ) -> Result<(), CoreError> {
        Err(self.unsupported(Operation::Quiesce))
    }

    async fn unquiesce(
        &self,
        _device: &DeviceAddress,
        _target: &QuiesceTarget,
    ) -> Result<(), CoreError> {
        Err(self.unsupported(Operation::Unquiesce))
    }

    // ── Services ─────────────────────────────────────────────────────

    async fn get_service_list(
        &self,
        _device: &DeviceAddress,
        _domain: &str,
    ) -> Result<Vec<Service>, CoreError> {
        Err(self.unsupported(Operation::GetServiceList))
    }

    async fn get_service_list_from_export(
        &self,
        _device: &DeviceAddress,
        _image: Bytes,
    ) -> Result<Vec<ConfigObjectRef>, CoreError> {
        Err(self.unsupported(Operation::GetServiceListFromExport))
    }

    async fn start_service(
        &self,
        _device: &DeviceAddress,
        _domain: &str,
        _services: &[ConfigObjectRef],
    ) -> Result<(), CoreError> {
        Err(self.unsupported(Operation::StartService))
    }

    async fn stop_service(
        &self,
        _device: &DeviceAddress,
        _domain: &str,
        _services: &[ConfigObjectRef],
    ) -> Result<(), CoreError> {
        Err(self.unsupported(Operation::StopService))
    }

    async fn delete_service(
        &self,
        _device: &DeviceAddress,
        _domain: &str,
        _service: &ConfigObjectRef,
        _exclude_objects: &[ConfigObjectRef],
        _delete_files: bool,
    ) -> Result<DeleteServiceResult, CoreError> {
        Err(self.unsupported(Operation::DeleteService))
    }

    async fn get_inter_dependent_services(
        &self,
        _device: &DeviceAddress,
        _domain: &str,
        _image: Bytes,
    ) -> Result<InterDependentServices, CoreError> {
        Err(self.unsupported(Operation::GetInterDependentServices))
    }

    async fn get_referenced_objects(
        &self,
        _device: &DeviceAddress,
        _domain: &str,
        _service: &ConfigObjectRef,
    ) -> Result<ReferencedObjects, CoreError> {
        Err(self.unsupported(Operation::GetReferencedObjects))
    }
}

// ── Notification source ──────────────────────────────────────────────

/// Inbound side: something that receives device notifications and fans
/// them out as raw JSON.
#[async_trait]
pub trait NotificationSource: Send + Sync {
    /// Begin accepting notifications. Returns the bound address.
    async fn start(&self) -> Result<SocketAddr, CoreError>;

    /// Stop accepting and release the listening endpoint.
    async fn stop(&self);

    fn is_running(&self) -> bool;

    /// URL devices should deliver to.
    fn callback_url(&self) -> Result<Url, CoreError>;

    /// Receiver of every accepted notification.
    fn notifications(&self) -> broadcast::Receiver<Arc<Notification>>;
}
