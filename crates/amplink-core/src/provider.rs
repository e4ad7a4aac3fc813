// ── AMP provider ──
//
// `CommandChannel` over the AMP JSON endpoint, and
// `NotificationSource` over the built-in catcher. Wire types are converted
// to model types here; api errors gain the device key on the way out.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use amplink_api::amp::dispatch;
use amplink_api::{AmpClient, AmpVersion, DeviceAddress, Notification, NotificationCatcher, Operation};
use async_trait::async_trait;
use bytes::Bytes;
use secrecy::SecretString;
use tokio::sync::broadcast;
use url::Url;

use crate::channel::{CommandChannel, NotificationSource};
use crate::error::CoreError;
use crate::model::{
    BackupOptions, ConfigObjectRef, DeleteServiceResult, DeploymentPolicy, DeviceInfo,
    DeviceSettings, DiffTarget, DomainStatus, ErrorReport, InterDependentServices, QuiesceTarget,
    RebootMode, ReferencedObjects, RestoreOptions, Service, SubscribeOutcome, SubscriptionState,
};
use crate::registry::AMP_PROVIDER_ID;

/// Command channel backed by an [`AmpClient`].
#[derive(Debug, Clone)]
pub struct AmpChannel {
    client: AmpClient,
}

impl AmpChannel {
    pub fn new(client: AmpClient) -> Self {
        Self { client }
    }

    pub fn version(&self) -> AmpVersion {
        self.client.version()
    }

    pub fn client(&self) -> &AmpClient {
        &self.client
    }
}

fn err(device: &DeviceAddress) -> impl FnOnce(amplink_api::Error) -> CoreError + '_ {
    move |e| CoreError::from_api(&device.key(), e)
}

#[async_trait]
impl CommandChannel for AmpChannel {
    fn provider_id(&self) -> &str {
        AMP_PROVIDER_ID
    }

    fn supports(&self, operation: Operation) -> bool {
        dispatch::supports(self.client.version(), operation)
    }

    // ── Subscriptions ────────────────────────────────────────────────

    async fn ping(
        &self,
        device: &DeviceAddress,
        subscription_id: &str,
    ) -> Result<SubscriptionState, CoreError> {
        let raw = self.client.ping(device, subscription_id).await.map_err(err(device))?;
        SubscriptionState::try_from(raw)
    }

    async fn subscribe(
        &self,
        device: &DeviceAddress,
        subscription_id: &str,
        topics: &[String],
        callback_url: &str,
    ) -> Result<SubscribeOutcome, CoreError> {
        let raw = self
            .client
            .subscribe(device, subscription_id, topics, callback_url)
            .await
            .map_err(err(device))?;
        SubscribeOutcome::try_from(raw)
    }

    async fn unsubscribe(
        &self,
        device: &DeviceAddress,
        subscription_id: &str,
    ) -> Result<(), CoreError> {
        self.client
            .unsubscribe(device, subscription_id)
            .await
            .map_err(err(device))
    }

    // ── Device ───────────────────────────────────────────────────────

    async fn get_device_metadata(&self, device: &DeviceAddress) -> Result<DeviceInfo, CoreError> {
        self.client
            .get_device_metadata(device)
            .await
            .map(DeviceInfo::from)
            .map_err(err(device))
    }

    async fn set_device_metadata(
        &self,
        device: &DeviceAddress,
        settings: &DeviceSettings,
    ) -> Result<(), CoreError> {
        self.client
            .set_device_metadata(device, settings)
            .await
            .map_err(err(device))
    }

    async fn reboot(&self, device: &DeviceAddress, mode: RebootMode) -> Result<(), CoreError> {
        self.client.reboot(device, mode).await.map_err(err(device))
    }

    async fn get_error_report(&self, device: &DeviceAddress) -> Result<ErrorReport, CoreError> {
        self.client.get_error_report(device).await.map_err(err(device))
    }

    async fn get_saml_token(
        &self,
        device: &DeviceAddress,
        domain: &str,
    ) -> Result<SecretString, CoreError> {
        self.client
            .get_saml_token(device, domain)
            .await
            .map(|t| SecretString::from(t.token))
            .map_err(err(device))
    }

    async fn backup_device(
        &self,
        device: &DeviceAddress,
        options: &BackupOptions,
    ) -> Result<Bytes, CoreError> {
        self.client
            .backup_device(device, options)
            .await
            .map_err(err(device))
    }

    async fn restore_device(
        &self,
        device: &DeviceAddress,
        options: &RestoreOptions,
        backup: Bytes,
    ) -> Result<(), CoreError> {
        self.client
            .restore_device(device, options, backup)
            .await
            .map_err(err(device))
    }

    // ── Domains ──────────────────────────────────────────────────────

    async fn get_domain_list(&self, device: &DeviceAddress) -> Result<Vec<String>, CoreError> {
        self.client.get_domain_list(device).await.map_err(err(device))
    }

    async fn get_domain(&self, device: &DeviceAddress, domain: &str) -> Result<Bytes, CoreError> {
        self.client.get_domain(device, domain).await.map_err(err(device))
    }

    async fn set_domain(
        &self,
        device: &DeviceAddress,
        domain: &str,
        image: Bytes,
        policy: Option<&DeploymentPolicy>,
        import_all: bool,
    ) -> Result<(), CoreError> {
        self.client
            .set_domain(device, domain, image, policy, import_all)
            .await
            .map_err(err(device))
    }

    async fn delete_domain(&self, device: &DeviceAddress, domain: &str) -> Result<(), CoreError> {
        self.client.delete_domain(device, domain).await.map_err(err(device))
    }

    async fn start_domain(&self, device: &DeviceAddress, domain: &str) -> Result<(), CoreError> {
        self.client.start_domain(device, domain).await.map_err(err(device))
    }

    async fn stop_domain(&self, device: &DeviceAddress, domain: &str) -> Result<(), CoreError> {
        self.client.stop_domain(device, domain).await.map_err(err(device))
    }

    async fn restart_domain(&self, device: &DeviceAddress, domain: &str) -> Result<(), CoreError> {
        self.client.restart_domain(device, domain).await.map_err(err(device))
    }

    async fn get_domain_status(
        &self,
        device: &DeviceAddress,
        domain: &str,
    ) -> Result<DomainStatus, CoreError> {
        self.client
            .get_domain_status(device, domain)
            .await
            .map(|raw| DomainStatus::from(&raw))
            .map_err(err(device))
    }

    // ── Firmware ─────────────────────────────────────────────────────

    async fn set_firmware(
        &self,
        device: &DeviceAddress,
        image: Bytes,
        accept_license: bool,
    ) -> Result<(), CoreError> {
        let result = if accept_license {
            self.client.set_firmware_accept_license(device, image).await
        } else {
            self.client.set_firmware(device, image).await
        };
        result.map_err(err(device))
    }

    async fn set_firmware_stream(
        &self,
        device: &DeviceAddress,
        path: &Path,
        accept_license: bool,
    ) -> Result<(), CoreError> {
        let result = if accept_license {
            self.client
                .set_firmware_stream_accept_license(device, path)
                .await
        } else {
            self.client.set_firmware_stream(device, path).await
        };
        result.map_err(err(device))
    }

    // ── Key files ────────────────────────────────────────────────────

    async fn get_key_filenames(
        &self,
        device: &DeviceAddress,
        domain: &str,
    ) -> Result<Vec<String>, CoreError> {
        self.client
            .get_key_filenames(device, domain)
            .await
            .map_err(err(device))
    }

    async fn set_key_file(
        &self,
        device: &DeviceAddress,
        domain: &str,
        filename: &str,
        contents: Bytes,
    ) -> Result<(), CoreError> {
        self.client
            .set_key_file(device, domain, filename, contents)
            .await
            .map_err(err(device))
    }

    async fn delete_key_file(
        &self,
        device: &DeviceAddress,
        domain: &str,
        filename: &str,
    ) -> Result<(), CoreError> {
        self.client
            .delete_key_file(device, domain, filename)
            .await
            .map_err(err(device))
    }

    // ── Configuration diff ───────────────────────────────────────────

    async fn is_different(
        &self,
        device: &DeviceAddress,
        from: &DiffTarget,
        to: &DiffTarget,
    ) -> Result<bool, CoreError> {
        self.client
            .is_different(device, from, to)
            .await
            .map_err(err(device))
    }

    async fn get_diff_url(
        &self,
        device: &DeviceAddress,
        from: &DiffTarget,
        to: &DiffTarget,
    ) -> Result<Url, CoreError> {
        self.client
            .get_diff_url(device, from, to)
            .await
            .map_err(err(device))
    }

    // ── Quiesce ──────────────────────────────────────────────────────

    async fn quiesce(
        &self,
        device: &DeviceAddress,
        target: &QuiesceTarget,
        timeout_secs: u32,
    ) -> Result<(), CoreError> {
        self.client
            .quiesce(device, target, timeout_secs)
            .await
            .map_err(err(device))
    }

    async fn unquiesce(
        &self,
        device: &DeviceAddress,
        target: &QuiesceTarget,
    ) -> Result<(), CoreError> {
        self.client.unquiesce(device, target).await.map_err(err(device))
    }

    // ── Services ─────────────────────────────────────────────────────

    async fn get_service_list(
        &self,
        device: &DeviceAddress,
        domain: &str,
    ) -> Result<Vec<Service>, CoreError> {
        let raw = self
            .client
            .get_service_list(device, domain)
            .await
            .map_err(err(device))?;
        Ok(raw.into_iter().map(Service::from).collect())
    }

    async fn get_service_list_from_export(
        &self,
        device: &DeviceAddress,
        image: Bytes,
    ) -> Result<Vec<ConfigObjectRef>, CoreError> {
        self.client
            .get_service_list_from_export(device, image)
            .await
            .map_err(err(device))
    }

    async fn start_service(
        &self,
        device: &DeviceAddress,
        domain: &str,
        services: &[ConfigObjectRef],
    ) -> Result<(), CoreError> {
        self.client
            .start_service(device, domain, services)
            .await
            .map_err(err(device))
    }

    async fn stop_service(
        &self,
        device: &DeviceAddress,
        domain: &str,
        services: &[ConfigObjectRef],
    ) -> Result<(), CoreError> {
        self.client
            .stop_service(device, domain, services)
            .await
            .map_err(err(device))
    }

    async fn delete_service(
        &self,
        device: &DeviceAddress,
        domain: &str,
        service: &ConfigObjectRef,
        exclude_objects: &[ConfigObjectRef],
        delete_files: bool,
    ) -> Result<DeleteServiceResult, CoreError> {
        self.client
            .delete_service(device, domain, service, exclude_objects, delete_files)
            .await
            .map_err(err(device))
    }

    async fn get_inter_dependent_services(
        &self,
        device: &DeviceAddress,
        domain: &str,
        image: Bytes,
    ) -> Result<InterDependentServices, CoreError> {
        self.client
            .get_inter_dependent_services(device, domain, image)
            .await
            .map_err(err(device))
    }

    async fn get_referenced_objects(
        &self,
        device: &DeviceAddress,
        domain: &str,
        service: &ConfigObjectRef,
    ) -> Result<ReferencedObjects, CoreError> {
        self.client
            .get_referenced_objects(device, domain, service)
            .await
            .map_err(err(device))
    }
}

// ── Catcher as a notification source ─────────────────────────────────

#[async_trait]
impl NotificationSource for NotificationCatcher {
    async fn start(&self) -> Result<SocketAddr, CoreError> {
        NotificationCatcher::start(self).await.map_err(CoreError::from)
    }

    async fn stop(&self) {
        NotificationCatcher::stop(self).await;
    }

    fn is_running(&self) -> bool {
        NotificationCatcher::is_running(self)
    }

    fn callback_url(&self) -> Result<Url, CoreError> {
        NotificationCatcher::callback_url(self).map_err(CoreError::from)
    }

    fn notifications(&self) -> broadcast::Receiver<Arc<Notification>> {
        NotificationCatcher::subscribe(self)
    }
}
