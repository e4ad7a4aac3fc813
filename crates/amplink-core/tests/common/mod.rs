#![allow(clippy::unwrap_used, dead_code)]

// In-process fakes: an appliance that forgets subscriptions on reboot,
// and a notification source tests push envelopes into.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use amplink_api::{Credentials, DeviceAddress, Notification, Operation};
use amplink_core::model::RebootMode;
use amplink_core::{
    AmpVersion, CommandChannel, CoreError, DeviceInfo, DeviceType, DomainStatus, ModelType,
    NotificationSource, OperationStatus, SubscribeOutcome, SubscriptionState,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::sync::broadcast;
use url::Url;

pub const SERIAL: &str = "0A1B2C3D";

pub fn device() -> DeviceAddress {
    DeviceAddress::new(
        "dp1.example.net",
        5550,
        Credentials::new("admin", SecretString::from("s3cret".to_string())),
    )
}

pub fn up() -> DomainStatus {
    DomainStatus {
        op: OperationStatus::Up,
        ..DomainStatus::default()
    }
}

pub fn down() -> DomainStatus {
    DomainStatus {
        op: OperationStatus::Down,
        ..DomainStatus::default()
    }
}

// ── Fake appliance ───────────────────────────────────────────────────

#[derive(Default)]
struct ApplianceState {
    /// Subscription id -> callback URL. Never survives a reboot.
    subscriptions: HashMap<String, String>,
    domains: BTreeMap<String, DomainStatus>,
    firmware_installs: Vec<(usize, bool)>,
    domain_list_calls: usize,
    /// Report FAULT for every live subscription, as after a failed delivery.
    ping_fault: bool,
}

/// Simulated appliance speaking the command contract.
pub struct FakeAppliance {
    model: ModelType,
    state: Mutex<ApplianceState>,
}

impl FakeAppliance {
    pub fn new(model: &str) -> Self {
        let mut state = ApplianceState::default();
        state.domains.insert("default".into(), up());
        Self {
            model: ModelType::new(model),
            state: Mutex::new(state),
        }
    }

    pub fn set_domain_status(&self, domain: &str, status: DomainStatus) {
        self.state
            .lock()
            .unwrap()
            .domains
            .insert(domain.to_owned(), status);
    }

    pub fn set_ping_fault(&self, fault: bool) {
        self.state.lock().unwrap().ping_fault = fault;
    }

    pub fn subscriber_callback(&self, id: &str) -> Option<String> {
        self.state.lock().unwrap().subscriptions.get(id).cloned()
    }

    pub fn domain_list_calls(&self) -> usize {
        self.state.lock().unwrap().domain_list_calls
    }

    pub fn firmware_installs(&self) -> Vec<(usize, bool)> {
        self.state.lock().unwrap().firmware_installs.clone()
    }
}

#[async_trait]
impl CommandChannel for FakeAppliance {
    fn provider_id(&self) -> &str {
        "fake"
    }

    fn supports(&self, operation: Operation) -> bool {
        matches!(
            operation,
            Operation::Ping
                | Operation::Subscribe
                | Operation::Unsubscribe
                | Operation::GetDeviceMetadata
                | Operation::Reboot
                | Operation::GetDomainList
                | Operation::GetDomainStatus
                | Operation::SetFirmware
                | Operation::SetFirmwareAcceptLicense
        )
    }

    async fn ping(
        &self,
        _device: &DeviceAddress,
        subscription_id: &str,
    ) -> Result<SubscriptionState, CoreError> {
        let state = self.state.lock().unwrap();
        Ok(
            match (state.subscriptions.contains_key(subscription_id), state.ping_fault) {
                (false, _) => SubscriptionState::None,
                (true, true) => SubscriptionState::Fault,
                (true, false) => SubscriptionState::Active,
            },
        )
    }

    async fn subscribe(
        &self,
        _device: &DeviceAddress,
        subscription_id: &str,
        _topics: &[String],
        callback_url: &str,
    ) -> Result<SubscribeOutcome, CoreError> {
        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.subscriptions.get(subscription_id) {
            return Ok(SubscribeOutcome::Duplicate {
                callback_url: existing.clone(),
            });
        }
        state
            .subscriptions
            .insert(subscription_id.to_owned(), callback_url.to_owned());
        Ok(SubscribeOutcome::Active)
    }

    async fn unsubscribe(
        &self,
        _device: &DeviceAddress,
        subscription_id: &str,
    ) -> Result<(), CoreError> {
        let mut state = self.state.lock().unwrap();
        state
            .subscriptions
            .remove(subscription_id)
            .map(|_| ())
            .ok_or_else(|| CoreError::NotFound {
                what: "Subscription".into(),
                name: subscription_id.to_owned(),
            })
    }

    async fn get_device_metadata(&self, device: &DeviceAddress) -> Result<DeviceInfo, CoreError> {
        Ok(DeviceInfo {
            name: Some(device.host().to_owned()),
            serial_number: SERIAL.into(),
            model: self.model.clone(),
            device_type: DeviceType::IDG,
            firmware_level: Some("10.5.0.12".into()),
            amp_versions: vec![AmpVersion::V1, AmpVersion::V2, AmpVersion::V3],
            management_port: Some(device.port()),
            hardware_options: vec![],
            secure_backup_supported: true,
        })
    }

    async fn reboot(&self, _device: &DeviceAddress, _mode: RebootMode) -> Result<(), CoreError> {
        self.state.lock().unwrap().subscriptions.clear();
        Ok(())
    }

    async fn get_domain_list(&self, _device: &DeviceAddress) -> Result<Vec<String>, CoreError> {
        let mut state = self.state.lock().unwrap();
        state.domain_list_calls += 1;
        Ok(state.domains.keys().cloned().collect())
    }

    async fn get_domain_status(
        &self,
        _device: &DeviceAddress,
        domain: &str,
    ) -> Result<DomainStatus, CoreError> {
        self.state
            .lock()
            .unwrap()
            .domains
            .get(domain)
            .copied()
            .ok_or_else(|| CoreError::NotFound {
                what: "Domain".into(),
                name: domain.to_owned(),
            })
    }

    async fn set_firmware(
        &self,
        _device: &DeviceAddress,
        image: Bytes,
        accept_license: bool,
    ) -> Result<(), CoreError> {
        self.state
            .lock()
            .unwrap()
            .firmware_installs
            .push((image.len(), accept_license));
        Ok(())
    }
}

// ── Fake notification source ─────────────────────────────────────────

pub struct FakeSource {
    events: broadcast::Sender<Arc<Notification>>,
    running: Mutex<bool>,
    arrivals: AtomicU64,
}

impl Default for FakeSource {
    fn default() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            events,
            running: Mutex::new(false),
            arrivals: AtomicU64::new(0),
        }
    }
}

impl FakeSource {
    pub fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 5555))
    }

    /// Deliver one envelope as if a device had posted it.
    pub fn push(&self, body: Value) {
        let arrival = self.arrivals.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.events.send(Arc::new(Notification {
            peer: SocketAddr::from(([192, 0, 2, 10], 40000)),
            received_at: Utc::now(),
            arrival,
            body,
        }));
    }
}

#[async_trait]
impl NotificationSource for FakeSource {
    async fn start(&self) -> Result<SocketAddr, CoreError> {
        *self.running.lock().unwrap() = true;
        Ok(Self::addr())
    }

    async fn stop(&self) {
        *self.running.lock().unwrap() = false;
    }

    fn is_running(&self) -> bool {
        *self.running.lock().unwrap()
    }

    fn callback_url(&self) -> Result<Url, CoreError> {
        Ok(Url::parse(&format!("http://{}/", Self::addr())).unwrap())
    }

    fn notifications(&self) -> broadcast::Receiver<Arc<Notification>> {
        self.events.subscribe()
    }
}

// ── Envelopes ────────────────────────────────────────────────────────

pub fn envelope(seq: u64, code: &str, object_class: &str, object_name: &str) -> Value {
    json!({
        "CommonBaseEvent": {
            "creationTime": "2026-03-14T09:26:53Z",
            "sequenceNumber": seq,
            "sourceComponentId": {
                "instanceId": SERIAL,
                "objectClass": object_class,
                "objectName": object_name
            },
            "extendedDataElements": [
                { "name": "ClientAddress", "type": "string", "values": ["192.0.2.10"] }
            ],
            "msgDataElement": { "msgId": code }
        }
    })
}
