// ── Manager context ──
//
// The one process-wide object: owns the provider registry, the status
// store, the subscription manager and the running notification source.
// Lifecycle is explicit: `new` resolves and validates providers, `start`
// binds the listener and spawns background tasks, `stop` tears them down.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use amplink_api::{DeviceAddress, Notification};
use bytes::Bytes;
use dashmap::DashMap;
use tokio::io::AsyncReadExt;
use tokio::sync::{Mutex, broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::blob::{BlobMetadata, DEFAULT_SCAN_LIMIT, scan_metadata, scan_metadata_within};
use crate::channel::{CommandChannel, NotificationSource};
use crate::config::ManagerConfig;
use crate::error::{CoreError, ErrorKind};
use crate::model::{DeviceInfo, DomainStatus, Event, EventKind, OperationStatus};
use crate::registry::ProviderRegistry;
use crate::sequencer::{EventSequencer, SequenceCheck};
use crate::store::StatusStore;
use crate::stream::StatusStream;
use crate::subscription::SubscriptionManager;

const EVENT_CHANNEL_SIZE: usize = 256;

/// A device under management.
#[derive(Debug, Clone)]
pub struct ManagedDevice {
    pub address: DeviceAddress,
    pub info: DeviceInfo,
}

/// Work for the re-fetch task.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Refetch {
    Device(String),
    Domain(String, String),
}

/// Process-wide manager.
///
/// Cheaply cloneable. Construct once at startup and pass to every
/// consumer.
#[derive(Clone)]
pub struct ManagerContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    config: ManagerConfig,
    registry: Arc<ProviderRegistry>,
    channel: Arc<dyn CommandChannel>,
    source: Arc<dyn NotificationSource>,
    subscriptions: SubscriptionManager,
    store: StatusStore,
    devices: DashMap<String, ManagedDevice>,
    events: broadcast::Sender<Arc<Event>>,
    /// Cancellation for the current run. `None` while stopped.
    cancel: Mutex<Option<CancellationToken>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ManagerContext {
    /// Validate `config`, resolve its providers from `registry` and build
    /// the context. Nothing is bound or spawned until [`start`](Self::start).
    pub fn new(config: ManagerConfig, registry: Arc<ProviderRegistry>) -> Result<Self, CoreError> {
        config.validate()?;
        registry.validate(&config)?;
        let channel = registry.resolve_channel(&config.channel_provider)?;
        let source = registry.resolve_source(&config.catcher_provider)?;
        let subscriptions = SubscriptionManager::new(
            Arc::clone(&channel),
            config.subscription_id.clone(),
            config.topics.clone(),
        );
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Ok(Self {
            inner: Arc::new(ContextInner {
                config,
                registry,
                channel,
                source,
                subscriptions,
                store: StatusStore::new(),
                devices: DashMap::new(),
                events,
                cancel: Mutex::new(None),
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Context over the built-in providers.
    pub fn with_defaults(config: ManagerConfig) -> Result<Self, CoreError> {
        let registry = Arc::new(ProviderRegistry::with_defaults(&config));
        Self::new(config, registry)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.inner.registry
    }

    /// The command channel, for issuing any operation directly.
    pub fn channel(&self) -> &Arc<dyn CommandChannel> {
        &self.inner.channel
    }

    pub fn subscriptions(&self) -> &SubscriptionManager {
        &self.inner.subscriptions
    }

    pub fn store(&self) -> &StatusStore {
        &self.inner.store
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Start the notification source, subscribe every managed device and
    /// spawn the bridge, re-fetch and keep-alive tasks.
    pub async fn start(&self) -> Result<SocketAddr, CoreError> {
        let mut cancel_slot = self.inner.cancel.lock().await;
        if cancel_slot.is_some() {
            return Err(CoreError::Config {
                message: "manager already started".into(),
            });
        }

        let addr = self.inner.source.start().await?;
        let callback = match self.inner.source.callback_url() {
            Ok(url) => url,
            Err(e) => {
                self.inner.source.stop().await;
                return Err(e);
            }
        };
        info!(%addr, callback = %callback, "notification source started");
        self.inner.subscriptions.set_callback_url(callback);

        let cancel = CancellationToken::new();
        let (refetch_tx, refetch_rx) = mpsc::unbounded_channel();
        let mut handles = self.inner.task_handles.lock().await;

        handles.push(tokio::spawn(bridge_task(
            self.clone(),
            self.inner.source.notifications(),
            refetch_tx.clone(),
            cancel.clone(),
        )));
        handles.push(tokio::spawn(refetch_task(
            self.clone(),
            refetch_rx,
            cancel.clone(),
        )));
        if !self.inner.config.keepalive_interval.is_zero() {
            handles.push(tokio::spawn(keepalive_task(
                self.clone(),
                refetch_tx,
                cancel.clone(),
            )));
        }
        drop(handles);
        *cancel_slot = Some(cancel);
        drop(cancel_slot);

        for device in self.devices() {
            if let Err(e) = self.inner.subscriptions.subscribe(&device.address).await {
                warn!(device = %device.address.key(), error = %e, "subscribe failed");
            }
        }
        Ok(addr)
    }

    /// Cancel background tasks, unsubscribe every device and release the
    /// listener. Safe to call when not started.
    pub async fn stop(&self) {
        let Some(cancel) = self.inner.cancel.lock().await.take() else {
            return;
        };
        cancel.cancel();

        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        drop(handles);

        for device in self.devices() {
            if let Err(e) = self.inner.subscriptions.unsubscribe(&device.address).await {
                warn!(device = %device.address.key(), error = %e, "unsubscribe failed");
            }
        }
        self.inner.source.stop().await;
        info!("manager stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.inner.cancel.lock().await.is_some()
    }

    // ── Devices ──────────────────────────────────────────────────────

    /// Take a device under management: fetch its metadata and domain
    /// status, and subscribe when running.
    pub async fn add_device(&self, address: DeviceAddress) -> Result<DeviceInfo, CoreError> {
        let info = self.inner.channel.get_device_metadata(&address).await?;
        self.inner
            .subscriptions
            .register_serial(&address, &info.serial_number);
        self.inner.devices.insert(
            address.key(),
            ManagedDevice {
                address: address.clone(),
                info: info.clone(),
            },
        );
        info!(
            device = %address.key(),
            serial = %info.serial_number,
            model = %info.model,
            "device added"
        );

        self.refresh_device(&address).await?;
        if self.is_running().await {
            self.inner.subscriptions.subscribe(&address).await?;
        }
        Ok(info)
    }

    /// Release a device. Unsubscribing is best effort.
    pub async fn remove_device(&self, address: &DeviceAddress) {
        if self.is_running().await {
            if let Err(e) = self.inner.subscriptions.unsubscribe(address).await {
                warn!(device = %address.key(), error = %e, "unsubscribe failed");
            }
        }
        self.inner.subscriptions.remove_device(address);
        self.inner.store.remove_device(&address.key());
        self.inner.devices.remove(&address.key());
    }

    pub fn device(&self, key: &str) -> Option<ManagedDevice> {
        self.inner.devices.get(key).map(|r| r.value().clone())
    }

    /// Every managed device, sorted by key.
    pub fn devices(&self) -> Vec<ManagedDevice> {
        let mut devices: Vec<ManagedDevice> =
            self.inner.devices.iter().map(|r| r.value().clone()).collect();
        devices.sort_unstable_by_key(|d| d.address.key());
        devices
    }

    // ── Status ───────────────────────────────────────────────────────

    /// Re-fetch the status of every domain on a device.
    pub async fn refresh_device(&self, address: &DeviceAddress) -> Result<(), CoreError> {
        let channel = &self.inner.channel;
        let domains = channel.get_domain_list(address).await?;
        let futs = domains.into_iter().map(|domain| async move {
            let status = channel.get_domain_status(address, &domain).await;
            (domain, status)
        });

        let mut statuses = Vec::new();
        for (domain, status) in futures_util::future::join_all(futs).await {
            match status {
                Ok(status) => statuses.push((domain, status)),
                // Deleted between the list and the status call.
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(device = %address.key(), %domain, "domain vanished during refresh");
                }
                Err(e) => return Err(e),
            }
        }

        self.inner.store.replace_device(&address.key(), statuses);
        self.inner.subscriptions.take_refetch(address);
        debug!(device = %address.key(), "device status refreshed");
        Ok(())
    }

    /// Re-fetch one domain's status. A domain that no longer exists is
    /// dropped from the store.
    pub async fn refresh_domain(
        &self,
        address: &DeviceAddress,
        domain: &str,
    ) -> Result<Option<DomainStatus>, CoreError> {
        match self.inner.channel.get_domain_status(address, domain).await {
            Ok(status) => {
                self.inner.store.upsert(&address.key(), domain, status);
                Ok(Some(status))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.inner.store.remove(&address.key(), domain);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Last known status of one domain.
    pub fn status(&self, address: &DeviceAddress, domain: &str) -> Option<DomainStatus> {
        self.inner.store.get(&address.key(), domain)
    }

    /// Operational status of a device, rolled up from its domains.
    pub fn device_status(&self, address: &DeviceAddress) -> OperationStatus {
        self.inner.store.device_rollup(&address.key())
    }

    pub fn status_stream(&self) -> StatusStream {
        StatusStream::new(self.inner.store.subscribe())
    }

    /// Receiver of every decoded, non-duplicate event.
    pub fn events(&self) -> broadcast::Receiver<Arc<Event>> {
        self.inner.events.subscribe()
    }

    // ── Deployment ───────────────────────────────────────────────────

    /// Install firmware held in memory after checking the image's model
    /// tag against the device.
    pub async fn deploy_firmware(
        &self,
        address: &DeviceAddress,
        image: Bytes,
        accept_license: bool,
    ) -> Result<(), CoreError> {
        self.check_firmware(address, &scan_metadata(&image))?;
        self.inner
            .channel
            .set_firmware(address, image, accept_license)
            .await
    }

    /// Install firmware streamed from a file after checking its header.
    pub async fn deploy_firmware_file(
        &self,
        address: &DeviceAddress,
        path: &Path,
        accept_license: bool,
    ) -> Result<(), CoreError> {
        let header = read_header(path).await?;
        self.check_firmware(address, &scan_metadata_within(&header, DEFAULT_SCAN_LIMIT))?;
        self.inner
            .channel
            .set_firmware_stream(address, path, accept_license)
            .await
    }

    fn check_firmware(&self, address: &DeviceAddress, meta: &BlobMetadata) -> Result<(), CoreError> {
        let Some(device) = self.device(&address.key()) else {
            return Err(CoreError::NotFound {
                what: "Device".into(),
                name: address.key(),
            });
        };
        match &meta.model_type {
            Some(image_model) if !image_model.is_compatible_with(&device.info.model) => {
                Err(CoreError::ValidationFailed {
                    message: format!(
                        "firmware for model {image_model} cannot be installed on model {}",
                        device.info.model
                    ),
                })
            }
            Some(_) => Ok(()),
            None => {
                debug!(device = %address.key(), "firmware image carries no model tag");
                Ok(())
            }
        }
    }
}

async fn read_header(path: &Path) -> Result<Vec<u8>, CoreError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| CoreError::ValidationFailed {
            message: format!("cannot open {}: {e}", path.display()),
        })?;
    let mut header = Vec::with_capacity(DEFAULT_SCAN_LIMIT);
    file.take(DEFAULT_SCAN_LIMIT as u64)
        .read_to_end(&mut header)
        .await
        .map_err(|e| CoreError::ValidationFailed {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
    Ok(header)
}

// ── Background tasks ─────────────────────────────────────────────────

/// Notification source -> sequencer -> store re-fetch and event fan-out.
async fn bridge_task(
    ctx: ManagerContext,
    mut notifications: broadcast::Receiver<Arc<Notification>>,
    refetch: mpsc::UnboundedSender<Refetch>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            result = notifications.recv() => match result {
                Ok(notification) => ctx.handle_notification(&notification, &refetch),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "notification bridge lagged, re-fetching every device");
                    for device in ctx.devices() {
                        let _ = refetch.send(Refetch::Device(device.address.key()));
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    debug!("notification bridge stopped");
}

impl ManagerContext {
    fn handle_notification(
        &self,
        notification: &Notification,
        refetch: &mpsc::UnboundedSender<Refetch>,
    ) {
        let Some(event) =
            EventSequencer::decode_or_discard(&notification.body, notification.peer)
        else {
            return;
        };
        let subs = &self.inner.subscriptions;

        let check = subs.observe(&event);
        if check == SequenceCheck::Duplicate {
            return;
        }
        if event.kind == EventKind::Test {
            info!(device = %event.device_id, seq = event.sequence_number, "test event received");
            Self::queue_flagged(subs, refetch);
            return;
        }

        let device_key = subs.device_for_serial(&event.device_id);
        if event.kind == EventKind::FirmwareChanged || check == SequenceCheck::Reset {
            subs.flag_refetch_serial(&event.device_id);
        } else if event.kind.affects_domain_status() {
            match (&device_key, event.domain()) {
                (Some(key), Some(domain)) => {
                    let _ = refetch.send(Refetch::Domain(key.clone(), domain.to_owned()));
                }
                (Some(key), None) => {
                    let _ = refetch.send(Refetch::Device(key.clone()));
                }
                (None, _) => {
                    warn!(serial = %event.device_id, "event from an unmanaged device");
                }
            }
        }
        Self::queue_flagged(subs, refetch);

        let _ = self.inner.events.send(Arc::new(event));
    }

    fn queue_flagged(subs: &SubscriptionManager, refetch: &mpsc::UnboundedSender<Refetch>) {
        for key in subs.drain_refetch() {
            let _ = refetch.send(Refetch::Device(key));
        }
    }
}

/// Serializes store re-fetches requested by the bridge and keep-alive.
async fn refetch_task(
    ctx: ManagerContext,
    mut requests: mpsc::UnboundedReceiver<Refetch>,
    cancel: CancellationToken,
) {
    loop {
        let request = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            request = requests.recv() => match request {
                Some(r) => r,
                None => break,
            },
        };

        let (key, domain) = match &request {
            Refetch::Device(key) => (key, None),
            Refetch::Domain(key, domain) => (key, Some(domain.as_str())),
        };
        let Some(device) = ctx.device(key) else {
            debug!(device = %key, "re-fetch for a device no longer managed");
            continue;
        };

        let result = match domain {
            Some(domain) => ctx.refresh_domain(&device.address, domain).await.map(|_| ()),
            None => ctx.refresh_device(&device.address).await,
        };
        if let Err(e) = result {
            warn!(device = %key, error = %e, kind = ?e.kind(), "re-fetch failed");
        }
    }
    debug!("re-fetch task stopped");
}

/// Pings every subscription and resubscribes devices that lost theirs.
async fn keepalive_task(
    ctx: ManagerContext,
    refetch: mpsc::UnboundedSender<Refetch>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(ctx.inner.config.keepalive_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }

        for device in ctx.devices() {
            if let Err(e) = ctx.inner.subscriptions.ensure_subscribed(&device.address).await {
                warn!(device = %device.address.key(), error = %e, "keep-alive ping failed");
            }
        }
        ManagerContext::queue_flagged(&ctx.inner.subscriptions, &refetch);
    }
    debug!("keep-alive task stopped");
}
