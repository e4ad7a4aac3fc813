// ── Subscription lifecycle ──
//
// Owns the subscription each managed device holds for us: subscribe,
// keep-alive ping, resubscribe after reboot, unsubscribe. Also owns the
// event sequencer, so gap and fault detection land in one place and turn
// into re-fetch flags for the manager.

use std::sync::Arc;

use amplink_api::DeviceAddress;
use arc_swap::ArcSwapOption;
use dashmap::{DashMap, DashSet};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::channel::CommandChannel;
use crate::error::{CoreError, ErrorKind};
use crate::model::{Event, SubscribeOutcome, Subscription, SubscriptionState};
use crate::sequencer::{EventSequencer, SequenceCheck};

/// Tracks one subscription per device and the events it delivers.
///
/// State-changing calls against one device are serialized here; calls
/// against different devices run concurrently.
pub struct SubscriptionManager {
    channel: Arc<dyn CommandChannel>,
    subscription_id: String,
    topics: Vec<String>,
    callback_url: ArcSwapOption<Url>,
    sequencer: EventSequencer,
    /// Device key -> subscription as last observed.
    subscriptions: DashMap<String, Subscription>,
    /// Device serial -> device key. Events identify devices by serial.
    devices_by_serial: DashMap<String, String>,
    /// Device keys whose state must be re-fetched in full.
    refetch: DashSet<String>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SubscriptionManager {
    pub fn new(
        channel: Arc<dyn CommandChannel>,
        subscription_id: impl Into<String>,
        topics: Vec<String>,
    ) -> Self {
        Self {
            channel,
            subscription_id: subscription_id.into(),
            topics,
            callback_url: ArcSwapOption::empty(),
            sequencer: EventSequencer::new(),
            subscriptions: DashMap::new(),
            devices_by_serial: DashMap::new(),
            refetch: DashSet::new(),
            locks: DashMap::new(),
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// Set the callback registered at subscribe time.
    pub fn set_callback_url(&self, url: Url) {
        self.callback_url.store(Some(Arc::new(url)));
    }

    pub fn callback_url(&self) -> Result<Url, CoreError> {
        self.callback_url
            .load_full()
            .map(|u| (*u).clone())
            .ok_or_else(|| CoreError::Config {
                message: "no callback URL; start the notification source first".into(),
            })
    }

    /// Associate a device serial number with its address key.
    pub fn register_serial(&self, device: &DeviceAddress, serial: &str) {
        self.devices_by_serial
            .insert(serial.to_owned(), device.key());
    }

    /// Address key of the device with this serial, if registered.
    pub fn device_for_serial(&self, serial: &str) -> Option<String> {
        self.devices_by_serial.get(serial).map(|r| r.value().clone())
    }

    pub fn subscription(&self, device: &DeviceAddress) -> Option<Subscription> {
        self.subscriptions.get(&device.key()).map(|r| r.value().clone())
    }

    // ── Remote lifecycle ─────────────────────────────────────────────

    /// Register our subscription with `device`.
    ///
    /// A duplicate registration pointing at our own callback counts as
    /// active. One pointing elsewhere is returned as-is and not recorded.
    pub async fn subscribe(&self, device: &DeviceAddress) -> Result<SubscribeOutcome, CoreError> {
        let lock = self.lock_for(device);
        let _guard = lock.lock().await;
        self.subscribe_locked(device).await
    }

    /// Current subscription state. FAULT flags the device for re-fetch.
    pub async fn ping(&self, device: &DeviceAddress) -> Result<SubscriptionState, CoreError> {
        let state = self.channel.ping(device, &self.subscription_id).await?;
        self.record_state(device, state);
        Ok(state)
    }

    /// Ping, and resubscribe when the device no longer knows us.
    ///
    /// After a reboot the device reports NONE: sequence tracking is reset
    /// and a fresh subscription registered. Events sent while we were not
    /// subscribed are gone, so the device is flagged for re-fetch.
    pub async fn ensure_subscribed(
        &self,
        device: &DeviceAddress,
    ) -> Result<SubscriptionState, CoreError> {
        let lock = self.lock_for(device);
        let _guard = lock.lock().await;

        let state = self.channel.ping(device, &self.subscription_id).await?;
        self.record_state(device, state);
        if state != SubscriptionState::None {
            return Ok(state);
        }

        info!(device = %device.key(), "subscription lost, resubscribing");
        self.forget_sequence(device);
        match self.subscribe_locked(device).await? {
            SubscribeOutcome::Active => {
                self.refetch.insert(device.key());
                Ok(SubscriptionState::Active)
            }
            SubscribeOutcome::Duplicate { callback_url } => {
                warn!(
                    device = %device.key(),
                    %callback_url,
                    "subscription id taken by another callback"
                );
                Ok(SubscriptionState::None)
            }
        }
    }

    /// Tear down our subscription. An already-absent subscription is not
    /// an error.
    pub async fn unsubscribe(&self, device: &DeviceAddress) -> Result<(), CoreError> {
        let lock = self.lock_for(device);
        let _guard = lock.lock().await;

        let result = self
            .channel
            .unsubscribe(device, &self.subscription_id)
            .await;
        self.subscriptions.remove(&device.key());
        self.forget_sequence(device);

        match result {
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::AlreadyDeleted) => {
                debug!(device = %device.key(), "subscription already gone");
                Ok(())
            }
            other => other,
        }
    }

    // ── Event bookkeeping ────────────────────────────────────────────

    /// Classify an event's sequence number. A loss flags the sending
    /// device for re-fetch.
    pub fn observe(&self, event: &Event) -> SequenceCheck {
        let check = self.sequencer.observe(event);
        if check.is_loss() {
            self.flag_refetch_serial(&event.device_id);
        }
        check
    }

    /// Flag the device with this serial for a full re-fetch.
    pub fn flag_refetch_serial(&self, serial: &str) {
        match self.device_for_serial(serial) {
            Some(key) => {
                self.refetch.insert(key);
            }
            None => warn!(serial, "re-fetch requested for an unregistered device"),
        }
    }

    pub fn flag_refetch(&self, device: &DeviceAddress) {
        self.refetch.insert(device.key());
    }

    /// Clear and return the re-fetch flag for one device.
    pub fn take_refetch(&self, device: &DeviceAddress) -> bool {
        self.refetch.remove(&device.key()).is_some()
    }

    /// Clear and return every pending re-fetch flag.
    pub fn drain_refetch(&self) -> Vec<String> {
        let keys: Vec<String> = self.refetch.iter().map(|k| k.key().clone()).collect();
        for key in &keys {
            self.refetch.remove(key);
        }
        keys
    }

    pub fn sequencer(&self) -> &EventSequencer {
        &self.sequencer
    }

    /// Forget everything about a device.
    pub fn remove_device(&self, device: &DeviceAddress) {
        let key = device.key();
        self.forget_sequence(device);
        self.subscriptions.remove(&key);
        self.refetch.remove(&key);
        self.devices_by_serial.retain(|_, k| *k != key);
        self.locks.remove(&key);
    }

    // ── Private helpers ──────────────────────────────────────────────

    async fn subscribe_locked(&self, device: &DeviceAddress) -> Result<SubscribeOutcome, CoreError> {
        let callback = self.callback_url()?;
        let outcome = self
            .channel
            .subscribe(device, &self.subscription_id, &self.topics, callback.as_str())
            .await?;

        let outcome = match outcome {
            SubscribeOutcome::Duplicate { callback_url } if same_callback(&callback_url, &callback) => {
                debug!(device = %device.key(), "already subscribed with our callback");
                SubscribeOutcome::Active
            }
            other => other,
        };

        if outcome == SubscribeOutcome::Active {
            self.subscriptions.insert(
                device.key(),
                Subscription {
                    id: self.subscription_id.clone(),
                    topics: self.topics.clone(),
                    callback_url: callback.to_string(),
                    state: SubscriptionState::Active,
                },
            );
            info!(device = %device.key(), id = %self.subscription_id, "subscribed");
        }
        Ok(outcome)
    }

    fn record_state(&self, device: &DeviceAddress, state: SubscriptionState) {
        if let Some(mut sub) = self.subscriptions.get_mut(&device.key()) {
            sub.state = state;
        }
        match state {
            SubscriptionState::Fault => {
                warn!(device = %device.key(), "subscription FAULT, events were dropped");
                self.refetch.insert(device.key());
            }
            SubscriptionState::None => {
                debug!(device = %device.key(), "device reports no subscription");
            }
            SubscriptionState::Active => {}
        }
    }

    fn forget_sequence(&self, device: &DeviceAddress) {
        let key = device.key();
        for entry in self.devices_by_serial.iter().filter(|r| *r.value() == key) {
            self.sequencer.forget(entry.key());
        }
    }

    fn lock_for(&self, device: &DeviceAddress) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(device.key())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }
}

/// Callback URLs match on scheme, host and port. Path is insignificant.
fn same_callback(reported: &str, ours: &Url) -> bool {
    Url::parse(reported).is_ok_and(|r| {
        r.scheme() == ours.scheme()
            && r.host_str() == ours.host_str()
            && r.port_or_known_default() == ours.port_or_known_default()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn callback_comparison_ignores_path() {
        let ours = Url::parse("https://10.0.0.5:5555/").unwrap();
        assert!(same_callback("https://10.0.0.5:5555/amp/notify", &ours));
        assert!(!same_callback("https://10.0.0.6:5555/", &ours));
        assert!(!same_callback("http://10.0.0.5:5555/", &ours));
        assert!(!same_callback("not a url", &ours));
    }
}
