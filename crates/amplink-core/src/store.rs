// ── Reactive domain status store ──
//
// Concurrent storage for the last known status of every domain on every
// managed device, with push-based change notification via `watch`
// channels. Refetch tasks write; any number of consumers read.

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;

use crate::model::{DomainStatus, OperationStatus};

/// Status of one domain on one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainStatusRow {
    pub device: String,
    pub domain: String,
    pub status: DomainStatus,
}

type Key = (String, String);

/// A live status cell. Holders see every later swap without re-querying.
pub type StatusCell = Arc<ArcSwap<DomainStatus>>;

/// Last known domain status, keyed by device key and domain name.
///
/// Each domain owns one cell that is swapped atomically on update. Every
/// mutation that changes a value bumps the version counter and
/// rebuilds the snapshot that subscribers receive. Writes that leave the
/// stored value unchanged notify nobody.
pub struct StatusStore {
    by_key: DashMap<Key, StatusCell>,

    /// Version counter, bumped on every effective mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, sorted by device then domain.
    snapshot: watch::Sender<Arc<Vec<DomainStatusRow>>>,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusStore {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_key: DashMap::new(),
            version,
            snapshot,
        }
    }

    /// Record the status of one domain. Returns `true` if anything changed.
    pub fn upsert(&self, device: &str, domain: &str, status: DomainStatus) -> bool {
        let changed = self.swap_in((device.to_owned(), domain.to_owned()), status);
        if changed {
            self.publish();
        }
        changed
    }

    /// Replace everything known about `device` with `domains`.
    ///
    /// Upserts first, then prunes domains that no longer exist, so readers
    /// never observe the device briefly empty.
    pub fn replace_device(&self, device: &str, domains: Vec<(String, DomainStatus)>) {
        let incoming: HashSet<String> = domains.iter().map(|(d, _)| d.clone()).collect();
        let mut changed = false;
        for (domain, status) in domains {
            changed |= self.swap_in((device.to_owned(), domain), status);
        }
        let before = self.by_key.len();
        self.by_key
            .retain(|(dev, domain), _| dev != device || incoming.contains(domain));
        changed |= self.by_key.len() != before;

        if changed {
            self.publish();
        }
    }

    /// Forget a domain. Returns its last status.
    pub fn remove(&self, device: &str, domain: &str) -> Option<DomainStatus> {
        let removed = self
            .by_key
            .remove(&(device.to_owned(), domain.to_owned()))
            .map(|(_, cell)| **cell.load());
        if removed.is_some() {
            self.publish();
        }
        removed
    }

    /// Forget every domain of a device. Returns how many were dropped.
    pub fn remove_device(&self, device: &str) -> usize {
        let before = self.by_key.len();
        self.by_key.retain(|(dev, _), _| dev != device);
        let removed = before - self.by_key.len();
        if removed > 0 {
            self.publish();
        }
        removed
    }

    pub fn get(&self, device: &str, domain: &str) -> Option<DomainStatus> {
        self.by_key
            .get(&(device.to_owned(), domain.to_owned()))
            .map(|r| **r.value().load())
    }

    /// The live cell for a domain, if the domain is known.
    pub fn cell(&self, device: &str, domain: &str) -> Option<StatusCell> {
        self.by_key
            .get(&(device.to_owned(), domain.to_owned()))
            .map(|r| Arc::clone(r.value()))
    }

    /// Domain names known for a device, sorted.
    pub fn domains(&self, device: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .by_key
            .iter()
            .filter(|r| r.key().0 == device)
            .map(|r| r.key().1.clone())
            .collect();
        names.sort_unstable();
        names
    }

    /// Operational status of a device rolled up from its domains.
    pub fn device_rollup(&self, device: &str) -> OperationStatus {
        OperationStatus::rollup(
            self.by_key
                .iter()
                .filter(|r| r.key().0 == device)
                .map(|r| r.value().load().op),
        )
    }

    /// Rollup across every device, each device first rolled up on its own.
    pub fn fleet_rollup(&self) -> OperationStatus {
        let devices: HashSet<String> = self.by_key.iter().map(|r| r.key().0.clone()).collect();
        OperationStatus::rollup(devices.iter().map(|d| self.device_rollup(d)))
    }

    /// Current snapshot (cheap `Arc` clone).
    pub fn snapshot(&self) -> Arc<Vec<DomainStatusRow>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<DomainStatusRow>>> {
        self.snapshot.subscribe()
    }

    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    // ── Private helpers ──────────────────────────────────────────────

    /// Swap a new status into the key's cell. Returns `true` on change.
    fn swap_in(&self, key: Key, status: DomainStatus) -> bool {
        match self.by_key.entry(key) {
            Entry::Occupied(occupied) => {
                let previous = occupied.get().swap(Arc::new(status));
                *previous != status
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Arc::new(ArcSwap::from_pointee(status)));
                true
            }
        }
    }

    fn publish(&self) {
        let mut rows: Vec<DomainStatusRow> = self
            .by_key
            .iter()
            .map(|r| DomainStatusRow {
                device: r.key().0.clone(),
                domain: r.key().1.clone(),
                status: **r.value().load(),
            })
            .collect();
        rows.sort_unstable_by(|a, b| (&a.device, &a.domain).cmp(&(&b.device, &b.domain)));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(rows));
        self.version.send_modify(|v| *v += 1);
    }
}
