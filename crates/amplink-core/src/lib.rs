//! Domain layer between `amplink-api` and management consumers.
//!
//! - **[`CommandChannel`]**: the remote operation contract, implemented
//!   for the AMP protocol by [`AmpChannel`] and resolved by id through the
//!   [`ProviderRegistry`].
//!
//! - **[`ManagerContext`]**: the process-wide object. [`start()`](ManagerContext::start)
//!   binds the notification listener and spawns the bridge that feeds
//!   pushed events through the [`EventSequencer`] into the [`StatusStore`],
//!   re-fetching state after gaps, faults and firmware changes.
//!
//! - **[`SubscriptionManager`]**: subscribe, keep-alive and resubscribe
//!   after device reboot.
//!
//! - **Domain model** ([`model`]): status algebra ([`OperationStatus`]
//!   rollup and severity), [`DomainStatus`], and the open-ended
//!   [`DeviceType`] / [`ModelType`] tokens with their deployment
//!   compatibility relation.

pub mod blob;
pub mod channel;
pub mod config;
pub mod context;
pub mod convert;
pub mod error;
pub mod list_codec;
pub mod model;
pub mod provider;
pub mod registry;
pub mod sequencer;
pub mod store;
pub mod stream;
pub mod subscription;

// ── Primary re-exports ──────────────────────────────────────────────
pub use blob::{BlobMetadata, BlobRepository, MemoryBlobRepository, scan_metadata};
pub use channel::{CommandChannel, NotificationSource};
pub use config::{ManagerConfig, TlsVerification};
pub use context::{ManagedDevice, ManagerContext};
pub use error::{CoreError, ErrorKind};
pub use provider::AmpChannel;
pub use registry::{AMP_PROVIDER_ID, ProviderLifetime, ProviderRegistry};
pub use sequencer::{EventSequencer, SequenceCheck, check_sequence};
pub use store::{DomainStatusRow, StatusStore};
pub use stream::StatusStream;
pub use subscription::SubscriptionManager;

pub use model::{
    AdminStatus, DeviceInfo, DeviceType, DomainStatus, Event, EventKind, ModelFamily, ModelType,
    OperationStatus, QuiesceStatus, Service, SubscribeOutcome, Subscription, SubscriptionState,
};

// Wire-level types consumers need to call the contract.
pub use amplink_api::{AmpVersion, Credentials, DeviceAddress, Operation};
