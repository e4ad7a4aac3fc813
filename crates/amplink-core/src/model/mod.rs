// ── Domain model ──
//
// Canonical types consumers work with. Wire types from amplink-api are
// converted in `convert`; dependency-planning descriptors are passed
// through unchanged.

pub mod device;
pub mod device_type;
pub mod event;
pub mod status;
pub mod subscription;

pub use device::{DeviceInfo, DeviceSettings};
pub use device_type::{DeviceType, ModelFamily, ModelType};
pub use event::{Event, EventKind, ExtendedAttribute};
pub use status::{AdminStatus, DomainStatus, OperationStatus, QuiesceStatus};
pub use subscription::{SubscribeOutcome, Subscription, SubscriptionState};

pub use amplink_api::amp::models::{
    BackupOptions, ConfigObjectRef, DeleteServiceResult, DeletedObject, DeploymentPolicy,
    DiffTarget, ErrorReport, InterDependentServices, QuiesceTarget, ReferencedObject,
    ReferencedObjects, RestoreOptions,
};
pub use amplink_api::amp::RebootMode;

/// A service in a domain with its parsed state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub object: ConfigObjectRef,
    pub op: OperationStatus,
    pub admin: AdminStatus,
    pub quiesce: QuiesceStatus,
    pub needs_save: bool,
    pub user_comment: Option<String>,
}
