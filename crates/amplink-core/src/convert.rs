// ── API-to-domain type conversions ──
//
// Bridges raw `amplink_api` response types into canonical
// `amplink_core::model` types. Status strings become strong types; values
// a device reports that we do not recognize degrade to `Unknown` instead
// of failing the whole call.

use amplink_api::AmpVersion;
use amplink_api::amp::models::{
    DeviceMetaInfo, DomainStatusRecord, PingResponse, RuntimeService, SubscribeResponse,
};

use crate::error::CoreError;
use crate::model::{
    AdminStatus, DeviceInfo, DeviceType, DomainStatus, ModelType, OperationStatus, QuiesceStatus,
    Service, SubscribeOutcome, SubscriptionState,
};

// ── Device ─────────────────────────────────────────────────────────

impl From<DeviceMetaInfo> for DeviceInfo {
    fn from(raw: DeviceMetaInfo) -> Self {
        let mut amp_versions: Vec<AmpVersion> = raw
            .supported_amp_versions
            .iter()
            .filter_map(|v| v.parse().ok())
            .collect();
        amp_versions.sort_unstable();
        amp_versions.dedup();

        Self {
            name: raw.device_name,
            serial_number: raw.serial_number,
            model: ModelType::new(&raw.model_type),
            device_type: DeviceType::new(&raw.device_type),
            firmware_level: raw.firmware_level,
            amp_versions,
            management_port: raw.management_port,
            hardware_options: raw.hardware_options,
            secure_backup_supported: raw.secure_backup_supported,
        }
    }
}

// ── Status ─────────────────────────────────────────────────────────

impl From<&DomainStatusRecord> for DomainStatus {
    fn from(raw: &DomainStatusRecord) -> Self {
        Self {
            admin: AdminStatus::from_device(&raw.admin_state),
            op: OperationStatus::from_device(&raw.op_state),
            quiesce: QuiesceStatus::from_device(raw.quiesce_state.as_deref()),
            needs_save: raw
                .config_state
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case("modified")),
            debug_state: raw.debug_state,
        }
    }
}

impl From<RuntimeService> for Service {
    fn from(raw: RuntimeService) -> Self {
        Self {
            op: raw
                .op_state
                .as_deref()
                .map_or(OperationStatus::Unknown, OperationStatus::from_device),
            admin: raw
                .admin_state
                .as_deref()
                .map_or(AdminStatus::Unknown, AdminStatus::from_device),
            quiesce: QuiesceStatus::from_device(raw.quiesce_state.as_deref()),
            needs_save: raw.needs_save,
            user_comment: raw.user_comment,
            object: raw.object,
        }
    }
}

// ── Subscriptions ──────────────────────────────────────────────────

impl TryFrom<PingResponse> for SubscriptionState {
    type Error = CoreError;

    fn try_from(raw: PingResponse) -> Result<Self, Self::Error> {
        raw.state.trim().parse().map_err(|_| CoreError::Protocol {
            message: format!("unknown subscription state '{}'", raw.state),
        })
    }
}

impl TryFrom<SubscribeResponse> for SubscribeOutcome {
    type Error = CoreError;

    fn try_from(raw: SubscribeResponse) -> Result<Self, Self::Error> {
        match raw.state.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "duplicate" => Ok(Self::Duplicate {
                callback_url: raw.callback_url.unwrap_or_default(),
            }),
            other => Err(CoreError::Protocol {
                message: format!("unknown subscribe outcome '{other}'"),
            }),
        }
    }
}
