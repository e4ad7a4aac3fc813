// AMP wire types
//
// Request and response shapes for the management endpoint. Status-like
// fields stay as strings here; `amplink-core` parses them into strong
// types. Fields use `#[serde(default)]` liberally because firmware
// levels differ in which fields they report.

use serde::{Deserialize, Serialize};
use url::Url;

// ── Envelope ─────────────────────────────────────────────────────────

/// Standard AMP response envelope.
///
/// ```json
/// { "status": { "rc": "ok" }, "data": { ... } }
/// { "status": { "rc": "error", "code": "not-found", "msg": "...", "object": "prod" } }
/// ```
#[derive(Debug, Deserialize)]
pub struct AmpResponse<T> {
    pub status: AmpStatus,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
}

/// Result code block. `rc == "ok"` means success.
#[derive(Debug, Clone, Deserialize)]
pub struct AmpStatus {
    pub rc: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    /// Name of the object the failure refers to, when the device says.
    #[serde(default)]
    pub object: Option<String>,
}

/// Outgoing request body: the underlying call name plus its arguments.
#[derive(Debug, Serialize)]
pub struct AmpRequest<'a, A: Serialize> {
    pub call: &'a str,
    pub args: A,
}

// ── Subscriptions ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct PingResponse {
    /// `"active"`, `"none"`, or `"fault"`.
    pub state: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeResponse {
    /// `"active"` or `"duplicate"`.
    pub state: String,
    /// Callback already registered under this subscription id (duplicate only).
    #[serde(default)]
    pub callback_url: Option<String>,
}

// ── Device ───────────────────────────────────────────────────────────

/// Device metadata from `GetDeviceInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceMetaInfo {
    #[serde(default)]
    pub device_name: Option<String>,
    pub serial_number: String,
    pub model_type: String,
    pub device_type: String,
    #[serde(default)]
    pub firmware_level: Option<String>,
    #[serde(default)]
    pub supported_amp_versions: Vec<String>,
    #[serde(default)]
    pub management_port: Option<u16>,
    #[serde(default)]
    pub hardware_options: Vec<String>,
    #[serde(default)]
    pub secure_backup_supported: bool,
}

/// Mutable device settings accepted by `SetDeviceSettings`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub filename: String,
    pub contents: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Options for `SecureBackup`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupOptions {
    /// Name of the crypto certificate object on the device.
    pub crypto_certificate: String,
    /// Where the device finds the certificate (`cert:///...`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_location: Option<String>,
    /// Restrict the backup to these domains; empty means all.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
    #[serde(default)]
    pub include_iscsi: bool,
    #[serde(default)]
    pub include_raid: bool,
}

/// Options for `SecureRestore`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestoreOptions {
    /// Name of the crypto credential able to decrypt the backup.
    pub crypto_credential: String,
    #[serde(default)]
    pub validate_only: bool,
}

// ── Domains ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct DomainList {
    #[serde(default)]
    pub domains: Vec<String>,
}

/// Domain status from `GetDomainStatus`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainStatusRecord {
    /// `"up"`, `"down"`, `"partial"`, or `"unknown"`.
    pub op_state: String,
    /// `"enabled"` or `"disabled"`.
    pub admin_state: String,
    #[serde(default)]
    pub quiesce_state: Option<String>,
    /// `"saved"` or `"modified"`.
    #[serde(default)]
    pub config_state: Option<String>,
    #[serde(default)]
    pub debug_state: bool,
}

/// Optional deployment policy applied while importing a domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentPolicy {
    /// Domain name recorded inside the policy export.
    pub domain_name: String,
    /// Policy object name inside the export.
    pub policy_name: String,
    /// Raw policy export.
    #[serde(skip)]
    pub policy: bytes::Bytes,
}

// ── Files ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<String>,
}

// ── Configuration diff ───────────────────────────────────────────────

/// One side of a configuration comparison.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "kebab-case")]
pub enum DiffTarget {
    /// The running configuration of a domain.
    Running { domain: String },
    /// The last saved configuration of a domain.
    Saved { domain: String },
    /// An export the device can fetch itself.
    Url { url: Url },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiffResponse {
    pub different: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DiffUrlResponse {
    pub url: Url,
}

// ── Services and dependency discovery ────────────────────────────────

/// Reference to a configuration object on the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConfigObjectRef {
    pub class_name: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_display_name: Option<String>,
    #[serde(default)]
    pub referenced_externally: bool,
}

impl ConfigObjectRef {
    pub fn new(class_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            class_name: class_name.into(),
            name: name.into(),
            class_display_name: None,
            referenced_externally: false,
        }
    }
}

/// A running service as reported by `GetServiceListFromDomain`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeService {
    #[serde(flatten)]
    pub object: ConfigObjectRef,
    #[serde(default)]
    pub op_state: Option<String>,
    #[serde(default)]
    pub admin_state: Option<String>,
    #[serde(default)]
    pub quiesce_state: Option<String>,
    #[serde(default)]
    pub needs_save: bool,
    #[serde(default)]
    pub user_comment: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceList<T> {
    #[serde(default = "Vec::new")]
    pub services: Vec<T>,
}

/// Node in a referenced-object tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedObject {
    pub object: ConfigObjectRef,
    #[serde(default)]
    pub children: Vec<ReferencedObject>,
}

/// Objects and files a service depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencedObjects {
    pub root: ReferencedObject,
    #[serde(default)]
    pub files: Vec<String>,
}

impl ReferencedObjects {
    /// Depth-first walk over every referenced object, root first.
    pub fn objects(&self) -> Vec<&ConfigObjectRef> {
        fn walk<'a>(node: &'a ReferencedObject, out: &mut Vec<&'a ConfigObjectRef>) {
            out.push(&node.object);
            for child in &node.children {
                walk(child, out);
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }
}

/// Services, objects and files that would be overwritten by an import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterDependentServices {
    #[serde(default)]
    pub services: Vec<ConfigObjectRef>,
    #[serde(default)]
    pub objects: Vec<ConfigObjectRef>,
    #[serde(default)]
    pub files: Vec<String>,
}

/// Outcome for one object touched by `DeleteService`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedObject {
    pub object: ConfigObjectRef,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub excluded: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteServiceResult {
    #[serde(default)]
    pub objects: Vec<DeletedObject>,
}

impl DeleteServiceResult {
    /// Objects the device failed to delete (not counting exclusions).
    pub fn failures(&self) -> impl Iterator<Item = &DeletedObject> {
        self.objects.iter().filter(|o| !o.deleted && !o.excluded)
    }
}

// ── Quiesce ──────────────────────────────────────────────────────────

/// What a quiesce or unquiesce call drains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuiesceTarget {
    Device,
    Domain(String),
    Services {
        domain: String,
        services: Vec<ConfigObjectRef>,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn envelope_without_data_deserializes() {
        let resp: AmpResponse<DomainList> =
            serde_json::from_value(json!({ "status": { "rc": "ok" } })).unwrap();
        assert_eq!(resp.status.rc, "ok");
        assert!(resp.data.is_none());
    }

    #[test]
    fn diff_target_is_tagged_by_source() {
        let target = DiffTarget::Saved {
            domain: "prod".into(),
        };
        assert_eq!(
            serde_json::to_value(&target).unwrap(),
            json!({ "source": "saved", "domain": "prod" })
        );
    }

    #[test]
    fn runtime_service_flattens_object_ref() {
        let svc: RuntimeService = serde_json::from_value(json!({
            "class_name": "MultiProtocolGateway",
            "name": "orders-mpgw",
            "op_state": "up",
            "admin_state": "enabled"
        }))
        .unwrap();
        assert_eq!(svc.object.name, "orders-mpgw");
        assert_eq!(svc.op_state.as_deref(), Some("up"));
        assert!(!svc.needs_save);
    }

    #[test]
    fn referenced_objects_walks_depth_first() {
        let tree = ReferencedObjects {
            root: ReferencedObject {
                object: ConfigObjectRef::new("MultiProtocolGateway", "gw"),
                children: vec![
                    ReferencedObject {
                        object: ConfigObjectRef::new("XMLManager", "default"),
                        children: vec![ReferencedObject {
                            object: ConfigObjectRef::new("UserAgent", "default"),
                            children: vec![],
                        }],
                    },
                    ReferencedObject {
                        object: ConfigObjectRef::new("StylePolicy", "orders"),
                        children: vec![],
                    },
                ],
            },
            files: vec!["local:///orders.xsl".into()],
        };
        let names: Vec<_> = tree.objects().iter().map(|o| o.class_name.as_str()).collect();
        assert_eq!(
            names,
            ["MultiProtocolGateway", "XMLManager", "UserAgent", "StylePolicy"]
        );
    }

    #[test]
    fn delete_result_failures_skip_exclusions() {
        let result = DeleteServiceResult {
            objects: vec![
                DeletedObject {
                    object: ConfigObjectRef::new("A", "a"),
                    deleted: true,
                    excluded: false,
                    error_message: None,
                },
                DeletedObject {
                    object: ConfigObjectRef::new("B", "b"),
                    deleted: false,
                    excluded: true,
                    error_message: None,
                },
                DeletedObject {
                    object: ConfigObjectRef::new("C", "c"),
                    deleted: false,
                    excluded: false,
                    error_message: Some("in use".into()),
                },
            ],
        };
        let failed: Vec<_> = result.failures().map(|o| o.object.name.as_str()).collect();
        assert_eq!(failed, ["c"]);
    }
}
