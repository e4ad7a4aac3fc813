// Logical operation → underlying AMP call resolution.
//
// The command contract is expressed as logical operations. Each protocol
// version binds a subset of them to concrete call names; a few logical
// operations (quiesce, unquiesce) bind to different calls depending on
// whether they target the whole device, one domain, or a set of services.
// The table is static; nothing here is inferred at runtime.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::Error;

/// AMP protocol revision spoken by a device.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    EnumIter,
    Serialize,
    Deserialize,
)]
pub enum AmpVersion {
    #[strum(to_string = "1.0", serialize = "v1", serialize = "1")]
    #[serde(rename = "1.0", alias = "v1", alias = "1")]
    V1,
    #[strum(to_string = "2.0", serialize = "v2", serialize = "2")]
    #[serde(rename = "2.0", alias = "v2", alias = "2")]
    V2,
    #[strum(to_string = "3.0", serialize = "v3", serialize = "3")]
    #[serde(rename = "3.0", alias = "v3", alias = "3")]
    V3,
}

impl AmpVersion {
    pub const LATEST: Self = Self::V3;

    /// Endpoint path segment for this version.
    pub fn endpoint_path(self) -> &'static str {
        match self {
            Self::V1 => "/service/mgmt/amp/1.0",
            Self::V2 => "/service/mgmt/amp/2.0",
            Self::V3 => "/service/mgmt/amp/3.0",
        }
    }
}

/// What a scoped operation acts upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum Scope {
    Device,
    Domain,
    Service,
}

/// Every logical operation of the command contract.
///
/// Names are stable kebab-case strings (`get-domain-status`, ...).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum Operation {
    // Subscriptions
    Ping,
    Subscribe,
    Unsubscribe,
    // Device
    GetDeviceMetadata,
    SetDeviceMetadata,
    Reboot,
    GetErrorReport,
    GetSamlToken,
    BackupDevice,
    RestoreDevice,
    // Domains
    GetDomainList,
    GetDomain,
    SetDomain,
    DeleteDomain,
    StartDomain,
    StopDomain,
    RestartDomain,
    GetDomainStatus,
    // Firmware
    SetFirmware,
    SetFirmwareAcceptLicense,
    SetFirmwareStream,
    SetFirmwareStreamAcceptLicense,
    // Key files
    GetKeyFilenames,
    SetKeyFile,
    DeleteKeyFile,
    // Configuration diff
    IsDifferent,
    GetDiffUrl,
    // Quiesce (scoped)
    Quiesce,
    Unquiesce,
    // Services and dependency discovery
    GetServiceList,
    GetServiceListFromExport,
    StartService,
    StopService,
    DeleteService,
    GetInterDependentServices,
    GetReferencedObjects,
}

impl Operation {
    /// Scope used when the caller does not name one.
    pub fn default_scope(self) -> Scope {
        match self {
            Self::GetDomain
            | Self::SetDomain
            | Self::DeleteDomain
            | Self::StartDomain
            | Self::StopDomain
            | Self::RestartDomain
            | Self::GetDomainStatus
            | Self::GetKeyFilenames
            | Self::SetKeyFile
            | Self::DeleteKeyFile
            | Self::GetSamlToken => Scope::Domain,
            Self::GetServiceList
            | Self::GetServiceListFromExport
            | Self::StartService
            | Self::StopService
            | Self::DeleteService
            | Self::GetInterDependentServices
            | Self::GetReferencedObjects => Scope::Service,
            _ => Scope::Device,
        }
    }

    /// Whether the call moves a deployment image and gets the long deadline.
    pub fn is_transfer(self) -> bool {
        matches!(
            self,
            Self::GetDomain
                | Self::SetDomain
                | Self::SetFirmware
                | Self::SetFirmwareAcceptLicense
                | Self::SetFirmwareStream
                | Self::SetFirmwareStreamAcceptLicense
                | Self::BackupDevice
                | Self::RestoreDevice
        )
    }
}

/// One row of the dispatch table.
#[derive(Debug, Clone, Copy)]
pub struct CallBinding {
    pub operation: Operation,
    pub scope: Scope,
    pub call: &'static str,
    pub since: AmpVersion,
}

const fn bind(
    operation: Operation,
    scope: Scope,
    call: &'static str,
    since: AmpVersion,
) -> CallBinding {
    CallBinding {
        operation,
        scope,
        call,
        since,
    }
}

use AmpVersion::{V1, V2, V3};
use Operation as Op;
use Scope::{Device, Domain, Service};

/// Static binding of logical operations to AMP calls.
pub static CALL_TABLE: &[CallBinding] = &[
    bind(Op::Ping, Device, "Ping", V1),
    bind(Op::Subscribe, Device, "Subscribe", V1),
    bind(Op::Unsubscribe, Device, "Unsubscribe", V1),
    bind(Op::GetDeviceMetadata, Device, "GetDeviceInfo", V1),
    bind(Op::SetDeviceMetadata, Device, "SetDeviceSettings", V3),
    bind(Op::Reboot, Device, "Reboot", V1),
    bind(Op::GetErrorReport, Device, "GetErrorReport", V1),
    bind(Op::GetSamlToken, Domain, "GetToken", V2),
    bind(Op::BackupDevice, Device, "SecureBackup", V3),
    bind(Op::RestoreDevice, Device, "SecureRestore", V3),
    bind(Op::GetDomainList, Device, "GetDomainList", V1),
    bind(Op::GetDomain, Domain, "GetDomainExport", V1),
    bind(Op::SetDomain, Domain, "SetDomain", V1),
    bind(Op::DeleteDomain, Domain, "DeleteDomain", V1),
    bind(Op::StartDomain, Domain, "StartDomain", V2),
    bind(Op::StopDomain, Domain, "StopDomain", V2),
    bind(Op::RestartDomain, Domain, "RestartDomain", V1),
    bind(Op::GetDomainStatus, Domain, "GetDomainStatus", V1),
    bind(Op::SetFirmware, Device, "SetFirmware", V1),
    bind(Op::SetFirmwareAcceptLicense, Device, "SetFirmware", V2),
    bind(Op::SetFirmwareStream, Device, "SetFirmware", V1),
    bind(Op::SetFirmwareStreamAcceptLicense, Device, "SetFirmware", V2),
    bind(Op::GetKeyFilenames, Domain, "GetCryptoArtifacts", V1),
    bind(Op::SetKeyFile, Domain, "SetFile", V1),
    bind(Op::DeleteKeyFile, Domain, "DeleteFile", V2),
    bind(Op::IsDifferent, Device, "CompareConfig", V1),
    bind(Op::GetDiffUrl, Device, "CompareConfigUrl", V1),
    bind(Op::Quiesce, Device, "QuiesceDevice", V2),
    bind(Op::Quiesce, Domain, "DomainQuiesce", V2),
    bind(Op::Quiesce, Service, "ServiceQuiesce", V3),
    bind(Op::Unquiesce, Device, "UnquiesceDevice", V2),
    bind(Op::Unquiesce, Domain, "DomainUnquiesce", V2),
    bind(Op::Unquiesce, Service, "ServiceUnquiesce", V3),
    bind(Op::GetServiceList, Service, "GetServiceListFromDomain", V3),
    bind(Op::GetServiceListFromExport, Service, "GetServiceListFromExport", V3),
    bind(Op::StartService, Service, "StartServices", V3),
    bind(Op::StopService, Service, "StopServices", V3),
    bind(Op::DeleteService, Service, "DeleteService", V3),
    bind(Op::GetInterDependentServices, Service, "GetInterDependentServices", V3),
    bind(Op::GetReferencedObjects, Service, "GetReferencedObjectList", V3),
];

/// Resolve a logical operation at its default scope.
pub fn resolve(version: AmpVersion, operation: Operation) -> Result<&'static str, Error> {
    resolve_scoped(version, operation, operation.default_scope())
}

/// Resolve a logical operation at an explicit scope.
pub fn resolve_scoped(
    version: AmpVersion,
    operation: Operation,
    scope: Scope,
) -> Result<&'static str, Error> {
    CALL_TABLE
        .iter()
        .find(|b| b.operation == operation && b.scope == scope && b.since <= version)
        .map(|b| b.call)
        .ok_or(Error::UnsupportedOperation { operation, version })
}

/// Whether `version` binds `operation` at any scope.
pub fn supports(version: AmpVersion, operation: Operation) -> bool {
    CALL_TABLE
        .iter()
        .any(|b| b.operation == operation && b.since <= version)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn every_operation_is_bound_in_latest_version() {
        for op in Operation::iter() {
            assert!(supports(AmpVersion::LATEST, op), "{op} has no binding");
        }
    }

    #[test]
    fn quiesce_maps_to_a_call_per_scope() {
        let v = AmpVersion::V3;
        assert_eq!(resolve_scoped(v, Op::Quiesce, Device).unwrap(), "QuiesceDevice");
        assert_eq!(resolve_scoped(v, Op::Quiesce, Domain).unwrap(), "DomainQuiesce");
        assert_eq!(resolve_scoped(v, Op::Quiesce, Service).unwrap(), "ServiceQuiesce");
    }

    #[test]
    fn older_versions_reject_newer_operations() {
        let err = resolve(AmpVersion::V1, Op::GetServiceList).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedOperation {
                operation: Op::GetServiceList,
                version: AmpVersion::V1
            }
        ));
        assert!(resolve_scoped(AmpVersion::V2, Op::Quiesce, Service).is_err());
        assert!(resolve_scoped(AmpVersion::V2, Op::Quiesce, Domain).is_ok());
    }

    #[test]
    fn license_acceptance_needs_v2() {
        assert!(resolve(AmpVersion::V1, Op::SetFirmware).is_ok());
        assert!(resolve(AmpVersion::V1, Op::SetFirmwareAcceptLicense).is_err());
        assert_eq!(
            resolve(AmpVersion::V2, Op::SetFirmwareStreamAcceptLicense).unwrap(),
            "SetFirmware"
        );
    }

    #[test]
    fn operation_names_round_trip() {
        assert_eq!(Op::GetDomainStatus.to_string(), "get-domain-status");
        assert_eq!(Operation::from_str("get-saml-token").unwrap(), Op::GetSamlToken);
    }

    #[test]
    fn versions_parse_from_common_spellings() {
        assert_eq!(AmpVersion::from_str("3.0").unwrap(), AmpVersion::V3);
        assert_eq!(AmpVersion::from_str("v2").unwrap(), AmpVersion::V2);
        assert_eq!(AmpVersion::V1.to_string(), "1.0");
        assert!(AmpVersion::V1 < AmpVersion::V3);
    }
}
