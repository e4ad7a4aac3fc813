// AMP service and quiesce endpoints
//
// Service listing and lifecycle, dependency discovery, and the scoped
// quiesce/unquiesce calls (device, domain or a set of services).

use bytes::Bytes;
use reqwest::multipart::Form;
use serde_json::json;
use tracing::{debug, info};

use crate::amp::client::AmpClient;
use crate::amp::dispatch::{Operation, Scope};
use crate::amp::domains::binary_part;
use crate::amp::models::{
    ConfigObjectRef, DeleteServiceResult, InterDependentServices, QuiesceTarget,
    ReferencedObjects, RuntimeService, ServiceList,
};
use crate::auth::DeviceAddress;
use crate::error::Error;

/// Seconds a device waits for in-flight transactions when none is given.
pub const DEFAULT_QUIESCE_TIMEOUT_SECS: u32 = 60;

impl AmpClient {
    /// Services running in a domain.
    pub async fn get_service_list(
        &self,
        device: &DeviceAddress,
        domain: &str,
    ) -> Result<Vec<RuntimeService>, Error> {
        let list: ServiceList<RuntimeService> = self
            .call(
                device,
                Operation::GetServiceList,
                Scope::Service,
                &json!({ "domain": domain }),
            )
            .await?;
        Ok(list.services)
    }

    /// Services contained in an export image, without importing it.
    pub async fn get_service_list_from_export(
        &self,
        device: &DeviceAddress,
        image: Bytes,
    ) -> Result<Vec<ConfigObjectRef>, Error> {
        let form = Form::new().part("image", binary_part(image, "domain.zip")?);
        let list: ServiceList<ConfigObjectRef> = self
            .upload_for(device, Operation::GetServiceListFromExport, &json!({}), form)
            .await?;
        Ok(list.services)
    }

    pub async fn start_service(
        &self,
        device: &DeviceAddress,
        domain: &str,
        services: &[ConfigObjectRef],
    ) -> Result<(), Error> {
        self.service_command(device, Operation::StartService, domain, services)
            .await
    }

    pub async fn stop_service(
        &self,
        device: &DeviceAddress,
        domain: &str,
        services: &[ConfigObjectRef],
    ) -> Result<(), Error> {
        self.service_command(device, Operation::StopService, domain, services)
            .await
    }

    /// Delete a service and, unless excluded, the objects and files it
    /// references.
    pub async fn delete_service(
        &self,
        device: &DeviceAddress,
        domain: &str,
        service: &ConfigObjectRef,
        exclude_objects: &[ConfigObjectRef],
        delete_files: bool,
    ) -> Result<DeleteServiceResult, Error> {
        info!(
            device = %device.key(),
            domain,
            class = %service.class_name,
            name = %service.name,
            excluded = exclude_objects.len(),
            delete_files,
            "deleting service"
        );
        self.call(
            device,
            Operation::DeleteService,
            Scope::Service,
            &json!({
                "domain": domain,
                "service": service,
                "exclude_objects": exclude_objects,
                "delete_files": delete_files,
            }),
        )
        .await
    }

    /// Services, objects and files an import of `image` would overwrite.
    pub async fn get_inter_dependent_services(
        &self,
        device: &DeviceAddress,
        domain: &str,
        image: Bytes,
    ) -> Result<InterDependentServices, Error> {
        debug!(domain, bytes = image.len(), "probing interdependent services");
        let form = Form::new().part("image", binary_part(image, "domain.zip")?);
        let args = json!({ "domain": domain });
        self.upload_for(device, Operation::GetInterDependentServices, &args, form)
            .await
    }

    /// Object tree and files referenced by one service.
    pub async fn get_referenced_objects(
        &self,
        device: &DeviceAddress,
        domain: &str,
        service: &ConfigObjectRef,
    ) -> Result<ReferencedObjects, Error> {
        self.call(
            device,
            Operation::GetReferencedObjects,
            Scope::Service,
            &json!({ "domain": domain, "service": service }),
        )
        .await
    }

    /// Drain traffic before maintenance.
    pub async fn quiesce(
        &self,
        device: &DeviceAddress,
        target: &QuiesceTarget,
        timeout_secs: u32,
    ) -> Result<(), Error> {
        info!(device = %device.key(), ?target, timeout_secs, "quiescing");
        let (scope, mut args) = quiesce_args(target);
        args["timeout"] = json!(timeout_secs);
        self.call_unit(device, Operation::Quiesce, scope, &args)
            .await
    }

    pub async fn unquiesce(&self, device: &DeviceAddress, target: &QuiesceTarget) -> Result<(), Error> {
        info!(device = %device.key(), ?target, "unquiescing");
        let (scope, args) = quiesce_args(target);
        self.call_unit(device, Operation::Unquiesce, scope, &args)
            .await
    }

    async fn service_command(
        &self,
        device: &DeviceAddress,
        operation: Operation,
        domain: &str,
        services: &[ConfigObjectRef],
    ) -> Result<(), Error> {
        debug!(domain, %operation, count = services.len(), "service command");
        self.call_unit(
            device,
            operation,
            Scope::Service,
            &json!({ "domain": domain, "services": services }),
        )
        .await
    }
}

fn quiesce_args(target: &QuiesceTarget) -> (Scope, serde_json::Value) {
    match target {
        QuiesceTarget::Device => (Scope::Device, json!({})),
        QuiesceTarget::Domain(domain) => (Scope::Domain, json!({ "domain": domain })),
        QuiesceTarget::Services { domain, services } => (
            Scope::Service,
            json!({ "domain": domain, "services": services }),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiesce_scope_follows_target() {
        assert_eq!(quiesce_args(&QuiesceTarget::Device).0, Scope::Device);
        assert_eq!(
            quiesce_args(&QuiesceTarget::Domain("prod".into())).0,
            Scope::Domain
        );
        let (scope, args) = quiesce_args(&QuiesceTarget::Services {
            domain: "prod".into(),
            services: vec![ConfigObjectRef::new("MultiProtocolGateway", "gw")],
        });
        assert_eq!(scope, Scope::Service);
        assert_eq!(args["services"][0]["name"], "gw");
    }
}
