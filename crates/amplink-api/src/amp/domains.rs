// AMP domain endpoints
//
// Listing, export/import, delete, lifecycle control and status.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde_json::json;
use tracing::{debug, info};

use crate::amp::client::AmpClient;
use crate::amp::dispatch::{Operation, Scope};
use crate::amp::models::{DeploymentPolicy, DomainList, DomainStatusRecord};
use crate::auth::DeviceAddress;
use crate::error::Error;

impl AmpClient {
    /// List domain names on the device.
    pub async fn get_domain_list(&self, device: &DeviceAddress) -> Result<Vec<String>, Error> {
        let list: DomainList = self
            .call(device, Operation::GetDomainList, Scope::Device, &json!({}))
            .await?;
        Ok(list.domains)
    }

    /// Export a domain as an opaque deployment image.
    pub async fn get_domain(&self, device: &DeviceAddress, domain: &str) -> Result<Bytes, Error> {
        debug!(domain, "exporting domain");
        self.call_binary(device, Operation::GetDomain, &json!({ "domain": domain }))
            .await
    }

    /// Import a deployment image into a domain, creating it if absent.
    ///
    /// With `import_all` unset only changed objects are overwritten. The
    /// optional deployment policy is uploaded as a second part and applied
    /// by the device during import.
    pub async fn set_domain(
        &self,
        device: &DeviceAddress,
        domain: &str,
        image: Bytes,
        policy: Option<&DeploymentPolicy>,
        import_all: bool,
    ) -> Result<(), Error> {
        info!(
            device = %device.key(),
            domain,
            bytes = image.len(),
            policy = policy.map(|p| p.policy_name.as_str()),
            import_all,
            "importing domain"
        );

        let mut form = Form::new().part("image", binary_part(image, "domain.zip")?);
        let mut args = json!({ "domain": domain, "import_all": import_all });
        if let Some(policy) = policy {
            args["policy"] = json!({
                "domain_name": policy.domain_name,
                "policy_name": policy.policy_name,
            });
            form = form.part("policy", binary_part(policy.policy.clone(), "policy.zip")?);
        }

        self.upload(device, Operation::SetDomain, &args, form).await
    }

    /// Delete a domain and all its configuration.
    pub async fn delete_domain(&self, device: &DeviceAddress, domain: &str) -> Result<(), Error> {
        info!(device = %device.key(), domain, "deleting domain");
        self.domain_command(device, Operation::DeleteDomain, domain)
            .await
    }

    pub async fn start_domain(&self, device: &DeviceAddress, domain: &str) -> Result<(), Error> {
        self.domain_command(device, Operation::StartDomain, domain)
            .await
    }

    pub async fn stop_domain(&self, device: &DeviceAddress, domain: &str) -> Result<(), Error> {
        self.domain_command(device, Operation::StopDomain, domain)
            .await
    }

    pub async fn restart_domain(&self, device: &DeviceAddress, domain: &str) -> Result<(), Error> {
        self.domain_command(device, Operation::RestartDomain, domain)
            .await
    }

    /// Current admin, operational and quiesce state of a domain.
    pub async fn get_domain_status(
        &self,
        device: &DeviceAddress,
        domain: &str,
    ) -> Result<DomainStatusRecord, Error> {
        self.call(
            device,
            Operation::GetDomainStatus,
            Scope::Domain,
            &json!({ "domain": domain }),
        )
        .await
    }

    async fn domain_command(
        &self,
        device: &DeviceAddress,
        operation: Operation,
        domain: &str,
    ) -> Result<(), Error> {
        debug!(domain, %operation, "domain command");
        self.call_unit(device, operation, Scope::Domain, &json!({ "domain": domain }))
            .await
    }
}

pub(crate) fn binary_part(data: Bytes, file_name: &'static str) -> Result<Part, Error> {
    Ok(Part::stream(data)
        .file_name(file_name)
        .mime_str("application/octet-stream")?)
}
