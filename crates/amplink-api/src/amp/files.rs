// AMP key-file and configuration-diff endpoints

use bytes::Bytes;
use reqwest::multipart::Form;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use crate::amp::client::AmpClient;
use crate::amp::dispatch::{Operation, Scope};
use crate::amp::domains::binary_part;
use crate::amp::models::{DiffResponse, DiffTarget, DiffUrlResponse, FileList};
use crate::auth::DeviceAddress;
use crate::error::Error;

impl AmpClient {
    /// Names of key and certificate files in a domain's crypto store.
    pub async fn get_key_filenames(
        &self,
        device: &DeviceAddress,
        domain: &str,
    ) -> Result<Vec<String>, Error> {
        let list: FileList = self
            .call(
                device,
                Operation::GetKeyFilenames,
                Scope::Domain,
                &json!({ "domain": domain }),
            )
            .await?;
        Ok(list.files)
    }

    /// Upload a key or certificate file, replacing any file of that name.
    pub async fn set_key_file(
        &self,
        device: &DeviceAddress,
        domain: &str,
        filename: &str,
        contents: Bytes,
    ) -> Result<(), Error> {
        info!(device = %device.key(), domain, filename, "uploading key file");
        let args = json!({ "domain": domain, "filename": filename });
        let form = Form::new().part("file", binary_part(contents, "key.pem")?);
        self.upload(device, Operation::SetKeyFile, &args, form).await
    }

    pub async fn delete_key_file(
        &self,
        device: &DeviceAddress,
        domain: &str,
        filename: &str,
    ) -> Result<(), Error> {
        info!(device = %device.key(), domain, filename, "deleting key file");
        self.call_unit(
            device,
            Operation::DeleteKeyFile,
            Scope::Domain,
            &json!({ "domain": domain, "filename": filename }),
        )
        .await
    }

    /// Whether two configurations differ.
    pub async fn is_different(
        &self,
        device: &DeviceAddress,
        from: &DiffTarget,
        to: &DiffTarget,
    ) -> Result<bool, Error> {
        debug!(?from, ?to, "comparing configurations");
        let resp: DiffResponse = self
            .call(
                device,
                Operation::IsDifferent,
                Scope::Device,
                &json!({ "from": from, "to": to }),
            )
            .await?;
        Ok(resp.different)
    }

    /// URL of the device-rendered difference between two configurations.
    pub async fn get_diff_url(
        &self,
        device: &DeviceAddress,
        from: &DiffTarget,
        to: &DiffTarget,
    ) -> Result<Url, Error> {
        let resp: DiffUrlResponse = self
            .call(
                device,
                Operation::GetDiffUrl,
                Scope::Device,
                &json!({ "from": from, "to": to }),
            )
            .await?;
        Ok(resp.url)
    }
}
