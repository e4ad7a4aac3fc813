// AMP firmware endpoints
//
// One underlying call with four logical shapes: in-memory image or
// streamed image, each with or without license acceptance.

use std::path::Path;

use bytes::Bytes;
use reqwest::Body;
use reqwest::multipart::{Form, Part};
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::amp::client::AmpClient;
use crate::amp::dispatch::Operation;
use crate::amp::domains::binary_part;
use crate::auth::DeviceAddress;
use crate::error::Error;

impl AmpClient {
    /// Install a firmware image held in memory. The device reboots after.
    pub async fn set_firmware(&self, device: &DeviceAddress, image: Bytes) -> Result<(), Error> {
        self.install_firmware(device, Operation::SetFirmware, image_part_bytes(image)?, false)
            .await
    }

    /// Install a firmware image held in memory, accepting its license.
    pub async fn set_firmware_accept_license(
        &self,
        device: &DeviceAddress,
        image: Bytes,
    ) -> Result<(), Error> {
        self.install_firmware(
            device,
            Operation::SetFirmwareAcceptLicense,
            image_part_bytes(image)?,
            true,
        )
        .await
    }

    /// Install a firmware image streamed from disk.
    pub async fn set_firmware_stream(&self, device: &DeviceAddress, path: &Path) -> Result<(), Error> {
        let part = image_part_file(path).await?;
        self.install_firmware(device, Operation::SetFirmwareStream, part, false)
            .await
    }

    /// Install a firmware image streamed from disk, accepting its license.
    pub async fn set_firmware_stream_accept_license(
        &self,
        device: &DeviceAddress,
        path: &Path,
    ) -> Result<(), Error> {
        let part = image_part_file(path).await?;
        self.install_firmware(device, Operation::SetFirmwareStreamAcceptLicense, part, true)
            .await
    }

    async fn install_firmware(
        &self,
        device: &DeviceAddress,
        operation: Operation,
        image: Part,
        accept_license: bool,
    ) -> Result<(), Error> {
        info!(device = %device.key(), %operation, accept_license, "installing firmware");
        let args = json!({ "accept_license": accept_license });
        self.upload(device, operation, &args, Form::new().part("image", image))
            .await
    }
}

fn image_part_bytes(image: Bytes) -> Result<Part, Error> {
    binary_part(image, "firmware.scrypt")
}

async fn image_part_file(path: &Path) -> Result<Part, Error> {
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    let body = Body::wrap_stream(ReaderStream::new(file));
    let file_name = path
        .file_name()
        .map_or_else(|| "firmware.scrypt".to_owned(), |n| n.to_string_lossy().into_owned());
    Ok(Part::stream_with_length(body, len)
        .file_name(file_name)
        .mime_str("application/octet-stream")?)
}
