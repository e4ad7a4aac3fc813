// AMP HTTP client
//
// Wraps `reqwest::Client` with AMP envelope handling, per-version call
// resolution, and deadline enforcement. The endpoint modules (domains,
// firmware, services, ...) are implemented as inherent methods in separate
// files to keep this module focused on transport mechanics.

use bytes::Bytes;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::Form;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::amp::dispatch::{self, AmpVersion, Operation, Scope};
use crate::amp::models::{AmpRequest, AmpResponse, AmpStatus};
use crate::auth::DeviceAddress;
use crate::connector::BoundedConnector;
use crate::error::Error;
use crate::transport::TransportConfig;

/// Header carrying the resolved call name, for proxies and request logs.
pub const CALL_HEADER: &str = "X-AMP-Call";

const BINARY_CONTENT_TYPE: &str = "application/octet-stream";
const PREVIEW_LEN: usize = 200;

/// Status, content type and body of one completed exchange.
struct RawResponse {
    status: StatusCode,
    content_type: Option<String>,
    body: Bytes,
}

/// HTTP client for the AMP management endpoint of any number of devices.
///
/// The client is not bound to a device: every call takes the
/// [`DeviceAddress`] it targets. Calls against distinct devices may run
/// concurrently; callers serialize state-changing calls per device.
#[derive(Debug, Clone)]
pub struct AmpClient {
    http: reqwest::Client,
    version: AmpVersion,
    connector: BoundedConnector,
    transfer: BoundedConnector,
    scheme: String,
}

impl AmpClient {
    /// Create a client speaking `version`, built from a `TransportConfig`.
    pub fn new(version: AmpVersion, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self::with_client(http, version, transport))
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(
        http: reqwest::Client,
        version: AmpVersion,
        transport: &TransportConfig,
    ) -> Self {
        Self {
            http,
            version,
            connector: transport.connector(),
            transfer: transport.transfer_connector(),
            scheme: transport.scheme.clone(),
        }
    }

    /// The protocol version this client speaks.
    pub fn version(&self) -> AmpVersion {
        self.version
    }

    /// Management endpoint URL for a device.
    pub fn endpoint(&self, device: &DeviceAddress) -> Result<Url, Error> {
        let full = format!(
            "{}://{}{}",
            self.scheme,
            device.key(),
            self.version.endpoint_path()
        );
        Ok(Url::parse(&full)?)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Issue a JSON call and return the unwrapped `data` payload.
    pub(crate) async fn call<A, T>(
        &self,
        device: &DeviceAddress,
        operation: Operation,
        scope: Scope,
        args: &A,
    ) -> Result<T, Error>
    where
        A: Serialize + Sync,
        T: DeserializeOwned,
    {
        let call = dispatch::resolve_scoped(self.version, operation, scope)?;
        let raw = self.send_json(device, operation, call, args).await?;
        decode_envelope::<T>(call, &raw)?.ok_or_else(|| Error::Deserialization {
            call: call.to_owned(),
            message: "response carried no data".into(),
            body: preview(&raw.body),
        })
    }

    /// Issue a JSON call whose response carries no payload.
    pub(crate) async fn call_unit<A>(
        &self,
        device: &DeviceAddress,
        operation: Operation,
        scope: Scope,
        args: &A,
    ) -> Result<(), Error>
    where
        A: Serialize + Sync,
    {
        let call = dispatch::resolve_scoped(self.version, operation, scope)?;
        let raw = self.send_json(device, operation, call, args).await?;
        decode_envelope::<serde::de::IgnoredAny>(call, &raw)?;
        Ok(())
    }

    /// Issue a JSON call that answers with a binary payload.
    pub(crate) async fn call_binary<A>(
        &self,
        device: &DeviceAddress,
        operation: Operation,
        args: &A,
    ) -> Result<Bytes, Error>
    where
        A: Serialize + Sync,
    {
        let call = dispatch::resolve(self.version, operation)?;
        let raw = self.send_json(device, operation, call, args).await?;

        if raw.status.is_success() && is_binary(raw.content_type.as_deref()) {
            return Ok(raw.body);
        }

        // Failures come back as a regular JSON envelope.
        decode_envelope::<serde::de::IgnoredAny>(call, &raw)?;
        Err(Error::Deserialization {
            call: call.to_owned(),
            message: format!(
                "expected a binary payload, got {}",
                raw.content_type.as_deref().unwrap_or("no content type")
            ),
            body: preview(&raw.body),
        })
    }

    /// Upload a multipart request: an `args` JSON part plus binary parts.
    pub(crate) async fn upload<A>(
        &self,
        device: &DeviceAddress,
        operation: Operation,
        args: &A,
        form: Form,
    ) -> Result<(), Error>
    where
        A: Serialize + Sync,
    {
        let (call, raw) = self.send_multipart(device, operation, args, form).await?;
        decode_envelope::<serde::de::IgnoredAny>(call, &raw)?;
        Ok(())
    }

    /// Upload a multipart request and return the unwrapped `data` payload.
    pub(crate) async fn upload_for<A, T>(
        &self,
        device: &DeviceAddress,
        operation: Operation,
        args: &A,
        form: Form,
    ) -> Result<T, Error>
    where
        A: Serialize + Sync,
        T: DeserializeOwned,
    {
        let (call, raw) = self.send_multipart(device, operation, args, form).await?;
        decode_envelope::<T>(call, &raw)?.ok_or_else(|| Error::Deserialization {
            call: call.to_owned(),
            message: "response carried no data".into(),
            body: preview(&raw.body),
        })
    }

    async fn send_multipart<A>(
        &self,
        device: &DeviceAddress,
        operation: Operation,
        args: &A,
        form: Form,
    ) -> Result<(&'static str, RawResponse), Error>
    where
        A: Serialize + Sync,
    {
        let call = dispatch::resolve(self.version, operation)?;
        let args_json = serde_json::to_string(args).map_err(|e| Error::Deserialization {
            call: call.to_owned(),
            message: format!("failed to encode arguments: {e}"),
            body: String::new(),
        })?;
        let form = form.text("call", call).text("args", args_json);

        let url = self.endpoint(device)?;
        debug!(call, device = %device.key(), "AMP upload");
        let builder = self.http.post(url).multipart(form);
        let raw = self.exchange(device, operation, call, builder).await?;
        Ok((call, raw))
    }

    async fn send_json<A>(
        &self,
        device: &DeviceAddress,
        operation: Operation,
        call: &'static str,
        args: &A,
    ) -> Result<RawResponse, Error>
    where
        A: Serialize + Sync,
    {
        let url = self.endpoint(device)?;
        debug!(call, device = %device.key(), "AMP call");
        let builder = self.http.post(url).json(&AmpRequest { call, args });
        self.exchange(device, operation, call, builder).await
    }

    /// Send the request and read the whole response under the deadline.
    async fn exchange(
        &self,
        device: &DeviceAddress,
        operation: Operation,
        call: &'static str,
        builder: reqwest::RequestBuilder,
    ) -> Result<RawResponse, Error> {
        let connector = if operation.is_transfer() {
            self.transfer
        } else {
            self.connector
        };
        let creds = device.credentials();
        let pending = builder
            .basic_auth(creds.username(), Some(creds.password_str()))
            .header(CALL_HEADER, call)
            .send();

        let raw = connector
            .run(&device.key(), async move {
                let resp = pending.await?;
                let status = resp.status();
                let content_type = resp
                    .headers()
                    .get(CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                let body = resp.bytes().await?;
                Ok(RawResponse {
                    status,
                    content_type,
                    body,
                })
            })
            .await?;

        trace!(call, status = %raw.status, bytes = raw.body.len(), "AMP response");

        if raw.status == StatusCode::UNAUTHORIZED || raw.status == StatusCode::FORBIDDEN {
            return Err(Error::Authentication {
                message: format!("{call} rejected credentials (HTTP {})", raw.status),
            });
        }

        if !raw.status.is_success() && !is_json(raw.content_type.as_deref()) {
            return Err(Error::HttpStatus {
                call: call.to_owned(),
                status: raw.status.as_u16(),
                body: preview(&raw.body),
            });
        }

        Ok(raw)
    }
}

// ── Envelope parsing ─────────────────────────────────────────────────

/// Parse the `{ status, data }` envelope, returning `data` on success or
/// the classified device error otherwise.
fn decode_envelope<T: DeserializeOwned>(call: &str, raw: &RawResponse) -> Result<Option<T>, Error> {
    let envelope: AmpResponse<T> =
        serde_json::from_slice(&raw.body).map_err(|e| Error::Deserialization {
            call: call.to_owned(),
            message: e.to_string(),
            body: preview(&raw.body),
        })?;

    if envelope.status.rc == "ok" {
        Ok(envelope.data)
    } else {
        Err(status_error(call, envelope.status))
    }
}

/// Classify a non-ok result code block.
fn status_error(call: &str, status: AmpStatus) -> Error {
    let object = status.object.clone().unwrap_or_default();
    match status.code.as_deref() {
        Some("not-found") => Error::NotFound {
            what: what_for(call),
            name: object,
        },
        Some("already-deleted") => Error::AlreadyDeleted {
            what: what_for(call),
            name: object,
        },
        Some("authentication-failure") => Error::Authentication {
            message: status.msg.unwrap_or_else(|| "credentials rejected".into()),
        },
        _ => Error::DeviceExecution {
            call: call.to_owned(),
            message: status
                .msg
                .unwrap_or_else(|| format!("rc={}", status.rc)),
            code: status.code,
        },
    }
}

/// Human noun for the object a call acts on.
fn what_for(call: &str) -> String {
    let noun = if call.contains("Domain") {
        "Domain"
    } else if matches!(call, "Subscribe" | "Unsubscribe" | "Ping") {
        "Subscription"
    } else if call.contains("Service") || call.contains("Referenced") {
        "Service"
    } else if call.contains("File") || call.contains("Crypto") {
        "File"
    } else {
        "Object"
    };
    noun.to_owned()
}

fn is_binary(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.starts_with(BINARY_CONTENT_TYPE))
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.starts_with("application/json"))
}

fn preview(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    text.chars().take(PREVIEW_LEN).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::auth::Credentials;

    #[test]
    fn subscription_calls_name_their_target() {
        assert_eq!(what_for("Subscribe"), "Subscription");
        assert_eq!(what_for("Unsubscribe"), "Subscription");
        assert_eq!(what_for("Ping"), "Subscription");
        assert_eq!(what_for("GetDomainStatus"), "Domain");
        assert_eq!(what_for("Reboot"), "Object");
    }

    fn device() -> DeviceAddress {
        DeviceAddress::new(
            "dp1.example.com",
            5550,
            Credentials::new("admin", SecretString::from("pw".to_string())),
        )
    }

    fn status(code: Option<&str>, msg: Option<&str>, object: Option<&str>) -> AmpStatus {
        AmpStatus {
            rc: "error".into(),
            code: code.map(String::from),
            msg: msg.map(String::from),
            object: object.map(String::from),
        }
    }

    #[test]
    fn endpoint_includes_version_path() {
        let client = AmpClient::new(AmpVersion::V3, &TransportConfig::default()).unwrap();
        assert_eq!(
            client.endpoint(&device()).unwrap().as_str(),
            "https://dp1.example.com:5550/service/mgmt/amp/3.0"
        );
    }

    #[test]
    fn not_found_code_maps_to_not_found() {
        let err = status_error("GetDomainStatus", status(Some("not-found"), None, Some("prod")));
        match err {
            Error::NotFound { what, name } => {
                assert_eq!(what, "Domain");
                assert_eq!(name, "prod");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn already_deleted_code_maps_to_already_deleted() {
        let err = status_error("DeleteDomain", status(Some("already-deleted"), None, Some("qa")));
        assert!(matches!(err, Error::AlreadyDeleted { .. }));
    }

    #[test]
    fn unknown_code_is_device_execution_failure() {
        let err = status_error("SetDomain", status(Some("import-failed"), Some("bad export"), None));
        match err {
            Error::DeviceExecution { call, message, code } => {
                assert_eq!(call, "SetDomain");
                assert_eq!(message, "bad export");
                assert_eq!(code.as_deref(), Some("import-failed"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn preview_truncates_long_bodies() {
        let body = vec![b'x'; 1000];
        assert_eq!(preview(&body).len(), PREVIEW_LEN);
    }
}
