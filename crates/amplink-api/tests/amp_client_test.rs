#![allow(clippy::unwrap_used)]
// Integration tests for `AmpClient` using wiremock.

use std::time::{Duration, Instant};

use bytes::Bytes;
use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{basic_auth, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use amplink_api::amp::models::{ConfigObjectRef, DiffTarget, QuiesceTarget};
use amplink_api::{
    AmpClient, AmpVersion, Credentials, DeviceAddress, Error, ErrorKind, TlsMode, TransportConfig,
};

// ── Helpers ─────────────────────────────────────────────────────────

const ENDPOINT: &str = "/service/mgmt/amp/3.0";

fn transport() -> TransportConfig {
    TransportConfig {
        tls: TlsMode::System,
        scheme: "http".into(),
        ..TransportConfig::default()
    }
}

async fn setup_with(version: AmpVersion, transport: &TransportConfig) -> (MockServer, AmpClient, DeviceAddress) {
    let server = MockServer::start().await;
    let addr = server.address();
    let device = DeviceAddress::new(
        addr.ip().to_string(),
        addr.port(),
        Credentials::new("admin", SecretString::from("s3cret".to_string())),
    );
    let client = AmpClient::with_client(reqwest::Client::new(), version, transport);
    (server, client, device)
}

async fn setup() -> (MockServer, AmpClient, DeviceAddress) {
    setup_with(AmpVersion::V3, &transport()).await
}

fn ok(data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "status": { "rc": "ok" }, "data": data }))
}

fn ok_empty() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "status": { "rc": "ok" } }))
}

fn device_error(code: &str, object: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "status": { "rc": "error", "code": code, "msg": format!("{code}: {object}"), "object": object }
    }))
}

// ── Envelope and authentication ─────────────────────────────────────

#[tokio::test]
async fn test_get_domain_status() {
    let (server, client, device) = setup().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(basic_auth("admin", "s3cret"))
        .and(header("x-amp-call", "GetDomainStatus"))
        .and(body_partial_json(json!({ "call": "GetDomainStatus", "args": { "domain": "prod" } })))
        .respond_with(ok(json!({
            "op_state": "up",
            "admin_state": "enabled",
            "quiesce_state": "unquiesced",
            "config_state": "modified",
            "debug_state": false
        })))
        .expect(1)
        .mount(&server)
        .await;

    let status = client.get_domain_status(&device, "prod").await.unwrap();
    assert_eq!(status.op_state, "up");
    assert_eq!(status.admin_state, "enabled");
    assert_eq!(status.config_state.as_deref(), Some("modified"));
}

#[tokio::test]
async fn test_rejected_credentials() {
    let (server, client, device) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
        .mount(&server)
        .await;

    let result = client.get_domain_list(&device).await;
    let err = result.unwrap_err();
    assert!(matches!(err, Error::Authentication { .. }), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::InvalidCredentials);
}

#[tokio::test]
async fn test_not_found_domain() {
    let (server, client, device) = setup().await;

    Mock::given(method("POST"))
        .respond_with(device_error("not-found", "staging"))
        .mount(&server)
        .await;

    let err = client.get_domain_status(&device, "staging").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "Domain not found: staging");
}

#[tokio::test]
async fn test_lost_delete_race() {
    let (server, client, device) = setup().await;

    Mock::given(method("POST"))
        .and(header("x-amp-call", "DeleteDomain"))
        .respond_with(device_error("already-deleted", "qa"))
        .mount(&server)
        .await;

    let err = client.delete_domain(&device, "qa").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyDeleted);
}

#[tokio::test]
async fn test_garbage_body_is_protocol_failure() {
    let (server, client, device) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>not amp</html>"))
        .mount(&server)
        .await;

    let err = client.get_domain_list(&device).await.unwrap_err();
    match &err {
        Error::Deserialization { call, body, .. } => {
            assert_eq!(call, "GetDomainList");
            assert!(body.contains("not amp"));
        }
        other => panic!("expected Deserialization, got {other:?}"),
    }
    assert_eq!(err.kind(), ErrorKind::ProtocolFailure);
}

#[tokio::test]
async fn test_server_error_is_device_execution_failure() {
    let (server, client, device) = setup().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .mount(&server)
        .await;

    let err = client.reboot(&device, amplink_api::amp::RebootMode::Reload).await.unwrap_err();
    assert!(matches!(err, Error::HttpStatus { status: 503, .. }));
    assert_eq!(err.kind(), ErrorKind::DeviceExecutionFailure);
}

// ── Version dispatch ────────────────────────────────────────────────

#[tokio::test]
async fn test_unsupported_operation_never_reaches_device() {
    let (server, client, device) = setup_with(AmpVersion::V1, &transport()).await;

    Mock::given(method("POST"))
        .respond_with(ok_empty())
        .expect(0)
        .mount(&server)
        .await;

    let err = client.get_service_list(&device, "prod").await.unwrap_err();
    assert!(matches!(err, Error::UnsupportedOperation { .. }));
    assert_eq!(err.key(), "amp.protocol.unsupported");
}

#[tokio::test]
async fn test_quiesce_resolves_call_per_scope() {
    let (server, client, device) = setup().await;

    for call in ["QuiesceDevice", "DomainQuiesce", "ServiceQuiesce"] {
        Mock::given(method("POST"))
            .and(header("x-amp-call", call))
            .respond_with(ok_empty())
            .expect(1)
            .mount(&server)
            .await;
    }

    client.quiesce(&device, &QuiesceTarget::Device, 30).await.unwrap();
    client
        .quiesce(&device, &QuiesceTarget::Domain("prod".into()), 30)
        .await
        .unwrap();
    client
        .quiesce(
            &device,
            &QuiesceTarget::Services {
                domain: "prod".into(),
                services: vec![ConfigObjectRef::new("MultiProtocolGateway", "orders")],
            },
            30,
        )
        .await
        .unwrap();
}

// ── Subscriptions ───────────────────────────────────────────────────

#[tokio::test]
async fn test_subscribe_duplicate_reports_existing_callback() {
    let (server, client, device) = setup().await;

    Mock::given(method("POST"))
        .and(header("x-amp-call", "Subscribe"))
        .and(body_partial_json(json!({ "args": { "id": "sub1" } })))
        .respond_with(ok(json!({
            "state": "duplicate",
            "callback_url": "https://mgr.example.com:5555/"
        })))
        .mount(&server)
        .await;

    let topics = vec!["operational-state".to_string(), "firmware-change".to_string()];
    let resp = client
        .subscribe(&device, "sub1", &topics, "https://mgr.example.com:5555/")
        .await
        .unwrap();
    assert_eq!(resp.state, "duplicate");
    assert_eq!(resp.callback_url.as_deref(), Some("https://mgr.example.com:5555/"));
}

// ── Binary payloads ─────────────────────────────────────────────────

#[tokio::test]
async fn test_domain_export_returns_raw_bytes() {
    let (server, client, device) = setup().await;

    Mock::given(method("POST"))
        .and(header("x-amp-call", "GetDomainExport"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/octet-stream")
                .set_body_bytes(b"PK\x03\x04export".to_vec()),
        )
        .mount(&server)
        .await;

    let image = client.get_domain(&device, "prod").await.unwrap();
    assert_eq!(image, Bytes::from_static(b"PK\x03\x04export"));
}

#[tokio::test]
async fn test_firmware_upload_is_multipart() {
    let (server, client, device) = setup().await;

    Mock::given(method("POST"))
        .and(header("x-amp-call", "SetFirmware"))
        .respond_with(ok_empty())
        .expect(1)
        .mount(&server)
        .await;

    client
        .set_firmware_accept_license(&device, Bytes::from_static(b"firmware-image"))
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let content_type = requests[0]
        .headers
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();
    assert!(content_type.starts_with("multipart/form-data"), "{content_type}");
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(body.contains("firmware-image"));
    assert!(body.contains("\"accept_license\":true"));
}

// ── Diff ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_is_different_sends_both_targets() {
    let (server, client, device) = setup().await;

    Mock::given(method("POST"))
        .and(header("x-amp-call", "CompareConfig"))
        .and(body_partial_json(json!({
            "args": {
                "from": { "source": "running", "domain": "prod" },
                "to": { "source": "saved", "domain": "prod" }
            }
        })))
        .respond_with(ok(json!({ "different": true })))
        .mount(&server)
        .await;

    let different = client
        .is_different(
            &device,
            &DiffTarget::Running { domain: "prod".into() },
            &DiffTarget::Saved { domain: "prod".into() },
        )
        .await
        .unwrap();
    assert!(different);
}

// ── Deadline ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_slow_device_times_out_at_deadline() {
    let transport = TransportConfig {
        connect_timeout: Duration::from_millis(300),
        poll_interval: Duration::from_millis(20),
        ..transport()
    };
    let (server, client, device) = setup_with(AmpVersion::V3, &transport).await;

    Mock::given(method("POST"))
        .respond_with(ok(json!({ "domains": [] })).set_delay(Duration::from_secs(10)))
        .mount(&server)
        .await;

    let started = Instant::now();
    let err = client.get_domain_list(&device).await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, Error::Timeout { deadline_ms: 300, .. }), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::IoFailure);
    assert!(elapsed >= Duration::from_millis(300), "returned early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "returned late: {elapsed:?}");
}
