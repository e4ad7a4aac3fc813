#![allow(clippy::unwrap_used)]

// Manager context end to end: pushed events drive status re-fetches.

mod common;

use std::sync::Arc;
use std::time::Duration;

use amplink_core::model::event::codes;
use amplink_core::{
    CommandChannel, ErrorKind, EventKind, ManagerConfig, ManagerContext, NotificationSource,
    OperationStatus, ProviderLifetime, ProviderRegistry,
};
use bytes::Bytes;
use pretty_assertions::assert_eq;
use tokio::time::timeout;

use common::{FakeAppliance, FakeSource, device, down, envelope, up};

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    ctx: ManagerContext,
    appliance: Arc<FakeAppliance>,
    source: Arc<FakeSource>,
}

fn harness(model: &str) -> Harness {
    harness_with_keepalive(model, Duration::ZERO)
}

fn harness_with_keepalive(model: &str, keepalive_interval: Duration) -> Harness {
    let appliance = Arc::new(FakeAppliance::new(model));
    let source = Arc::new(FakeSource::default());

    let registry = ProviderRegistry::new();
    let channel = Arc::clone(&appliance);
    registry
        .channels()
        .register("fake", ProviderLifetime::Singleton, move || {
            Ok(Arc::clone(&channel) as Arc<dyn CommandChannel>)
        });
    let src = Arc::clone(&source);
    registry
        .sources()
        .register("fake", ProviderLifetime::Singleton, move || {
            Ok(Arc::clone(&src) as Arc<dyn NotificationSource>)
        });

    let config = ManagerConfig {
        channel_provider: "fake".into(),
        catcher_provider: "fake".into(),
        keepalive_interval,
        ..ManagerConfig::default()
    };
    let ctx = ManagerContext::new(config, Arc::new(registry)).unwrap();
    Harness {
        ctx,
        appliance,
        source,
    }
}

#[tokio::test]
async fn add_device_loads_domain_status() {
    let h = harness("7199");
    h.appliance.set_domain_status("staging", down());
    let dev = device();

    let info = h.ctx.add_device(dev.clone()).await.unwrap();
    assert_eq!(info.serial_number, common::SERIAL);
    assert_eq!(h.ctx.status(&dev, "default"), Some(up()));
    assert_eq!(h.ctx.status(&dev, "staging"), Some(down()));
    assert_eq!(h.ctx.device_status(&dev), OperationStatus::Partial);
}

#[tokio::test]
async fn start_subscribes_and_stop_releases() {
    let h = harness("7199");
    let dev = device();
    h.ctx.add_device(dev.clone()).await.unwrap();

    h.ctx.start().await.unwrap();
    assert!(h.source.is_running());
    assert_eq!(
        h.appliance.subscriber_callback("amplink").as_deref(),
        Some("http://127.0.0.1:5555/")
    );
    let err = h.ctx.start().await.unwrap_err();
    assert_eq!(err.key(), "amp.config.invalid");

    h.ctx.stop().await;
    assert!(!h.source.is_running());
    assert!(h.appliance.subscriber_callback("amplink").is_none());
    assert!(!h.ctx.is_running().await);
}

#[tokio::test]
async fn op_state_event_refreshes_one_domain() {
    let h = harness("7199");
    let dev = device();
    h.ctx.add_device(dev.clone()).await.unwrap();
    h.ctx.start().await.unwrap();

    let mut statuses = h.ctx.status_stream();
    let mut events = h.ctx.events();

    h.appliance.set_domain_status("default", down());
    h.source
        .push(envelope(1, codes::OP_STATE_DOWN, "Domain", "default"));

    let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(event.kind, EventKind::OpStateDown);
    assert_eq!(event.client_address.as_deref(), Some("192.0.2.10"));

    let snap = timeout(WAIT, statuses.changed()).await.unwrap().unwrap();
    assert_eq!(snap[0].status, down());
    assert_eq!(h.ctx.device_status(&dev), OperationStatus::Down);

    h.ctx.stop().await;
}

#[tokio::test]
async fn sequence_gap_triggers_full_refetch() {
    let h = harness("7199");
    let dev = device();
    h.ctx.add_device(dev.clone()).await.unwrap();
    h.ctx.start().await.unwrap();
    let baseline = h.appliance.domain_list_calls();

    let mut statuses = h.ctx.status_stream();
    h.appliance.set_domain_status("payments", up());

    h.source.push(envelope(1, codes::TEST, "Domain", "default"));
    h.source.push(envelope(5, codes::TEST, "Domain", "default"));

    timeout(WAIT, statuses.changed()).await.unwrap().unwrap();
    assert_eq!(h.ctx.status(&dev, "payments"), Some(up()));
    assert!(h.appliance.domain_list_calls() > baseline);

    h.ctx.stop().await;
}

#[tokio::test]
async fn test_and_duplicate_events_are_not_broadcast() {
    let h = harness("7199");
    h.ctx.add_device(device()).await.unwrap();
    h.ctx.start().await.unwrap();
    let mut events = h.ctx.events();

    h.source.push(envelope(1, codes::TEST, "Domain", "default"));
    h.source
        .push(envelope(2, codes::DOMAIN_CONFIG_SAVED, "Domain", "default"));
    h.source
        .push(envelope(2, codes::DOMAIN_CONFIG_SAVED, "Domain", "default"));
    h.source
        .push(envelope(3, codes::DOMAIN_CONFIG_MODIFIED, "Domain", "default"));

    let first = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(first.sequence_number, 2);
    let second = timeout(WAIT, events.recv()).await.unwrap().unwrap();
    assert_eq!(second.sequence_number, 3);

    h.ctx.stop().await;
}

#[tokio::test]
async fn firmware_deploy_is_gated_on_model_compatibility() {
    let h = harness("9001");
    let dev = device();
    h.ctx.add_device(dev.clone()).await.unwrap();

    // 9001 and 9002 are distinct but compatible.
    let image = Bytes::from_static(b"<model-type>9002</model-type>payload");
    h.ctx.deploy_firmware(&dev, image, true).await.unwrap();

    let image = Bytes::from_static(b"<model-type>7199</model-type>payload");
    let err = h.ctx.deploy_firmware(&dev, image, false).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolFailure);
    assert_eq!(err.key(), "amp.request.invalid");

    // Untagged images pass through unchecked.
    let image = Bytes::from_static(b"opaque");
    h.ctx.deploy_firmware(&dev, image, false).await.unwrap();

    assert_eq!(h.appliance.firmware_installs(), vec![(36, true), (6, false)]);
}

#[tokio::test(start_paused = true)]
async fn keepalive_fault_triggers_full_refetch() {
    let h = harness_with_keepalive("7199", Duration::from_secs(1));
    let dev = device();
    h.ctx.add_device(dev.clone()).await.unwrap();
    h.ctx.start().await.unwrap();
    let baseline = h.appliance.domain_list_calls();

    let mut statuses = h.ctx.status_stream();
    h.appliance.set_domain_status("payments", up());
    h.appliance.set_ping_fault(true);

    // No event arrives: only the FAULT ping can reveal the loss.
    timeout(WAIT, statuses.changed()).await.unwrap().unwrap();
    assert_eq!(h.ctx.status(&dev, "payments"), Some(up()));
    assert!(h.appliance.domain_list_calls() > baseline);

    h.ctx.stop().await;
}
