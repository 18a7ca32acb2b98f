//! End-to-end tests for the composed sidecar against the mock server.
//!
//! Tests CAN use `.unwrap()` and `.expect()` - this is allowed.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{eventually_async, fast_link_config, MockMcs, TEST_ADDRESS};
use mcsw_core::{RoomId, SessionDescriptor};
use mcswd::config::Config;
use mcswd::registry::MediaSession;
use mcswd::sidecar::{self, Sidecar};
use mcswd::supervisor::{ExitStatus, Supervisor};
use serde_json::json;

#[tokio::test]
async fn test_sidecar_mirrors_and_drains_on_stop() {
    let mcs = MockMcs::new();
    mcs.set_rooms(&["r1"]);
    let mut sidecar = Sidecar::spawn(fast_link_config(), mcs.connector());
    assert_eq!(sidecar.take_tasks().len(), 4);

    sidecar.connect(TEST_ADDRESS).await;
    assert!(sidecar.link.is_connected());
    assert!(
        eventually_async(|| {
            let mirror = sidecar.mirror.clone();
            async move { mirror.room_ids().await.unwrap() == vec![RoomId::new("r1")] }
        })
        .await
    );

    let session = MediaSession::join(sidecar.link.clone(), RoomId::new("r1"), "SFU", json!({}))
        .await
        .unwrap();
    session.publish("WebRtcEndpoint", json!({})).await.unwrap();
    sidecar
        .registry
        .register(SessionDescriptor::new("c1", "stream1", "send"), Arc::new(session))
        .await
        .unwrap();

    let supervisor = Supervisor::new(sidecar.registry.clone(), Duration::from_secs(2));
    assert_eq!(supervisor.stop().await, ExitStatus::Graceful);

    assert_eq!(mcs.calls("unpublish").len(), 1);
    assert_eq!(mcs.calls("leave").len(), 1);
    assert!(sidecar.registry.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_run_without_address_is_a_startup_fault() {
    let status = sidecar::run(&Config::default()).await;
    assert_eq!(status, ExitStatus::Fatal);
    assert_eq!(status.code(), 1);
}
