//! Startup behaviour when the broker is unreachable
//!
//! Uses the real rumqttc session against a local port nothing listens on.
//! The service must come up anyway, report the failure through its state and
//! keep probing until stopped.

use daylight_sync::config::BrokerEndpoint;
use daylight_sync::shutdown::{self, ShutdownSignal};
use daylight_sync::testing::{FixedNetworkCheck, RecordingApplier};
use daylight_sync::transport::mqtt::ConnectionState;
use daylight_sync::{ConnectionSupervisor, RumqttcSession};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;

fn unreachable_endpoint(reconnect_delay: Duration) -> BrokerEndpoint {
    BrokerEndpoint {
        address: "127.0.0.1".to_string(),
        port: 1,
        username: None,
        password: None,
        topic: "home/daylight".to_string(),
        reconnect_delay,
        keep_alive: Duration::from_secs(5),
        client_id: Some("daylight-sync-broker-down".to_string()),
    }
}

fn supervisor(reconnect_delay: Duration) -> Arc<ConnectionSupervisor> {
    Arc::new(
        ConnectionSupervisor::new(
            unreachable_endpoint(reconnect_delay),
            RumqttcSession::new(),
            Arc::new(RecordingApplier::new()),
        )
        .with_network_check(Arc::new(FixedNetworkCheck::available()), Duration::from_millis(5)),
    )
}

#[tokio::test]
async fn test_start_returns_when_broker_refuses() {
    let supervisor = supervisor(Duration::from_secs(60));

    let started = timeout(Duration::from_secs(10), supervisor.start(&ShutdownSignal::never())).await;

    assert!(started.is_ok(), "start must not hang on a refused connection");
    assert!(
        matches!(supervisor.state(), ConnectionState::Failed(_)),
        "unexpected state {:?}",
        supervisor.state()
    );

    let stop_started = Instant::now();
    supervisor.stop(&ShutdownSignal::never()).await;
    assert!(stop_started.elapsed() < Duration::from_secs(5));
    assert_eq!(supervisor.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_keeps_retrying_while_broker_is_down() {
    let supervisor = supervisor(Duration::from_millis(50));

    supervisor.start(&ShutdownSignal::never()).await;

    let deadline = Instant::now() + Duration::from_secs(5);
    while supervisor.reconnect_count() < 2 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert!(
        supervisor.reconnect_count() >= 2,
        "expected repeated reconnect attempts, got {}",
        supervisor.reconnect_count()
    );
    assert!(!supervisor.state().is_connected());

    supervisor.stop(&ShutdownSignal::never()).await;
}

#[tokio::test]
async fn test_external_shutdown_during_outage() {
    let supervisor = supervisor(Duration::from_millis(50));
    let (trigger, signal) = shutdown::channel();

    supervisor.start(&signal).await;
    trigger.fire();

    let stopped = timeout(
        Duration::from_secs(5),
        supervisor.stop(&ShutdownSignal::never()),
    )
    .await;
    assert!(stopped.is_ok(), "stop must finish promptly during an outage");
}
