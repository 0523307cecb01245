//! Pure state transition and liveness logic for the connection supervisor
//!
//! The supervisor feeds every connection event through
//! [`HealthMonitor::determine_next_state`]; no I/O happens here.

use super::connection::ConnectionState;
use tracing::{debug, error, info, warn};

/// Pure health monitoring and state transition logic
pub struct HealthMonitor;

/// Connection events that trigger state transitions
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// Connect request issued
    ConnectStarted,
    /// Broker accepted the connection
    ConnectAccepted,
    /// Connect rejected, timed out or errored
    ConnectFailed(String),
    /// Subscribe request issued
    SubscribeStarted,
    /// Subscription acknowledged
    SubscribeAcknowledged,
    /// Subscription failed; the connection itself stays up
    SubscribeFailed(String),
    /// Liveness probe returned false or errored
    ProbeFailed(String),
    /// Old connection torn down ahead of a reconnect
    ResetForReconnect,
    /// Graceful disconnect or shutdown
    Disconnected,
}

impl HealthMonitor {
    /// Determine next state after connection event (pure function)
    pub fn determine_next_state(
        current_state: &ConnectionState,
        event: ConnectionEvent,
    ) -> ConnectionState {
        match event {
            ConnectionEvent::ConnectStarted => ConnectionState::Connecting,
            ConnectionEvent::ConnectAccepted => ConnectionState::Connected,
            ConnectionEvent::ConnectFailed(reason) => ConnectionState::Failed(reason),
            ConnectionEvent::SubscribeStarted => ConnectionState::Subscribing,
            ConnectionEvent::SubscribeAcknowledged => ConnectionState::Subscribed,
            ConnectionEvent::SubscribeFailed(_) => match current_state {
                ConnectionState::Subscribing => ConnectionState::Connected,
                other => other.clone(),
            },
            ConnectionEvent::ProbeFailed(reason) => ConnectionState::Failed(reason),
            ConnectionEvent::ResetForReconnect => ConnectionState::Disconnected,
            ConnectionEvent::Disconnected => ConnectionState::Disconnected,
        }
    }

    /// Log connection state transition (pure logging function)
    pub fn log_state_transition(from: &ConnectionState, to: &ConnectionState) {
        match (from, to) {
            (a, b) if a == b => {}
            (_, ConnectionState::Connected) if !from.is_connected() => {
                info!("MQTT connection established");
            }
            (_, ConnectionState::Subscribed) => {
                info!("MQTT subscription active");
            }
            (_, ConnectionState::Failed(reason)) if from.is_connected() => {
                warn!("MQTT connection lost: {}", reason);
            }
            (_, ConnectionState::Failed(reason)) => {
                error!("MQTT connection failed: {}", reason);
            }
            _ => {
                debug!("MQTT connection state: {:?} -> {:?}", from, to);
            }
        }
    }
}
