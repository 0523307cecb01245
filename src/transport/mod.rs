//! Transport layer for the command channel
//!
//! This module provides the broker session abstraction used by the
//! connection supervisor and its MQTT implementation.

use crate::config::BrokerEndpoint;
use crate::shutdown::ShutdownSignal;
use tokio::sync::mpsc;

pub mod mqtt;
pub mod network;

pub use mqtt::{MqttError, RumqttcSession};
pub use network::{any_usable_address, InterfaceNetworkCheck, NetworkCheck};

/// Result of a connect attempt that reached the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// Broker accepted the connection
    Accepted,
    /// Broker answered with a non-success code
    Rejected(String),
}

/// A message delivered on the subscribed topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Broker session trait
///
/// This trait provides an abstraction over the broker connection so the
/// supervisor can be driven by a scripted session in tests. Implementations
/// are only ever called sequentially; the supervisor serializes access.
#[async_trait::async_trait]
pub trait BrokerSession: Send {
    /// Open a fresh connection, replacing any previous one
    ///
    /// Returns [`MqttError::Cancelled`] when `shutdown` fires first.
    async fn connect(
        &mut self,
        endpoint: &BrokerEndpoint,
        shutdown: &ShutdownSignal,
    ) -> Result<ConnectOutcome, MqttError>;

    /// Subscribe to `topic` on the current connection
    async fn subscribe(&mut self, topic: &str, shutdown: &ShutdownSignal) -> Result<(), MqttError>;

    /// Lightweight liveness probe of the current connection
    async fn ping(&mut self) -> Result<bool, MqttError>;

    /// Close the current connection
    async fn disconnect(&mut self) -> Result<(), MqttError>;

    /// Hand over the inbound message stream; yields `Some` exactly once
    fn take_messages(&mut self) -> Option<mpsc::Receiver<InboundMessage>>;
}
