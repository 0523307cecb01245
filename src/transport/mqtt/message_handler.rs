//! Pure message routing logic for MQTT events
//!
//! The event-loop task in [`super::client`] turns every polled event into an
//! [`EventRoute`] and acts on that, keeping the packet inspection testable.

use rumqttc::v5::mqttbytes::v5::{ConnectReturnCode, Packet, SubscribeReasonCode};
use rumqttc::v5::{ConnectionError, Event, StateError};

/// Pure message routing decisions based on MQTT events
pub struct MessageHandler;

impl MessageHandler {
    /// Route MQTT event to appropriate handler (pure routing decision)
    pub fn route_event(event: &Event) -> EventRoute {
        match event {
            Event::Incoming(incoming) => match incoming {
                Packet::ConnAck(connack) => EventRoute::ConnectionAcknowledged {
                    accepted: matches!(connack.code, ConnectReturnCode::Success),
                    code: format!("{:?}", connack.code),
                },
                Packet::Publish(publish) => EventRoute::MessageReceived {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.to_vec(),
                },
                Packet::SubAck(suback) => EventRoute::SubscriptionConfirmed {
                    packet_id: suback.pkid,
                    granted: Self::subscription_granted(&suback.return_codes),
                    reason_codes: format!("{:?}", suback.return_codes),
                },
                Packet::Disconnect(disconnect) => {
                    EventRoute::Disconnected(format!("{:?}", disconnect.reason_code))
                }
                other => EventRoute::InfrastructureEvent(format!("{other:?}")),
            },
            Event::Outgoing(_) => EventRoute::OutgoingEvent,
        }
    }

    /// Whether every topic in a SubAck was granted (pure function)
    pub fn subscription_granted(return_codes: &[SubscribeReasonCode]) -> bool {
        !return_codes.is_empty()
            && return_codes
                .iter()
                .all(|code| matches!(code, SubscribeReasonCode::Success(_)))
    }

    /// Classify the error that ended the event loop (pure function)
    ///
    /// rumqttc reports a refused ConnAck or SubAck as a polling error rather
    /// than as an incoming packet.
    pub fn route_error(error: &ConnectionError) -> LoopFailure {
        match error {
            ConnectionError::ConnectionRefused(code) => {
                LoopFailure::ConnectRefused(format!("{code:?}"))
            }
            ConnectionError::MqttState(StateError::SubFail { reason }) => {
                LoopFailure::SubscribeRefused(format!("{reason:?}"))
            }
            other => LoopFailure::Link(other.to_string()),
        }
    }
}

/// Why the event loop stopped polling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopFailure {
    /// Broker answered CONNECT with a failure code
    ConnectRefused(String),
    /// Broker answered SUBSCRIBE with a failure code and the link was closed
    SubscribeRefused(String),
    /// Network or protocol failure
    Link(String),
}

/// Routing decisions for MQTT events
#[derive(Debug, Clone, PartialEq)]
pub enum EventRoute {
    /// ConnAck received; `accepted` is false for any non-success code
    ConnectionAcknowledged { accepted: bool, code: String },
    /// Message received on the subscribed topic
    MessageReceived { topic: String, payload: Vec<u8> },
    /// SubAck received; `granted` is false if any topic was refused
    SubscriptionConfirmed {
        packet_id: u16,
        granted: bool,
        reason_codes: String,
    },
    /// Broker sent a Disconnect (reason code)
    Disconnected(String),
    /// PingResp and other packets with no action attached
    InfrastructureEvent(String),
    /// Outgoing event (handled by rumqttc)
    OutgoingEvent,
}
