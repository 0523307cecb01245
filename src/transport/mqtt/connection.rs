//! Pure connection state management for MQTT client
//!
//! This module contains pure functions for connection state management,
//! error types and broker option construction.

use crate::config::BrokerEndpoint;
use rumqttc::v5::MqttOptions;
use thiserror::Error;

/// Connection state owned by the connection supervisor
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// No transport connection
    Disconnected,
    /// Connect request in flight
    Connecting,
    /// Broker accepted the connection, not yet subscribed
    Connected,
    /// Subscribe request in flight
    Subscribing,
    /// Subscribed to the command topic, messages are flowing
    Subscribed,
    /// Last connect attempt or liveness probe failed (reason)
    Failed(String),
}

impl ConnectionState {
    /// Whether the broker currently holds an accepted connection
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Subscribing | ConnectionState::Subscribed
        )
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed: {0}")]
    ConnectionFailedStr(String),
    #[error("Subscription failed: {0}")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Subscription refused by broker: {0}")]
    SubscriptionRefused(String),
    #[error("Disconnect failed")]
    DisconnectFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Operation cancelled by shutdown")]
    Cancelled,
}

/// Client id used for a connection attempt
///
/// A configured id is used as-is; otherwise a fresh one is generated for each
/// attempt so a half-open previous session cannot collide with the new one.
pub fn client_id_for(endpoint: &BrokerEndpoint) -> String {
    match &endpoint.client_id {
        Some(id) if !id.trim().is_empty() => id.clone(),
        _ => format!("daylight-sync-{}", uuid::Uuid::new_v4().simple()),
    }
}

/// Pure function to configure MQTT options from the broker endpoint
pub fn configure_mqtt_options(endpoint: &BrokerEndpoint) -> Result<MqttOptions, MqttError> {
    let host = endpoint.address.trim();
    if host.is_empty() {
        return Err(MqttError::InvalidEndpoint(
            "broker address is empty".to_string(),
        ));
    }
    if endpoint.port == 0 {
        return Err(MqttError::InvalidEndpoint(format!(
            "invalid broker port for {host}: 0"
        )));
    }

    let mut mqtt_options = MqttOptions::new(client_id_for(endpoint), host, endpoint.port);

    // Credentials are passed through untouched
    if let Some(username) = &endpoint.username {
        let password = endpoint.password.clone().unwrap_or_default();
        mqtt_options.set_credentials(username, &password);
    }

    mqtt_options.set_keep_alive(endpoint.keep_alive);

    Ok(mqtt_options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // Helper to create broker endpoint
    fn test_endpoint() -> BrokerEndpoint {
        BrokerEndpoint {
            address: "localhost".to_string(),
            port: 1883,
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            topic: "home/daylight".to_string(),
            reconnect_delay: Duration::from_secs(10),
            keep_alive: Duration::from_secs(30),
            client_id: None,
        }
    }

    #[test]
    fn test_configure_mqtt_options() {
        let options = configure_mqtt_options(&test_endpoint()).unwrap();
        assert_eq!(options.broker_address(), ("localhost".to_string(), 1883));
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
    }

    #[test]
    fn test_empty_address_rejected() {
        let mut endpoint = test_endpoint();
        endpoint.address = "  ".to_string();
        let result = configure_mqtt_options(&endpoint);
        assert!(matches!(result, Err(MqttError::InvalidEndpoint(_))));
    }

    #[test]
    fn test_zero_port_rejected() {
        let mut endpoint = test_endpoint();
        endpoint.port = 0;
        assert!(matches!(
            configure_mqtt_options(&endpoint),
            Err(MqttError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_generated_client_ids_are_unique() {
        let endpoint = test_endpoint();
        let first = client_id_for(&endpoint);
        let second = client_id_for(&endpoint);
        assert!(first.starts_with("daylight-sync-"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_configured_client_id_is_kept() {
        let mut endpoint = test_endpoint();
        endpoint.client_id = Some("office-pc".to_string());
        assert_eq!(client_id_for(&endpoint), "office-pc");
        assert_eq!(configure_mqtt_options(&endpoint).unwrap().client_id(), "office-pc");
    }

    #[test]
    fn test_connection_state_is_connected() {
        assert!(ConnectionState::Connected.is_connected());
        assert!(ConnectionState::Subscribing.is_connected());
        assert!(ConnectionState::Subscribed.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(!ConnectionState::Failed("x".to_string()).is_connected());
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::ConnectionFailedStr("test".to_string()),
            MqttError::SubscriptionFailed("test".to_string().into()),
            MqttError::SubscriptionRefused("NotAuthorized".to_string()),
            MqttError::DisconnectFailed("test".to_string().into()),
            MqttError::InvalidEndpoint("test".to_string()),
            MqttError::NotConnected,
            MqttError::Cancelled,
        ];

        for error in errors {
            let error_string = error.to_string();
            assert!(!error_string.is_empty());
        }
    }
}
