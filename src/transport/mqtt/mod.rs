//! MQTT v5 session implementation
//!
//! This module separates pure functions from I/O operations:
//!
//! - [`connection`] - Connection state, errors and option construction
//! - [`message_handler`] - Pure event routing
//! - [`health_monitor`] - Pure state transitions driven by connection events
//! - [`client`] - rumqttc-backed [`BrokerSession`](crate::transport::BrokerSession)
//!
//! # Usage
//!
//! ```rust,no_run
//! use daylight_sync::config::BrokerEndpoint;
//! use daylight_sync::shutdown::ShutdownSignal;
//! use daylight_sync::transport::{BrokerSession, ConnectOutcome, RumqttcSession};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let endpoint = BrokerEndpoint {
//!     address: "localhost".to_string(),
//!     port: 1883,
//!     username: None,
//!     password: None,
//!     topic: "home/daylight".to_string(),
//!     reconnect_delay: Duration::from_secs(30),
//!     keep_alive: Duration::from_secs(30),
//!     client_id: None,
//! };
//!
//! let mut session = RumqttcSession::new();
//! let mut messages = session.take_messages().expect("fresh session");
//! let shutdown = ShutdownSignal::never();
//!
//! if session.connect(&endpoint, &shutdown).await? == ConnectOutcome::Accepted {
//!     session.subscribe(&endpoint.topic, &shutdown).await?;
//!     if let Some(message) = messages.recv().await {
//!         println!("{}: {} bytes", message.topic, message.payload.len());
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod health_monitor;
pub mod message_handler;

// Re-export public types for convenience
pub use client::RumqttcSession;
pub use connection::{client_id_for, configure_mqtt_options, ConnectionState, MqttError};
pub use health_monitor::{ConnectionEvent, HealthMonitor};
pub use message_handler::{EventRoute, LoopFailure, MessageHandler};
