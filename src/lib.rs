//! Daylight Sync
//!
//! Receives brightness commands over MQTT and applies them to monitors through
//! the ControlMyMonitor command-line utility.
//!
//! # Overview
//!
//! - [`supervisor`] owns the broker connection: initial connect, subscription,
//!   periodic liveness probe and reconnect-with-resubscribe.
//! - [`command`] decodes payloads, maps percentages onto device ranges and runs
//!   one `/SetValueIfNeeded` invocation per command, keeping at most one
//!   process in flight.
//! - [`config`], [`observability`] and [`shutdown`] provide configuration,
//!   structured logging and cancellation.
//!
//! # Quick Start
//!
//! ```rust
//! use daylight_sync::command::{build_operations, decode, CommandLine};
//! use daylight_sync::config::{DeviceTarget, ValueRange};
//!
//! let devices = vec![DeviceTarget {
//!     name: "MONITOR1".to_string(),
//!     brightness: ValueRange { code: 10, min: 10, max: 90 },
//!     contrast: ValueRange { code: 12, min: 0, max: 100 },
//! }];
//!
//! let payload = decode(br#"{"brightness":50,"color":40}"#).unwrap();
//! let operations = build_operations(&devices, &payload);
//! let line = CommandLine::from_operations("ControlMyMonitor", &operations);
//!
//! assert_eq!(
//!     line.argument_string(),
//!     "/SetValueIfNeeded MONITOR1 10 50 /SetValueIfNeeded MONITOR1 12 50"
//! );
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod observability;
pub mod shutdown;
pub mod supervisor;
pub mod testing;
pub mod transport;

pub use command::{ApplyCommand, CommandPayload, LatestCommandSlot, MonitorCommandExecutor};
pub use config::{BrokerEndpoint, DaylightConfig, DeviceTarget};
pub use error::{SyncError, SyncResult};
pub use supervisor::ConnectionSupervisor;
pub use transport::RumqttcSession;
