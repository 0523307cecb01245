//! Command pipeline: payload decoding, value mapping, translation and execution
//!
//! A broker message flows through these modules in order:
//!
//! - [`codec`] - decodes the wire body into a clamped [`CommandPayload`]
//! - [`mapping`] - maps a percent onto a device-specific integer range
//! - [`translator`] - expands a payload into `/SetValueIfNeeded` operations per device
//! - [`executor`] - runs the operations as one external-process invocation
//! - [`latest`] - single-slot buffer that keeps at most one invocation in flight
//!
//! [`stepper`] drives the pipeline from manual input instead of the broker.

pub mod codec;
pub mod executor;
pub mod latest;
pub mod mapping;
pub mod payload;
pub mod stepper;
pub mod translator;

pub use codec::{decode, DecodeError};
pub use executor::{ExecutionError, ExecutionReport, MonitorCommandExecutor};
pub use latest::LatestCommandSlot;
pub use mapping::percent_to_range;
pub use payload::{CommandPayload, Percent};
pub use stepper::{BrightnessStepper, StepDirection};
pub use translator::{build_operations, CommandLine, SetValueOperation};

use async_trait::async_trait;

/// Capability to apply a decoded command to the monitors
///
/// The connection supervisor depends only on this trait, never on how the
/// command reaches the hardware.
#[async_trait]
pub trait ApplyCommand: Send + Sync {
    async fn apply(&self, payload: CommandPayload);
}
