//! Translation of a command into control-utility operations (pure functions)

use super::mapping::percent_to_range;
use super::payload::CommandPayload;
use crate::config::DeviceTarget;
use std::fmt;

/// Switch understood by the control utility; skips the write when unchanged
pub const SET_VALUE_SWITCH: &str = "/SetValueIfNeeded";

/// One "set parameter to value" operation on one device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetValueOperation {
    pub device: String,
    pub code: u16,
    pub value: i32,
}

impl SetValueOperation {
    /// Argument tokens for this operation
    pub fn arguments(&self) -> [String; 4] {
        [
            SET_VALUE_SWITCH.to_string(),
            self.device.clone(),
            self.code.to_string(),
            self.value.to_string(),
        ]
    }
}

impl fmt::Display for SetValueOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SET_VALUE_SWITCH} {} {} {}",
            self.device, self.code, self.value
        )
    }
}

/// Expand a payload into two operations per device, in configuration order
///
/// Contrast is derived from the brightness percent; the payload's color value
/// is not applied.
pub fn build_operations(devices: &[DeviceTarget], payload: &CommandPayload) -> Vec<SetValueOperation> {
    let brightness = payload.brightness();

    devices
        .iter()
        .flat_map(|device| {
            [
                SetValueOperation {
                    device: device.name.clone(),
                    code: device.brightness.code,
                    value: percent_to_range(device.brightness.min, device.brightness.max, brightness),
                },
                SetValueOperation {
                    device: device.name.clone(),
                    code: device.contrast.code,
                    value: percent_to_range(device.contrast.min, device.contrast.max, brightness),
                },
            ]
        })
        .collect()
}

/// A single invocation of the control utility
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub arguments: Vec<String>,
}

impl CommandLine {
    /// Join all operations into one invocation
    pub fn from_operations(program: &str, operations: &[SetValueOperation]) -> Self {
        Self {
            program: program.to_string(),
            arguments: operations.iter().flat_map(|op| op.arguments()).collect(),
        }
    }

    /// Space-joined argument string as passed to the utility
    pub fn argument_string(&self) -> String {
        self.arguments.join(" ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.arguments.is_empty() {
            write!(f, "{}", self.program)
        } else {
            write!(f, "{} {}", self.program, self.argument_string())
        }
    }
}
