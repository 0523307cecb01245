//! Testing utilities and mock implementations
//!
//! This module provides mock implementations for testing the supervisor and
//! command pipeline without an MQTT broker or the monitor control utility.

pub mod mocks;

pub use mocks::*;
