//! Command values received from the broker

use serde::Serialize;
use std::fmt;

/// A percentage guaranteed to lie in `0..=100`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Percent(u8);

impl Percent {
    pub const MIN: Percent = Percent(0);
    pub const MAX: Percent = Percent(100);

    /// Clamp any integer into `0..=100`
    pub fn clamped(value: i64) -> Self {
        Percent(value.clamp(0, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Move by `delta` points, saturating at the bounds
    pub fn stepped(self, delta: i64) -> Self {
        Self::clamped(i64::from(self.0) + delta)
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Brightness/color command; values are clamped on assignment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommandPayload {
    brightness: Percent,
    color: Percent,
}

impl CommandPayload {
    pub fn new(brightness: i64, color: i64) -> Self {
        Self {
            brightness: Percent::clamped(brightness),
            color: Percent::clamped(color),
        }
    }

    pub fn brightness(&self) -> Percent {
        self.brightness
    }

    /// Color temperature percent; carried but not applied to devices yet
    pub fn color(&self) -> Percent {
        self.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_clamping() {
        assert_eq!(Percent::clamped(-5).value(), 0);
        assert_eq!(Percent::clamped(0).value(), 0);
        assert_eq!(Percent::clamped(42).value(), 42);
        assert_eq!(Percent::clamped(100).value(), 100);
        assert_eq!(Percent::clamped(150).value(), 100);
        assert_eq!(Percent::clamped(i64::MIN), Percent::MIN);
        assert_eq!(Percent::clamped(i64::MAX), Percent::MAX);
    }

    #[test]
    fn test_percent_stepping_saturates() {
        let p = Percent::clamped(95);
        assert_eq!(p.stepped(10).value(), 100);
        assert_eq!(Percent::clamped(5).stepped(-10).value(), 0);
        assert_eq!(Percent::clamped(25).stepped(10).value(), 35);
    }

    #[test]
    fn test_constructor_clamps() {
        let payload = CommandPayload::new(250, -1);
        assert_eq!(payload.brightness().value(), 100);
        assert_eq!(payload.color().value(), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(Percent::clamped(60).to_string(), "60%");
    }
}
