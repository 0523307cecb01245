//! Manual brightness stepping for the `step` test command

use super::payload::{CommandPayload, Percent};

/// Direction parsed from one line of manual input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Up,
    Down,
}

impl StepDirection {
    /// `+`/`up` and `-`/`down`, case-insensitive; anything else is ignored
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_lowercase().as_str() {
            "+" | "up" => Some(StepDirection::Up),
            "-" | "down" => Some(StepDirection::Down),
            _ => None,
        }
    }
}

/// Tracks the brightness driven by manual input
#[derive(Debug, Clone)]
pub struct BrightnessStepper {
    current: Percent,
    step: u8,
}

impl BrightnessStepper {
    pub fn new(start: Percent, step: u8) -> Self {
        Self {
            current: start,
            step,
        }
    }

    pub fn current(&self) -> Percent {
        self.current
    }

    /// Move one step; returns the command to send, or `None` when already at the bound
    pub fn step(&mut self, direction: StepDirection) -> Option<CommandPayload> {
        let delta = match direction {
            StepDirection::Up => i64::from(self.step),
            StepDirection::Down => -i64::from(self.step),
        };
        let next = self.current.stepped(delta);
        if next == self.current {
            return None;
        }

        self.current = next;
        Some(CommandPayload::new(i64::from(next.value()), 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_direction() {
        assert_eq!(StepDirection::parse("+"), Some(StepDirection::Up));
        assert_eq!(StepDirection::parse(" UP \n"), Some(StepDirection::Up));
        assert_eq!(StepDirection::parse("-"), Some(StepDirection::Down));
        assert_eq!(StepDirection::parse("down"), Some(StepDirection::Down));
        assert_eq!(StepDirection::parse(""), None);
        assert_eq!(StepDirection::parse("left"), None);
    }

    #[test]
    fn test_steps_saturate_at_bounds() {
        let mut stepper = BrightnessStepper::new(Percent::clamped(25), 10);

        let payload = stepper.step(StepDirection::Up).unwrap();
        assert_eq!(payload.brightness().value(), 35);

        for _ in 0..10 {
            stepper.step(StepDirection::Up);
        }
        assert_eq!(stepper.current(), Percent::MAX);
        assert_eq!(stepper.step(StepDirection::Up), None);

        let payload = stepper.step(StepDirection::Down).unwrap();
        assert_eq!(payload.brightness().value(), 90);
    }

    #[test]
    fn test_step_down_clamps_to_zero() {
        let mut stepper = BrightnessStepper::new(Percent::clamped(5), 10);
        let payload = stepper.step(StepDirection::Down).unwrap();
        assert_eq!(payload.brightness(), Percent::MIN);
        assert_eq!(stepper.step(StepDirection::Down), None);
    }
}
