//! Motor data model shared by the store, the registry and the web layer.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Board-specific GPIO identifier (BCM numbering on the Raspberry Pi).
pub type PinNumber = u8;

/// Rotation direction of a step command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
        }
    }
}

/// Which half of an assignment a pin plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PinRole {
    Step,
    Direction,
}

impl fmt::Display for PinRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinRole::Step => write!(f, "step"),
            PinRole::Direction => write!(f, "direction"),
        }
    }
}

/// Step/direction wiring of one motor driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PinAssignment {
    pub step_pin: PinNumber,
    pub dir_pin: PinNumber,
}

impl PinAssignment {
    pub const fn new(step_pin: PinNumber, dir_pin: PinNumber) -> Self {
        Self { step_pin, dir_pin }
    }

    pub fn pins(&self) -> [PinNumber; 2] {
        [self.step_pin, self.dir_pin]
    }

    /// Role `pin` plays in this assignment, if any.
    pub fn role_of(&self, pin: PinNumber) -> Option<PinRole> {
        if pin == self.step_pin {
            Some(PinRole::Step)
        } else if pin == self.dir_pin {
            Some(PinRole::Direction)
        } else {
            None
        }
    }

    /// First pin of `self` that `other` also uses, with its role in `other`.
    pub fn shared_pin(&self, other: &PinAssignment) -> Option<(PinNumber, PinRole)> {
        self.pins()
            .into_iter()
            .find_map(|pin| other.role_of(pin).map(|role| (pin, role)))
    }
}

impl fmt::Display for PinAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step={} dir={}", self.step_pin, self.dir_pin)
    }
}

/// A named motor and its current wiring.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MotorConfig {
    pub name: String,
    pub assignment: PinAssignment,
}

/// Live view of one motor for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MotorRuntimeState {
    pub config: MotorConfig,
    pub active: bool,
}
