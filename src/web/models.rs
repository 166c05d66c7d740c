//! Contains the data models for API requests and responses.

use crate::board::PinUsage;
use crate::motor::{Direction, MotorRuntimeState, PinNumber};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Represents the response for the /api/v1/status endpoint.
#[derive(Serialize, Debug)]
pub struct StatusResponse {
    pub status: &'static str,
    pub emergency_stop: bool,
    pub motors: BTreeMap<String, MotorRuntimeState>,
}

/// Represents a request to move a motor.
///
/// `{"motor": "motor1", "steps": -200}` is accepted as well: without a
/// `direction` the sign of the count picks it.
#[derive(Deserialize, Debug)]
pub struct StepRequest {
    #[serde(alias = "motor")]
    pub name: String,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(alias = "steps")]
    pub count: i64,
    /// Optional override of the pulse half period, in microseconds.
    #[serde(default)]
    pub half_period_us: Option<u64>,
}

impl StepRequest {
    /// Direction and pulse count to issue, or `None` for a negative count
    /// with an explicit direction.
    pub fn motion(&self) -> Option<(Direction, u32)> {
        let direction = match self.direction {
            Some(direction) if self.count >= 0 => direction,
            Some(_) => return None,
            None if self.count < 0 => Direction::Backward,
            None => Direction::Forward,
        };
        // anything past u32 is far beyond max_steps and rejected downstream
        let count = u32::try_from(self.count.unsigned_abs()).unwrap_or(u32::MAX);
        Some((direction, count))
    }
}


/// Represents a request to move a motor onto new pins.
#[derive(Deserialize, Debug)]
pub struct ReassignRequest {
    #[serde(alias = "motor")]
    pub name: String,
    pub step_pin: PinNumber,
    pub dir_pin: PinNumber,
}

/// Generic success response for commands.
#[derive(Serialize, Debug)]
pub struct CommandResponse {
    pub status: &'static str,
    pub message: String,
    pub timestamp: String,
}

/// One motor's wiring with header positions.
#[derive(Serialize, Debug)]
pub struct MotorPins {
    pub step_pin: PinNumber,
    pub dir_pin: PinNumber,
    pub step_pin_physical: Option<u8>,
    pub dir_pin_physical: Option<u8>,
}

/// Represents the response for the /api/v1/config endpoint.
#[derive(Serialize, Debug)]
pub struct ConfigResponse {
    pub status: &'static str,
    pub config: BTreeMap<String, MotorPins>,
}

/// Represents the response for the /api/v1/pins endpoint.
#[derive(Serialize, Debug)]
pub struct PinsResponse {
    pub status: &'static str,
    pub board: String,
    pub available_pins: Vec<PinUsage>,
}

/// Represents the response for the /api/v1/gpio endpoint.
#[derive(Serialize, Debug)]
pub struct GpioInfoResponse {
    pub status: &'static str,
    pub backend: &'static str,
    pub mock_mode: bool,
    pub message: &'static str,
    pub emergency_stop: bool,
    pub active_pins: Vec<PinNumber>,
}
