//! Error taxonomy for motor commands.

use crate::hardware::HardwareError;
use crate::motor::{PinNumber, PinRole};
use crate::store::StoreError;
use thiserror::Error;

/// An invalid or conflicting pin assignment. Always user-correctable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("step and direction pins cannot be the same (pin {pin})")]
    SamePin { pin: PinNumber },
    #[error("pin {pin} is not a valid GPIO on {board}")]
    InvalidPin { pin: PinNumber, board: String },
    #[error("pin {pin} conflicts with {motor} {role} pin")]
    Conflict {
        pin: PinNumber,
        motor: String,
        role: PinRole,
    },
}

/// Failure of a registry command.
#[derive(Debug, Error)]
pub enum MotorError {
    #[error("invalid pin configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("unknown motor: {0}")]
    UnknownMotor(String),
    #[error("motor {0} is busy")]
    MotorBusy(String),
    #[error("emergency stop is active; clear it before moving motors")]
    EmergencyStopActive,
    #[error("step count must be between 1 and {max}, got {count}")]
    InvalidCount { count: u32, max: u32 },
    #[error("motor {name} interrupted by emergency stop after {completed} of {requested} steps")]
    Interrupted {
        name: String,
        completed: u32,
        requested: u32,
    },
    #[error("hardware error: {0}")]
    Hardware(#[from] HardwareError),
    #[error("failed to persist pin configuration: {0}")]
    Io(#[source] StoreError),
}

impl From<StoreError> for MotorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Config(e) => MotorError::Config(e),
            other => MotorError::Io(other),
        }
    }
}

impl MotorError {
    /// Stable machine-readable tag used in API responses.
    pub fn kind(&self) -> &'static str {
        match self {
            MotorError::Config(_) => "config_error",
            MotorError::UnknownMotor(_) => "unknown_motor",
            MotorError::MotorBusy(_) => "motor_busy",
            MotorError::EmergencyStopActive => "emergency_stop_active",
            MotorError::InvalidCount { .. } => "invalid_count",
            MotorError::Interrupted { .. } => "interrupted",
            MotorError::Hardware(_) => "hardware_error",
            MotorError::Io(_) => "io_error",
        }
    }
}
