// src/hardware/mod.rs - GPIO actuator contract and backend selection
pub mod simulated;
#[cfg(feature = "rpi")]
pub mod rpi;

use crate::config::{BackendKind, GpioConfig};
use crate::motor::{Direction, PinAssignment, PinNumber};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use simulated::SimulatedActuator;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HardwareError {
    #[error("GPIO pin {pin} unavailable: {reason}")]
    PinUnavailable { pin: PinNumber, reason: String },
    #[error("GPIO access failed: {0}")]
    Gpio(String),
    #[error("pulse on pin {pin} timed out after {timeout_ms} ms")]
    Timeout { pin: PinNumber, timeout_ms: u64 },
    #[error("output halted by emergency stop")]
    Halted,
}

/// Logic level of an output pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

/// Drives the step/direction pins of motor drivers.
///
/// The registry owns all sequencing; an actuator only has to emit pulses and
/// stop doing so as soon as [`Actuator::halt_all`] is called. Any pulse that
/// was in progress when the halt arrived must return [`HardwareError::Halted`]
/// instead of touching a pin again.
#[async_trait]
pub trait Actuator: Send + Sync {
    /// Short backend name for diagnostics ("simulated", "rpi").
    fn name(&self) -> &'static str;

    /// Whether this backend toggles real pins.
    fn is_simulated(&self) -> bool;

    /// Set the direction pin and emit `count` step pulses, each high for
    /// `half_period` and low for `half_period`.
    async fn pulse(
        &self,
        assignment: PinAssignment,
        direction: Direction,
        count: u32,
        half_period: Duration,
    ) -> Result<(), HardwareError>;

    /// Drive every output low and abort in-flight pulses.
    async fn halt_all(&self);

    /// Drive the step pin of `assignment` low after an abandoned pulse.
    /// Must not fail after a halt.
    async fn idle(&self, assignment: PinAssignment);

    /// Give up pins that are no longer assigned to a motor.
    async fn release(&self, _assignment: PinAssignment) {}
}

/// Open the GPIO backend selected by `config`.
///
/// `auto` prefers real pins and falls back to simulation when GPIO access is
/// unavailable, mirroring how the controller is usually first run on a
/// development machine.
pub fn open_backend(config: &GpioConfig) -> Result<Arc<dyn Actuator>, HardwareError> {
    match config.backend {
        BackendKind::Simulated => Ok(Arc::new(SimulatedActuator::new())),
        BackendKind::Rpi => open_rpi(),
        BackendKind::Auto => match open_rpi() {
            Ok(actuator) => Ok(actuator),
            Err(e) => {
                tracing::warn!("GPIO access unavailable ({}); falling back to simulated GPIO", e);
                Ok(Arc::new(SimulatedActuator::new()))
            }
        },
    }
}

#[cfg(feature = "rpi")]
fn open_rpi() -> Result<Arc<dyn Actuator>, HardwareError> {
    Ok(Arc::new(rpi::RpiActuator::new()?))
}

#[cfg(not(feature = "rpi"))]
fn open_rpi() -> Result<Arc<dyn Actuator>, HardwareError> {
    Err(HardwareError::Gpio("built without the `rpi` feature".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_backend() {
        let config = GpioConfig { backend: BackendKind::Simulated };
        let actuator = open_backend(&config).unwrap();
        assert_eq!(actuator.name(), "simulated");
        assert!(actuator.is_simulated());
    }

    #[cfg(not(feature = "rpi"))]
    #[test]
    fn test_auto_falls_back_without_gpio() {
        let config = GpioConfig { backend: BackendKind::Auto };
        let actuator = open_backend(&config).unwrap();
        assert!(actuator.is_simulated());

        let config = GpioConfig { backend: BackendKind::Rpi };
        assert!(matches!(open_backend(&config), Err(HardwareError::Gpio(_))));
    }
}
