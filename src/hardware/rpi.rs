// Raspberry Pi GPIO backend (feature `rpi`)
use super::{Actuator, HardwareError, Level};
use crate::motor::{Direction, PinAssignment, PinNumber};
use async_trait::async_trait;
use rppal::gpio::{Gpio, OutputPin};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Drives step/direction pins through `/dev/gpiomem`.
///
/// Pins are claimed lazily on first use and kept as outputs until released.
pub struct RpiActuator {
    gpio: Gpio,
    pins: Mutex<HashMap<PinNumber, OutputPin>>,
    halt_epoch: AtomicU64,
}

impl RpiActuator {
    pub fn new() -> Result<Self, HardwareError> {
        let gpio = Gpio::new().map_err(|e| HardwareError::Gpio(e.to_string()))?;
        tracing::info!("GPIO access confirmed; driving real pins");
        Ok(Self {
            gpio,
            pins: Mutex::new(HashMap::new()),
            halt_epoch: AtomicU64::new(0),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PinNumber, OutputPin>> {
        self.pins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, epoch: u64, pin: PinNumber, level: Level) -> Result<(), HardwareError> {
        let mut pins = self.lock();
        if self.halt_epoch.load(Ordering::SeqCst) != epoch {
            return Err(HardwareError::Halted);
        }
        let output = match pins.entry(pin) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let claimed = self
                    .gpio
                    .get(pin)
                    .map_err(|e| HardwareError::PinUnavailable { pin, reason: e.to_string() })?;
                tracing::debug!("Claimed GPIO {} as output", pin);
                entry.insert(claimed.into_output_low())
            }
        };
        match level {
            Level::High => output.set_high(),
            Level::Low => output.set_low(),
        }
        Ok(())
    }
}

#[async_trait]
impl Actuator for RpiActuator {
    fn name(&self) -> &'static str {
        "rpi"
    }

    fn is_simulated(&self) -> bool {
        false
    }

    async fn pulse(
        &self,
        assignment: PinAssignment,
        direction: Direction,
        count: u32,
        half_period: Duration,
    ) -> Result<(), HardwareError> {
        let epoch = self.halt_epoch.load(Ordering::SeqCst);
        let dir_level = match direction {
            Direction::Forward => Level::High,
            Direction::Backward => Level::Low,
        };
        self.write(epoch, assignment.dir_pin, dir_level)?;
        for _ in 0..count {
            self.write(epoch, assignment.step_pin, Level::High)?;
            tokio::time::sleep(half_period).await;
            self.write(epoch, assignment.step_pin, Level::Low)?;
            tokio::time::sleep(half_period).await;
        }
        Ok(())
    }

    async fn halt_all(&self) {
        let mut pins = self.lock();
        self.halt_epoch.fetch_add(1, Ordering::SeqCst);
        for output in pins.values_mut() {
            output.set_low();
        }
        tracing::warn!("All {} claimed GPIO outputs driven low", pins.len());
    }

    async fn idle(&self, assignment: PinAssignment) {
        if let Some(output) = self.lock().get_mut(&assignment.step_pin) {
            output.set_low();
        }
    }

    async fn release(&self, assignment: PinAssignment) {
        let mut pins = self.lock();
        for pin in assignment.pins() {
            // dropping the OutputPin restores the pin's previous mode
            if pins.remove(&pin).is_some() {
                tracing::debug!("Released GPIO {}", pin);
            }
        }
    }
}
