//! In-memory GPIO backend.
//!
//! Used when the host has no GPIO access and by the test-suite. Pin writes are
//! logged and recorded so the resulting pin levels and pulse counts can be
//! inspected afterwards. Faults and hung pins can be injected per pin.

use super::{Actuator, HardwareError, Level};
use crate::motor::{Direction, PinAssignment, PinNumber};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct SimState {
    levels: BTreeMap<PinNumber, Level>,
    pulses: BTreeMap<PinNumber, u64>,
    halts: u64,
    faulty: BTreeSet<PinNumber>,
    stalled: BTreeSet<PinNumber>,
    released: Vec<PinAssignment>,
}

#[derive(Debug, Default)]
pub struct SimulatedActuator {
    state: Mutex<SimState>,
    halt_epoch: AtomicU64,
}

impl SimulatedActuator {
    pub fn new() -> Self {
        tracing::info!("Using simulated GPIO; no pins will be driven");
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every pulse touching `pin` fail with [`HardwareError::PinUnavailable`].
    pub fn fail_pin(&self, pin: PinNumber) {
        self.lock().faulty.insert(pin);
    }

    /// Make pulses on step pin `pin` hang forever with the pin held high.
    pub fn stall_pin(&self, pin: PinNumber) {
        self.lock().stalled.insert(pin);
    }

    /// Completed step pulses emitted on `pin`.
    pub fn pulse_count(&self, pin: PinNumber) -> u64 {
        self.lock().pulses.get(&pin).copied().unwrap_or(0)
    }

    pub fn total_pulses(&self) -> u64 {
        self.lock().pulses.values().sum()
    }

    /// Last level written to `pin`, if it was ever driven.
    pub fn level(&self, pin: PinNumber) -> Option<Level> {
        self.lock().levels.get(&pin).copied()
    }

    pub fn halt_count(&self) -> u64 {
        self.lock().halts
    }

    pub fn released(&self) -> Vec<PinAssignment> {
        self.lock().released.clone()
    }

    fn write(&self, epoch: u64, pin: PinNumber, level: Level) -> Result<(), HardwareError> {
        let mut state = self.lock();
        if self.halt_epoch.load(Ordering::SeqCst) != epoch {
            return Err(HardwareError::Halted);
        }
        tracing::trace!("sim: GPIO {} -> {:?}", pin, level);
        state.levels.insert(pin, level);
        Ok(())
    }
}

#[async_trait]
impl Actuator for SimulatedActuator {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn is_simulated(&self) -> bool {
        true
    }

    async fn pulse(
        &self,
        assignment: PinAssignment,
        direction: Direction,
        count: u32,
        half_period: Duration,
    ) -> Result<(), HardwareError> {
        let epoch = self.halt_epoch.load(Ordering::SeqCst);
        let stalled = {
            let state = self.lock();
            if let Some(pin) = assignment.pins().into_iter().find(|p| state.faulty.contains(p)) {
                return Err(HardwareError::PinUnavailable { pin, reason: "injected fault".to_string() });
            }
            state.stalled.contains(&assignment.step_pin)
        };

        let dir_level = match direction {
            Direction::Forward => Level::High,
            Direction::Backward => Level::Low,
        };
        self.write(epoch, assignment.dir_pin, dir_level)?;

        for _ in 0..count {
            self.write(epoch, assignment.step_pin, Level::High)?;
            if stalled {
                std::future::pending::<()>().await;
            }
            tokio::time::sleep(half_period).await;
            self.write(epoch, assignment.step_pin, Level::Low)?;
            *self.lock().pulses.entry(assignment.step_pin).or_insert(0) += 1;
            tokio::time::sleep(half_period).await;
        }
        Ok(())
    }

    async fn halt_all(&self) {
        let mut state = self.lock();
        self.halt_epoch.fetch_add(1, Ordering::SeqCst);
        for level in state.levels.values_mut() {
            *level = Level::Low;
        }
        state.halts += 1;
        tracing::debug!("sim: all outputs driven low");
    }

    async fn idle(&self, assignment: PinAssignment) {
        let mut state = self.lock();
        if let Some(level) = state.levels.get_mut(&assignment.step_pin) {
            *level = Level::Low;
        }
    }

    async fn release(&self, assignment: PinAssignment) {
        let mut state = self.lock();
        for pin in assignment.pins() {
            state.levels.remove(&pin);
        }
        state.released.push(assignment);
    }
}
