//! The motor registry: the authoritative in-memory view of every motor.
//!
//! All state-changing commands pass through here. The registry keeps three
//! things consistent:
//!
//! * the in-memory assignments and the persisted pin document (a reassignment
//!   is only committed to memory once the document has been saved);
//! * the per-motor `active` flag, which is cleared after every step attempt,
//!   including cancelled ones;
//! * the emergency-stop flag, which every step checks on entry and at each
//!   pulse boundary, and which preempts an in-flight pulse immediately.
//!
//! Motor state sits behind a short-held lock that is never held across an
//! await or a file write, so `status()` never waits for a running step or a
//! pin change being saved.

use crate::board::Board;
use crate::config::PulseSettings;
use crate::error::MotorError;
use crate::hardware::{Actuator, HardwareError};
use crate::motor::{Direction, MotorConfig, MotorRuntimeState, PinAssignment};
use crate::store::{ConfigStore, ConfigurationDocument};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::sync::{watch, Mutex};

type MotorTable = BTreeMap<String, MotorSlot>;

#[derive(Debug)]
struct MotorSlot {
    assignment: PinAssignment,
    /// Id of the step currently driving this motor.
    run: Option<u64>,
    /// A pin change for this motor is being saved.
    reassigning: bool,
}

impl MotorSlot {
    fn new(assignment: PinAssignment) -> Self {
        Self { assignment, run: None, reassigning: false }
    }
}

pub struct MotorRegistry {
    store: ConfigStore,
    actuator: Arc<dyn Actuator>,
    pulse: PulseSettings,
    motors: RwLock<MotorTable>,
    stop: watch::Sender<bool>,
    next_run: AtomicU64,
    /// Serializes pin changes so they can be saved without the table lock.
    reassign_lock: Mutex<()>,
}

/// Clears a motor's `active` flag when a step ends, however it ends.
struct RunGuard<'a> {
    motors: &'a RwLock<MotorTable>,
    name: &'a str,
    run: u64,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut motors = self.motors.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = motors.get_mut(self.name) {
            // emergency stop may already have released it, and a newer step may own it now
            if slot.run == Some(self.run) {
                slot.run = None;
            }
        }
    }
}

impl MotorRegistry {
    /// Build the registry from the persisted document (or its defaults).
    pub fn new(store: ConfigStore, actuator: Arc<dyn Actuator>, pulse: PulseSettings) -> Self {
        let doc = store.load();
        let motors = doc
            .iter()
            .map(|(name, assignment)| (name.to_string(), MotorSlot::new(assignment)))
            .collect();
        let (stop, _) = watch::channel(false);
        tracing::info!(
            "Motor registry ready: {} motor(s), {} GPIO backend",
            doc.len(),
            actuator.name()
        );
        Self {
            store,
            actuator,
            pulse,
            motors: RwLock::new(motors),
            stop,
            next_run: AtomicU64::new(0),
            reassign_lock: Mutex::new(()),
        }
    }

    fn read_motors(&self) -> RwLockReadGuard<'_, MotorTable> {
        self.motors.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_motors(&self) -> RwLockWriteGuard<'_, MotorTable> {
        self.motors.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(motors: &MotorTable) -> ConfigurationDocument {
        motors
            .iter()
            .fold(ConfigurationDocument::empty(), |doc, (name, slot)| doc.with_motor(name, slot.assignment))
    }

    pub fn board(&self) -> &Board {
        self.store.board()
    }

    pub fn actuator(&self) -> &dyn Actuator {
        self.actuator.as_ref()
    }

    pub fn is_emergency_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Current assignments as a document.
    pub fn document(&self) -> ConfigurationDocument {
        Self::snapshot(&self.read_motors())
    }

    /// Snapshot of every motor's wiring and activity.
    pub fn status(&self) -> BTreeMap<String, MotorRuntimeState> {
        self.read_motors()
            .iter()
            .map(|(name, slot)| {
                let state = MotorRuntimeState {
                    config: MotorConfig { name: name.clone(), assignment: slot.assignment },
                    active: slot.run.is_some(),
                };
                (name.clone(), state)
            })
            .collect()
    }

    /// Step `name` by `count` pulses at the default pulse rate.
    pub async fn step(&self, name: &str, direction: Direction, count: u32) -> Result<(), MotorError> {
        self.step_with_half_period(name, direction, count, None).await
    }

    /// Step `name` by `count` pulses. `half_period_us` overrides the default
    /// pulse rate and is clamped to the configured bounds.
    pub async fn step_with_half_period(
        &self,
        name: &str,
        direction: Direction,
        count: u32,
        half_period_us: Option<u64>,
    ) -> Result<(), MotorError> {
        let half_period = self.pulse.clamp_half_period(half_period_us);
        let mut stop_rx = self.stop.subscribe();

        let (assignment, run) = {
            let mut motors = self.write_motors();
            // checked under the lock so a concurrent emergency stop either
            // rejects us here or finds us active and releases us
            if *stop_rx.borrow_and_update() {
                tracing::warn!("Rejected step on {}: emergency stop active", name);
                return Err(MotorError::EmergencyStopActive);
            }
            if count == 0 || count > self.pulse.max_steps {
                return Err(MotorError::InvalidCount { count, max: self.pulse.max_steps });
            }
            let slot = motors
                .get_mut(name)
                .ok_or_else(|| MotorError::UnknownMotor(name.to_string()))?;
            if slot.run.is_some() || slot.reassigning {
                tracing::warn!("Rejected step on {}: already moving", name);
                return Err(MotorError::MotorBusy(name.to_string()));
            }
            let run = self.next_run.fetch_add(1, Ordering::Relaxed);
            slot.run = Some(run);
            (slot.assignment, run)
        };
        let _guard = RunGuard { motors: &self.motors, name, run };

        tracing::debug!("Stepping {} {} x{} ({}, half period {:?})", name, direction, count, assignment, half_period);
        let result = self
            .drive(name, assignment, direction, count, half_period, &mut stop_rx)
            .await;
        match &result {
            Ok(()) => tracing::info!("Moved {} {} steps {}", name, count, direction),
            Err(MotorError::Interrupted { completed, .. }) => {
                tracing::warn!("Step on {} interrupted after {} of {} pulses", name, completed, count)
            }
            Err(e) => tracing::error!("Step on {} failed: {}", name, e),
        }
        result
    }

    async fn drive(
        &self,
        name: &str,
        assignment: PinAssignment,
        direction: Direction,
        count: u32,
        half_period: Duration,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Result<(), MotorError> {
        let interrupted = |completed: u32| MotorError::Interrupted {
            name: name.to_string(),
            completed,
            requested: count,
        };
        // one pulse is two half periods; the configured timeout is slack on top
        let limit = self.pulse.timeout() + half_period * 2;

        for completed in 0..count {
            if *stop_rx.borrow() {
                return Err(interrupted(completed));
            }
            let pulse = tokio::time::timeout(
                limit,
                self.actuator.pulse(assignment, direction, 1, half_period),
            );
            let outcome = tokio::select! {
                biased;
                _ = async { stop_rx.wait_for(|stopped| *stopped).await.map(|_| ()) } => {
                    return Err(interrupted(completed));
                }
                outcome = pulse => outcome,
            };
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(HardwareError::Halted)) => return Err(interrupted(completed)),
                Ok(Err(e)) => return Err(MotorError::Hardware(e)),
                Err(_) => {
                    // the abandoned pulse may have left the step line high
                    self.actuator.idle(assignment).await;
                    return Err(MotorError::Hardware(HardwareError::Timeout {
                        pin: assignment.step_pin,
                        timeout_ms: limit.as_millis() as u64,
                    }));
                }
            }
        }
        Ok(())
    }

    /// Move `name` onto new pins after checking them against every other
    /// motor. Memory is only updated once the new document is on disk.
    pub async fn reassign_pins(&self, name: &str, assignment: PinAssignment) -> Result<(), MotorError> {
        let _serial = self.reassign_lock.lock().await;

        let (previous, staged) = {
            let mut motors = self.write_motors();
            let previous = match motors.get(name) {
                None => return Err(MotorError::UnknownMotor(name.to_string())),
                Some(slot) if slot.run.is_some() => {
                    tracing::warn!("Rejected pin change on {}: motor is moving", name);
                    return Err(MotorError::MotorBusy(name.to_string()));
                }
                Some(slot) => slot.assignment,
            };

            let current = Self::snapshot(&motors);
            if let Err(e) = current.check_assignment(name, &assignment, self.store.board()) {
                tracing::warn!("Rejected pin change on {}: {}", name, e);
                return Err(e.into());
            }
            // steps on this motor are refused until the change lands
            if let Some(slot) = motors.get_mut(name) {
                slot.reassigning = true;
            }
            (previous, current.with_motor(name, assignment))
        };

        // no await between reserving the slot and committing it
        let saved = self.store.save(&staged);
        {
            let mut motors = self.write_motors();
            if let Some(slot) = motors.get_mut(name) {
                slot.reassigning = false;
                if saved.is_ok() {
                    slot.assignment = assignment;
                }
            }
        }
        if let Err(e) = saved {
            tracing::error!("Failed to persist pin change on {}: {}", name, e);
            return Err(e.into());
        }

        if previous != assignment {
            self.actuator.release(previous).await;
        }
        tracing::info!("Pin configuration for {} updated: {} -> {}", name, previous, assignment);
        Ok(())
    }

    /// Engage the emergency stop: block new steps, interrupt running ones
    /// and drive every output low. Returns how many motors were moving.
    pub async fn emergency_stop(&self) -> usize {
        self.stop.send_replace(true);
        let interrupted = {
            let mut motors = self.write_motors();
            motors.values_mut().filter_map(|slot| slot.run.take()).count()
        };
        self.actuator.halt_all().await;
        tracing::warn!("Emergency stop engaged; {} motor(s) interrupted", interrupted);
        interrupted
    }

    /// Operator action: allow motion again. Interrupted steps are not
    /// resumed. Returns whether the stop was engaged.
    pub fn clear_emergency_stop(&self) -> bool {
        let was_engaged = self.stop.send_if_modified(|stopped| std::mem::replace(stopped, false));
        if was_engaged {
            tracing::info!("Emergency stop cleared by operator");
        }
        was_engaged
    }
}
