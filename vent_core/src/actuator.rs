//! Closed-loop position actuator.
//!
//! Owns the consumer side of the encoder counter and the PWM/direction
//! outputs. Motion is expressed as bounded move tasks executed one
//! non-blocking step at a time; `blocking_move` and `home` are the only two
//! operations allowed to block the caller, each bounded by its own timeout.
//!
//! The discrete `position` index is truth-from-encoder: it is committed only
//! after a commanded move completes, and it means nothing until `home` has
//! established the datum against the mechanical stop at least once.

use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;
use vent_traits::{Clock, Direction, MotorDriver};

use crate::encoder::TickCounter;
use crate::error::{ActuatorError, Result};
use crate::{ActuatorCfg, HomingCfg};

#[cfg(feature = "hardware-errors")]
fn map_driver_error(e: &(dyn std::error::Error + 'static)) -> ActuatorError {
    if let Some(hw) = e.downcast_ref::<vent_hardware::error::HwError>() {
        ActuatorError::Driver(hw.to_string())
    } else {
        ActuatorError::Driver(e.to_string())
    }
}

#[cfg(not(feature = "hardware-errors"))]
fn map_driver_error(e: &(dyn std::error::Error + 'static)) -> ActuatorError {
    ActuatorError::Driver(e.to_string())
}

/// One bounded displacement request. At most one is active at a time;
/// arming a new task implicitly cancels any prior one.
#[derive(Debug, Clone, Copy)]
struct MoveTask {
    target_ticks: u64,
    direction: Direction,
    duty: u8,
    origin_ticks: i64,
}

pub struct Actuator<M: MotorDriver> {
    motor: M,
    counter: TickCounter,
    cfg: ActuatorCfg,
    clock: Arc<dyn Clock + Send + Sync>,
    task: Option<MoveTask>,
    /// Committed discrete position; `None` until homing establishes the datum.
    position: Option<u8>,
    /// Encoder count recorded at the last stop, for external-movement checks.
    stop_ticks: i64,
}

impl<M: MotorDriver> core::fmt::Debug for Actuator<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Actuator")
            .field("position", &self.position)
            .field("ticks", &self.counter.ticks())
            .field("moving", &self.task.is_some())
            .finish()
    }
}

impl<M: MotorDriver> Actuator<M> {
    pub fn new(
        motor: M,
        counter: TickCounter,
        cfg: ActuatorCfg,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Self {
        Self {
            motor,
            counter,
            cfg,
            clock,
            task: None,
            position: None,
            stop_ticks: 0,
        }
    }

    pub fn cfg(&self) -> &ActuatorCfg {
        &self.cfg
    }

    /// Committed discrete position; `None` until the axis has been homed.
    pub fn position(&self) -> Option<u8> {
        self.position
    }

    /// Highest valid position index (fully open).
    pub fn max_position(&self) -> u8 {
        self.cfg.positions - 1
    }

    pub fn is_moving(&self) -> bool {
        self.task.is_some()
    }

    pub fn ticks(&self) -> i64 {
        self.counter.ticks()
    }

    /// Cut PWM to zero and retire any active task. Idempotent; the direction
    /// pin is left as-is.
    pub fn stop(&mut self) -> Result<()> {
        self.task = None;
        self.motor
            .stop()
            .map_err(|e| eyre::Report::new(map_driver_error(&*e)))
            .wrap_err("motor stop")?;
        self.stop_ticks = self.counter.ticks();
        Ok(())
    }

    /// Drive the outputs and record the sign subsequent encoder pulses count
    /// with.
    pub fn set_speed(&mut self, duty: u8, direction: Direction) -> Result<()> {
        if duty > 0 {
            self.counter.set_commanded(direction);
        }
        self.motor
            .set_output(duty, direction)
            .map_err(|e| eyre::Report::new(map_driver_error(&*e)))
            .wrap_err("motor output")
    }

    /// Arm a bounded move. Zero ticks is equivalent to `stop()`.
    pub fn set_move_task(&mut self, ticks: u64, direction: Direction, duty: u8) -> Result<()> {
        if ticks == 0 {
            return self.stop();
        }
        self.task = Some(MoveTask {
            target_ticks: ticks,
            direction,
            duty,
            origin_ticks: self.counter.ticks(),
        });
        tracing::debug!(ticks, ?direction, duty, "move task armed");
        Ok(())
    }

    /// One non-blocking step of the active task. Returns `true` while the
    /// task still runs, `false` once there is nothing (left) to do.
    pub fn exec_move_task(&mut self) -> Result<bool> {
        let Some(task) = self.task else {
            return Ok(false);
        };
        let travelled = self.counter.ticks().abs_diff(task.origin_ticks);
        if travelled >= task.target_ticks {
            self.stop()?;
            tracing::debug!(travelled, target = task.target_ticks, "move task complete");
            return Ok(false);
        }
        // Re-assert the outputs every step; something external may have
        // overwritten them since the last one.
        self.set_speed(task.duty, task.direction)?;
        Ok(true)
    }

    /// Run a move to completion, bounded by `timeout_ms`. On timeout the
    /// motor is forced to a stop and the move reports failure.
    pub fn blocking_move(
        &mut self,
        ticks: u64,
        direction: Direction,
        duty: u8,
        timeout_ms: u64,
    ) -> Result<()> {
        self.set_move_task(ticks, direction, duty)?;
        let start = self.clock.now();
        while self.exec_move_task()? {
            if self.clock.ms_since(start) >= timeout_ms {
                self.stop()?;
                tracing::warn!(ticks, timeout_ms, "move timed out");
                return Err(eyre::Report::new(ActuatorError::MoveTimeout(timeout_ms)));
            }
            self.clock.sleep(Duration::from_millis(self.cfg.poll_ms));
        }
        Ok(())
    }

    /// Move to a discrete aperture stop. A no-op when already there; the new
    /// index is committed only after the move completes, so any failure
    /// leaves the committed position untouched.
    pub fn change_position(&mut self, target: u8) -> Result<()> {
        let current = self
            .position
            .ok_or_else(|| eyre::Report::new(ActuatorError::NotHomed))?;
        let max = self.max_position();
        if target > max {
            return Err(eyre::Report::new(ActuatorError::PositionOutOfRange {
                index: target,
                max,
            }));
        }
        if target == current {
            return Ok(());
        }
        let ticks = u64::from(current.abs_diff(target)) * u64::from(self.cfg.step_ticks());
        let direction = if target > current {
            self.cfg.open_direction
        } else {
            self.cfg.open_direction.flip()
        };
        tracing::info!(from = current, to = target, ticks, "position change");
        self.blocking_move(ticks, direction, self.cfg.move_duty, self.cfg.move_timeout_ms)?;
        self.position = Some(target);
        Ok(())
    }

    /// Establish the absolute datum by driving into the mechanical stop in
    /// `direction` and watching for the encoder velocity to collapse.
    ///
    /// The first samples are skipped so spin-up does not read as a stall;
    /// two consecutive below-threshold samples after real motion confirm the
    /// stop. The mechanism then backs off the stop and the backed-off
    /// posture becomes tick zero, position 0. A shaft that never turns gets
    /// one retry at escalated duty before the attempt fails.
    pub fn home(&mut self, direction: Direction) -> Result<()> {
        self.task = None;
        let homing: HomingCfg = self.cfg.homing;
        let start = self.clock.now();
        let mut duty = homing.duty;
        let mut escalated = false;
        tracing::info!(?direction, duty, "homing started");

        'attempt: loop {
            self.set_speed(duty, direction)?;
            let mut last_ticks = self.counter.ticks();
            let mut sample = 0u32;
            let mut below = 0u32;
            let mut seen_motion = false;

            loop {
                if self.clock.ms_since(start) >= homing.timeout_ms {
                    self.stop()?;
                    return Err(eyre::Report::new(ActuatorError::HomingTimeout(
                        homing.timeout_ms,
                    )));
                }
                self.clock.sleep(Duration::from_millis(homing.sample_ms));
                sample += 1;

                let now_ticks = self.counter.ticks();
                let moved = now_ticks.abs_diff(last_ticks);
                last_ticks = now_ticks;
                if sample <= homing.warmup_samples {
                    continue;
                }

                if moved >= u64::from(homing.min_ticks_per_sample) {
                    seen_motion = true;
                    below = 0;
                    continue;
                }
                below += 1;
                if below < homing.confirm_samples {
                    continue;
                }

                if !seen_motion {
                    if escalated {
                        self.stop()?;
                        tracing::error!("homing stall: shaft never moved");
                        return Err(eyre::Report::new(ActuatorError::HomingStall));
                    }
                    escalated = true;
                    duty = homing.escalated_duty;
                    tracing::warn!(duty, "no movement during homing; escalating duty");
                    continue 'attempt;
                }

                // Velocity collapsed after real motion: hard stop reached.
                self.stop()?;
                self.blocking_move(
                    u64::from(homing.unjam_ticks),
                    direction.flip(),
                    homing.duty,
                    homing.timeout_ms,
                )
                .wrap_err("homing back-off")?;
                self.counter.zero();
                self.position = Some(0);
                self.stop_ticks = 0;
                tracing::info!("homing complete; datum established");
                return Ok(());
            }
        }
    }

    /// While idle, report whether the shaft drifted more than `threshold`
    /// ticks since the last stop. Updates the stop reference on detection so
    /// each disturbance is flagged once. Informational: no recovery is
    /// attempted here.
    pub fn detect_external_movement(&mut self, threshold: u64) -> bool {
        if self.task.is_some() {
            return false;
        }
        let now_ticks = self.counter.ticks();
        let drift = now_ticks.abs_diff(self.stop_ticks);
        if drift > threshold {
            tracing::warn!(drift, "external shaft movement detected");
            self.stop_ticks = now_ticks;
            return true;
        }
        false
    }
}
