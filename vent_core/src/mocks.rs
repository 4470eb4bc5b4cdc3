//! Simulation helpers shared by tests and host-side demo runs.
//!
//! [`SimRig`] couples a virtual clock to simple motor/encoder physics: every
//! `sleep` advances the shaft exactly as far as the commanded duty would
//! carry it, with hard stops at both ends of travel. That makes the bounded
//! blocking operations (moves, homing) deterministic and instant to test.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use vent_traits::{Clock, Direction, MotorDriver, SensorFrame, SensorHub};

use crate::encoder::{PulseHandle, TickCounter};

struct RigState {
    offset: Duration,
    duty: u8,
    direction: Direction,
    running: bool,
    /// Actual shaft posture in ticks; the simulation's ground truth.
    shaft: i64,
    min_stop: i64,
    max_stop: i64,
    /// Shaft speed at full duty.
    ticks_per_ms: f32,
    carry: f32,
    dead: bool,
    max_duty_seen: u8,
    handle: PulseHandle,
}

#[derive(Clone)]
pub struct SimRig {
    origin: Instant,
    state: Arc<Mutex<RigState>>,
}

impl SimRig {
    /// Hard stops sit at 0 and `travel_ticks`; the shaft starts at
    /// `start_ticks` (clamped). `ticks_per_ms` is the speed at duty 255.
    pub fn new(counter: &TickCounter, travel_ticks: i64, start_ticks: i64, ticks_per_ms: f32) -> Self {
        let state = RigState {
            offset: Duration::ZERO,
            duty: 0,
            direction: Direction::Forward,
            running: false,
            shaft: start_ticks.clamp(0, travel_ticks),
            min_stop: 0,
            max_stop: travel_ticks,
            ticks_per_ms,
            carry: 0.0,
            dead: false,
            max_duty_seen: 0,
            handle: counter.isr_handle(),
        };
        Self {
            origin: Instant::now(),
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RigState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn motor(&self) -> SimMotor {
        SimMotor { rig: self.clone() }
    }

    pub fn clock(&self) -> SimClock {
        SimClock { rig: self.clone() }
    }

    /// Freeze the shaft: commanded output is recorded but produces no
    /// motion. For stall and timeout scenarios.
    pub fn set_dead(&self, dead: bool) {
        self.lock().dead = dead;
    }

    pub fn shaft_ticks(&self) -> i64 {
        self.lock().shaft
    }

    /// Currently commanded duty.
    pub fn duty(&self) -> u8 {
        self.lock().duty
    }

    /// Highest duty the controller ever commanded.
    pub fn max_duty_seen(&self) -> u8 {
        self.lock().max_duty_seen
    }

    /// Back-drive the shaft from outside (wind, a person). Emits encoder
    /// pulses without any commanded output.
    pub fn nudge(&self, delta: i64) {
        let mut s = self.lock();
        let target = (s.shaft + delta).clamp(s.min_stop, s.max_stop);
        let pulses = (target - s.shaft).abs();
        s.shaft = target;
        for _ in 0..pulses {
            s.handle.pulse();
        }
    }

    /// Advance virtual time, moving the shaft if the motor is running.
    pub fn advance(&self, d: Duration) {
        let mut s = self.lock();
        s.offset += d;
        if !s.running || s.duty == 0 || s.dead {
            return;
        }
        let ms = d.as_secs_f32() * 1000.0;
        let distance = (f32::from(s.duty) / 255.0) * s.ticks_per_ms * ms + s.carry;
        let steps = distance.floor();
        s.carry = distance - steps;
        let delta = steps as i64 * i64::from(s.direction.sign());
        let target = (s.shaft + delta).clamp(s.min_stop, s.max_stop);
        let pulses = (target - s.shaft).abs();
        s.shaft = target;
        for _ in 0..pulses {
            s.handle.pulse();
        }
    }
}

pub struct SimMotor {
    rig: SimRig,
}

impl MotorDriver for SimMotor {
    fn set_output(
        &mut self,
        duty: u8,
        direction: Direction,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut s = self.rig.lock();
        s.duty = duty;
        s.direction = direction;
        s.running = duty > 0;
        s.max_duty_seen = s.max_duty_seen.max(duty);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut s = self.rig.lock();
        s.duty = 0;
        s.running = false;
        Ok(())
    }
}

/// Clock of the rig's virtual timeline; `sleep` advances the simulation
/// instead of the wall clock.
pub struct SimClock {
    rig: SimRig,
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        self.rig.origin + self.rig.lock().offset
    }

    fn sleep(&self, d: Duration) {
        self.rig.advance(d);
    }
}

/// Sensor hub returning the same frame forever.
pub struct StaticSensors(pub SensorFrame);

impl SensorHub for StaticSensors {
    fn sample(&mut self) -> SensorFrame {
        self.0
    }
}

/// Externally mutable sensor frame for tests that change conditions mid-run.
#[derive(Clone, Default)]
pub struct SharedSensors(Arc<Mutex<SensorFrame>>);

impl SharedSensors {
    pub fn new(frame: SensorFrame) -> Self {
        Self(Arc::new(Mutex::new(frame)))
    }

    pub fn set(&self, frame: SensorFrame) {
        match self.0.lock() {
            Ok(mut guard) => *guard = frame,
            Err(poisoned) => *poisoned.into_inner() = frame,
        }
    }
}

impl SensorHub for SharedSensors {
    fn sample(&mut self) -> SensorFrame {
        match self.0.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
