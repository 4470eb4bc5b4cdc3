#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! GPIO drivers for the window rig, plus host-side sensor simulation.
//!
//! Real hardware (Raspberry Pi, software PWM via rppal) sits behind the
//! `hardware` feature; the default build only carries what a simulated run
//! needs.

pub mod error;

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;

use std::sync::{Arc, Mutex};

use vent_traits::{SensorFrame, SensorHub};

struct DriftState {
    co2: f32,
    room: f32,
    outside: f32,
    aperture: f32,
    step: u64,
}

/// Deterministic indoor-climate simulation for host runs.
///
/// CO2 climbs toward a ceiling while the window is effectively closed and
/// the room temperature wanders around a baseline, so an unattended
/// simulated session exercises the decision modes. Clones share state: the
/// host keeps one handle to feed the current aperture fraction back via
/// [`DriftingSensors::set_aperture`] while the controller samples another.
#[derive(Clone)]
pub struct DriftingSensors {
    state: Arc<Mutex<DriftState>>,
}

impl DriftingSensors {
    pub fn new(room_c: f32, outside_c: f32, co2_ppm: f32) -> Self {
        Self {
            state: Arc::new(Mutex::new(DriftState {
                co2: co2_ppm,
                room: room_c,
                outside: outside_c,
                aperture: 0.0,
                step: 0,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DriftState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current window opening in [0, 1]; drives the exchange rates below.
    pub fn set_aperture(&self, fraction: f32) {
        self.lock().aperture = fraction.clamp(0.0, 1.0);
    }
}

impl Default for DriftingSensors {
    fn default() -> Self {
        Self::new(24.0, 14.0, 800.0)
    }
}

impl SensorHub for DriftingSensors {
    fn sample(&mut self) -> SensorFrame {
        let mut s = self.lock();
        s.step += 1;
        // Occupancy raises CO2; ventilation flushes it toward outdoor air.
        let generation = 6.0 * (1.0 - s.aperture);
        let flush = (s.co2 - 420.0) * 0.02 * s.aperture;
        s.co2 = (s.co2 + generation - flush).clamp(420.0, 5000.0);

        // The room drifts toward outside air in proportion to the aperture,
        // with a slow interior heat load underneath.
        let exchange = (s.outside - s.room) * 0.01 * s.aperture;
        let load = 0.002 * (s.step as f32 * 0.05).sin().mul_add(0.5, 1.0);
        s.room += exchange + load;

        SensorFrame {
            room_temp_c: Some(s.room),
            outside_temp_c: Some(s.outside),
            co2_ppm: Some(s.co2 as u16),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn co2_climbs_while_closed_and_falls_when_open() {
        let mut hub = DriftingSensors::default();
        let start = hub.sample().co2_ppm.unwrap();
        for _ in 0..50 {
            hub.sample();
        }
        let closed = hub.sample().co2_ppm.unwrap();
        assert!(closed > start, "closed room must accumulate CO2");

        hub.set_aperture(1.0);
        for _ in 0..200 {
            hub.sample();
        }
        let open = hub.sample().co2_ppm.unwrap();
        assert!(open < closed, "open window must flush CO2");
    }

    #[test]
    fn frames_always_carry_all_channels() {
        let mut hub = DriftingSensors::default();
        let frame = hub.sample();
        assert!(frame.room_temp_c.is_some());
        assert!(frame.outside_temp_c.is_some());
        assert!(frame.co2_ppm.is_some());
    }
}
