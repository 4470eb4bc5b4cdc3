//! Control-loop host.
//!
//! The engine never schedules itself; these helpers invoke `update()` at a
//! fixed cadence through the injected clock. Update errors are logged and do
//! not stop the loop — the window must keep being managed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use vent_traits::{Clock, MotorDriver, SensorHub};

use crate::engine::WindowController;

/// Run until `shutdown` flips true.
pub fn run_until_shutdown<M, S>(
    controller: &mut WindowController<M, S>,
    clock: &dyn Clock,
    period: Duration,
    shutdown: &AtomicBool,
) where
    M: MotorDriver,
    S: SensorHub,
{
    tracing::info!(period_ms = period.as_millis() as u64, "control loop started");
    while !shutdown.load(Ordering::Relaxed) {
        if let Err(e) = controller.update() {
            tracing::error!(error = %e, "update cycle failed");
        }
        clock.sleep(period);
    }
    tracing::info!("control loop stopped");
}

/// Run for a fixed span of (possibly virtual) time.
pub fn run_for<M, S>(
    controller: &mut WindowController<M, S>,
    clock: &dyn Clock,
    period: Duration,
    span: Duration,
) where
    M: MotorDriver,
    S: SensorHub,
{
    let span_ms = span.as_millis() as u64;
    let start = clock.now();
    tracing::info!(span_ms, "bounded control loop started");
    while clock.ms_since(start) < span_ms {
        if let Err(e) = controller.update() {
            tracing::error!(error = %e, "update cycle failed");
        }
        clock.sleep(period);
    }
    tracing::info!("bounded control loop finished");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vent_traits::SensorFrame;

    use super::*;
    use crate::mocks::{SimRig, StaticSensors};
    use crate::{ActuatorCfg, Mode, TickCounter, WindowConfig, build_controller};

    #[test]
    fn run_for_terminates_on_the_virtual_clock() {
        let counter = TickCounter::new();
        let rig = SimRig::new(&counter, 2000, 300, 2.0);
        let clock = Arc::new(rig.clock());
        let sensors = StaticSensors(SensorFrame {
            room_temp_c: Some(22.0),
            outside_temp_c: Some(18.0),
            co2_ppm: Some(600),
        });
        let mut controller = build_controller(
            rig.motor(),
            sensors,
            counter,
            ActuatorCfg::default(),
            WindowConfig::default(),
            clock,
            Mode::Auto,
        )
        .expect("build");
        controller.home().expect("home");

        let clock = rig.clock();
        run_for(
            &mut controller,
            &clock,
            Duration::from_millis(250),
            Duration::from_secs(300),
        );
        // Five simulated minutes passed; the last emergency check (10 s
        // cadence) refreshed the snapshot at 290 s.
        assert!(controller.recent_data().at_ms >= 290_000);
    }
}
