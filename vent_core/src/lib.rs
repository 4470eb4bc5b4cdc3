#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core window control logic (hardware-agnostic).
//!
//! All hardware interactions go through the `vent_traits::MotorDriver` and
//! `vent_traits::SensorHub` traits; time goes through `vent_traits::Clock`.
//!
//! ## Architecture
//!
//! - **Encoder**: atomic tick counter shared with the interrupt context
//!   (`encoder` module)
//! - **Actuator**: bounded move tasks, stall-detection homing, discrete
//!   aperture stops (`actuator` module)
//! - **Metrics**: discomfort scoring from temperature and CO2 (`metrics`)
//! - **History**: recency-decayed per-position metric memory (`history`)
//! - **Engine**: mode state machine with a prioritized emergency override
//!   (`engine` module)
//!
//! The only concurrent context below the control thread is the encoder ISR,
//! which touches nothing but the tick counter. Everything else is
//! single-threaded by construction and `update()` does a constant amount of
//! non-blocking work per call, except when a due decision commands one
//! bounded move.

pub mod actuator;
pub mod conversions;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod history;
pub mod metrics;
pub mod mocks;
pub mod runner;

use std::marker::PhantomData;
use std::sync::Arc;

use vent_traits::clock::{Clock, MonotonicClock};
use vent_traits::{Direction, MotorDriver, SensorHub};

pub use crate::actuator::Actuator;
pub use crate::encoder::{PulseHandle, TickCounter};
pub use crate::engine::{EmergencyKind, Mode, RecentData, WindowController};
pub use crate::error::{ActuatorError, BuildError, Result};
pub use crate::history::{MetricRecord, PositionHistory};

/// Operator-tunable thresholds and weights.
///
/// Replaced wholesale through `set_config`, never mutated field-by-field
/// from concurrent contexts. Defaults reproduce the deployed firmware
/// constants.
#[derive(Debug, Clone)]
pub struct WindowConfig {
    /// Auto mode steers the predicted metric toward this value.
    pub metric_target: f32,
    /// Half-width of the no-action band around the target.
    pub metric_margin: f32,
    /// Linear extrapolation horizon for the predicted metric (seconds).
    pub prediction_horizon_s: f32,
    pub temp_ideal: f32,
    pub temp_weight_multiplier: f32,
    /// Temperature metric assumed while the room sensor is in error.
    pub temp_error_fallback: f32,
    pub co2_ideal: u16,
    pub co2_weight_divisor: f32,
    /// CO2 metric assumed while the CO2 sensor is in error.
    pub co2_error_fallback: f32,
    pub temp_weight: f32,
    pub co2_weight: f32,
    pub temp_critical_high: f32,
    pub temp_critical_low: f32,
    pub co2_critical_high: u16,
    pub binary_open_threshold: f32,
    pub binary_close_threshold: f32,
    /// Rolling-buffer length for short-term mode (data-collection ticks).
    pub short_term_history_size: usize,
    pub short_term_sensitivity: f32,
    /// Ring capacity of each per-position history (build-time).
    pub history_capacity: usize,
    /// Total decay weight below which a position's history is untrusted.
    pub min_weight_threshold: f32,
    pub data_collection_interval_ms: u64,
    pub decision_interval_ms: u64,
    pub emergency_check_interval_ms: u64,
    /// Emergency holds at least this long even if readings normalize.
    pub emergency_min_dwell_ms: u64,
    /// Emergency always releases after this long.
    pub emergency_max_dwell_ms: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            metric_target: 0.0,
            metric_margin: 20.0,
            prediction_horizon_s: 180.0,
            temp_ideal: 22.0,
            temp_weight_multiplier: 3.5,
            temp_error_fallback: 50.0,
            co2_ideal: 600,
            co2_weight_divisor: 60.0,
            co2_error_fallback: 30.0,
            temp_weight: 1.0,
            co2_weight: 1.0,
            temp_critical_high: 30.0,
            temp_critical_low: 5.0,
            co2_critical_high: 2000,
            binary_open_threshold: 30.0,
            binary_close_threshold: 10.0,
            short_term_history_size: 6,
            short_term_sensitivity: 2.0,
            history_capacity: 180,
            min_weight_threshold: 0.1,
            data_collection_interval_ms: 60_000,
            decision_interval_ms: 60_000,
            emergency_check_interval_ms: 10_000,
            emergency_min_dwell_ms: 300_000,
            emergency_max_dwell_ms: 600_000,
        }
    }
}

/// Stall-detection homing parameters.
#[derive(Debug, Clone, Copy)]
pub struct HomingCfg {
    pub duty: u8,
    /// Duty for the single retry after a no-movement stall.
    pub escalated_duty: u8,
    /// Velocity sampling period.
    pub sample_ms: u64,
    /// Samples ignored after start so spin-up does not read as a stall.
    pub warmup_samples: u32,
    /// Below this many ticks per sample the shaft counts as stopped.
    pub min_ticks_per_sample: u32,
    /// Consecutive below-threshold samples that confirm the hard stop.
    pub confirm_samples: u32,
    /// Reverse back-off distance after hitting the stop.
    pub unjam_ticks: u32,
    /// Ceiling for the whole procedure.
    pub timeout_ms: u64,
}

impl Default for HomingCfg {
    fn default() -> Self {
        Self {
            duty: 120,
            escalated_duty: 200,
            sample_ms: 100,
            warmup_samples: 3,
            min_ticks_per_sample: 5,
            confirm_samples: 2,
            unjam_ticks: 30,
            timeout_ms: 10_000,
        }
    }
}

/// Axis geometry and drive parameters.
#[derive(Debug, Clone)]
pub struct ActuatorCfg {
    /// Number of discrete aperture stops (0 = closed .. positions-1 = open).
    pub positions: u8,
    /// Encoder ticks across the full closed-to-open travel.
    pub travel_ticks: u32,
    /// Motor direction that drives the window toward open.
    pub open_direction: Direction,
    /// PWM duty for ordinary position changes.
    pub move_duty: u8,
    pub move_timeout_ms: u64,
    /// Poll period inside blocking moves.
    pub poll_ms: u64,
    /// Idle encoder drift beyond this many ticks counts as external movement.
    pub external_move_threshold: u64,
    pub homing: HomingCfg,
}

impl ActuatorCfg {
    /// Ticks per discrete step: `travel_ticks / (positions - 1)`.
    pub fn step_ticks(&self) -> u32 {
        self.travel_ticks / u32::from(self.positions.max(2) - 1)
    }
}

impl Default for ActuatorCfg {
    fn default() -> Self {
        Self {
            positions: 10,
            travel_ticks: 1800,
            open_direction: Direction::Forward,
            move_duty: 150,
            move_timeout_ms: 10_000,
            poll_ms: 1,
            external_move_threshold: 25,
            homing: HomingCfg::default(),
        }
    }
}

pub(crate) fn validate_window_config(cfg: &WindowConfig) -> std::result::Result<(), BuildError> {
    let finite = [
        cfg.metric_target,
        cfg.metric_margin,
        cfg.prediction_horizon_s,
        cfg.temp_ideal,
        cfg.temp_weight_multiplier,
        cfg.temp_error_fallback,
        cfg.co2_weight_divisor,
        cfg.co2_error_fallback,
        cfg.temp_weight,
        cfg.co2_weight,
        cfg.temp_critical_high,
        cfg.temp_critical_low,
        cfg.binary_open_threshold,
        cfg.binary_close_threshold,
        cfg.short_term_sensitivity,
        cfg.min_weight_threshold,
    ];
    if finite.iter().any(|v| !v.is_finite()) {
        return Err(BuildError::InvalidConfig("float parameters must be finite"));
    }
    if cfg.metric_margin < 0.0 {
        return Err(BuildError::InvalidConfig("metric_margin must be >= 0"));
    }
    if cfg.prediction_horizon_s < 0.0 {
        return Err(BuildError::InvalidConfig("prediction_horizon_s must be >= 0"));
    }
    if cfg.temp_weight_multiplier <= 0.0 {
        return Err(BuildError::InvalidConfig("temp_weight_multiplier must be > 0"));
    }
    if cfg.co2_weight_divisor <= 0.0 {
        return Err(BuildError::InvalidConfig("co2_weight_divisor must be > 0"));
    }
    if cfg.temp_weight < 0.0 || cfg.co2_weight < 0.0 {
        return Err(BuildError::InvalidConfig("metric weights must be >= 0"));
    }
    if cfg.binary_open_threshold <= cfg.binary_close_threshold {
        return Err(BuildError::InvalidConfig(
            "binary_open_threshold must exceed binary_close_threshold",
        ));
    }
    if cfg.temp_critical_high <= cfg.temp_critical_low {
        return Err(BuildError::InvalidConfig(
            "temp_critical_high must exceed temp_critical_low",
        ));
    }
    if cfg.short_term_history_size < 2 {
        return Err(BuildError::InvalidConfig("short_term_history_size must be >= 2"));
    }
    if cfg.short_term_sensitivity <= 0.0 {
        return Err(BuildError::InvalidConfig("short_term_sensitivity must be > 0"));
    }
    if cfg.history_capacity == 0 {
        return Err(BuildError::InvalidConfig("history_capacity must be > 0"));
    }
    if cfg.min_weight_threshold <= 0.0 {
        return Err(BuildError::InvalidConfig("min_weight_threshold must be > 0"));
    }
    if cfg.data_collection_interval_ms == 0
        || cfg.decision_interval_ms == 0
        || cfg.emergency_check_interval_ms == 0
    {
        return Err(BuildError::InvalidConfig("cadence intervals must be > 0"));
    }
    if cfg.emergency_min_dwell_ms > cfg.emergency_max_dwell_ms {
        return Err(BuildError::InvalidConfig(
            "emergency_min_dwell_ms must not exceed emergency_max_dwell_ms",
        ));
    }
    Ok(())
}

pub(crate) fn validate_actuator_cfg(cfg: &ActuatorCfg) -> std::result::Result<(), BuildError> {
    if cfg.positions < 2 {
        return Err(BuildError::InvalidConfig("actuator needs at least two positions"));
    }
    if cfg.travel_ticks == 0 || cfg.step_ticks() == 0 {
        return Err(BuildError::InvalidConfig("travel_ticks too small for the position count"));
    }
    if cfg.move_duty == 0 {
        return Err(BuildError::InvalidConfig("move_duty must be > 0"));
    }
    if cfg.move_timeout_ms == 0 {
        return Err(BuildError::InvalidConfig("move_timeout_ms must be > 0"));
    }
    if cfg.homing.duty == 0 {
        return Err(BuildError::InvalidConfig("homing duty must be > 0"));
    }
    if cfg.homing.escalated_duty < cfg.homing.duty {
        return Err(BuildError::InvalidConfig("escalated_duty must be >= homing duty"));
    }
    if cfg.homing.sample_ms == 0 || cfg.homing.timeout_ms == 0 {
        return Err(BuildError::InvalidConfig("homing sample_ms and timeout_ms must be > 0"));
    }
    if cfg.homing.confirm_samples == 0 || cfg.homing.min_ticks_per_sample == 0 {
        return Err(BuildError::InvalidConfig(
            "homing confirm_samples and min_ticks_per_sample must be >= 1",
        ));
    }
    Ok(())
}

/// Build a statically-dispatched controller from concrete motor and sensors.
pub fn build_controller<M, S>(
    motor: M,
    sensors: S,
    counter: TickCounter,
    actuator_cfg: ActuatorCfg,
    config: WindowConfig,
    clock: Arc<dyn Clock + Send + Sync>,
    initial_mode: Mode,
) -> Result<WindowController<M, S>>
where
    M: MotorDriver + 'static,
    S: SensorHub + 'static,
{
    validate_window_config(&config).map_err(eyre::Report::new)?;
    validate_actuator_cfg(&actuator_cfg).map_err(eyre::Report::new)?;
    let actuator = Actuator::new(motor, counter, actuator_cfg, Arc::clone(&clock));
    Ok(WindowController::from_parts(
        actuator,
        sensors,
        config,
        clock,
        initial_mode,
    ))
}

/// Controller over boxed hardware, as produced by [`ControllerBuilder`].
pub type BoxedController = WindowController<Box<dyn MotorDriver>, Box<dyn SensorHub>>;

impl BoxedController {
    /// Start building a controller with dynamically-dispatched hardware.
    pub fn builder() -> ControllerBuilder<Missing, Missing> {
        ControllerBuilder::default()
    }
}

// Type-state markers for the builder
pub struct Missing;
pub struct Set;

/// Builder for [`BoxedController`]. Motor and sensors advance the type
/// state; everything else is optional and validated on `build()`.
pub struct ControllerBuilder<M, S> {
    motor: Option<Box<dyn MotorDriver>>,
    sensors: Option<Box<dyn SensorHub>>,
    config: Option<WindowConfig>,
    actuator_cfg: Option<ActuatorCfg>,
    counter: Option<TickCounter>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    initial_mode: Option<Mode>,
    _m: PhantomData<M>,
    _s: PhantomData<S>,
}

impl Default for ControllerBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            motor: None,
            sensors: None,
            config: None,
            actuator_cfg: None,
            counter: None,
            clock: None,
            initial_mode: None,
            _m: PhantomData,
            _s: PhantomData,
        }
    }
}

impl<M, S> ControllerBuilder<M, S> {
    pub fn with_config(mut self, config: WindowConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_actuator_cfg(mut self, cfg: ActuatorCfg) -> Self {
        self.actuator_cfg = Some(cfg);
        self
    }

    /// Provide the tick counter whose ISR handle is already wired to the
    /// encoder interrupt. A fresh counter is created when absent.
    pub fn with_counter(mut self, counter: TickCounter) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Custom clock; defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_initial_mode(mut self, mode: Mode) -> Self {
        self.initial_mode = Some(mode);
        self
    }

    /// Fallible build available in any type-state; reports missing pieces
    /// as typed `BuildError`s.
    pub fn try_build(self) -> Result<BoxedController> {
        let ControllerBuilder {
            motor,
            sensors,
            config,
            actuator_cfg,
            counter,
            clock,
            initial_mode,
            _m: _,
            _s: _,
        } = self;

        let motor = motor.ok_or_else(|| eyre::Report::new(BuildError::MissingMotor))?;
        let sensors = sensors.ok_or_else(|| eyre::Report::new(BuildError::MissingSensors))?;
        let config = config.unwrap_or_default();
        let actuator_cfg = actuator_cfg.unwrap_or_default();
        let counter = counter.unwrap_or_default();
        let clock: Arc<dyn Clock + Send + Sync> = match clock {
            Some(boxed) => Arc::from(boxed),
            None => Arc::new(MonotonicClock::new()),
        };
        let initial_mode = initial_mode.unwrap_or(Mode::Auto);

        build_controller(
            motor,
            sensors,
            counter,
            actuator_cfg,
            config,
            clock,
            initial_mode,
        )
    }
}

impl<S> ControllerBuilder<Missing, S> {
    pub fn with_motor(self, motor: impl MotorDriver + 'static) -> ControllerBuilder<Set, S> {
        let ControllerBuilder {
            motor: _,
            sensors,
            config,
            actuator_cfg,
            counter,
            clock,
            initial_mode,
            _m: _,
            _s: _,
        } = self;
        ControllerBuilder {
            motor: Some(Box::new(motor)),
            sensors,
            config,
            actuator_cfg,
            counter,
            clock,
            initial_mode,
            _m: PhantomData,
            _s: PhantomData,
        }
    }
}

impl<M> ControllerBuilder<M, Missing> {
    pub fn with_sensors(self, sensors: impl SensorHub + 'static) -> ControllerBuilder<M, Set> {
        let ControllerBuilder {
            motor,
            sensors: _,
            config,
            actuator_cfg,
            counter,
            clock,
            initial_mode,
            _m: _,
            _s: _,
        } = self;
        ControllerBuilder {
            motor,
            sensors: Some(Box::new(sensors)),
            config,
            actuator_cfg,
            counter,
            clock,
            initial_mode,
            _m: PhantomData,
            _s: PhantomData,
        }
    }
}

impl ControllerBuilder<Set, Set> {
    /// Validate and build. Only available once motor and sensors are set.
    pub fn build(self) -> Result<BoxedController> {
        self.try_build()
    }
}

#[cfg(test)]
mod build_tests {
    use super::*;
    use crate::mocks::{SimRig, StaticSensors};
    use vent_traits::SensorFrame;

    #[test]
    fn builder_requires_nothing_beyond_motor_and_sensors() {
        let counter = TickCounter::new();
        let rig = SimRig::new(&counter, 2000, 100, 2.0);
        let controller = BoxedController::builder()
            .with_motor(rig.motor())
            .with_sensors(StaticSensors(SensorFrame::default()))
            .with_counter(counter)
            .with_clock(Box::new(rig.clock()))
            .build()
            .expect("build with defaults");
        assert_eq!(controller.mode(), Mode::Auto);
        assert_eq!(controller.position(), None);
    }

    #[test]
    fn try_build_reports_missing_motor() {
        let err = ControllerBuilder::default().try_build().expect_err("no motor");
        assert!(err.to_string().contains("missing motor"));
    }

    #[test]
    fn invalid_actuator_geometry_is_rejected() {
        let counter = TickCounter::new();
        let rig = SimRig::new(&counter, 2000, 100, 2.0);
        let cfg = ActuatorCfg {
            positions: 10,
            travel_ticks: 4, // below one tick per step
            ..ActuatorCfg::default()
        };
        let err = BoxedController::builder()
            .with_motor(rig.motor())
            .with_sensors(StaticSensors(SensorFrame::default()))
            .with_actuator_cfg(cfg)
            .build()
            .expect_err("geometry must be rejected");
        assert!(err.to_string().contains("travel_ticks"));
    }

    #[test]
    fn inverted_binary_thresholds_are_rejected() {
        let counter = TickCounter::new();
        let rig = SimRig::new(&counter, 2000, 100, 2.0);
        let cfg = WindowConfig {
            binary_open_threshold: 5.0,
            binary_close_threshold: 10.0,
            ..WindowConfig::default()
        };
        let err = BoxedController::builder()
            .with_motor(rig.motor())
            .with_sensors(StaticSensors(SensorFrame::default()))
            .with_config(cfg)
            .build()
            .expect_err("thresholds must be rejected");
        assert!(err.to_string().contains("binary_open_threshold"));
    }
}
