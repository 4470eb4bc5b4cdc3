#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and validation for the window controller.
//!
//! Every section carries firmware defaults, so an empty TOML document is a
//! valid configuration. `Config::validate()` rejects values the control code
//! must never see (non-finite floats, inverted threshold pairs, zero
//! cadences) before anything downstream is built.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Discomfort-metric parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// Ideal room temperature (°C).
    pub temp_ideal: f32,
    /// Degrees-from-ideal to metric-points multiplier.
    pub temp_weight_multiplier: f32,
    /// Metric value assumed when the room sensor is in error.
    pub temp_error_fallback: f32,
    /// CO2 level (ppm) below which the CO2 metric is zero.
    pub co2_ideal: u16,
    /// ppm-above-ideal per metric point.
    pub co2_weight_divisor: f32,
    /// Metric value assumed when the CO2 sensor is in error.
    pub co2_error_fallback: f32,
    pub temp_weight: f32,
    pub co2_weight: f32,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            temp_ideal: 22.0,
            temp_weight_multiplier: 3.5,
            temp_error_fallback: 50.0,
            co2_ideal: 600,
            co2_weight_divisor: 60.0,
            co2_error_fallback: 30.0,
            temp_weight: 1.0,
            co2_weight: 1.0,
        }
    }
}

/// Startup mode selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModeCfg {
    Manual,
    #[default]
    Auto,
    Binary,
    ShortTerm,
}

/// Decision-mode parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Modes {
    pub default_mode: ModeCfg,
    /// Auto mode acts when the predicted metric leaves target ± margin.
    pub metric_target: f32,
    pub metric_margin: f32,
    /// Linear extrapolation horizon for the predicted metric (seconds).
    pub prediction_horizon_s: f32,
    pub binary_open_threshold: f32,
    pub binary_close_threshold: f32,
    /// Rolling-buffer length for short-term mode (data-collection ticks).
    pub short_term_history_size: usize,
    /// Metric change across the rolling buffer that triggers a step.
    pub short_term_sensitivity: f32,
}

impl Default for Modes {
    fn default() -> Self {
        Self {
            default_mode: ModeCfg::Auto,
            metric_target: 0.0,
            metric_margin: 20.0,
            prediction_horizon_s: 180.0,
            binary_open_threshold: 30.0,
            binary_close_threshold: 10.0,
            short_term_history_size: 6,
            short_term_sensitivity: 2.0,
        }
    }
}

/// Safety-critical bounds and emergency timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Emergency {
    pub temp_critical_high: f32,
    pub temp_critical_low: f32,
    pub co2_critical_high: u16,
    pub check_interval_ms: u64,
    /// Emergency holds at least this long even if readings normalize.
    pub min_dwell_ms: u64,
    /// Emergency always releases after this long.
    pub max_dwell_ms: u64,
}

impl Default for Emergency {
    fn default() -> Self {
        Self {
            temp_critical_high: 30.0,
            temp_critical_low: 5.0,
            co2_critical_high: 2000,
            check_interval_ms: 10_000,
            min_dwell_ms: 300_000,
            max_dwell_ms: 600_000,
        }
    }
}

/// Control-loop cadences.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Intervals {
    pub data_collection_ms: u64,
    pub decision_ms: u64,
    /// Host-loop update period; how often `update()` is invoked.
    pub update_period_ms: u64,
}

impl Default for Intervals {
    fn default() -> Self {
        Self {
            data_collection_ms: 60_000,
            decision_ms: 60_000,
            update_period_ms: 250,
        }
    }
}

/// Per-position metric history sizing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct History {
    pub capacity: usize,
    /// Below this total decay weight a position's history is untrusted.
    pub min_weight_threshold: f32,
}

impl Default for History {
    fn default() -> Self {
        Self {
            capacity: 180,
            min_weight_threshold: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DirCfg {
    #[default]
    Forward,
    Backward,
}

impl From<DirCfg> for vent_traits::Direction {
    fn from(d: DirCfg) -> Self {
        match d {
            DirCfg::Forward => Self::Forward,
            DirCfg::Backward => Self::Backward,
        }
    }
}

/// Axis geometry and drive parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Actuator {
    /// Number of discrete aperture stops (0 = closed .. positions-1 = open).
    pub positions: u8,
    /// Encoder ticks across the full closed-to-open travel.
    pub travel_ticks: u32,
    /// Motor direction that drives the window toward open.
    pub open_direction: DirCfg,
    /// PWM duty for ordinary position changes.
    pub move_duty: u8,
    pub move_timeout_ms: u64,
    /// Poll period inside blocking moves.
    pub poll_ms: u64,
    /// Idle encoder drift beyond this many ticks counts as external movement.
    pub external_move_threshold: u64,
}

impl Default for Actuator {
    fn default() -> Self {
        Self {
            positions: 10,
            travel_ticks: 1800,
            open_direction: DirCfg::Forward,
            move_duty: 150,
            move_timeout_ms: 10_000,
            poll_ms: 1,
            external_move_threshold: 25,
        }
    }
}

/// Stall-detection homing parameters.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Homing {
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

impl Default for Homing {
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

/// GPIO pin assignment (BCM numbering).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Pins {
    pub motor_pwm: u8,
    pub motor_dir: u8,
    pub encoder: u8,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            motor_pwm: 18,
            motor_dir: 19,
            encoder: 26,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// Path to a log file (JSON lines); console-only when absent.
    pub file: Option<String>,
    /// "error" | "warn" | "info" | "debug" | "trace"
    pub level: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub metrics: Metrics,
    pub modes: Modes,
    pub emergency: Emergency,
    pub intervals: Intervals,
    pub history: History,
    pub actuator: Actuator,
    pub homing: Homing,
    pub pins: Pins,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let err = ConfigError::Invalid;

        let finite = [
            self.metrics.temp_ideal,
            self.metrics.temp_weight_multiplier,
            self.metrics.temp_error_fallback,
            self.metrics.co2_weight_divisor,
            self.metrics.co2_error_fallback,
            self.metrics.temp_weight,
            self.metrics.co2_weight,
            self.modes.metric_target,
            self.modes.metric_margin,
            self.modes.prediction_horizon_s,
            self.modes.binary_open_threshold,
            self.modes.binary_close_threshold,
            self.modes.short_term_sensitivity,
            self.emergency.temp_critical_high,
            self.emergency.temp_critical_low,
            self.history.min_weight_threshold,
        ];
        if finite.iter().any(|v| !v.is_finite()) {
            return Err(err("all float parameters must be finite"));
        }

        if self.metrics.temp_weight_multiplier <= 0.0 {
            return Err(err("temp_weight_multiplier must be > 0"));
        }
        if self.metrics.co2_weight_divisor <= 0.0 {
            return Err(err("co2_weight_divisor must be > 0"));
        }
        if self.metrics.temp_weight < 0.0 || self.metrics.co2_weight < 0.0 {
            return Err(err("metric weights must be >= 0"));
        }
        if self.modes.metric_margin < 0.0 {
            return Err(err("metric_margin must be >= 0"));
        }
        if self.modes.prediction_horizon_s < 0.0 {
            return Err(err("prediction_horizon_s must be >= 0"));
        }
        if self.modes.binary_open_threshold <= self.modes.binary_close_threshold {
            return Err(err("binary_open_threshold must exceed binary_close_threshold"));
        }
        if self.modes.short_term_history_size < 2 {
            return Err(err("short_term_history_size must be >= 2"));
        }
        if self.modes.short_term_sensitivity <= 0.0 {
            return Err(err("short_term_sensitivity must be > 0"));
        }
        if self.emergency.temp_critical_high <= self.emergency.temp_critical_low {
            return Err(err("temp_critical_high must exceed temp_critical_low"));
        }
        if self.emergency.check_interval_ms == 0 {
            return Err(err("emergency check_interval_ms must be > 0"));
        }
        if self.emergency.min_dwell_ms > self.emergency.max_dwell_ms {
            return Err(err("emergency min_dwell_ms must not exceed max_dwell_ms"));
        }
        if self.intervals.data_collection_ms == 0 || self.intervals.decision_ms == 0 {
            return Err(err("collection and decision intervals must be > 0"));
        }
        if self.intervals.update_period_ms == 0 {
            return Err(err("update_period_ms must be > 0"));
        }
        if self.history.capacity == 0 {
            return Err(err("history capacity must be > 0"));
        }
        if self.history.min_weight_threshold <= 0.0 {
            return Err(err("min_weight_threshold must be > 0"));
        }
        if self.actuator.positions < 2 {
            return Err(err("actuator needs at least two positions"));
        }
        if self.actuator.travel_ticks < u32::from(self.actuator.positions) - 1 {
            return Err(err("travel_ticks too small for the position count"));
        }
        if self.actuator.move_duty == 0 {
            return Err(err("move_duty must be > 0"));
        }
        if self.actuator.move_timeout_ms == 0 {
            return Err(err("move_timeout_ms must be > 0"));
        }
        if self.homing.duty == 0 {
            return Err(err("homing duty must be > 0"));
        }
        if self.homing.escalated_duty < self.homing.duty {
            return Err(err("escalated_duty must be >= homing duty"));
        }
        if self.homing.sample_ms == 0 || self.homing.timeout_ms == 0 {
            return Err(err("homing sample_ms and timeout_ms must be > 0"));
        }
        if self.homing.confirm_samples == 0 {
            return Err(err("homing confirm_samples must be >= 1"));
        }
        if self.homing.min_ticks_per_sample == 0 {
            return Err(err("homing min_ticks_per_sample must be >= 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_is_a_valid_config() {
        let cfg = load_toml("").expect("parse");
        cfg.validate().expect("defaults must validate");
        assert_eq!(cfg.actuator.positions, 10);
        assert_eq!(cfg.metrics.co2_ideal, 600);
    }

    #[test]
    fn unknown_mode_name_is_a_parse_error() {
        let res = load_toml("[modes]\ndefault_mode = \"turbo\"\n");
        assert!(res.is_err());
    }

    #[test]
    fn kebab_case_mode_names_parse() {
        let cfg = load_toml("[modes]\ndefault_mode = \"short-term\"\n").expect("parse");
        assert_eq!(cfg.modes.default_mode, ModeCfg::ShortTerm);
    }
}
