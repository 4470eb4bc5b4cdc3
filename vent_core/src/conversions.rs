//! Schema-to-runtime configuration mapping.

use vent_traits::Direction;

use crate::engine::Mode;
use crate::{ActuatorCfg, HomingCfg, WindowConfig};

impl From<vent_config::ModeCfg> for Mode {
    fn from(m: vent_config::ModeCfg) -> Self {
        match m {
            vent_config::ModeCfg::Manual => Self::Manual,
            vent_config::ModeCfg::Auto => Self::Auto,
            vent_config::ModeCfg::Binary => Self::Binary,
            vent_config::ModeCfg::ShortTerm => Self::ShortTerm,
        }
    }
}

impl From<&vent_config::Config> for WindowConfig {
    fn from(c: &vent_config::Config) -> Self {
        Self {
            metric_target: c.modes.metric_target,
            metric_margin: c.modes.metric_margin,
            prediction_horizon_s: c.modes.prediction_horizon_s,
            temp_ideal: c.metrics.temp_ideal,
            temp_weight_multiplier: c.metrics.temp_weight_multiplier,
            temp_error_fallback: c.metrics.temp_error_fallback,
            co2_ideal: c.metrics.co2_ideal,
            co2_weight_divisor: c.metrics.co2_weight_divisor,
            co2_error_fallback: c.metrics.co2_error_fallback,
            temp_weight: c.metrics.temp_weight,
            co2_weight: c.metrics.co2_weight,
            temp_critical_high: c.emergency.temp_critical_high,
            temp_critical_low: c.emergency.temp_critical_low,
            co2_critical_high: c.emergency.co2_critical_high,
            binary_open_threshold: c.modes.binary_open_threshold,
            binary_close_threshold: c.modes.binary_close_threshold,
            short_term_history_size: c.modes.short_term_history_size,
            short_term_sensitivity: c.modes.short_term_sensitivity,
            history_capacity: c.history.capacity,
            min_weight_threshold: c.history.min_weight_threshold,
            data_collection_interval_ms: c.intervals.data_collection_ms,
            decision_interval_ms: c.intervals.decision_ms,
            emergency_check_interval_ms: c.emergency.check_interval_ms,
            emergency_min_dwell_ms: c.emergency.min_dwell_ms,
            emergency_max_dwell_ms: c.emergency.max_dwell_ms,
        }
    }
}

impl From<&vent_config::Homing> for HomingCfg {
    fn from(h: &vent_config::Homing) -> Self {
        Self {
            duty: h.duty,
            escalated_duty: h.escalated_duty,
            sample_ms: h.sample_ms,
            warmup_samples: h.warmup_samples,
            min_ticks_per_sample: h.min_ticks_per_sample,
            confirm_samples: h.confirm_samples,
            unjam_ticks: h.unjam_ticks,
            timeout_ms: h.timeout_ms,
        }
    }
}

impl From<&vent_config::Config> for ActuatorCfg {
    fn from(c: &vent_config::Config) -> Self {
        Self {
            positions: c.actuator.positions,
            travel_ticks: c.actuator.travel_ticks,
            open_direction: c.actuator.open_direction.into(),
            move_duty: c.actuator.move_duty,
            move_timeout_ms: c.actuator.move_timeout_ms,
            poll_ms: c.actuator.poll_ms,
            external_move_threshold: c.actuator.external_move_threshold,
            homing: (&c.homing).into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schema_maps_onto_default_runtime_values() {
        let schema = vent_config::Config::default();
        let window: WindowConfig = (&schema).into();
        let actuator: ActuatorCfg = (&schema).into();
        let defaults = WindowConfig::default();

        assert_eq!(window.temp_ideal, defaults.temp_ideal);
        assert_eq!(window.co2_ideal, defaults.co2_ideal);
        assert_eq!(window.emergency_min_dwell_ms, defaults.emergency_min_dwell_ms);
        assert_eq!(actuator.positions, ActuatorCfg::default().positions);
        assert_eq!(actuator.homing.duty, HomingCfg::default().duty);
        assert_eq!(actuator.open_direction, Direction::Forward);
    }

    #[test]
    fn mode_names_map_one_to_one() {
        assert_eq!(Mode::from(vent_config::ModeCfg::Manual), Mode::Manual);
        assert_eq!(Mode::from(vent_config::ModeCfg::Auto), Mode::Auto);
        assert_eq!(Mode::from(vent_config::ModeCfg::Binary), Mode::Binary);
        assert_eq!(Mode::from(vent_config::ModeCfg::ShortTerm), Mode::ShortTerm);
    }
}
