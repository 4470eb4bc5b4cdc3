//! Discomfort metric math.
//!
//! Pure functions over the latest sensor values and the active config; all
//! per-channel metrics are clamped to `[0, 100]` and a channel in error
//! contributes its configured fallback instead of propagating an undefined
//! value into decisions.

use crate::WindowConfig;

/// Temperature discomfort: degrees away from ideal, scaled.
pub fn temperature_metric(room_temp_c: Option<f32>, cfg: &WindowConfig) -> f32 {
    match room_temp_c {
        None => cfg.temp_error_fallback,
        Some(t) => ((t - cfg.temp_ideal).abs() * cfg.temp_weight_multiplier).clamp(0.0, 100.0),
    }
}

/// CO2 discomfort: ppm above ideal, scaled. Levels at or below ideal score 0.
pub fn co2_metric(co2_ppm: Option<u16>, cfg: &WindowConfig) -> f32 {
    match co2_ppm {
        None => cfg.co2_error_fallback,
        Some(ppm) => {
            let excess = (f32::from(ppm) - f32::from(cfg.co2_ideal)).max(0.0);
            (excess / cfg.co2_weight_divisor).clamp(0.0, 100.0)
        }
    }
}

/// Combined discomfort; lower is better.
pub fn total_metric(room_temp_c: Option<f32>, co2_ppm: Option<u16>, cfg: &WindowConfig) -> f32 {
    temperature_metric(room_temp_c, cfg) * cfg.temp_weight
        + co2_metric(co2_ppm, cfg) * cfg.co2_weight
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> WindowConfig {
        WindowConfig::default()
    }

    #[test]
    fn co2_excess_is_scaled_by_the_divisor() {
        let config = WindowConfig {
            co2_ideal: 600,
            co2_weight_divisor: 20.0,
            ..cfg()
        };
        assert_eq!(co2_metric(Some(900), &config), 15.0);
    }

    #[test]
    fn co2_at_or_below_ideal_scores_zero() {
        let config = cfg();
        assert_eq!(co2_metric(Some(600), &config), 0.0);
        assert_eq!(co2_metric(Some(450), &config), 0.0);
    }

    #[test]
    fn temperature_deviation_is_scaled_by_the_multiplier() {
        let config = WindowConfig {
            temp_ideal: 22.0,
            temp_weight_multiplier: 2.0,
            ..cfg()
        };
        assert_eq!(temperature_metric(Some(25.0), &config), 6.0);
        assert_eq!(temperature_metric(Some(19.0), &config), 6.0);
    }

    #[test]
    fn sensor_error_yields_the_configured_fallback() {
        let config = cfg();
        assert_eq!(temperature_metric(None, &config), config.temp_error_fallback);
        assert_eq!(co2_metric(None, &config), config.co2_error_fallback);
    }

    #[test]
    fn metrics_clamp_at_one_hundred() {
        let config = cfg();
        assert_eq!(temperature_metric(Some(1000.0), &config), 100.0);
        assert_eq!(co2_metric(Some(u16::MAX), &config), 100.0);
    }

    #[test]
    fn total_metric_applies_channel_weights() {
        let config = WindowConfig {
            temp_ideal: 22.0,
            temp_weight_multiplier: 2.0,
            co2_ideal: 600,
            co2_weight_divisor: 20.0,
            temp_weight: 1.0,
            co2_weight: 2.0,
            ..cfg()
        };
        // temp 6.0 * 1.0 + co2 15.0 * 2.0
        assert_eq!(total_metric(Some(25.0), Some(900), &config), 36.0);
    }
}
