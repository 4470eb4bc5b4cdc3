//! Decision engine: mode state machine, metric history, emergency override.
//!
//! `update()` is the single per-cycle entry point. Within one invocation the
//! ordering is fixed: emergency evaluation first (with strict priority —
//! while an emergency holds, everything else is skipped), then data
//! collection, then the mode decision. Cadences are "at least every N
//! milliseconds", checked by elapsed-time comparison against the injected
//! clock; the engine never schedules anything itself.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use vent_traits::{Clock, MotorDriver, SensorHub};

use crate::actuator::Actuator;
use crate::error::Result;
use crate::history::PositionHistory;
use crate::{WindowConfig, metrics, validate_window_config};

/// Openness bonus applied per unit of aperture when the temperature gradient
/// says opening helps (subtracted) or hurts (added).
const TEMP_OPENNESS_BONUS: f32 = 10.0;
/// Openness bonus applied per unit of aperture while CO2 is above ideal.
const CO2_OPENNESS_BONUS: f32 = 15.0;

/// Operating mode; exactly one is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Manual,
    Auto,
    Binary,
    ShortTerm,
    Emergency,
}

/// Safety-critical condition classification. Computed fresh on every
/// emergency check; only the currently active kind is retained, for exit
/// testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmergencyKind {
    /// CO2 at or above the critical bound: always ventilate.
    Co2Critical,
    /// Critical room temperature and outside air moves it toward ideal.
    TempCriticalHelp,
    /// Critical room temperature and opening would make it worse.
    TempCriticalHarm,
    /// Room and CO2 channels both unreadable: stop trusting automation.
    SensorFailure,
}

/// Latest sensor snapshot with derived metrics and the committed position.
/// Rebuilt in full on every refresh; no partial updates.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RecentData {
    pub room_temp_c: Option<f32>,
    pub outside_temp_c: Option<f32>,
    pub co2_ppm: Option<u16>,
    pub temperature_metric: f32,
    pub co2_metric: f32,
    pub total_metric: f32,
    pub position: u8,
    pub at_ms: u64,
}

pub struct WindowController<M: MotorDriver, S: SensorHub> {
    actuator: Actuator<M>,
    sensors: S,
    cfg: WindowConfig,
    mode: Mode,
    recent: RecentData,
    histories: Vec<PositionHistory>,
    short_term: VecDeque<f32>,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
    last_emergency_ms: Option<u64>,
    last_collection_ms: Option<u64>,
    last_decision_ms: Option<u64>,
    emergency: Option<EmergencyKind>,
    emergency_since_ms: u64,
}

impl<M: MotorDriver, S: SensorHub> core::fmt::Debug for WindowController<M, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WindowController")
            .field("mode", &self.mode)
            .field("position", &self.actuator.position())
            .field("metric", &self.recent.total_metric)
            .finish()
    }
}

fn due(last: Option<u64>, now: u64, interval_ms: u64) -> bool {
    last.is_none_or(|t| now.saturating_sub(t) >= interval_ms)
}

impl<M: MotorDriver, S: SensorHub> WindowController<M, S> {
    pub(crate) fn from_parts(
        actuator: Actuator<M>,
        sensors: S,
        cfg: WindowConfig,
        clock: Arc<dyn Clock + Send + Sync>,
        initial_mode: Mode,
    ) -> Self {
        let positions = usize::from(actuator.cfg().positions);
        let histories =
            vec![PositionHistory::new(cfg.history_capacity, cfg.min_weight_threshold); positions];
        let epoch = clock.now();
        Self {
            actuator,
            sensors,
            cfg,
            mode: initial_mode,
            recent: RecentData::default(),
            histories,
            short_term: VecDeque::new(),
            clock,
            epoch,
            last_emergency_ms: None,
            last_collection_ms: None,
            last_decision_ms: None,
            emergency: None,
            emergency_since_ms: 0,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Read-only copy of the latest snapshot.
    pub fn recent_data(&self) -> RecentData {
        self.recent
    }

    pub fn config(&self) -> &WindowConfig {
        &self.cfg
    }

    /// Replace the whole configuration. Structural sizes (history capacity)
    /// are build-time; a swap only affects thresholds and cadences.
    pub fn set_config(&mut self, cfg: WindowConfig) -> Result<()> {
        validate_window_config(&cfg).map_err(eyre::Report::new)?;
        tracing::info!("configuration replaced");
        self.cfg = cfg;
        Ok(())
    }

    /// Committed discrete position; `None` until the axis has been homed.
    pub fn position(&self) -> Option<u8> {
        self.actuator.position()
    }

    /// Current aperture as a fraction: 0.0 fully closed, 1.0 fully open.
    pub fn position_fraction(&self) -> f32 {
        f32::from(self.actuator.position().unwrap_or(0))
            / f32::from(self.actuator.max_position().max(1))
    }

    /// Establish the position datum by driving into the closed stop.
    pub fn home(&mut self) -> Result<()> {
        let toward_closed = self.actuator.cfg().open_direction.flip();
        self.actuator.home(toward_closed)
    }

    /// Switch operating mode. Entry side effects fire here: entering
    /// ShortTerm starts from an empty rolling buffer.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.mode == mode {
            return;
        }
        tracing::info!(from = ?self.mode, to = ?mode, "mode change");
        self.mode = mode;
        if mode == Mode::ShortTerm {
            self.short_term.clear();
        }
    }

    /// Operator-requested position. Only meaningful in Manual mode; calls in
    /// other modes are honored but logged.
    pub fn set_manual_position(&mut self, index: u8) -> Result<()> {
        if self.mode != Mode::Manual {
            tracing::warn!(mode = ?self.mode, "manual position request outside manual mode");
        }
        let max = self.actuator.max_position();
        let clamped = index.min(max);
        if clamped != index {
            tracing::warn!(index, clamped, "manual position clamped to range");
        }
        self.actuator.change_position(clamped)
    }

    /// Rebuild the full snapshot from fresh sensor readings and the
    /// committed position. The sole synchronization point between sensor
    /// state and decision state within a cycle.
    pub fn update_recent_data(&mut self) {
        let frame = self.sensors.sample();
        let temperature_metric = metrics::temperature_metric(frame.room_temp_c, &self.cfg);
        let co2_metric = metrics::co2_metric(frame.co2_ppm, &self.cfg);
        self.recent = RecentData {
            room_temp_c: frame.room_temp_c,
            outside_temp_c: frame.outside_temp_c,
            co2_ppm: frame.co2_ppm,
            temperature_metric,
            co2_metric,
            total_metric: temperature_metric * self.cfg.temp_weight
                + co2_metric * self.cfg.co2_weight,
            position: self.actuator.position().unwrap_or(0),
            at_ms: self.clock.ms_since(self.epoch),
        };
    }

    /// Single per-cycle entry point; constant non-blocking work except when
    /// a due decision commands a bounded move.
    pub fn update(&mut self) -> Result<()> {
        let now = self.clock.ms_since(self.epoch);

        if !self.actuator.is_moving() {
            let threshold = self.actuator.cfg().external_move_threshold;
            // Informational only; the warning is the whole reaction.
            let _ = self.actuator.detect_external_movement(threshold);
        }

        if due(self.last_emergency_ms, now, self.cfg.emergency_check_interval_ms) {
            self.last_emergency_ms = Some(now);
            self.update_recent_data();
            match self.check_emergency_conditions() {
                Some(kind) => self.enter_emergency(kind, now),
                None => {
                    if self.mode == Mode::Emergency && self.should_exit_emergency(now) {
                        self.emergency = None;
                        tracing::info!("emergency cleared; returning to auto");
                        self.set_mode(Mode::Auto);
                    }
                }
            }
        }
        if self.mode == Mode::Emergency {
            return Ok(());
        }

        if due(self.last_collection_ms, now, self.cfg.data_collection_interval_ms) {
            self.last_collection_ms = Some(now);
            self.collect_data(now);
        }

        if due(self.last_decision_ms, now, self.cfg.decision_interval_ms) {
            self.last_decision_ms = Some(now);
            self.dispatch_decision(now)?;
        }
        Ok(())
    }

    fn collect_data(&mut self, now: u64) {
        self.update_recent_data();
        let position = usize::from(self.recent.position);
        if let Some(history) = self.histories.get_mut(position) {
            history.push(self.recent.total_metric, now);
        }
        if self.short_term.len() >= self.cfg.short_term_history_size {
            self.short_term.pop_front();
        }
        self.short_term.push_back(self.recent.total_metric);
        tracing::debug!(
            position,
            metric = self.recent.total_metric,
            co2 = self.recent.co2_ppm,
            "data collected"
        );
    }

    fn dispatch_decision(&mut self, now: u64) -> Result<()> {
        self.update_recent_data();
        let current = self.recent.total_metric;
        match self.mode {
            Mode::Auto => self.decide_auto(now, current),
            Mode::Binary => self.decide_binary(current),
            Mode::ShortTerm => self.decide_short_term(current),
            Mode::Manual => {
                tracing::trace!("manual mode; no automatic action");
                Ok(())
            }
            // update() returns before dispatch while an emergency holds.
            Mode::Emergency => Ok(()),
        }
    }

    fn decide_auto(&mut self, now: u64, current: f32) -> Result<()> {
        let position = usize::from(self.recent.position);
        let trend = self
            .histories
            .get(position)
            .map_or(0.0, PositionHistory::trend_per_s);
        let predicted = trend.mul_add(self.cfg.prediction_horizon_s, current);
        let low = self.cfg.metric_target - self.cfg.metric_margin;
        let high = self.cfg.metric_target + self.cfg.metric_margin;
        tracing::debug!(current, trend, predicted, "auto decision");
        if (low..=high).contains(&predicted) {
            return Ok(());
        }
        let need_to_improve = predicted > high;
        let Some(best) = self.find_best_position(now, need_to_improve) else {
            tracing::debug!("no position with trustworthy history");
            return Ok(());
        };
        if best != self.recent.position {
            tracing::info!(from = self.recent.position, to = best, "auto move");
            self.actuator.change_position(best)?;
        }
        Ok(())
    }

    /// Search every position with trustworthy history for the best weighted
    /// metric — lowest when the metric must come down, highest otherwise —
    /// after openness adjustments for the current temperature gradient and
    /// CO2 excess.
    fn find_best_position(&self, now: u64, need_to_improve: bool) -> Option<u8> {
        let recent = &self.recent;
        let max_position = self.actuator.max_position();
        let opening_helps = match (recent.room_temp_c, recent.outside_temp_c) {
            (Some(room), Some(outside)) => {
                (room > self.cfg.temp_ideal && outside < room)
                    || (room < self.cfg.temp_ideal && outside > room)
            }
            _ => false,
        };
        let gradient_known = recent.room_temp_c.is_some() && recent.outside_temp_c.is_some();
        let co2_high = recent.co2_ppm.is_some_and(|ppm| ppm > self.cfg.co2_ideal);

        let mut best: Option<(u8, f32)> = None;
        for (index, history) in self.histories.iter().enumerate() {
            let Some(weighted) = history.weighted_metric(now) else {
                continue;
            };
            let openness = index as f32 / f32::from(max_position.max(1));
            let mut adjusted = weighted;
            if gradient_known {
                if opening_helps {
                    adjusted -= openness * TEMP_OPENNESS_BONUS;
                } else {
                    adjusted += openness * TEMP_OPENNESS_BONUS;
                }
            }
            if co2_high {
                adjusted -= openness * CO2_OPENNESS_BONUS;
            }
            let better = best.is_none_or(|(_, score)| {
                if need_to_improve {
                    adjusted < score
                } else {
                    adjusted > score
                }
            });
            if better {
                best = Some((index as u8, adjusted));
            }
        }
        best.map(|(index, _)| index)
    }

    fn decide_binary(&mut self, current: f32) -> Result<()> {
        let max = self.actuator.max_position();
        let position = self.recent.position;
        if current > self.cfg.binary_open_threshold && position != max {
            tracing::info!(metric = current, "binary: opening fully");
            self.actuator.change_position(max)?;
        } else if current < self.cfg.binary_close_threshold && position != 0 {
            tracing::info!(metric = current, "binary: closing fully");
            self.actuator.change_position(0)?;
        }
        Ok(())
    }

    fn decide_short_term(&mut self, current: f32) -> Result<()> {
        if self.short_term.len() < 2 {
            return Ok(());
        }
        let Some(&oldest) = self.short_term.front() else {
            return Ok(());
        };
        let change = current - oldest;
        if change.abs() <= self.cfg.short_term_sensitivity {
            return Ok(());
        }
        let position = self.recent.position;
        let target = if change > 0.0 {
            // Worsening: step one toward open.
            position.saturating_add(1).min(self.actuator.max_position())
        } else {
            position.saturating_sub(1)
        };
        if target != position {
            tracing::info!(from = position, to = target, change, "short-term step");
            self.actuator.change_position(target)?;
        }
        Ok(())
    }

    /// Classify the current snapshot. CO2 wins over temperature; total
    /// sensor failure is checked last.
    fn check_emergency_conditions(&self) -> Option<EmergencyKind> {
        let recent = &self.recent;
        if let Some(co2) = recent.co2_ppm
            && co2 >= self.cfg.co2_critical_high
        {
            tracing::warn!(co2, "critical CO2 level");
            return Some(EmergencyKind::Co2Critical);
        }
        if let Some(room) = recent.room_temp_c
            && (room >= self.cfg.temp_critical_high || room <= self.cfg.temp_critical_low)
        {
            tracing::warn!(room, "critical room temperature");
            return Some(self.classify_temp_emergency(room));
        }
        if recent.room_temp_c.is_none() && recent.co2_ppm.is_none() {
            tracing::error!("room and CO2 sensors both failed");
            return Some(EmergencyKind::SensorFailure);
        }
        None
    }

    /// Opening helps when the outside air would move the room toward ideal;
    /// with no outside reading we assume it would not.
    fn classify_temp_emergency(&self, room: f32) -> EmergencyKind {
        let helps = match self.recent.outside_temp_c {
            Some(outside) if room >= self.cfg.temp_critical_high => outside < room,
            Some(outside) if room <= self.cfg.temp_critical_low => outside > room,
            _ => false,
        };
        if helps {
            EmergencyKind::TempCriticalHelp
        } else {
            EmergencyKind::TempCriticalHarm
        }
    }

    /// One-shot action on entry; the mode then stays passive until the exit
    /// condition. A move that fails to physically complete is logged, not
    /// escalated — the next cycle re-observes position.
    fn enter_emergency(&mut self, kind: EmergencyKind, now: u64) {
        let target = match kind {
            EmergencyKind::SensorFailure => {
                if self.mode != Mode::Manual {
                    tracing::error!("sensor failure: holding position, switching to manual");
                    self.set_mode(Mode::Manual);
                }
                self.emergency = None;
                return;
            }
            EmergencyKind::Co2Critical | EmergencyKind::TempCriticalHelp => {
                self.actuator.max_position()
            }
            EmergencyKind::TempCriticalHarm => 0,
        };
        if self.mode == Mode::Emergency && self.emergency == Some(kind) {
            return; // action already taken for this condition
        }
        tracing::warn!(kind = ?kind, target, "emergency action");
        if let Err(e) = self.actuator.change_position(target) {
            tracing::error!(error = %e, "emergency move failed");
        }
        self.emergency = Some(kind);
        self.emergency_since_ms = now;
        self.set_mode(Mode::Emergency);
    }

    /// Exit once the minimum dwell has passed and the room temperature (when
    /// readable) is back inside the critical band, or unconditionally after
    /// the maximum dwell.
    fn should_exit_emergency(&self, now: u64) -> bool {
        let dwell = now.saturating_sub(self.emergency_since_ms);
        if dwell >= self.cfg.emergency_max_dwell_ms {
            return true;
        }
        if dwell < self.cfg.emergency_min_dwell_ms {
            return false;
        }
        match self.recent.room_temp_c {
            Some(room) => {
                room < self.cfg.temp_critical_high && room > self.cfg.temp_critical_low
            }
            None => false,
        }
    }
}
