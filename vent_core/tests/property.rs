use std::sync::Arc;

use proptest::prelude::*;

use vent_core::mocks::SimRig;
use vent_core::{Actuator, ActuatorCfg, PositionHistory, TickCounter};
use vent_traits::Direction;

const RING_CAPACITY: usize = 32;

prop_compose! {
    /// (metric, age) pairs: metrics in the clamped range, ages up to 10 h.
    fn records_strategy()(
        records in prop::collection::vec((0.0f32..=100.0, 0u64..36_000_000u64), 1..60)
    ) -> Vec<(f32, u64)> {
        records
    }
}

proptest! {
    #[test]
    fn weighted_metric_is_bounded_by_its_records(records in records_strategy()) {
        let now: u64 = 36_000_000;
        let mut history = PositionHistory::new(RING_CAPACITY, 0.1);
        for (metric, age) in &records {
            history.push(*metric, now - *age);
        }
        if let Some(weighted) = history.weighted_metric(now) {
            // The ring retains the most recent RING_CAPACITY pushes.
            let retained: Vec<f32> = records
                .iter()
                .rev()
                .take(RING_CAPACITY)
                .map(|(metric, _)| *metric)
                .collect();
            let min = retained.iter().copied().fold(f32::INFINITY, f32::min);
            let max = retained.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            prop_assert!(
                weighted >= min - 1e-3 && weighted <= max + 1e-3,
                "weighted {weighted} outside [{min}, {max}]"
            );
        }
    }

    #[test]
    fn equal_metrics_age_into_strictly_smaller_weights(
        age in 0u64..3_600_000u64,
        extra in 60_000u64..3_600_000u64,
    ) {
        let now: u64 = 7_200_000;
        let mut newer = PositionHistory::new(4, 1e-6);
        let mut older = PositionHistory::new(4, 1e-6);
        newer.push(50.0, now - age);
        older.push(50.0, now - age - extra);
        prop_assert!(
            older.total_weight(now) < newer.total_weight(now),
            "older sample must carry strictly less weight"
        );
    }

    #[test]
    fn failed_moves_never_change_the_committed_position(
        targets in prop::collection::vec(0u8..10, 1..8)
    ) {
        let cfg = ActuatorCfg {
            move_timeout_ms: 50,
            ..ActuatorCfg::default()
        };
        let counter = TickCounter::new();
        let rig = SimRig::new(&counter, 2000, 600, 2.0);
        let clock = Arc::new(rig.clock());
        let mut actuator = Actuator::new(rig.motor(), counter, cfg, clock);
        actuator.home(Direction::Backward).expect("homing");

        rig.set_dead(true);
        for target in targets {
            if target == 0 {
                // Already there: idempotent success, no actuation needed.
                prop_assert!(actuator.change_position(target).is_ok());
            } else {
                prop_assert!(actuator.change_position(target).is_err());
            }
            prop_assert_eq!(actuator.position(), Some(0));
        }
    }
}
