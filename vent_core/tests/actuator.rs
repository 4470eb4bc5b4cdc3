use std::sync::Arc;

use rstest::rstest;
use vent_core::mocks::{SimMotor, SimRig};
use vent_core::{Actuator, ActuatorCfg, ActuatorError, TickCounter};
use vent_traits::{Direction, MotorDriver};

/// Physical travel is longer than the configured 1800 ticks so the far stop
/// stays reachable from the backed-off datum.
const PHYSICAL_TRAVEL: i64 = 2000;

fn rig_actuator(start_ticks: i64, cfg: ActuatorCfg) -> (SimRig, Actuator<SimMotor>) {
    let counter = TickCounter::new();
    let rig = SimRig::new(&counter, PHYSICAL_TRAVEL, start_ticks, 2.0);
    let clock = Arc::new(rig.clock());
    let actuator = Actuator::new(rig.motor(), counter, cfg, clock);
    (rig, actuator)
}

fn homed_actuator(start_ticks: i64, cfg: ActuatorCfg) -> (SimRig, Actuator<SimMotor>) {
    let (rig, mut actuator) = rig_actuator(start_ticks, cfg);
    actuator.home(Direction::Backward).expect("homing");
    (rig, actuator)
}

#[test]
fn homing_normalizes_ticks_and_position_to_zero() {
    let (rig, actuator) = homed_actuator(600, ActuatorCfg::default());
    assert_eq!(actuator.ticks(), 0);
    assert_eq!(actuator.position(), Some(0));
    // The mechanism backed off the stop by the configured un-jam distance.
    let backoff = rig.shaft_ticks();
    assert!(
        (29..=40).contains(&backoff),
        "expected ~30 ticks off the stop, got {backoff}"
    );
}

#[test]
fn homing_stall_escalates_duty_once_then_fails() {
    let (rig, mut actuator) = rig_actuator(600, ActuatorCfg::default());
    rig.set_dead(true);
    let err = actuator
        .home(Direction::Backward)
        .expect_err("dead shaft must stall");
    assert!(matches!(
        err.downcast_ref::<ActuatorError>(),
        Some(ActuatorError::HomingStall)
    ));
    let escalated = ActuatorCfg::default().homing.escalated_duty;
    assert_eq!(rig.max_duty_seen(), escalated, "retry must escalate duty");
    assert_eq!(rig.duty(), 0, "motor must end stopped");
}

#[test]
fn homing_times_out_when_the_stop_is_never_reached() {
    // A shaft that keeps turning without ever hitting a stop.
    let counter = TickCounter::new();
    let rig = SimRig::new(&counter, 1_000_000, 500_000, 2.0);
    let clock = Arc::new(rig.clock());
    let mut actuator = Actuator::new(rig.motor(), counter, ActuatorCfg::default(), clock);
    let err = actuator
        .home(Direction::Backward)
        .expect_err("must hit the ceiling");
    assert!(matches!(
        err.downcast_ref::<ActuatorError>(),
        Some(ActuatorError::HomingTimeout(_))
    ));
    assert_eq!(rig.duty(), 0);
}

#[test]
fn change_position_to_the_current_index_is_a_no_op() {
    let (rig, mut actuator) = homed_actuator(600, ActuatorCfg::default());
    let before = rig.shaft_ticks();
    actuator.change_position(0).expect("no-op success");
    assert_eq!(rig.shaft_ticks(), before, "no actuation may happen");
}

#[test]
fn change_position_moves_one_step_per_index() {
    let (rig, mut actuator) = homed_actuator(600, ActuatorCfg::default());
    let datum = rig.shaft_ticks();
    actuator.change_position(3).expect("move");
    assert_eq!(actuator.position(), Some(3));
    let step = i64::from(ActuatorCfg::default().step_ticks());
    let moved = rig.shaft_ticks() - datum;
    assert!(
        (moved - 3 * step).abs() <= 3,
        "expected ~{} ticks, moved {moved}",
        3 * step
    );

    // And back toward closed.
    actuator.change_position(1).expect("move back");
    assert_eq!(actuator.position(), Some(1));
}

#[rstest]
#[case(1)]
#[case(4)]
#[case(9)]
fn change_position_reaches_each_target(#[case] target: u8) {
    let (_rig, mut actuator) = homed_actuator(600, ActuatorCfg::default());
    actuator.change_position(target).expect("move");
    assert_eq!(actuator.position(), Some(target));
}

#[test]
fn rejected_targets_are_domain_errors() {
    let (_rig, mut actuator) = homed_actuator(600, ActuatorCfg::default());
    let err = actuator.change_position(10).expect_err("out of range");
    assert!(matches!(
        err.downcast_ref::<ActuatorError>(),
        Some(ActuatorError::PositionOutOfRange { index: 10, max: 9 })
    ));
}

#[test]
fn moves_before_homing_are_rejected() {
    let (_rig, mut actuator) = rig_actuator(600, ActuatorCfg::default());
    let err = actuator.change_position(3).expect_err("not homed");
    assert!(matches!(
        err.downcast_ref::<ActuatorError>(),
        Some(ActuatorError::NotHomed)
    ));
}

#[test]
fn failed_move_leaves_the_committed_position_unchanged() {
    let cfg = ActuatorCfg {
        move_timeout_ms: 200,
        ..ActuatorCfg::default()
    };
    let (rig, mut actuator) = homed_actuator(600, cfg);
    rig.set_dead(true);
    let err = actuator.change_position(4).expect_err("dead rig times out");
    assert!(matches!(
        err.downcast_ref::<ActuatorError>(),
        Some(ActuatorError::MoveTimeout(200))
    ));
    assert_eq!(actuator.position(), Some(0), "failure must not commit");
    assert_eq!(rig.duty(), 0, "motor must be forced to a stop");
}

#[test]
fn zero_tick_move_task_is_equivalent_to_stop() {
    let (rig, mut actuator) = homed_actuator(600, ActuatorCfg::default());
    actuator.set_speed(200, Direction::Forward).expect("drive");
    assert_eq!(rig.duty(), 200);
    actuator
        .set_move_task(0, Direction::Forward, 150)
        .expect("zero move");
    assert!(!actuator.is_moving());
    assert_eq!(rig.duty(), 0);
}

#[test]
fn exec_move_task_reasserts_commanded_outputs() {
    let (rig, mut actuator) = homed_actuator(600, ActuatorCfg::default());
    actuator
        .set_move_task(500, Direction::Forward, 180)
        .expect("arm");
    assert!(actuator.exec_move_task().expect("step"));
    assert_eq!(rig.duty(), 180);

    // Something external cuts the output; the next step restores it.
    rig.motor().set_output(0, Direction::Forward).expect("interfere");
    assert_eq!(rig.duty(), 0);
    assert!(actuator.exec_move_task().expect("step"));
    assert_eq!(rig.duty(), 180);
}

#[test]
fn blocking_move_timeout_forces_stop_and_reports_failure() {
    let (rig, mut actuator) = homed_actuator(600, ActuatorCfg::default());
    rig.set_dead(true);
    let err = actuator
        .blocking_move(400, Direction::Forward, 150, 100)
        .expect_err("no progress possible");
    assert!(matches!(
        err.downcast_ref::<ActuatorError>(),
        Some(ActuatorError::MoveTimeout(100))
    ));
    assert_eq!(rig.duty(), 0);
    assert!(!actuator.is_moving());
}

#[test]
fn external_movement_is_flagged_once_per_disturbance() {
    let (rig, mut actuator) = homed_actuator(600, ActuatorCfg::default());
    assert!(!actuator.detect_external_movement(25), "quiet shaft");

    rig.nudge(50);
    assert!(actuator.detect_external_movement(25), "drift must be flagged");
    assert!(
        !actuator.detect_external_movement(25),
        "reference updated; flagged once"
    );

    rig.nudge(10);
    assert!(
        !actuator.detect_external_movement(25),
        "drift below threshold is ignored"
    );
}
