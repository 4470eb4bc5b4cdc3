use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ActuatorError {
    #[error("move timed out after {0} ms")]
    MoveTimeout(u64),
    #[error("homing stalled: no encoder movement even at escalated duty")]
    HomingStall,
    #[error("homing exceeded the {0} ms ceiling")]
    HomingTimeout(u64),
    #[error("position {index} out of range 0..={max}")]
    PositionOutOfRange { index: u8, max: u8 },
    #[error("position reference not established; home the axis first")]
    NotHomed,
    #[error("motor driver error: {0}")]
    Driver(String),
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("missing motor driver")]
    MissingMotor,
    #[error("missing sensor hub")]
    MissingSensors,
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
