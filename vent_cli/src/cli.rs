//! CLI argument definitions and shared statics.

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::OnceLock;

pub static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(name = "vent", version, about = "Autonomous window vent controller")]
pub struct Cli {
    /// Path to config TOML (built-in defaults when absent)
    #[arg(long, value_name = "FILE", default_value = "etc/vent.toml")]
    pub config: PathBuf,

    /// Log as JSON lines instead of pretty
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,

    /// Console log level (error|warn|info|debug|trace)
    #[arg(long = "log-level", value_name = "LEVEL", default_value = "info")]
    pub log_level: String,

    /// Command to execute
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the control loop. Default builds drive a simulated rig in
    /// accelerated virtual time; `--features hardware` drives GPIO.
    Run {
        /// Session length in (virtual) seconds; simulated runs default to 3600
        #[arg(long, value_name = "SECS")]
        duration: Option<u64>,

        /// Skip the homing pass (bench rigs with no end stop)
        #[arg(long, action = ArgAction::SetTrue)]
        skip_homing: bool,

        /// Starting mode: manual|auto|binary|short-term (default from config)
        #[arg(long, value_name = "MODE")]
        mode: Option<String>,
    },
    /// Print one snapshot of the simulated rig and exit
    Status,
    /// Validate a config file and report the first violation
    CheckConfig,
}
