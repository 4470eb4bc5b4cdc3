//! `vent` binary: config loading, logging setup, control-loop hosting.

mod cli;

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

use vent_core::mocks::SimRig;
use vent_core::{ActuatorCfg, Mode, TickCounter, WindowConfig};
use vent_hardware::DriftingSensors;

use crate::cli::{Cli, Commands, FILE_GUARD};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    match &args.cmd {
        Commands::CheckConfig => check_config(&args.config),
        Commands::Status => {
            let (cfg, from_file) = load_or_default(&args.config)?;
            init_tracing(args.json, &args.log_level, &cfg.logging);
            note_config_source(&args, from_file);
            status(&cfg, args.json)
        }
        Commands::Run {
            duration,
            skip_homing,
            mode,
        } => {
            let (cfg, from_file) = load_or_default(&args.config)?;
            init_tracing(args.json, &args.log_level, &cfg.logging);
            note_config_source(&args, from_file);
            run(&cfg, *duration, *skip_homing, mode.as_deref())
        }
    }
}

fn note_config_source(args: &Cli, from_file: bool) {
    if from_file {
        tracing::info!(path = %args.config.display(), "configuration loaded");
    } else {
        tracing::info!(
            path = %args.config.display(),
            "config file not found; using built-in defaults"
        );
    }
}

fn check_config(path: &Path) -> eyre::Result<()> {
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read config file {}", path.display()))?;
    let cfg = vent_config::load_toml(&content)
        .wrap_err_with(|| format!("cannot parse {}", path.display()))?;
    cfg.validate()
        .wrap_err_with(|| format!("invalid configuration in {}", path.display()))?;
    println!("{} OK", path.display());
    Ok(())
}

fn load_or_default(path: &Path) -> eyre::Result<(vent_config::Config, bool)> {
    if !path.exists() {
        return Ok((vent_config::Config::default(), false));
    }
    let content = fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read config file {}", path.display()))?;
    let cfg = vent_config::load_toml(&content)
        .wrap_err_with(|| format!("cannot parse {}", path.display()))?;
    cfg.validate()
        .wrap_err_with(|| format!("invalid configuration in {}", path.display()))?;
    Ok((cfg, true))
}

fn init_tracing(json: bool, level: &str, logging: &vent_config::Logging) {
    let default_level = logging.level.clone().unwrap_or_else(|| level.to_string());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Some(file) = &logging.file {
        let path = Path::new(file);
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let name = path
            .file_name()
            .map_or_else(|| std::ffi::OsString::from("vent.log"), |n| n.to_os_string());
        let appender = tracing_appender::rolling::never(dir, name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false);
        if json {
            let _ = builder.json().try_init();
        } else {
            let _ = builder.try_init();
        }
    } else {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr);
        if json {
            let _ = builder.json().try_init();
        } else {
            let _ = builder.try_init();
        }
    }
}

fn parse_mode(name: &str) -> eyre::Result<Mode> {
    match name {
        "manual" => Ok(Mode::Manual),
        "auto" => Ok(Mode::Auto),
        "binary" => Ok(Mode::Binary),
        "short-term" => Ok(Mode::ShortTerm),
        other => eyre::bail!("unknown mode `{other}` (manual|auto|binary|short-term)"),
    }
}

fn shutdown_flag() -> eyre::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler = Arc::clone(&flag);
    ctrlc::set_handler(move || handler.store(true, Ordering::Relaxed))
        .wrap_err("installing signal handler")?;
    Ok(flag)
}

fn status(cfg: &vent_config::Config, json: bool) -> eyre::Result<()> {
    let counter = TickCounter::new();
    // Physical travel slightly exceeds the configured span so the far stop
    // stays reachable from the backed-off datum.
    let physical = i64::from(cfg.actuator.travel_ticks) + 200;
    let rig = SimRig::new(&counter, physical, physical / 3, 2.0);
    let mut controller = vent_core::build_controller(
        rig.motor(),
        DriftingSensors::default(),
        counter,
        ActuatorCfg::from(cfg),
        WindowConfig::from(cfg),
        Arc::new(rig.clock()),
        Mode::from(cfg.modes.default_mode),
    )?;
    controller.home().wrap_err("simulated homing failed")?;
    controller.update_recent_data();
    let recent = controller.recent_data();

    if json {
        println!(
            "{}",
            serde_json::json!({
                "mode": format!("{:?}", controller.mode()),
                "position": recent.position,
                "position_fraction": controller.position_fraction(),
                "room_temp_c": recent.room_temp_c,
                "outside_temp_c": recent.outside_temp_c,
                "co2_ppm": recent.co2_ppm,
                "temperature_metric": recent.temperature_metric,
                "co2_metric": recent.co2_metric,
                "total_metric": recent.total_metric,
            })
        );
    } else {
        println!("mode:     {:?}", controller.mode());
        println!(
            "position: {}/{} ({:.0}% open)",
            recent.position,
            cfg.actuator.positions - 1,
            controller.position_fraction() * 100.0
        );
        println!(
            "sensors:  room {:?} °C, outside {:?} °C, CO2 {:?} ppm",
            recent.room_temp_c, recent.outside_temp_c, recent.co2_ppm
        );
        println!(
            "metric:   {:.1} (temp {:.1}, co2 {:.1})",
            recent.total_metric, recent.temperature_metric, recent.co2_metric
        );
    }
    Ok(())
}

fn run(
    cfg: &vent_config::Config,
    duration: Option<u64>,
    skip_homing: bool,
    mode: Option<&str>,
) -> eyre::Result<()> {
    let initial_mode = match mode {
        Some(name) => parse_mode(name)?,
        None => Mode::from(cfg.modes.default_mode),
    };

    #[cfg(all(feature = "hardware", target_os = "linux"))]
    {
        run_hardware(cfg, duration, skip_homing, initial_mode)
    }
    #[cfg(not(all(feature = "hardware", target_os = "linux")))]
    {
        run_simulated(cfg, duration, skip_homing, initial_mode)
    }
}

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn run_simulated(
    cfg: &vent_config::Config,
    duration: Option<u64>,
    skip_homing: bool,
    initial_mode: Mode,
) -> eyre::Result<()> {
    use vent_traits::Clock;

    let span_ms = duration.unwrap_or(3600).saturating_mul(1000);
    let counter = TickCounter::new();
    let physical = i64::from(cfg.actuator.travel_ticks) + 200;
    let rig = SimRig::new(&counter, physical, physical / 3, 2.0);
    let sensors = DriftingSensors::default();
    let feedback = sensors.clone();
    let mut controller = vent_core::build_controller(
        rig.motor(),
        sensors,
        counter,
        ActuatorCfg::from(cfg),
        WindowConfig::from(cfg),
        Arc::new(rig.clock()),
        initial_mode,
    )?;

    if skip_homing {
        tracing::warn!("homing skipped; discrete positions undefined until homed");
    } else {
        controller.home().wrap_err("homing failed")?;
    }

    tracing::info!(span_s = span_ms / 1000, "simulated session started (virtual time)");
    let clock = rig.clock();
    let period = Duration::from_millis(cfg.intervals.update_period_ms);
    let shutdown = shutdown_flag()?;
    let start = clock.now();
    while clock.ms_since(start) < span_ms && !shutdown.load(Ordering::Relaxed) {
        if let Err(e) = controller.update() {
            tracing::error!(error = %e, "update cycle failed");
        }
        // Close the simulation loop: ventilation follows the aperture.
        feedback.set_aperture(controller.position_fraction());
        clock.sleep(period);
    }

    let recent = controller.recent_data();
    println!(
        "session complete: mode {:?}, position {}/{}, metric {:.1}, CO2 {:?} ppm",
        controller.mode(),
        recent.position,
        cfg.actuator.positions - 1,
        recent.total_metric,
        recent.co2_ppm,
    );
    Ok(())
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn run_hardware(
    cfg: &vent_config::Config,
    duration: Option<u64>,
    skip_homing: bool,
    initial_mode: Mode,
) -> eyre::Result<()> {
    use vent_traits::MonotonicClock;

    let counter = TickCounter::new();
    let handle = counter.isr_handle();
    let _irq =
        vent_hardware::gpio::spawn_encoder_interrupt(cfg.pins.encoder, move || handle.pulse())
            .wrap_err("arming encoder interrupt")?;
    let motor = vent_hardware::gpio::GpioMotor::new(cfg.pins.motor_pwm, cfg.pins.motor_dir)
        .wrap_err("initializing motor pins")?;

    // Sensor-bus drivers (one-wire probes, CO2 UART framing) live outside
    // this binary; the drifting simulation stands in until one is wired up.
    tracing::warn!("hardware build uses simulated sensors; wire a real SensorHub here");
    let sensors = DriftingSensors::default();

    let mut controller = vent_core::build_controller(
        motor,
        sensors,
        counter,
        ActuatorCfg::from(cfg),
        WindowConfig::from(cfg),
        Arc::new(MonotonicClock::new()),
        initial_mode,
    )?;
    if !skip_homing {
        controller.home().wrap_err("homing failed")?;
    }

    let clock = MonotonicClock::new();
    let period = Duration::from_millis(cfg.intervals.update_period_ms);
    let shutdown = shutdown_flag()?;
    match duration {
        Some(secs) => vent_core::runner::run_for(
            &mut controller,
            &clock,
            period,
            Duration::from_secs(secs),
        ),
        None => vent_core::runner::run_until_shutdown(&mut controller, &clock, period, &shutdown),
    }
    Ok(())
}
