//! Raspberry Pi GPIO drivers (rppal, software PWM).

use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Trigger};
use vent_traits::{Direction, MotorDriver};

use crate::error::{HwError, Result};

const PWM_FREQ_HZ: f64 = 20_000.0;

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

/// H-bridge motor output: one software-PWM pin plus a direction pin.
pub struct GpioMotor {
    pwm: OutputPin,
    dir: OutputPin,
}

impl GpioMotor {
    pub fn new(pwm_pin: u8, dir_pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(gpio_err)?;
        let mut pwm = gpio.get(pwm_pin).map_err(gpio_err)?.into_output();
        let dir = gpio.get(dir_pin).map_err(gpio_err)?.into_output();
        pwm.set_low();
        tracing::info!(pwm_pin, dir_pin, "motor pins initialized");
        Ok(Self { pwm, dir })
    }
}

impl MotorDriver for GpioMotor {
    fn set_output(
        &mut self,
        duty: u8,
        direction: Direction,
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        match direction {
            Direction::Forward => self.dir.set_high(),
            Direction::Backward => self.dir.set_low(),
        }
        self.pwm
            .set_pwm_frequency(PWM_FREQ_HZ, f64::from(duty) / 255.0)
            .map_err(|e| Box::new(gpio_err(e)) as _)
    }

    fn stop(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        // The direction pin is deliberately left as-is.
        self.pwm.clear_pwm().map_err(|e| Box::new(gpio_err(e)) as _)?;
        self.pwm.set_low();
        Ok(())
    }
}

/// Keeps the encoder input pin (and its interrupt registration) alive.
pub struct EncoderInterrupt {
    _pin: InputPin,
}

/// Wire a rising-edge GPIO interrupt to the encoder pulse callback.
///
/// `on_pulse` runs in interrupt context: it must only bump the tick counter.
pub fn spawn_encoder_interrupt<F>(pin: u8, mut on_pulse: F) -> Result<EncoderInterrupt>
where
    F: FnMut() + Send + 'static,
{
    let gpio = Gpio::new().map_err(gpio_err)?;
    let mut input = gpio.get(pin).map_err(gpio_err)?.into_input_pullup();
    input
        .set_async_interrupt(Trigger::RisingEdge, move |_level: Level| on_pulse())
        .map_err(gpio_err)?;
    tracing::info!(pin, "encoder interrupt armed");
    Ok(EncoderInterrupt { _pin: input })
}
