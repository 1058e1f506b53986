use crate::hal::GpioHal;
use crate::plan::{ClockChoice, CLOCK, PIN_PLAN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootState {
    Uninitialized,
    Idle,
}

impl BootState {
    pub const fn as_str(self) -> &'static str {
        match self {
            BootState::Uninitialized => "uninitialized",
            BootState::Idle => "idle",
        }
    }
}

/// One-shot reset sequence: default clock, then every bank of `PIN_PLAN`
/// driven high.
///
/// `run` consumes the initializer, so the configuration step can only be
/// entered again by building a new one, i.e. after a reset.
pub struct BootInitializer<G> {
    gpio: G,
}

impl<G: GpioHal> BootInitializer<G> {
    pub fn new(gpio: G) -> Self {
        Self { gpio }
    }

    pub fn state(&self) -> BootState {
        BootState::Uninitialized
    }

    pub fn run(mut self) -> Result<Idle<G>, G::Error> {
        self.initialize_clock();
        self.initialize_outputs()?;
        Ok(Idle { gpio: self.gpio })
    }

    fn initialize_clock(&mut self) -> ClockChoice {
        match CLOCK {
            ClockChoice::HardwareDefault => {}
        }
        CLOCK
    }

    fn initialize_outputs(&mut self) -> Result<(), G::Error> {
        for bank in &PIN_PLAN {
            self.gpio.enable_port_clock(bank.port)?;
            let mask = bank.mask();
            self.gpio.configure_pins(bank.port, mask, bank.config())?;
            self.gpio.set_pins_high(bank.port, mask)?;
        }
        Ok(())
    }
}

/// Terminal state. Held until an external reset.
pub struct Idle<G> {
    gpio: G,
}

impl<G> Idle<G> {
    pub fn state(&self) -> BootState {
        BootState::Idle
    }

    pub fn hal(&self) -> &G {
        &self.gpio
    }

    pub fn into_hal(self) -> G {
        self.gpio
    }

    /// Spin forever. No sleep, no watchdog, no interrupt dispatch.
    #[allow(clippy::empty_loop)]
    pub fn idle(self) -> ! {
        loop {}
    }
}
