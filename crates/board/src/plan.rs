use crate::pins::{PinConfig, Pins, Port};

/// PA13 (SWDIO) and PA14 (SWCLK). Reconfiguring either one drops the debug probe.
pub const DEBUG_PINS: Pins = Pins::PIN13.union(Pins::PIN14);

/// Desired state of one port bank: every pin except `reserved` becomes a
/// push-pull output driven high.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankPlan {
    pub port: Port,
    pub reserved: Pins,
}

impl BankPlan {
    pub const fn full(port: Port) -> Self {
        Self {
            port,
            reserved: Pins::empty(),
        }
    }

    pub const fn excluding(port: Port, reserved: Pins) -> Self {
        Self { port, reserved }
    }

    /// Pins the boot procedure touches.
    pub const fn mask(&self) -> Pins {
        Pins::all().difference(self.reserved)
    }

    pub const fn config(&self) -> PinConfig {
        PinConfig::PUSH_PULL_OUTPUT
    }
}

/// Applied in this order at boot.
pub const PIN_PLAN: [BankPlan; 5] = [
    BankPlan::excluding(Port::A, DEBUG_PINS),
    BankPlan::full(Port::B),
    BankPlan::full(Port::C),
    BankPlan::full(Port::D),
    BankPlan::full(Port::E),
];

pub fn bank_plan(port: Port) -> &'static BankPlan {
    // PIN_PLAN is indexed by port.
    &PIN_PLAN[port.index() as usize]
}

/// Clock tree the firmware runs on.
///
/// The boot procedure never touches RCC clock sources; the core keeps running
/// from whatever reset selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockChoice {
    /// Internal 16 MHz HSI, selected by hardware after reset.
    HardwareDefault,
}

impl ClockChoice {
    pub const fn sysclk_hz(self) -> u32 {
        match self {
            ClockChoice::HardwareDefault => 16_000_000,
        }
    }
}

pub const CLOCK: ClockChoice = ClockChoice::HardwareDefault;
