use crate::peripherals::gpio::GpioPort;
use allhigh_board::PinConfig;
use allhigh_config::SysclkSource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PinReport {
    pub pin: u8,
    pub mode: String,
    pub output_type: String,
    pub pull: String,
    pub speed: String,
    pub high: bool,
}

/// Observable state of one port bank.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BankReport {
    pub port: String,
    /// Pins currently configured as push-pull output, no pull, low speed.
    pub configured: u16,
    /// Pins actively driving a high level.
    pub driven_high: u16,
    pub pins: Vec<PinReport>,
}

impl BankReport {
    pub fn from_gpio(gpio: &GpioPort) -> Self {
        let mut configured = 0u16;
        let mut driven_high = 0u16;
        let mut pins = Vec::with_capacity(16);

        for n in 0..16u8 {
            let state = gpio.pin(n);
            if state.matches(&PinConfig::PUSH_PULL_OUTPUT) {
                configured |= 1 << n;
            }
            if gpio.is_driven_high(n) {
                driven_high |= 1 << n;
            }
            pins.push(PinReport {
                pin: n,
                mode: state.mode.as_str().to_string(),
                output_type: state.output_type.as_str().to_string(),
                pull: state.pull.map_or("reserved", |p| p.as_str()).to_string(),
                speed: state.speed.as_str().to_string(),
                high: gpio.level(n),
            });
        }

        Self {
            port: gpio.port().to_string(),
            configured,
            driven_high,
            pins,
        }
    }
}

#[derive(Serialize, Deserialize, Debug)]
pub struct MachineSnapshot {
    pub state: String,
    pub boots: u32,
    pub sysclk_source: Option<SysclkSource>,
    pub banks: Vec<BankReport>,
    pub peripherals: BTreeMap<String, serde_json::Value>,
}
