//! Board-level logic of the all-pins-high bring-up fixture.
//!
//! The pin plan, the STM32F4 register sequences and the boot procedure live
//! here so that the firmware and the host simulator execute the same code;
//! only the `Registers` backend differs.

#![cfg_attr(not(test), no_std)]

pub mod boot;
pub mod hal;
pub mod mmio;
pub mod pins;
pub mod plan;
pub mod regs;

pub use boot::{BootInitializer, BootState, Idle};
pub use hal::{GpioHal, Registers, Stm32Gpio};
pub use mmio::Mmio;
pub use pins::{Mode, OutputType, PinConfig, Pins, Port, Pull, Speed};
pub use plan::{bank_plan, BankPlan, ClockChoice, CLOCK, DEBUG_PINS, PIN_PLAN};
