#![no_main]
#![no_std]

use allhigh_board::{BootInitializer, Mmio, Stm32Gpio};
use cortex_m_rt::entry;
use panic_halt as _;

#[entry]
fn main() -> ! {
    // SAFETY: first and only code to run after reset; nothing else owns RCC or GPIO.
    let regs = unsafe { Mmio::new() };

    let idle = match BootInitializer::new(Stm32Gpio::new(regs)).run() {
        Ok(idle) => idle,
        Err(never) => match never {},
    };

    idle.idle()
}
