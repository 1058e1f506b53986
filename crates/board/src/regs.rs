//! STM32F4 register map for the blocks the boot procedure touches.

use crate::pins::Port;

pub const RCC_BASE: u32 = 0x4002_3800;
pub const RCC_CR: u32 = 0x00;
pub const RCC_CFGR: u32 = 0x08;
pub const RCC_AHB1ENR: u32 = 0x30;

pub const GPIO_BASE: u32 = 0x4002_0000;
pub const GPIO_STRIDE: u32 = 0x400;

pub const GPIO_MODER: u32 = 0x00;
pub const GPIO_OTYPER: u32 = 0x04;
pub const GPIO_OSPEEDR: u32 = 0x08;
pub const GPIO_PUPDR: u32 = 0x0C;
pub const GPIO_IDR: u32 = 0x10;
pub const GPIO_ODR: u32 = 0x14;
pub const GPIO_BSRR: u32 = 0x18;
pub const GPIO_LCKR: u32 = 0x1C;
pub const GPIO_AFRL: u32 = 0x20;
pub const GPIO_AFRH: u32 = 0x24;

pub const fn gpio_base(port: Port) -> u32 {
    GPIO_BASE + GPIO_STRIDE * port.index() as u32
}

/// GPIOxEN bit in RCC AHB1ENR.
pub const fn gpio_clock_bit(port: Port) -> u32 {
    1 << port.index()
}
