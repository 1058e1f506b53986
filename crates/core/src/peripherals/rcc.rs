use crate::SimResult;
use allhigh_board::regs::{RCC_AHB1ENR, RCC_CFGR, RCC_CR};
use allhigh_config::SysclkSource;

const CR_RESET: u32 = 0x0000_0083; // HSION | HSIRDY, HSITRIM = 16
const AHB1ENR_RESET: u32 = 0x0010_0000; // CCMDATARAMEN

const CR_HSION: u32 = 1 << 0;
const CR_HSIRDY: u32 = 1 << 1;
const CR_HSEON: u32 = 1 << 16;
const CR_HSERDY: u32 = 1 << 17;
const CR_PLLON: u32 = 1 << 24;
const CR_PLLRDY: u32 = 1 << 25;

/// Minimal STM32F4 RCC: clock source control, SYSCLK switch and the AHB1
/// clock gates. Oscillators become ready the moment they are switched on.
#[derive(Debug, serde::Serialize)]
pub struct Rcc {
    cr: u32,
    cfgr: u32,
    ahb1enr: u32,
}

impl Default for Rcc {
    fn default() -> Self {
        Self::new()
    }
}

impl Rcc {
    pub fn new() -> Self {
        Self {
            cr: CR_RESET,
            cfgr: 0,
            ahb1enr: AHB1ENR_RESET,
        }
    }

    pub fn ahb1enr(&self) -> u32 {
        self.ahb1enr
    }

    pub fn is_gate_enabled(&self, bit: u32) -> bool {
        bit < 32 && self.ahb1enr & (1 << bit) != 0
    }

    /// SYSCLK source as reported by CFGR.SWS; `None` for the reserved encoding.
    pub fn sysclk_source(&self) -> Option<SysclkSource> {
        match (self.cfgr >> 2) & 0b11 {
            0b00 => Some(SysclkSource::Hsi),
            0b01 => Some(SysclkSource::Hse),
            0b10 => Some(SysclkSource::Pll),
            _ => None,
        }
    }

    fn read_reg(&self, offset: u64) -> u32 {
        match offset as u32 {
            RCC_CR => self.cr,
            RCC_CFGR => self.cfgr,
            RCC_AHB1ENR => self.ahb1enr,
            _ => 0,
        }
    }

    fn write_reg(&mut self, offset: u64, value: u32) {
        match offset as u32 {
            RCC_CR => {
                let ready = CR_HSIRDY | CR_HSERDY | CR_PLLRDY;
                let mut cr = value & !ready;
                let pairs = [
                    (CR_HSION, CR_HSIRDY),
                    (CR_HSEON, CR_HSERDY),
                    (CR_PLLON, CR_PLLRDY),
                ];
                for (on, rdy) in pairs {
                    if cr & on != 0 {
                        cr |= rdy;
                    }
                }
                self.cr = cr;
            }
            RCC_CFGR => {
                // SWS (bits 3:2) follows SW (bits 1:0) immediately.
                let sw = value & 0b11;
                self.cfgr = (value & !0b1100) | (sw << 2);
            }
            RCC_AHB1ENR => {
                if value != self.ahb1enr {
                    tracing::debug!("RCC: AHB1ENR {:#010x} -> {:#010x}", self.ahb1enr, value);
                }
                self.ahb1enr = value;
            }
            _ => {}
        }
    }
}

impl crate::Peripheral for Rcc {
    fn read(&self, offset: u64) -> SimResult<u8> {
        let reg_offset = offset & !3;
        let byte_offset = (offset % 4) as u32;
        let reg_val = self.read_reg(reg_offset);
        Ok(((reg_val >> (byte_offset * 8)) & 0xFF) as u8)
    }

    fn write(&mut self, offset: u64, value: u8) -> SimResult<()> {
        let reg_offset = offset & !3;
        let byte_offset = (offset % 4) as u32;
        let mut reg_val = self.read_reg(reg_offset);

        let mask = 0xFF << (byte_offset * 8);
        reg_val &= !mask;
        reg_val |= (value as u32) << (byte_offset * 8);

        self.write_reg(reg_offset, reg_val);
        Ok(())
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn as_any(&self) -> Option<&dyn std::any::Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
