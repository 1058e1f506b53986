use crate::peripherals::gpio::GpioPort;
use crate::peripherals::rcc::Rcc;
use crate::{Bus, Peripheral, SimResult, SimulationError, SimulationObserver};
use allhigh_board::regs::{gpio_base, GPIO_STRIDE, RCC_BASE};
use allhigh_board::{Port, Registers};
use allhigh_config::{parse_size, ChipDescriptor};
use anyhow::Context;
use std::sync::Arc;

const DEFAULT_WINDOW: u64 = 0x400;
/// Cortex-M address space.
const ADDRESS_SPACE_END: u64 = 1 << 32;

pub struct PeripheralEntry {
    pub name: String,
    pub base: u64,
    pub size: u64,
    /// RCC AHB1ENR bit that must be set before the peripheral responds.
    pub clock_gate: Option<u32>,
    pub dev: Box<dyn Peripheral>,
}

impl PeripheralEntry {
    fn contains(&self, addr: u64) -> bool {
        addr >= self.base && addr - self.base < self.size
    }

    fn overlaps(&self, base: u64, end: u64) -> bool {
        base < self.base + self.size && self.base < end
    }
}

pub struct SystemBus {
    pub peripherals: Vec<PeripheralEntry>,
}

impl Default for SystemBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemBus {
    /// STM32F407 map: RCC plus GPIOA..GPIOE, each GPIO gated by its AHB1ENR bit.
    pub fn new() -> Self {
        let mut peripherals = vec![PeripheralEntry {
            name: "rcc".to_string(),
            base: RCC_BASE as u64,
            size: DEFAULT_WINDOW,
            clock_gate: None,
            dev: Box::new(Rcc::new()),
        }];
        for port in Port::ALL {
            peripherals.push(PeripheralEntry {
                name: port.name().to_string(),
                base: gpio_base(port) as u64,
                size: GPIO_STRIDE as u64,
                clock_gate: Some(port.index() as u32),
                dev: Box::new(GpioPort::new(port)),
            });
        }
        Self { peripherals }
    }

    pub fn from_config(chip: &ChipDescriptor) -> anyhow::Result<Self> {
        let mut bus = Self {
            peripherals: Vec::new(),
        };

        for p_cfg in &chip.peripherals {
            let dev: Box<dyn Peripheral> = match p_cfg.r#type.as_str() {
                "rcc" => Box::new(Rcc::new()),
                "gpio" => {
                    let label = p_cfg
                        .config
                        .get("port")
                        .and_then(|v| v.as_str())
                        .unwrap_or(&p_cfg.id);
                    let port: Port = label.parse().map_err(|e| {
                        anyhow::anyhow!(
                            "Cannot determine port for gpio peripheral '{}': {}",
                            p_cfg.id,
                            e
                        )
                    })?;
                    Box::new(GpioPort::new(port))
                }
                other => {
                    tracing::warn!(
                        "Unsupported peripheral type '{}' for id '{}'; skipping",
                        other,
                        p_cfg.id
                    );
                    continue;
                }
            };

            let size = match &p_cfg.size {
                Some(size) => parse_size(size)
                    .with_context(|| format!("Invalid size for peripheral '{}'", p_cfg.id))?,
                None => DEFAULT_WINDOW,
            };

            if let Some(bit) = p_cfg.clock_gate {
                if bit >= 32 {
                    anyhow::bail!(
                        "Clock gate bit {} for peripheral '{}' is out of range",
                        bit,
                        p_cfg.id
                    );
                }
            }

            let end = p_cfg
                .base_address
                .checked_add(size)
                .filter(|&end| end <= ADDRESS_SPACE_END)
                .ok_or_else(|| {
                    anyhow::anyhow!(
                        "Peripheral '{}' window {:#x} + {:#x} runs past the 32-bit address space",
                        p_cfg.id,
                        p_cfg.base_address,
                        size
                    )
                })?;
            if let Some(other) = bus
                .peripherals
                .iter()
                .find(|p| p.overlaps(p_cfg.base_address, end))
            {
                anyhow::bail!(
                    "Peripheral '{}' at {:#x}..{:#x} overlaps '{}'",
                    p_cfg.id,
                    p_cfg.base_address,
                    end,
                    other.name
                );
            }

            tracing::debug!(
                "Mapped {} ({}) at {:#x}..{:#x}",
                p_cfg.id,
                p_cfg.r#type,
                p_cfg.base_address,
                end
            );
            bus.peripherals.push(PeripheralEntry {
                name: p_cfg.id.clone(),
                base: p_cfg.base_address,
                size,
                clock_gate: p_cfg.clock_gate,
                dev,
            });
        }

        Ok(bus)
    }

    /// Hardware reset of every mapped peripheral.
    pub fn reset(&mut self) {
        for p in &mut self.peripherals {
            p.dev.reset();
        }
    }

    pub fn rcc(&self) -> Option<&Rcc> {
        self.peripherals
            .iter()
            .find_map(|p| p.dev.as_any()?.downcast_ref::<Rcc>())
    }

    pub fn gpio_ports(&self) -> impl Iterator<Item = &GpioPort> {
        self.peripherals
            .iter()
            .filter_map(|p| p.dev.as_any()?.downcast_ref::<GpioPort>())
    }

    pub fn gpio(&self, port: Port) -> Option<&GpioPort> {
        self.gpio_ports().find(|g| g.port() == port)
    }

    fn find(&self, addr: u64) -> SimResult<usize> {
        let idx = self
            .peripherals
            .iter()
            .position(|p| p.contains(addr))
            .ok_or(SimulationError::MemoryViolation(addr))?;

        // A bus without an RCC has no gates to honour.
        let entry = &self.peripherals[idx];
        if let (Some(bit), Some(rcc)) = (entry.clock_gate, self.rcc()) {
            if !rcc.is_gate_enabled(bit) {
                return Err(SimulationError::ClockGated {
                    peripheral: entry.name.clone(),
                    addr,
                });
            }
        }
        Ok(idx)
    }
}

impl Bus for SystemBus {
    fn read_u8(&self, addr: u64) -> SimResult<u8> {
        let idx = self.find(addr)?;
        let p = &self.peripherals[idx];
        p.dev.read(addr - p.base)
    }

    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()> {
        let idx = self.find(addr)?;
        let p = &mut self.peripherals[idx];
        p.dev.write(addr - p.base, value)
    }

    fn write_u32(&mut self, addr: u64, value: u32) -> SimResult<()> {
        let idx = self.find(addr)?;
        let p = &mut self.peripherals[idx];
        if p.size - (addr - p.base) >= 4 {
            return p.dev.write_u32(addr - p.base, value);
        }
        // Straddles a window edge: fall back to byte lanes.
        for i in 0..4 {
            self.write_u8(addr + i, ((value >> (i * 8)) & 0xFF) as u8)?;
        }
        Ok(())
    }
}

/// Firmware register accesses routed through the simulated bus.
pub struct BusRegisters<'a> {
    bus: &'a mut dyn Bus,
    observers: &'a [Arc<dyn SimulationObserver>],
}

impl<'a> BusRegisters<'a> {
    pub fn new(bus: &'a mut dyn Bus, observers: &'a [Arc<dyn SimulationObserver>]) -> Self {
        Self { bus, observers }
    }
}

impl Registers for BusRegisters<'_> {
    type Error = SimulationError;

    fn read(&mut self, addr: u32) -> SimResult<u32> {
        let value = self.bus.read_u32(addr as u64)?;
        tracing::debug!("read  {:#010x} -> {:#010x}", addr, value);
        for observer in self.observers {
            observer.on_register_read(addr, value);
        }
        Ok(value)
    }

    fn write(&mut self, addr: u32, value: u32) -> SimResult<()> {
        tracing::debug!("write {:#010x} <- {:#010x}", addr, value);
        self.bus.write_u32(addr as u64, value)?;
        for observer in self.observers {
            observer.on_register_write(addr, value);
        }
        Ok(())
    }
}
