pub mod bus;
pub mod metrics;
pub mod peripherals;
pub mod snapshot;

use allhigh_board::{BootInitializer, BootState, Stm32Gpio};
use std::any::Any;
use std::sync::Arc;


#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    #[error("Memory access violation at {0:#x}")]
    MemoryViolation(u64),
    #[error("Access to {peripheral} at {addr:#x} while its clock is gated")]
    ClockGated { peripheral: String, addr: u64 },
}

pub type SimResult<T> = Result<T, SimulationError>;

/// Trait for observing simulation events in a modular way.
pub trait SimulationObserver: std::fmt::Debug + Send + Sync {
    fn on_boot_start(&self) {}
    fn on_boot_complete(&self) {}
    fn on_register_read(&self, _addr: u32, _value: u32) {}
    fn on_register_write(&self, _addr: u32, _value: u32) {}
}

/// Trait representing a memory-mapped peripheral
pub trait Peripheral: std::fmt::Debug + Send {
    fn read(&self, offset: u64) -> SimResult<u8>;
    fn write(&mut self, offset: u64, value: u8) -> SimResult<()>;

    /// Word store. Peripherals with write-only trigger registers override this
    /// so the word lands as one access.
    fn write_u32(&mut self, offset: u64, value: u32) -> SimResult<()> {
        for i in 0..4 {
            self.write(offset + i, ((value >> (i * 8)) & 0xFF) as u8)?;
        }
        Ok(())
    }

    /// Return to hardware reset values.
    fn reset(&mut self) {}
    fn as_any(&self) -> Option<&dyn Any> {
        None
    }
    fn snapshot(&self) -> serde_json::Value {
        serde_json::Value::Null
    }
}

/// Trait representing the system bus
pub trait Bus {
    fn read_u8(&self, addr: u64) -> SimResult<u8>;
    fn write_u8(&mut self, addr: u64, value: u8) -> SimResult<()>;

    fn read_u16(&self, addr: u64) -> SimResult<u16> {
        let b0 = self.read_u8(addr)? as u16;
        let b1 = self.read_u8(addr + 1)? as u16;
        // Little Endian
        Ok(b0 | (b1 << 8))
    }

    fn read_u32(&self, addr: u64) -> SimResult<u32> {
        let b0 = self.read_u8(addr)? as u32;
        let b1 = self.read_u8(addr + 1)? as u32;
        let b2 = self.read_u8(addr + 2)? as u32;
        let b3 = self.read_u8(addr + 3)? as u32;
        Ok(b0 | (b1 << 8) | (b2 << 16) | (b3 << 24))
    }

    fn write_u32(&mut self, addr: u64, value: u32) -> SimResult<()> {
        self.write_u8(addr, (value & 0xFF) as u8)?;
        self.write_u8(addr + 1, ((value >> 8) & 0xFF) as u8)?;
        self.write_u8(addr + 2, ((value >> 16) & 0xFF) as u8)?;
        self.write_u8(addr + 3, ((value >> 24) & 0xFF) as u8)?;
        Ok(())
    }

    fn write_u16(&mut self, addr: u64, value: u16) -> SimResult<()> {
        self.write_u8(addr, (value & 0xFF) as u8)?;
        self.write_u8(addr + 1, ((value >> 8) & 0xFF) as u8)?;
        Ok(())
    }
}

/// Simulated board: the bus plus the boot state of the firmware running on it.
pub struct Machine {
    pub bus: bus::SystemBus,
    pub observers: Vec<Arc<dyn SimulationObserver>>,
    state: BootState,
    boots: u32,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Self::with_bus(bus::SystemBus::new())
    }

    pub fn with_bus(bus: bus::SystemBus) -> Self {
        Self {
            bus,
            observers: Vec::new(),
            state: BootState::Uninitialized,
            boots: 0,
        }
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    /// Number of times the boot procedure has run to completion.
    pub fn boot_count(&self) -> u32 {
        self.boots
    }

    /// Run the boot procedure from the current register state.
    ///
    /// Once idle, the firmware spins forever; calling this again does nothing
    /// until `reset`.
    pub fn power_on(&mut self) -> SimResult<()> {
        if self.state == BootState::Idle {
            tracing::debug!("Machine already idle; configuration only re-runs after reset");
            return Ok(());
        }

        for observer in &self.observers {
            observer.on_boot_start();
        }

        let regs = bus::BusRegisters::new(&mut self.bus, &self.observers);
        let idle = BootInitializer::new(Stm32Gpio::new(regs)).run()?;
        self.state = idle.state();
        self.boots += 1;

        for observer in &self.observers {
            observer.on_boot_complete();
        }
        tracing::info!("Boot #{} complete; firmware idle", self.boots);
        Ok(())
    }

    /// Hardware reset: every peripheral back to reset values, then boot again.
    pub fn reset(&mut self) -> SimResult<()> {
        tracing::debug!("Hardware reset");
        self.bus.reset();
        self.state = BootState::Uninitialized;
        self.power_on()
    }

    pub fn pin_report(&self) -> Vec<snapshot::BankReport> {
        let mut banks: Vec<_> = self
            .bus
            .gpio_ports()
            .map(snapshot::BankReport::from_gpio)
            .collect();
        banks.sort_by(|a, b| a.port.cmp(&b.port));
        banks
    }

    pub fn snapshot(&self) -> snapshot::MachineSnapshot {
        snapshot::MachineSnapshot {
            state: self.state.as_str().to_string(),
            boots: self.boots,
            sysclk_source: self.bus.rcc().and_then(|rcc| rcc.sysclk_source()),
            banks: self.pin_report(),
            peripherals: self
                .bus
                .peripherals
                .iter()
                .map(|p| (p.name.clone(), p.dev.snapshot()))
                .collect(),
        }
    }
}
