use crate::hal::Registers;
use core::convert::Infallible;

/// Volatile access to the physical register file.
///
/// Register accesses cannot fail from software's point of view: a pin shorted
/// to a rail or a wrong address is an electrical problem the core never sees.
/// That limitation is carried in the type: `Error = Infallible`.
#[derive(Debug)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// # Safety
    ///
    /// The caller must run on an STM32F4 and be the only code touching RCC and
    /// GPIOA..GPIOE for as long as the returned value is in use.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl Registers for Mmio {
    type Error = Infallible;

    fn read(&mut self, addr: u32) -> Result<u32, Infallible> {
        // SAFETY: `addr` comes from the register map; exclusivity per `Mmio::new`.
        Ok(unsafe { core::ptr::read_volatile(addr as *const u32) })
    }

    fn write(&mut self, addr: u32, value: u32) -> Result<(), Infallible> {
        // SAFETY: see `read`.
        unsafe { core::ptr::write_volatile(addr as *mut u32, value) };
        Ok(())
    }
}
