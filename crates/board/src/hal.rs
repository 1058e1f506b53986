use crate::pins::{PinConfig, Pins, Port};
use crate::regs::*;

/// Word-wide access to the memory-mapped register file.
pub trait Registers {
    type Error;

    fn read(&mut self, addr: u32) -> Result<u32, Self::Error>;
    fn write(&mut self, addr: u32, value: u32) -> Result<(), Self::Error>;

    fn modify<F>(&mut self, addr: u32, f: F) -> Result<(), Self::Error>
    where
        F: FnOnce(u32) -> u32,
    {
        let current = self.read(addr)?;
        self.write(addr, f(current))
    }
}

/// The three primitives the boot procedure needs from the hardware.
pub trait GpioHal {
    type Error;

    /// Ungate the bank's peripheral clock. Must precede any other access to the bank.
    fn enable_port_clock(&mut self, port: Port) -> Result<(), Self::Error>;

    /// Apply `config` to exactly `pins`; every other pin keeps its current setting.
    fn configure_pins(&mut self, port: Port, pins: Pins, config: PinConfig)
        -> Result<(), Self::Error>;

    fn set_pins_high(&mut self, port: Port, pins: Pins) -> Result<(), Self::Error>;
}

/// `GpioHal` expressed as STM32F4 RCC/GPIO register sequences.
#[derive(Debug)]
pub struct Stm32Gpio<R> {
    regs: R,
}

impl<R: Registers> Stm32Gpio<R> {
    pub fn new(regs: R) -> Self {
        Self { regs }
    }

    pub fn registers(&self) -> &R {
        &self.regs
    }

    pub fn into_inner(self) -> R {
        self.regs
    }
}

/// Mask and value for a `width`-bit field repeated for every pin in `pins`.
fn fields(pins: Pins, width: u32, value: u32) -> (u32, u32) {
    let field = (1u32 << width) - 1;
    pins.indices().fold((0, 0), |(mask, bits), n| {
        let shift = n as u32 * width;
        (mask | field << shift, bits | (value & field) << shift)
    })
}

impl<R: Registers> GpioHal for Stm32Gpio<R> {
    type Error = R::Error;

    fn enable_port_clock(&mut self, port: Port) -> Result<(), R::Error> {
        let enr = RCC_BASE + RCC_AHB1ENR;
        self.regs.modify(enr, |v| v | gpio_clock_bit(port))?;
        // Read back: the gate needs a bus cycle before the first GPIO access.
        self.regs.read(enr)?;
        Ok(())
    }

    fn configure_pins(
        &mut self,
        port: Port,
        pins: Pins,
        config: PinConfig,
    ) -> Result<(), R::Error> {
        let base = gpio_base(port);

        let (mask, bits) = fields(pins, 2, config.speed.bits());
        self.regs.modify(base + GPIO_OSPEEDR, |v| (v & !mask) | bits)?;

        let (mask, bits) = fields(pins, 1, config.output_type.bits());
        self.regs.modify(base + GPIO_OTYPER, |v| (v & !mask) | bits)?;

        let (mask, bits) = fields(pins, 2, config.pull.bits());
        self.regs.modify(base + GPIO_PUPDR, |v| (v & !mask) | bits)?;

        // Mode last so the driver only turns on once type/speed/pull are settled.
        let (mask, bits) = fields(pins, 2, config.mode.bits());
        self.regs.modify(base + GPIO_MODER, |v| (v & !mask) | bits)
    }

    fn set_pins_high(&mut self, port: Port, pins: Pins) -> Result<(), R::Error> {
        // BSRR low half: set bits, untouched pins are unaffected.
        self.regs.write(gpio_base(port) + GPIO_BSRR, pins.bits() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pins::{Mode, Pull, Speed};
    use std::collections::BTreeMap;

    /// Flat register file with a write log.
    #[derive(Default)]
    struct FakeRegisters {
        values: BTreeMap<u32, u32>,
        writes: Vec<(u32, u32)>,
    }

    impl Registers for FakeRegisters {
        type Error = ();

        fn read(&mut self, addr: u32) -> Result<u32, ()> {
            Ok(self.values.get(&addr).copied().unwrap_or(0))
        }

        fn write(&mut self, addr: u32, value: u32) -> Result<(), ()> {
            self.writes.push((addr, value));
            self.values.insert(addr, value);
            Ok(())
        }
    }

    #[test]
    fn test_fields_spread() {
        let (mask, bits) = fields(Pins::PIN0 | Pins::PIN15, 2, 0b01);
        assert_eq!(mask, 0xC000_0003);
        assert_eq!(bits, 0x4000_0001);

        let (mask, bits) = fields(Pins::all(), 1, 0);
        assert_eq!(mask, 0xFFFF);
        assert_eq!(bits, 0);
    }

    #[test]
    fn test_enable_clock_sets_bit_and_reads_back() {
        let mut regs = FakeRegisters::default();
        regs.values.insert(RCC_BASE + RCC_AHB1ENR, 0x0010_0000);
        let mut gpio = Stm32Gpio::new(regs);

        gpio.enable_port_clock(Port::C).unwrap();
        gpio.enable_port_clock(Port::A).unwrap();

        let regs = gpio.into_inner();
        assert_eq!(regs.values[&(RCC_BASE + RCC_AHB1ENR)], 0x0010_0005);
    }

    #[test]
    fn test_configure_preserves_unmasked_fields() {
        let base = gpio_base(Port::A);
        let mut regs = FakeRegisters::default();
        // PA13/PA14/PA15 alternate function, PA13 pull-up, PA14 pull-down.
        regs.values.insert(base + GPIO_MODER, 0xA800_0000);
        regs.values.insert(base + GPIO_PUPDR, 0x6400_0000);
        regs.values.insert(base + GPIO_OSPEEDR, 0x0C00_0000);
        let mut gpio = Stm32Gpio::new(regs);

        let pins = Pins::all().difference(Pins::PIN13 | Pins::PIN14);
        gpio.configure_pins(Port::A, pins, PinConfig::PUSH_PULL_OUTPUT)
            .unwrap();

        let regs = gpio.into_inner();
        let moder = regs.values[&(base + GPIO_MODER)];
        let pupdr = regs.values[&(base + GPIO_PUPDR)];
        let ospeedr = regs.values[&(base + GPIO_OSPEEDR)];

        // PA15 reprogrammed, PA13/PA14 untouched.
        assert_eq!(moder, 0x6800_0000 | 0x0055_5555 | 0x0100_0000);
        assert_eq!(Mode::from_bits(moder >> 26), Mode::Alternate);
        assert_eq!(Mode::from_bits(moder >> 28), Mode::Alternate);
        assert_eq!(Mode::from_bits(moder >> 30), Mode::Output);
        assert_eq!(Pull::from_bits(pupdr >> 26), Some(Pull::Up));
        assert_eq!(Pull::from_bits(pupdr >> 28), Some(Pull::Down));
        assert_eq!(pupdr & 0xC3FF_FFFF, 0);
        assert_eq!(Speed::from_bits(ospeedr >> 26), Speed::VeryHigh);
        assert_eq!(ospeedr & !0x0C00_0000, 0);
    }

    #[test]
    fn test_mode_written_last() {
        let mut gpio = Stm32Gpio::new(FakeRegisters::default());
        gpio.configure_pins(Port::B, Pins::all(), PinConfig::PUSH_PULL_OUTPUT)
            .unwrap();

        let base = gpio_base(Port::B);
        let order: Vec<u32> = gpio
            .registers()
            .writes
            .iter()
            .map(|(addr, _)| addr - base)
            .collect();
        assert_eq!(order, vec![GPIO_OSPEEDR, GPIO_OTYPER, GPIO_PUPDR, GPIO_MODER]);
        assert_eq!(gpio.registers().values[&(base + GPIO_MODER)], 0x5555_5555);
    }

    #[test]
    fn test_set_high_uses_bsrr_set_half() {
        let mut gpio = Stm32Gpio::new(FakeRegisters::default());
        gpio.set_pins_high(Port::A, Pins::from_bits_retain(0x9FFF))
            .unwrap();
        assert_eq!(
            gpio.registers().writes,
            vec![(gpio_base(Port::A) + GPIO_BSRR, 0x0000_9FFF)]
        );
    }
}
