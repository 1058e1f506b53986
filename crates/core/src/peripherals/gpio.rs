use crate::SimResult;
use allhigh_board::regs::*;
use allhigh_board::{Mode, OutputType, PinConfig, Pins, Port, Pull, Speed};

/// Reset values that differ per bank (debug pins live on A and B).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResetValues {
    moder: u32,
    ospeedr: u32,
    pupdr: u32,
}

const fn reset_values(port: Port) -> ResetValues {
    match port {
        // PA13/PA14/PA15 alternate function (SWDIO, SWCLK, JTDI).
        Port::A => ResetValues {
            moder: 0xA800_0000,
            ospeedr: 0x0C00_0000,
            pupdr: 0x6400_0000,
        },
        // PB3/PB4 alternate function (JTDO, NJTRST).
        Port::B => ResetValues {
            moder: 0x0000_0280,
            ospeedr: 0x0000_00C0,
            pupdr: 0x0000_0100,
        },
        _ => ResetValues {
            moder: 0,
            ospeedr: 0,
            pupdr: 0,
        },
    }
}

/// Decoded configuration of a single pin as the registers currently hold it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinState {
    pub mode: Mode,
    pub output_type: OutputType,
    /// `None` for the reserved `0b11` PUPDR encoding.
    pub pull: Option<Pull>,
    pub speed: Speed,
}

impl PinState {
    pub fn matches(&self, config: &PinConfig) -> bool {
        self.mode == config.mode
            && self.output_type == config.output_type
            && self.pull == Some(config.pull)
            && self.speed == config.speed
    }
}

/// STM32F4 GPIO port.
#[derive(Debug, serde::Serialize)]
pub struct GpioPort {
    #[serde(skip)]
    port: Port,
    moder: u32,   // 0x00: mode register
    otyper: u32,  // 0x04: output type register
    ospeedr: u32, // 0x08: output speed register
    pupdr: u32,   // 0x0C: pull-up/pull-down register
    odr: u32,     // 0x14: output data register
    lckr: u32,    // 0x1C: configuration lock register
    afrl: u32,    // 0x20: alternate function low register
    afrh: u32,    // 0x24: alternate function high register
    idr: u32,     // 0x10: derived on read; kept here for snapshots
    #[serde(skip)]
    bsrr_buf: u32,
    #[serde(skip)]
    bsrr_mask: u8,
}

impl GpioPort {
    pub fn new(port: Port) -> Self {
        let reset = reset_values(port);
        let mut gpio = Self {
            port,
            moder: reset.moder,
            otyper: 0,
            ospeedr: reset.ospeedr,
            pupdr: reset.pupdr,
            odr: 0,
            lckr: 0,
            afrl: 0,
            afrh: 0,
            idr: 0,
            bsrr_buf: 0,
            bsrr_mask: 0,
        };
        gpio.idr = gpio.input_levels();
        gpio
    }

    pub fn port(&self) -> Port {
        self.port
    }

    pub fn moder(&self) -> u32 {
        self.moder
    }

    pub fn odr(&self) -> u32 {
        self.odr
    }

    fn field(reg: u32, n: u8, width: u32) -> u32 {
        (reg >> (n as u32 * width)) & ((1 << width) - 1)
    }

    pub fn pin(&self, n: u8) -> PinState {
        PinState {
            mode: Mode::from_bits(Self::field(self.moder, n, 2)),
            output_type: OutputType::from_bits(Self::field(self.otyper, n, 1)),
            pull: Pull::from_bits(Self::field(self.pupdr, n, 2)),
            speed: Speed::from_bits(Self::field(self.ospeedr, n, 2)),
        }
    }

    fn output_pins(&self) -> Pins {
        Pins::all()
            .indices()
            .filter(|&n| self.pin(n).mode == Mode::Output)
            .fold(Pins::empty(), |acc, n| acc | Pins::pin(n))
    }

    /// Pin levels as IDR reports them: outputs follow ODR, every other pin
    /// floats to its pull bias (nothing external is attached).
    fn input_levels(&self) -> u32 {
        let outputs = self.output_pins().bits() as u32;
        let pulled_up = Pins::all()
            .indices()
            .filter(|&n| self.pin(n).pull == Some(Pull::Up))
            .fold(0u32, |acc, n| acc | 1 << n);
        ((self.odr & outputs) | (pulled_up & !outputs)) & 0xFFFF
    }

    pub fn level(&self, n: u8) -> bool {
        self.input_levels() & (1 << n) != 0
    }

    /// Pin actively sourcing a high level.
    pub fn is_driven_high(&self, n: u8) -> bool {
        self.pin(n).mode == Mode::Output && self.odr & (1 << n) != 0
    }

    /// Mode, type, speed, pull and output latch all still at their reset value.
    pub fn is_at_reset(&self, n: u8) -> bool {
        let reset = reset_values(self.port);
        let same =
            |a: u32, b: u32, width: u32| Self::field(a, n, width) == Self::field(b, n, width);
        same(self.moder, reset.moder, 2)
            && same(self.otyper, 0, 1)
            && same(self.ospeedr, reset.ospeedr, 2)
            && same(self.pupdr, reset.pupdr, 2)
            && same(self.odr, 0, 1)
    }

    fn read_reg(&self, offset: u64) -> u32 {
        match offset as u32 {
            GPIO_MODER => self.moder,
            GPIO_OTYPER => self.otyper,
            GPIO_OSPEEDR => self.ospeedr,
            GPIO_PUPDR => self.pupdr,
            GPIO_IDR => self.input_levels(),
            GPIO_ODR => self.odr,
            GPIO_LCKR => self.lckr,
            GPIO_AFRL => self.afrl,
            GPIO_AFRH => self.afrh,
            _ => 0,
        }
    }

    fn write_reg(&mut self, offset: u64, value: u32) {
        match offset as u32 {
            GPIO_MODER => self.moder = value,
            GPIO_OTYPER => self.otyper = value & 0xFFFF,
            GPIO_OSPEEDR => self.ospeedr = value,
            GPIO_PUPDR => self.pupdr = value,
            GPIO_ODR => self.odr = value & 0xFFFF,
            GPIO_BSRR => {
                // Lower 16 bits set, upper 16 bits reset; set wins on conflict.
                let set = value & 0xFFFF;
                let reset = (value >> 16) & 0xFFFF;
                self.odr &= !reset;
                self.odr |= set;
            }
            GPIO_LCKR => self.lckr = value,
            GPIO_AFRL => self.afrl = value,
            GPIO_AFRH => self.afrh = value,
            _ => {} // IDR is read-only
        }
        self.idr = self.input_levels();
    }

    fn handle_bsrr_byte(&mut self, byte_offset: u32, value: u8) {
        let shift = byte_offset * 8;
        self.bsrr_buf &= !(0xFF << shift);
        self.bsrr_buf |= (value as u32) << shift;
        self.bsrr_mask |= 1u8 << byte_offset;

        let flush = match self.bsrr_mask {
            0x0F => Some(self.bsrr_buf),
            0x03 => Some(self.bsrr_buf & 0x0000_FFFF),
            0x0C => Some(self.bsrr_buf & 0xFFFF_0000),
            _ => None,
        };
        if let Some(val) = flush {
            self.bsrr_buf = 0;
            self.bsrr_mask = 0;
            self.write_reg(GPIO_BSRR as u64, val);
        }
    }
}

impl crate::Peripheral for GpioPort {
    fn read(&self, offset: u64) -> SimResult<u8> {
        let reg_offset = offset & !3;
        let byte_offset = (offset % 4) as u32;
        let reg_val = self.read_reg(reg_offset);
        Ok(((reg_val >> (byte_offset * 8)) & 0xFF) as u8)
    }

    fn write(&mut self, offset: u64, value: u8) -> SimResult<()> {
        let reg_offset = offset & !3;
        let byte_offset = (offset % 4) as u32;

        // BSRR is write-only: assemble the word instead of read-modify-write.
        if reg_offset == GPIO_BSRR as u64 {
            self.handle_bsrr_byte(byte_offset, value);
            return Ok(());
        }

        let mut reg_val = self.read_reg(reg_offset);
        let mask = 0xFF << (byte_offset * 8);
        reg_val &= !mask;
        reg_val |= (value as u32) << (byte_offset * 8);

        self.write_reg(reg_offset, reg_val);
        Ok(())
    }

    fn write_u32(&mut self, offset: u64, value: u32) -> SimResult<()> {
        // A word store to BSRR applies set and reset halves together.
        if offset == GPIO_BSRR as u64 {
            self.bsrr_buf = 0;
            self.bsrr_mask = 0;
            self.write_reg(offset, value);
            return Ok(());
        }
        for i in 0..4 {
            self.write(offset + i, (value >> (i * 8)) as u8)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        *self = Self::new(self.port);
    }

    fn as_any(&self) -> Option<&dyn std::any::Any> {
        Some(self)
    }

    fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::GpioPort;
    use crate::Peripheral;
    use allhigh_board::{Mode, PinConfig, Port, Pull, Speed};

    fn write_u32(gpio: &mut GpioPort, offset: u64, value: u32) {
        Peripheral::write_u32(gpio, offset, value).unwrap();
    }

    fn read_u32(gpio: &GpioPort, offset: u64) -> u32 {
        (0..4).fold(0, |acc, i| acc | (gpio.read(offset + i).unwrap() as u32) << (i * 8))
    }

    #[test]
    fn test_gpio_reset_values() {
        let a = GpioPort::new(Port::A);
        assert_eq!(a.moder, 0xA800_0000);
        assert_eq!(a.pupdr, 0x6400_0000);
        assert_eq!(a.pin(13).mode, Mode::Alternate);
        assert_eq!(a.pin(13).pull, Some(Pull::Up));
        assert_eq!(a.pin(14).pull, Some(Pull::Down));
        assert_eq!(a.pin(13).speed, Speed::VeryHigh);

        let b = GpioPort::new(Port::B);
        assert_eq!(b.moder, 0x0000_0280);
        assert_eq!(b.pin(3).mode, Mode::Alternate);

        let c = GpioPort::new(Port::C);
        assert_eq!(c.moder, 0);
        assert_eq!(c.odr, 0);
        assert!((0..16).all(|n| c.is_at_reset(n)));
    }

    #[test]
    fn test_gpio_idr_follows_pull_bias_when_not_output() {
        let a = GpioPort::new(Port::A);
        // PA13 and PA15 pulled up, PA14 pulled down.
        assert_eq!(read_u32(&a, 0x10), 0xA000);
        assert!(a.level(13));
        assert!(!a.level(14));
    }

    #[test]
    fn test_gpio_moder_and_odr() {
        let mut gpio = GpioPort::new(Port::C);
        gpio.write(0x00, 0x55).unwrap();
        gpio.write(0x01, 0x55).unwrap();
        assert_eq!(gpio.moder & 0xFFFF, 0x5555);

        gpio.write(0x14, 0x34).unwrap();
        gpio.write(0x15, 0x12).unwrap();
        assert_eq!(gpio.odr, 0x1234);
        // Pins 0..7 are outputs, so IDR mirrors their ODR bits only.
        assert_eq!(read_u32(&gpio, 0x10), 0x0034);
    }

    #[test]
    fn test_gpio_bsrr_set_and_reset() {
        let mut gpio = GpioPort::new(Port::D);
        write_u32(&mut gpio, 0x18, 0x0000_00FF);
        assert_eq!(gpio.odr, 0x00FF);

        write_u32(&mut gpio, 0x18, 0x0001_0000);
        assert_eq!(gpio.odr, 0x00FE);

        // BSRR reads back as zero.
        assert_eq!(read_u32(&gpio, 0x18), 0);
    }

    #[test]
    fn test_gpio_bsrr_set_wins_over_reset() {
        let mut gpio = GpioPort::new(Port::E);
        write_u32(&mut gpio, 0x18, 0x0001_0001);
        assert_eq!(gpio.odr & 1, 1);
    }

    #[test]
    fn test_gpio_bsrr_halfword_stores() {
        let mut gpio = GpioPort::new(Port::E);
        gpio.write(0x18, 0x0F).unwrap();
        assert_eq!(gpio.odr, 0, "incomplete half must not apply");
        gpio.write(0x19, 0x00).unwrap();
        assert_eq!(gpio.odr, 0x000F);

        gpio.write(0x1A, 0x03).unwrap();
        gpio.write(0x1B, 0x00).unwrap();
        assert_eq!(gpio.odr, 0x000C);
    }

    #[test]
    fn test_gpio_driven_high_requires_output_mode() {
        let mut gpio = GpioPort::new(Port::B);
        write_u32(&mut gpio, 0x18, 0x0000_0001);
        assert!(!gpio.is_driven_high(0));
        assert!(!gpio.is_at_reset(0));

        write_u32(&mut gpio, 0x00, 0x0000_0281);
        assert!(gpio.is_driven_high(0));
        assert!(gpio.level(0));
        assert!(gpio.pin(0).matches(&PinConfig::PUSH_PULL_OUTPUT));
    }

    #[test]
    fn test_gpio_reset_restores_bank_defaults() {
        let mut gpio = GpioPort::new(Port::A);
        write_u32(&mut gpio, 0x00, 0x5555_5555);
        write_u32(&mut gpio, 0x18, 0x0000_FFFF);
        gpio.reset();
        assert_eq!(gpio.moder, 0xA800_0000);
        assert_eq!(gpio.odr, 0);
    }
}
