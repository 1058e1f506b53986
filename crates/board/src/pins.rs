use bitflags::bitflags;
use core::fmt;
use core::str::FromStr;

/// GPIO port bank. Declaration order is boot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Port {
    A,
    B,
    C,
    D,
    E,
}

impl Port {
    pub const ALL: [Port; 5] = [Port::A, Port::B, Port::C, Port::D, Port::E];

    /// Position in the GPIO address map; also the RCC AHB1ENR gate bit.
    pub const fn index(self) -> u8 {
        self as u8
    }

    pub const fn letter(self) -> char {
        match self {
            Port::A => 'A',
            Port::B => 'B',
            Port::C => 'C',
            Port::D => 'D',
            Port::E => 'E',
        }
    }

    /// Lowercase peripheral name as used on the bus, e.g. `gpioa`.
    pub const fn name(self) -> &'static str {
        match self {
            Port::A => "gpioa",
            Port::B => "gpiob",
            Port::C => "gpioc",
            Port::D => "gpiod",
            Port::E => "gpioe",
        }
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GPIO{}", self.letter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePortError;

impl fmt::Display for ParsePortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("unknown port; expected one of A, B, C, D, E (or gpioa..gpioe)")
    }
}

impl FromStr for Port {
    type Err = ParsePortError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let v = value.trim();
        let letter = match (v.get(..4), v.get(4..)) {
            (Some(prefix), Some(rest)) if prefix.eq_ignore_ascii_case("gpio") => rest,
            _ => v,
        };
        match letter {
            "a" | "A" => Ok(Port::A),
            "b" | "B" => Ok(Port::B),
            "c" | "C" => Ok(Port::C),
            "d" | "D" => Ok(Port::D),
            "e" | "E" => Ok(Port::E),
            _ => Err(ParsePortError),
        }
    }
}

bitflags! {
    /// Set of pin indices within one bank.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Pins: u16 {
        const PIN0 = 1 << 0;
        const PIN1 = 1 << 1;
        const PIN2 = 1 << 2;
        const PIN3 = 1 << 3;
        const PIN4 = 1 << 4;
        const PIN5 = 1 << 5;
        const PIN6 = 1 << 6;
        const PIN7 = 1 << 7;
        const PIN8 = 1 << 8;
        const PIN9 = 1 << 9;
        const PIN10 = 1 << 10;
        const PIN11 = 1 << 11;
        const PIN12 = 1 << 12;
        const PIN13 = 1 << 13;
        const PIN14 = 1 << 14;
        const PIN15 = 1 << 15;
    }
}

impl Pins {
    pub const COUNT: u8 = 16;

    /// Single pin. `n` must be below 16.
    pub const fn pin(n: u8) -> Self {
        assert!(n < Self::COUNT);
        Self::from_bits_retain(1 << n)
    }

    pub fn has(self, n: u8) -> bool {
        n < Self::COUNT && self.bits() & (1 << n) != 0
    }

    /// Ascending pin indices in the set.
    pub fn indices(self) -> impl Iterator<Item = u8> {
        (0..Self::COUNT).filter(move |&n| self.has(n))
    }
}

/// MODER field encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Input = 0b00,
    Output = 0b01,
    Alternate = 0b10,
    Analog = 0b11,
}

impl Mode {
    pub const fn bits(self) -> u32 {
        self as u32
    }

    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0b00 => Mode::Input,
            0b01 => Mode::Output,
            0b10 => Mode::Alternate,
            _ => Mode::Analog,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Mode::Input => "input",
            Mode::Output => "output",
            Mode::Alternate => "alternate",
            Mode::Analog => "analog",
        }
    }
}

/// OTYPER field encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    PushPull = 0,
    OpenDrain = 1,
}

impl OutputType {
    pub const fn bits(self) -> u32 {
        self as u32
    }

    pub const fn from_bits(bits: u32) -> Self {
        if bits & 1 == 0 {
            OutputType::PushPull
        } else {
            OutputType::OpenDrain
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            OutputType::PushPull => "push_pull",
            OutputType::OpenDrain => "open_drain",
        }
    }
}

/// PUPDR field encoding. `0b11` is reserved on STM32F4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pull {
    None = 0b00,
    Up = 0b01,
    Down = 0b10,
}

impl Pull {
    pub const fn bits(self) -> u32 {
        self as u32
    }

    pub const fn from_bits(bits: u32) -> Option<Self> {
        match bits & 0b11 {
            0b00 => Some(Pull::None),
            0b01 => Some(Pull::Up),
            0b10 => Some(Pull::Down),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Pull::None => "none",
            Pull::Up => "up",
            Pull::Down => "down",
        }
    }
}

/// OSPEEDR field encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    Low = 0b00,
    Medium = 0b01,
    High = 0b10,
    VeryHigh = 0b11,
}

impl Speed {
    pub const fn bits(self) -> u32 {
        self as u32
    }

    pub const fn from_bits(bits: u32) -> Self {
        match bits & 0b11 {
            0b00 => Speed::Low,
            0b01 => Speed::Medium,
            0b10 => Speed::High,
            _ => Speed::VeryHigh,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Speed::Low => "low",
            Speed::Medium => "medium",
            Speed::High => "high",
            Speed::VeryHigh => "very_high",
        }
    }
}

/// Electrical configuration applied to a set of pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinConfig {
    pub mode: Mode,
    pub output_type: OutputType,
    pub pull: Pull,
    pub speed: Speed,
}

impl PinConfig {
    pub const PUSH_PULL_OUTPUT: PinConfig = PinConfig {
        mode: Mode::Output,
        output_type: OutputType::PushPull,
        pull: Pull::None,
        speed: Speed::Low,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_parse() {
        assert_eq!("A".parse::<Port>(), Ok(Port::A));
        assert_eq!("e".parse::<Port>(), Ok(Port::E));
        assert_eq!("gpioc".parse::<Port>(), Ok(Port::C));
        assert_eq!("GPIOD".parse::<Port>(), Ok(Port::D));
        assert_eq!(" b ".parse::<Port>(), Ok(Port::B));
        assert!("F".parse::<Port>().is_err());
        assert!("gpio".parse::<Port>().is_err());
        assert!("".parse::<Port>().is_err());
    }

    #[test]
    fn test_port_order_matches_index() {
        for (i, port) in Port::ALL.iter().enumerate() {
            assert_eq!(port.index() as usize, i);
        }
        assert_eq!(Port::A.to_string(), "GPIOA");
        assert_eq!(Port::E.name(), "gpioe");
    }

    #[test]
    fn test_pins_indices() {
        let pins = Pins::pin(0) | Pins::pin(13) | Pins::PIN15;
        let got: Vec<u8> = pins.indices().collect();
        assert_eq!(got, vec![0, 13, 15]);
        assert!(pins.has(13));
        assert!(!pins.has(14));
        assert!(!pins.has(16));
        assert_eq!(Pins::all().indices().count(), 16);
    }

    #[test]
    fn test_field_decoding() {
        assert_eq!(Mode::from_bits(0b10), Mode::Alternate);
        assert_eq!(Mode::from_bits(Mode::Output.bits()), Mode::Output);
        assert_eq!(Pull::from_bits(0b11), None);
        assert_eq!(Pull::from_bits(0b01), Some(Pull::Up));
        assert_eq!(Speed::from_bits(0b11), Speed::VeryHigh);
        assert_eq!(OutputType::from_bits(1), OutputType::OpenDrain);
    }
}
