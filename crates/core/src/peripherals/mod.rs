pub mod gpio;
pub mod rcc;
