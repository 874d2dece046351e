//! High-power switched outputs on GP3 and GP15

use embedded_hal::digital::OutputPin;
use log::debug;

use super::output_error;
use crate::board::{BoardError, pins};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HighPowerPin {
    Gp3,
    Gp15,
}

impl HighPowerPin {
    pub const fn gpio(self) -> u8 {
        match self {
            Self::Gp3 => pins::HIGH_POWER_A,
            Self::Gp15 => pins::HIGH_POWER_B,
        }
    }
}

impl TryFrom<u8> for HighPowerPin {
    type Error = BoardError;

    fn try_from(pin: u8) -> Result<Self, Self::Error> {
        match pin {
            pins::HIGH_POWER_A => Ok(Self::Gp3),
            pins::HIGH_POWER_B => Ok(Self::Gp15),
            _ => Err(BoardError::InvalidPin { pin }),
        }
    }
}

pub struct HighPowerOutputs<A, B> {
    gp3: A,
    gp15: B,
}

impl<A: OutputPin, B: OutputPin> HighPowerOutputs<A, B> {
    pub fn new(gp3: A, gp15: B) -> Self {
        Self { gp3, gp15 }
    }

    pub fn set(&mut self, pin: HighPowerPin, on: bool) -> Result<(), BoardError> {
        debug!("High-power GP{} {}", pin.gpio(), if on { "on" } else { "off" });
        match (pin, on) {
            (HighPowerPin::Gp3, true) => self.gp3.set_high().map_err(output_error("Failed to drive GP3")),
            (HighPowerPin::Gp3, false) => self.gp3.set_low().map_err(output_error("Failed to drive GP3")),
            (HighPowerPin::Gp15, true) => self.gp15.set_high().map_err(output_error("Failed to drive GP15")),
            (HighPowerPin::Gp15, false) => self.gp15.set_low().map_err(output_error("Failed to drive GP15")),
        }
    }

    pub fn on(&mut self, pin: HighPowerPin) -> Result<(), BoardError> {
        self.set(pin, true)
    }

    pub fn off(&mut self, pin: HighPowerPin) -> Result<(), BoardError> {
        self.set(pin, false)
    }

    /// Switches an output chosen by GPIO number (3 or 15).
    pub fn set_gpio(&mut self, gpio: u8, on: bool) -> Result<(), BoardError> {
        self.set(HighPowerPin::try_from(gpio)?, on)
    }

    pub fn release(self) -> (A, B) {
        (self.gp3, self.gp15)
    }
}
