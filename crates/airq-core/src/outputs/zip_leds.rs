//! ZIP LED chain (WS2812-compatible) on a state machine
//!
//! Colours are held packed as GRB words, the order the LEDs expect on the
//! wire. Nothing is sent until [`ZipLeds::show`] is called.

use log::debug;

use super::{StateMachineTx, output_error};
use crate::board::{BoardError, StateMachineSlot};

pub const DEFAULT_BRIGHTNESS: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Colour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Colour {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const RED: Self = Self::new(255, 0, 0);
    pub const ORANGE: Self = Self::new(255, 100, 0);
    pub const YELLOW: Self = Self::new(255, 150, 0);
    pub const GREEN: Self = Self::new(0, 255, 0);
    pub const CYAN: Self = Self::new(0, 255, 255);
    pub const BLUE: Self = Self::new(0, 0, 255);
    pub const PURPLE: Self = Self::new(180, 0, 255);
    pub const WHITE: Self = Self::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn to_grb(self) -> u32 {
        (self.g as u32) << 16 | (self.r as u32) << 8 | self.b as u32
    }

    pub const fn from_grb(grb: u32) -> Self {
        Self {
            r: (grb >> 8) as u8,
            g: (grb >> 16) as u8,
            b: grb as u8,
        }
    }

    /// Scales every channel by `percent` / 100, truncating.
    pub const fn scaled(self, percent: u8) -> Self {
        Self::new(
            scale_channel(self.r, percent),
            scale_channel(self.g, percent),
            scale_channel(self.b, percent),
        )
    }
}

const fn scale_channel(channel: u8, percent: u8) -> u8 {
    (channel as u16 * percent as u16 / 100) as u8
}

pub struct ZipLeds<T, const N: usize> {
    tx: T,
    slot: StateMachineSlot,
    pixels: [u32; N],
    brightness: u8,
}

impl<T: StateMachineTx, const N: usize> ZipLeds<T, N> {
    /// All LEDs start off at the default brightness.
    pub fn new(tx: T, slot: StateMachineSlot) -> Self {
        Self {
            tx,
            slot,
            pixels: [0; N],
            brightness: DEFAULT_BRIGHTNESS,
        }
    }

    fn check_index(index: usize) -> Result<(), BoardError> {
        if index < N {
            Ok(())
        } else {
            Err(BoardError::InvalidLed { index, count: N })
        }
    }

    pub fn set(&mut self, index: usize, colour: Colour) -> Result<(), BoardError> {
        Self::check_index(index)?;
        self.pixels[index] = colour.to_grb();
        Ok(())
    }

    pub fn get(&self, index: usize) -> Result<Colour, BoardError> {
        Self::check_index(index)?;
        Ok(Colour::from_grb(self.pixels[index]))
    }

    pub fn clear(&mut self, index: usize) -> Result<(), BoardError> {
        self.set(index, Colour::BLACK)
    }

    pub fn set_all(&mut self, colour: Colour) {
        self.pixels = [colour.to_grb(); N];
    }

    pub fn clear_all(&mut self) {
        self.pixels = [0; N];
    }

    /// Brightness in percent, clamped to 0-100.
    pub fn set_brightness(&mut self, percent: i32) {
        self.brightness = percent.clamp(0, 100) as u8;
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    /// Sends every LED colour, scaled by the brightness, down the chain.
    pub fn show(&mut self) -> Result<(), BoardError> {
        for grb in self.pixels {
            let word = Colour::from_grb(grb).scaled(self.brightness).to_grb();
            // the state machine shifts out the top 24 bits
            self.tx
                .push(word << 8)
                .map_err(output_error("Failed to update ZIP LEDs"))?;
        }
        debug!("Showed {} ZIP LEDs at {}%", N, self.brightness);
        Ok(())
    }

    pub fn len(&self) -> usize {
        N
    }

    pub fn is_empty(&self) -> bool {
        N == 0
    }

    pub fn slot(&self) -> &StateMachineSlot {
        &self.slot
    }

    pub fn tx(&self) -> &T {
        &self.tx
    }

    pub fn release(self) -> (T, StateMachineSlot) {
        (self.tx, self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::StateMachineAllocator;
    use crate::sim::RecordingStateMachine;

    fn leds<const N: usize>() -> ZipLeds<RecordingStateMachine, N> {
        let slot = StateMachineAllocator::new().claim().unwrap();
        ZipLeds::new(RecordingStateMachine::new(), slot)
    }

    #[test]
    fn test_grb_packing() {
        assert_eq!(Colour::RED.to_grb(), 0x00_FF00);
        assert_eq!(Colour::GREEN.to_grb(), 0xFF_0000);
        assert_eq!(Colour::YELLOW.to_grb(), 0x96_FF00);
        assert_eq!(Colour::from_grb(Colour::PURPLE.to_grb()), Colour::PURPLE);
    }

    #[test]
    fn test_set_get_clear() {
        let mut leds = leds::<3>();
        leds.set(1, Colour::BLUE).unwrap();
        assert_eq!(leds.get(1), Ok(Colour::BLUE));
        assert_eq!(leds.get(0), Ok(Colour::BLACK));

        leds.clear(1).unwrap();
        assert_eq!(leds.get(1), Ok(Colour::BLACK));
    }

    #[test]
    fn test_index_is_validated() {
        let mut leds = leds::<3>();
        assert_eq!(
            leds.set(3, Colour::RED),
            Err(BoardError::InvalidLed { index: 3, count: 3 })
        );
        assert_eq!(leds.get(7), Err(BoardError::InvalidLed { index: 7, count: 3 }));
    }

    #[test]
    fn test_show_scales_by_brightness() {
        let mut leds = leds::<2>();
        leds.set(0, Colour::WHITE).unwrap();
        leds.set(1, Colour::PURPLE).unwrap();
        leds.show().unwrap();

        // 50 %: 255 -> 127, 180 -> 90
        assert_eq!(leds.tx().words(), &[0x7F7F7F00, 0x005A7F00]);
    }

    #[test]
    fn test_brightness_is_clamped() {
        let mut leds = leds::<1>();
        leds.set_brightness(250);
        assert_eq!(leds.brightness(), 100);
        leds.set_brightness(-5);
        assert_eq!(leds.brightness(), 0);

        leds.set_all(Colour::WHITE);
        leds.show().unwrap();
        assert_eq!(leds.tx().last_word(), Some(0));
    }

    #[test]
    fn test_clear_all() {
        let mut leds = leds::<3>();
        leds.set_all(Colour::CYAN);
        leds.clear_all();
        assert!((0..3).all(|i| leds.get(i) == Ok(Colour::BLACK)));
    }
}
