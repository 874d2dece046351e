//! Board context
//!
//! [`Board`] owns the resources that several peripherals compete for and
//! hands them out explicitly, so nothing relies on module-level state.

pub mod allocator;

pub use allocator::{STATE_MACHINE_COUNT, StateMachineAllocator, StateMachineSlot};

use log::info;
use thiserror_no_std::Error;

use crate::config::BoardConfig;
use crate::outputs::StateMachineTx;
use crate::outputs::servo::Servo;
use crate::outputs::zip_leds::ZipLeds;

/// GPIO assignments of the board.
pub mod pins {
    pub const SERVO: u8 = 2;
    pub const HIGH_POWER_A: u8 = 3;
    pub const BUZZER: u8 = 4;
    pub const I2C_SDA: u8 = 6;
    pub const I2C_SCL: u8 = 7;
    pub const BUTTON_A: u8 = 12;
    pub const BUTTON_B: u8 = 13;
    pub const HIGH_POWER_B: u8 = 15;
    pub const ZIP_LEDS: u8 = 20;
}

/// Number of ZIP LEDs fitted on the board itself.
pub const ONBOARD_ZIP_LEDS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BoardError {
    #[error("Could not claim a state machine, all in use")]
    NoFreeStateMachine,

    #[error("State machine {index} is already in use")]
    StateMachineInUse { index: u8 },

    #[error("No state machine {index}")]
    InvalidStateMachine { index: u8 },

    #[error("Invalid LED {index} (chain has {count})")]
    InvalidLed { index: usize, count: usize },

    #[error("No high-power output on pin {pin}")]
    InvalidPin { pin: u8 },

    #[error("Output failed: {details}")]
    Output { details: &'static str },
}

pub struct Board {
    config: BoardConfig,
    state_machines: StateMachineAllocator,
}

impl Board {
    pub fn new(config: BoardConfig) -> Self {
        Self {
            config,
            state_machines: StateMachineAllocator::new(),
        }
    }

    /// Board whose listed state machines are already used by other code.
    pub fn with_reserved(config: BoardConfig, reserved: &[u8]) -> Result<Self, BoardError> {
        let mut board = Self::new(config);
        for &index in reserved {
            board.state_machines.reserve(index)?;
        }
        Ok(board)
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn state_machines(&mut self) -> &mut StateMachineAllocator {
        &mut self.state_machines
    }

    /// Claims a state machine and starts the servo pulse train on it.
    pub fn servo<T: StateMachineTx>(&mut self, tx: T) -> Result<Servo<T>, BoardError> {
        let slot = self.state_machines.claim()?;
        match Servo::new(tx, slot) {
            Ok(servo) => {
                info!("Servo on GP{} ready", pins::SERVO);
                Ok(servo)
            }
            Err((slot, e)) => {
                self.state_machines.release(slot);
                Err(e)
            }
        }
    }

    /// Claims a state machine for a chain of `N` ZIP LEDs, at the configured
    /// brightness.
    pub fn zip_leds<T: StateMachineTx, const N: usize>(
        &mut self,
        tx: T,
    ) -> Result<ZipLeds<T, N>, BoardError> {
        let slot = self.state_machines.claim()?;
        let mut leds = ZipLeds::new(tx, slot);
        leds.set_brightness(self.config.led_brightness as i32);
        info!("{} ZIP LEDs on GP{} ready", N, pins::ZIP_LEDS);
        Ok(leds)
    }

    /// Stops the servo and returns its state machine to the pool.
    pub fn release_servo<T: StateMachineTx>(&mut self, servo: Servo<T>) -> T {
        let (tx, slot) = servo.release();
        self.state_machines.release(slot);
        tx
    }

    pub fn release_zip_leds<T: StateMachineTx, const N: usize>(&mut self, leds: ZipLeds<T, N>) -> T {
        let (tx, slot) = leds.release();
        self.state_machines.release(slot);
        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::RecordingStateMachine;

    #[test]
    fn test_peripherals_claim_distinct_slots() {
        let mut board = Board::with_reserved(BoardConfig::default(), &[0]).unwrap();
        let servo = board.servo(RecordingStateMachine::new()).unwrap();
        let leds: ZipLeds<_, ONBOARD_ZIP_LEDS> = board.zip_leds(RecordingStateMachine::new()).unwrap();

        assert_eq!(servo.slot().index(), 1);
        assert_eq!(leds.slot().index(), 2);
        assert_eq!(leds.brightness(), 50);
        assert_eq!(board.state_machines().free_count(), 5);

        board.release_servo(servo);
        board.release_zip_leds(leds);
        assert_eq!(board.state_machines().free_count(), 7);
    }

    #[test]
    fn test_no_free_state_machine() {
        let mut board = Board::with_reserved(BoardConfig::default(), &[0, 1, 2, 3, 4, 5, 6]).unwrap();
        let _servo = board.servo(RecordingStateMachine::new()).unwrap();
        assert_eq!(
            board.servo(RecordingStateMachine::new()).err(),
            Some(BoardError::NoFreeStateMachine)
        );
    }

    #[test]
    fn test_failed_servo_start_returns_slot() {
        let mut board = Board::new(BoardConfig::default());
        let result = board.servo(RecordingStateMachine::failing());
        assert!(matches!(result, Err(BoardError::Output { .. })));
        assert_eq!(board.state_machines().free_count(), STATE_MACHINE_COUNT);
    }

    #[test]
    fn test_duplicate_reservation() {
        assert_eq!(
            Board::with_reserved(BoardConfig::default(), &[3, 3]).err(),
            Some(BoardError::StateMachineInUse { index: 3 })
        );
    }
}
