//! Output peripherals of the board
//!
//! The servo and the ZIP LEDs are driven by programmable-I/O state machines;
//! the high-power outputs are plain GPIOs and the buzzer is a PWM channel.

pub mod buzzer;
pub mod high_power;
pub mod servo;
pub mod zip_leds;

use core::fmt::Debug;

use log::error;

use crate::board::BoardError;

/// Transmit side of a programmable-I/O state machine.
pub trait StateMachineTx {
    type Error: Debug;

    /// Pushes one word into the transmit FIFO, blocking while it is full.
    fn push(&mut self, word: u32) -> Result<(), Self::Error>;

    fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error>;
}

/// Logs a peripheral failure and folds it into [`BoardError::Output`].
pub(crate) fn output_error<E: Debug>(details: &'static str) -> impl FnOnce(E) -> BoardError {
    move |e| {
        error!("{}: {:?}", details, e);
        BoardError::Output { details }
    }
}
