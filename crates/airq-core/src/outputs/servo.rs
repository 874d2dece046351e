//! Hobby servo on a state machine
//!
//! The state machine generates a 20 ms pulse train; the high time of each
//! pulse (500-2500 µs) sets the servo angle.

use log::{debug, warn};

use super::{StateMachineTx, output_error};
use crate::board::{BoardError, StateMachineSlot};

pub const MIN_PULSE_US: i32 = 500;
pub const MAX_PULSE_US: i32 = 2500;
pub const PULSE_TRAIN_US: u32 = 20_000;

const PULSE_SPAN_US: f32 = (MAX_PULSE_US - MIN_PULSE_US) as f32;

pub struct Servo<T> {
    tx: T,
    slot: StateMachineSlot,
    period_us: i32,
}

impl<T: StateMachineTx> Servo<T> {
    /// Loads the pulse train period, parks the servo at 0° and starts the
    /// state machine. On failure the slot is handed back.
    pub fn new(mut tx: T, slot: StateMachineSlot) -> Result<Self, (StateMachineSlot, BoardError)> {
        let started = tx
            .push(PULSE_TRAIN_US)
            .and_then(|_| tx.push(MIN_PULSE_US as u32))
            .and_then(|_| tx.set_enabled(true))
            .map_err(output_error("Failed to start servo"));

        match started {
            Ok(()) => Ok(Self {
                tx,
                slot,
                period_us: MIN_PULSE_US,
            }),
            Err(e) => Err((slot, e)),
        }
    }

    /// Moves to an angle between 0 and 180 degrees.
    pub fn to_degrees(&mut self, degrees: f32) -> Result<(), BoardError> {
        self.to_period((degrees * PULSE_SPAN_US / 180.0 + MIN_PULSE_US as f32) as i32)
    }

    pub fn to_radians(&mut self, radians: f32) -> Result<(), BoardError> {
        self.to_period((radians / 3.1416 * PULSE_SPAN_US) as i32 + MIN_PULSE_US)
    }

    /// Sets the pulse high time directly, clamped to 500-2500 µs.
    pub fn to_period(&mut self, period_us: i32) -> Result<(), BoardError> {
        let period_us = period_us.clamp(MIN_PULSE_US, MAX_PULSE_US);
        self.tx
            .push(period_us as u32)
            .map_err(output_error("Failed to set servo period"))?;
        self.period_us = period_us;
        debug!("Servo period {} us", period_us);
        Ok(())
    }

    pub fn enable(&mut self) -> Result<(), BoardError> {
        self.tx
            .set_enabled(true)
            .map_err(output_error("Failed to enable servo"))
    }

    pub fn disable(&mut self) -> Result<(), BoardError> {
        self.tx
            .set_enabled(false)
            .map_err(output_error("Failed to disable servo"))
    }

    pub fn period_us(&self) -> i32 {
        self.period_us
    }

    pub fn slot(&self) -> &StateMachineSlot {
        &self.slot
    }

    pub fn tx(&self) -> &T {
        &self.tx
    }

    /// Stops the pulse train and gives back the state machine. The state
    /// machine is handed back even when it refuses to stop.
    pub fn release(mut self) -> (T, StateMachineSlot) {
        if self.disable().is_err() {
            warn!("Servo released with its pulse train still running");
        }
        (self.tx, self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::StateMachineAllocator;
    use crate::sim::{FifoStalled, RecordingStateMachine};

    /// Accepts words and starts, but cannot be stopped.
    struct StuckStateMachine {
        enabled: bool,
    }

    impl StateMachineTx for StuckStateMachine {
        type Error = FifoStalled;

        fn push(&mut self, _word: u32) -> Result<(), Self::Error> {
            Ok(())
        }

        fn set_enabled(&mut self, enabled: bool) -> Result<(), Self::Error> {
            if !enabled {
                return Err(FifoStalled);
            }
            self.enabled = true;
            Ok(())
        }
    }

    fn servo() -> Servo<RecordingStateMachine> {
        let slot = StateMachineAllocator::new().claim().unwrap();
        match Servo::new(RecordingStateMachine::new(), slot) {
            Ok(servo) => servo,
            Err((_, e)) => panic!("servo failed to start: {e:?}"),
        }
    }

    #[test]
    fn test_start_sends_pulse_train_first() {
        let servo = servo();
        assert_eq!(servo.tx().words(), &[20_000, 500]);
        assert!(servo.tx().is_enabled());
        assert_eq!(servo.period_us(), 500);
    }

    #[test]
    fn test_degrees_to_pulse() {
        let mut servo = servo();
        for (degrees, expected) in [(0.0, 500), (45.0, 1000), (90.0, 1500), (180.0, 2500)] {
            servo.to_degrees(degrees).unwrap();
            assert_eq!(servo.period_us(), expected, "{degrees} degrees");
            assert_eq!(servo.tx().last_word(), Some(expected as u32));
        }
    }

    #[test]
    fn test_radians_to_pulse() {
        let mut servo = servo();
        servo.to_radians(1.5708).unwrap();
        assert_eq!(servo.period_us(), 1500);
        servo.to_radians(3.1416).unwrap();
        assert_eq!(servo.period_us(), 2500);
    }

    #[test]
    fn test_period_is_clamped() {
        let mut servo = servo();
        servo.to_period(100).unwrap();
        assert_eq!(servo.period_us(), 500);
        servo.to_degrees(270.0).unwrap();
        assert_eq!(servo.period_us(), 2500);
    }

    #[test]
    fn test_release_stops_pulse_train() {
        let servo = servo();
        let (tx, slot) = servo.release();
        assert!(!tx.is_enabled());
        assert_eq!(slot.index(), 0);
    }

    #[test]
    fn test_release_hands_back_machine_that_fails_to_stop() {
        let slot = StateMachineAllocator::new().claim().unwrap();
        let mut servo = match Servo::new(StuckStateMachine { enabled: false }, slot) {
            Ok(servo) => servo,
            Err((_, e)) => panic!("servo failed to start: {e:?}"),
        };
        assert_eq!(
            servo.disable(),
            Err(BoardError::Output { details: "Failed to disable servo" })
        );

        let (tx, slot) = servo.release();
        assert!(tx.enabled);
        assert_eq!(slot.index(), 0);
    }
}
