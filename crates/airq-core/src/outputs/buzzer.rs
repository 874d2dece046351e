//! Piezo buzzer on a PWM channel

use embedded_hal::pwm::SetDutyCycle;
use embedded_hal_async::delay::DelayNs;
use log::debug;

use super::output_error;
use crate::board::BoardError;

pub const MIN_FREQUENCY_HZ: u32 = 30;
pub const MAX_FREQUENCY_HZ: u32 = 3000;

/// PWM slice whose period can be changed at run time.
pub trait SetFrequency {
    type Error: core::fmt::Debug;

    fn set_frequency(&mut self, hz: u32) -> Result<(), Self::Error>;
}

pub struct Buzzer<P> {
    pwm: P,
    frequency_hz: Option<u32>,
}

impl<P: SetDutyCycle + SetFrequency> Buzzer<P> {
    pub fn new(pwm: P) -> Self {
        Self {
            pwm,
            frequency_hz: None,
        }
    }

    /// Starts a square wave at `hz`, clamped to 30-3000 Hz. Returns the
    /// frequency actually played.
    pub fn play_tone(&mut self, hz: u32) -> Result<u32, BoardError> {
        let hz = hz.clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ);
        SetFrequency::set_frequency(&mut self.pwm, hz)
            .map_err(output_error("Failed to set buzzer frequency"))?;
        self.pwm
            .set_duty_cycle_fraction(1, 2)
            .map_err(output_error("Failed to set buzzer duty"))?;
        self.frequency_hz = Some(hz);
        debug!("Buzzer at {} Hz", hz);
        Ok(hz)
    }

    pub async fn play_tone_for<D: DelayNs>(
        &mut self,
        hz: u32,
        duration_ms: u32,
        delay: &mut D,
    ) -> Result<(), BoardError> {
        self.play_tone(hz)?;
        delay.delay_ms(duration_ms).await;
        self.stop_tone()
    }

    pub fn stop_tone(&mut self) -> Result<(), BoardError> {
        self.pwm
            .set_duty_cycle_fully_off()
            .map_err(output_error("Failed to stop buzzer"))?;
        self.frequency_hz = None;
        Ok(())
    }

    /// Frequency of the tone currently playing.
    pub fn frequency(&self) -> Option<u32> {
        self.frequency_hz
    }

    pub fn release(self) -> P {
        self.pwm
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::sim::{ManualClock, SimDelay};
    use core::convert::Infallible;
    use embassy_futures::block_on;

    #[derive(Default)]
    struct FakePwm {
        duty: u16,
        hz: u32,
    }

    impl embedded_hal::pwm::ErrorType for FakePwm {
        type Error = Infallible;
    }

    impl SetDutyCycle for FakePwm {
        fn max_duty_cycle(&self) -> u16 {
            u16::MAX
        }

        fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Infallible> {
            self.duty = duty;
            Ok(())
        }
    }

    impl SetFrequency for FakePwm {
        type Error = Infallible;

        fn set_frequency(&mut self, hz: u32) -> Result<(), Infallible> {
            self.hz = hz;
            Ok(())
        }
    }

    #[test]
    fn test_tone_at_half_duty() {
        let mut buzzer = Buzzer::new(FakePwm::default());
        assert_eq!(buzzer.play_tone(440), Ok(440));
        let pwm = buzzer.release();
        assert_eq!(pwm.hz, 440);
        assert_eq!(pwm.duty, u16::MAX / 2);
    }

    #[test]
    fn test_frequency_is_clamped() {
        let mut buzzer = Buzzer::new(FakePwm::default());
        assert_eq!(buzzer.play_tone(5), Ok(30));
        assert_eq!(buzzer.play_tone(10_000), Ok(3000));
        assert_eq!(buzzer.frequency(), Some(3000));
    }

    #[test]
    fn test_timed_tone_stops() {
        let clock = ManualClock::new();
        let mut delay = SimDelay::new(&clock);
        let mut buzzer = Buzzer::new(FakePwm::default());

        block_on(buzzer.play_tone_for(1000, 250, &mut delay)).unwrap();
        assert_eq!(clock.now_ms(), 250);
        assert_eq!(buzzer.frequency(), None);
        assert_eq!(buzzer.release().duty, 0);
    }
}
