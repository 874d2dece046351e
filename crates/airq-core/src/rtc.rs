//! Real-time clock helpers
//!
//! The hardware RTC keeps the calendar running; these helpers validate and
//! format its values and implement the alarm on top of it.

use core::fmt::Write;

use heapless::String;
use log::info;
use thiserror_no_std::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RtcError {
    #[error("Invalid date {day}/{month}/{year}")]
    InvalidDate { day: u8, month: u8, year: u16 },

    #[error("Invalid time {hour}:{minute}:{second}")]
    InvalidTime { hour: u8, minute: u8, second: u8 },
}

pub const fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub const fn days_in_month(month: u8, year: u16) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Day of the week for a Gregorian date, 0 = Monday. `None` when the month
/// is outside 1..=12 or the day is 0.
pub const fn weekday(day: u8, month: u8, year: u16) -> Option<u8> {
    const OFFSETS: [u32; 12] = [0, 3, 2, 5, 0, 3, 5, 1, 4, 6, 2, 4];
    if day == 0 || month == 0 || month > 12 {
        return None;
    }
    // shifted by one 400-year cycle so January of year 0 stays positive
    let y = year as u32 + if month < 3 { 399 } else { 400 };
    let sunday_based = (y + y / 4 - y / 100 + y / 400 + OFFSETS[(month - 1) as usize] + day as u32) % 7;
    Some(((sunday_based + 6) % 7) as u8)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub day: u8,
    pub month: u8,
    pub year: u16,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// 0 = Monday
    pub weekday: u8,
}

impl DateTime {
    /// Validated date and time with the weekday filled in.
    pub fn new(
        day: u8,
        month: u8,
        year: u16,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Result<Self, RtcError> {
        let weekday = match weekday(day, month, year) {
            Some(weekday) if year != 0 && day <= days_in_month(month, year) => weekday,
            _ => return Err(RtcError::InvalidDate { day, month, year }),
        };
        if hour > 23 || minute > 59 || second > 59 {
            return Err(RtcError::InvalidTime {
                hour,
                minute,
                second,
            });
        }
        Ok(Self {
            day,
            month,
            year,
            hour,
            minute,
            second,
            weekday,
        })
    }

    /// `dd/mm/yyyy`
    pub fn date_string(&self) -> String<10> {
        let mut out = String::new();
        write!(out, "{:02}/{:02}/{:04}", self.day, self.month, self.year).ok();
        out
    }

    /// `hh:mm:ss`
    pub fn time_string(&self) -> String<8> {
        let mut out = String::new();
        write!(out, "{:02}:{:02}:{:02}", self.hour, self.minute, self.second).ok();
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alarm {
    hour: u8,
    minute: u8,
    /// Hours and minutes between repeats.
    repeat: Option<(u8, u8)>,
    armed: bool,
    triggered: bool,
}

impl Alarm {
    pub const fn new() -> Self {
        Self {
            hour: 0,
            minute: 0,
            repeat: None,
            armed: false,
            triggered: false,
        }
    }

    pub fn set(&mut self, hour: u8, minute: u8, repeat: Option<(u8, u8)>) -> Result<(), RtcError> {
        if hour > 23 || minute > 59 {
            return Err(RtcError::InvalidTime {
                hour,
                minute,
                second: 0,
            });
        }
        self.hour = hour;
        self.minute = minute;
        self.repeat = repeat;
        self.armed = true;
        self.triggered = false;
        info!("Alarm set for {:02}:{:02}", hour, minute);
        Ok(())
    }

    /// Latches the trigger once `now` reaches the alarm time. Returns whether
    /// the alarm is sounding.
    pub fn check(&mut self, now: &DateTime) -> bool {
        if self.armed && now.hour == self.hour && now.minute == self.minute {
            self.triggered = true;
        }
        self.triggered
    }

    /// Stops a sounding alarm. A repeating alarm is re-armed one period
    /// later; any other alarm is disarmed.
    pub fn silence(&mut self) {
        self.triggered = false;
        match self.repeat {
            Some((hours, minutes)) => {
                let minute = self.minute as u16 + minutes as u16;
                let hour = self.hour as u16 + hours as u16 + minute / 60;
                self.minute = (minute % 60) as u8;
                self.hour = (hour % 24) as u8;
                info!("Alarm re-armed for {:02}:{:02}", self.hour, self.minute);
            }
            None => self.armed = false,
        }
    }

    pub fn time(&self) -> (u8, u8) {
        (self.hour, self.minute)
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered
    }
}

impl Default for Alarm {
    fn default() -> Self {
        Self::new()
    }
}
