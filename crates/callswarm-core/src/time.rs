//! 12-hour clock parsing and the minimum-slot-time policy check.
//!
//! Provider receptionists quote times as strings ("9:30 AM", "2 PM").
//! Everything that compares slots does so through [`parse_time`], which
//! maps a string to minutes since midnight. Malformed input is an error,
//! never a silent zero — a slot that cannot be parsed must not win a run.

use thiserror::Error;

/// Failure to interpret a 12-hour clock string.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimeError {
    /// Input was empty or whitespace.
    #[error("empty time string")]
    Empty,

    /// No AM/PM suffix present.
    #[error("missing AM/PM suffix in {0:?}")]
    MissingPeriod(String),

    /// Suffix was present but not AM or PM.
    #[error("unrecognized AM/PM suffix in {0:?}")]
    InvalidPeriod(String),

    /// Hour or minute component was not a number.
    #[error("non-numeric time component in {0:?}")]
    NotNumeric(String),

    /// Hour outside 1..=12.
    #[error("hour out of range in {0:?}")]
    HourOutOfRange(String),

    /// Minute outside 0..=59.
    #[error("minute out of range in {0:?}")]
    MinuteOutOfRange(String),

    /// Trailing garbage after the AM/PM suffix.
    #[error("unexpected trailing content in {0:?}")]
    TrailingContent(String),
}

/// Parse a 12-hour clock string ("9:30 AM", "12:05 pm", "2 PM") into
/// minutes since midnight.
///
/// `12:xx AM` normalizes to `0:xx`; `12:xx PM` stays `12:xx`. Periods in
/// the suffix ("a.m.") are tolerated. Anything else is rejected.
pub fn parse_time(input: &str) -> Result<u32, TimeError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TimeError::Empty);
    }
    let upper = trimmed.to_ascii_uppercase().replace('.', "");
    let mut parts = upper.split_whitespace();
    let Some(clock) = parts.next() else {
        return Err(TimeError::Empty);
    };
    let Some(period) = parts.next() else {
        return Err(TimeError::MissingPeriod(input.to_string()));
    };
    if parts.next().is_some() {
        return Err(TimeError::TrailingContent(input.to_string()));
    }

    let (hour_str, minute_str) = match clock.split_once(':') {
        Some((h, m)) => (h, m),
        None => (clock, "0"),
    };
    let hour: u32 = hour_str
        .parse()
        .map_err(|_| TimeError::NotNumeric(input.to_string()))?;
    let minute: u32 = minute_str
        .parse()
        .map_err(|_| TimeError::NotNumeric(input.to_string()))?;
    if !(1..=12).contains(&hour) {
        return Err(TimeError::HourOutOfRange(input.to_string()));
    }
    if minute > 59 {
        return Err(TimeError::MinuteOutOfRange(input.to_string()));
    }

    let hour24 = match period {
        "AM" => {
            if hour == 12 { 0 } else { hour }
        }
        "PM" => {
            if hour == 12 { 12 } else { hour + 12 }
        }
        _ => return Err(TimeError::InvalidPeriod(input.to_string())),
    };
    Ok(hour24 * 60 + minute)
}

/// Whether `slot` satisfies the minimum-time policy `minimum`.
///
/// True iff both strings parse and `slot` is not earlier than `minimum`.
/// A malformed slot is simply unacceptable (fail closed); a malformed
/// minimum rejects every slot, which configuration validation prevents
/// from ever being deployed.
pub fn slot_is_acceptable(slot: &str, minimum: &str) -> bool {
    match (parse_time(slot), parse_time(minimum)) {
        (Ok(s), Ok(m)) => s >= m,
        _ => false,
    }
}
