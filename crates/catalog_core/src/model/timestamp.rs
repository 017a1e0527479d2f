//! Wire timestamp format shared by record export and reconstruction.
//!
//! # Responsibility
//! - Render record timestamps as fixed-width text.
//! - Parse that text back without accepting near-misses.
//! - Provide the microsecond-precision clock used by records.
//!
//! # Invariants
//! - Rendered text is always `YYYY-MM-DDTHH:MM:SS.ffffff` (26 chars, no offset).
//! - `parse_timestamp(&format_timestamp(t)) == t` for every `t` returned by `now()`.

use chrono::{Local, NaiveDateTime, SubsecRound};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// `strftime` pattern of the wire format.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

const TIMESTAMP_LEN: usize = 26;

/// Failure to read a wire timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimestampError {
    /// Text does not have the fixed `YYYY-MM-DDTHH:MM:SS.ffffff` shape.
    Malformed(String),
    /// Shape is right but the calendar/clock values are impossible.
    OutOfRange { text: String, reason: String },
}

impl Display for TimestampError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed(text) => write!(
                f,
                "timestamp `{text}` does not match format YYYY-MM-DDTHH:MM:SS.ffffff"
            ),
            Self::OutOfRange { text, reason } => {
                write!(f, "timestamp `{text}` is not a valid date/time: {reason}")
            }
        }
    }
}

impl Error for TimestampError {}

/// Current local wall-clock time truncated to whole microseconds.
pub fn now() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(6)
}

/// Renders `value` in the wire format, always with six fraction digits.
pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses wire-format text.
///
/// # Errors
/// - `Malformed` when the text is not exactly 26 chars of the expected shape
///   (missing fraction, short fraction, offsets and separators all count).
/// - `OutOfRange` when fields are well-shaped but invalid, e.g. month 13.
pub fn parse_timestamp(text: &str) -> Result<NaiveDateTime, TimestampError> {
    if !has_wire_shape(text) {
        return Err(TimestampError::Malformed(text.to_string()));
    }

    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT).map_err(|err| {
        TimestampError::OutOfRange {
            text: text.to_string(),
            reason: err.to_string(),
        }
    })
}

fn has_wire_shape(text: &str) -> bool {
    let bytes = text.as_bytes();
    bytes.len() == TIMESTAMP_LEN
        && bytes.iter().enumerate().all(|(index, byte)| match index {
            4 | 7 => *byte == b'-',
            10 => *byte == b'T',
            13 | 16 => *byte == b':',
            19 => *byte == b'.',
            _ => byte.is_ascii_digit(),
        })
}

#[cfg(test)]
mod tests {
    use super::{format_timestamp, now, parse_timestamp, TimestampError};
    use chrono::{NaiveDate, Timelike};

    #[test]
    fn format_always_emits_six_fraction_digits() {
        let value = NaiveDate::from_ymd_opt(2017, 9, 28)
            .and_then(|date| date.and_hms_micro_opt(21, 3, 54, 0))
            .unwrap();
        assert_eq!(format_timestamp(&value), "2017-09-28T21:03:54.000000");
    }

    #[test]
    fn parse_reads_wire_text() {
        let parsed = parse_timestamp("2017-09-28T21:03:54.052298").unwrap();
        let expected = NaiveDate::from_ymd_opt(2017, 9, 28)
            .and_then(|date| date.and_hms_micro_opt(21, 3, 54, 52_298))
            .unwrap();
        assert_eq!(parsed, expected);
    }

    #[test]
    fn parse_rejects_near_misses() {
        for text in [
            "2017-09-28T21:03:54",
            "2017-09-28T21:03:54.0522",
            "2017-09-28 21:03:54.052298",
            "2017-09-28T21:03:54.052298Z",
            "17-09-28T21:03:54.052298",
            "",
        ] {
            let err = parse_timestamp(text).unwrap_err();
            assert_eq!(err, TimestampError::Malformed(text.to_string()));
        }
    }

    #[test]
    fn parse_rejects_impossible_dates() {
        let err = parse_timestamp("2017-13-28T21:03:54.052298").unwrap_err();
        assert!(matches!(err, TimestampError::OutOfRange { .. }));
    }

    #[test]
    fn now_round_trips_exactly() {
        let value = now();
        assert_eq!(value.nanosecond() % 1_000, 0);
        assert_eq!(parse_timestamp(&format_timestamp(&value)).unwrap(), value);
    }
}
