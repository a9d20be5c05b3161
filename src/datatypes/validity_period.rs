// ABOUTME: TP validity period in relative (one octet) and absolute (timestamp) formats
// ABOUTME: Relative values follow the four-range piecewise scale of 3GPP TS 23.040

use crate::codec::EncodingError;
use chrono::{DateTime, FixedOffset};
use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;
const WEEK: u64 = 7 * DAY;

/// How long the SMSC keeps trying to deliver a submitted message
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidityPeriod {
    /// Relative to submission, encoded in one octet
    Relative(Duration),
    /// Absolute expiry time, encoded as a 7-octet timestamp
    Absolute(DateTime<FixedOffset>),
}

impl ValidityPeriod {
    /// Bits 4..3 of the SMS-SUBMIT first octet
    pub fn format_flags(&self) -> u8 {
        match self {
            ValidityPeriod::Relative(_) => 0x10,
            ValidityPeriod::Absolute(_) => 0x18,
        }
    }
}

impl From<Duration> for ValidityPeriod {
    fn from(duration: Duration) -> Self {
        ValidityPeriod::Relative(duration)
    }
}

/// Encodes a relative validity period, rounding down to the granularity of
/// the range it falls into. Periods above 63 weeks cannot be represented.
pub fn encode_relative_validity(period: Duration) -> Result<u8, EncodingError> {
    let secs = period.as_secs();
    let value = if secs <= 12 * HOUR {
        (secs / (5 * MINUTE)).max(1) - 1
    } else if secs <= DAY {
        (secs - 12 * HOUR) / (30 * MINUTE) + 143
    } else {
        let days = secs / DAY;
        if days <= 30 {
            days + 166
        } else if days <= 441 {
            days / 7 + 192
        } else {
            return Err(EncodingError::ValidityPeriodTooLong(period));
        }
    };
    Ok(value as u8)
}

/// Decodes a relative validity period octet
pub fn decode_relative_validity(value: u8) -> Duration {
    let value = value as u64;
    let secs = match value {
        0..=143 => (value + 1) * 5 * MINUTE,
        144..=167 => 12 * HOUR + (value - 143) * 30 * MINUTE,
        168..=196 => (value - 166) * DAY,
        _ => (value - 192) * WEEK,
    };
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minutes(m: u64) -> Duration {
        Duration::from_secs(m * MINUTE)
    }

    #[test]
    fn test_encode_relative_validity_fixtures() {
        assert_eq!(encode_relative_validity(minutes(30)).unwrap(), 5);
        assert_eq!(encode_relative_validity(minutes(16 * 60)).unwrap(), 151);
        assert_eq!(encode_relative_validity(Duration::from_secs(3 * DAY)).unwrap(), 169);
        assert_eq!(encode_relative_validity(Duration::from_secs(5 * WEEK)).unwrap(), 197);
    }

    #[test]
    fn test_encode_relative_validity_range_edges() {
        assert_eq!(encode_relative_validity(Duration::ZERO).unwrap(), 0);
        assert_eq!(encode_relative_validity(minutes(12 * 60)).unwrap(), 143);
        assert_eq!(encode_relative_validity(Duration::from_secs(DAY)).unwrap(), 167);
        assert_eq!(encode_relative_validity(Duration::from_secs(30 * DAY)).unwrap(), 196);
        assert_eq!(encode_relative_validity(Duration::from_secs(63 * WEEK)).unwrap(), 255);
        assert!(matches!(
            encode_relative_validity(Duration::from_secs(442 * DAY)),
            Err(EncodingError::ValidityPeriodTooLong(_))
        ));
    }

    #[test]
    fn test_encode_relative_validity_is_monotonic() {
        let mut previous = 0;
        for step in 0..(441 * 24 * 4) {
            let period = Duration::from_secs(step * 15 * MINUTE);
            let value = encode_relative_validity(period).unwrap();
            assert!(value >= previous, "period {period:?}");
            previous = value;
        }
    }

    #[test]
    fn test_decode_relative_validity() {
        assert_eq!(decode_relative_validity(5), minutes(30));
        assert_eq!(decode_relative_validity(151), minutes(16 * 60));
        assert_eq!(decode_relative_validity(169), Duration::from_secs(3 * DAY));
        assert_eq!(decode_relative_validity(197), Duration::from_secs(5 * WEEK));
        assert_eq!(decode_relative_validity(0), minutes(5));
        assert_eq!(decode_relative_validity(255), Duration::from_secs(63 * WEEK));
    }

    #[test]
    fn test_decode_encode_within_granularity() {
        for value in 0..=255u8 {
            let period = decode_relative_validity(value);
            assert_eq!(encode_relative_validity(period).unwrap(), value);
        }
    }
}
