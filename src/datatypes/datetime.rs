// ABOUTME: Service centre timestamp / absolute validity period in 7 semi-octets
// ABOUTME: The time zone is in quarter hours with the sign carried in bit 3 of the last octet

use crate::codec::DecodingError;
use crate::datatypes::semi_octet::{decode_bcd, encode_bcd};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, TimeZone, Timelike};

/// Length of an encoded timestamp in octets
pub const TIMESTAMP_LEN: usize = 7;

const QUARTER_HOUR: i32 = 15 * 60;
const NEGATIVE_ZONE: u8 = 0x08;

/// Encodes a timestamp as YY MM DD hh mm ss zz, each octet nibble-swapped
pub fn encode_timestamp(time: &DateTime<FixedOffset>) -> [u8; TIMESTAMP_LEN] {
    let offset = time.offset().local_minus_utc();
    let quarters = (offset.abs() / QUARTER_HOUR) as u8;
    let mut zone = encode_bcd(quarters);
    if offset < 0 {
        zone |= NEGATIVE_ZONE;
    }

    [
        encode_bcd((time.year().rem_euclid(100)) as u8),
        encode_bcd(time.month() as u8),
        encode_bcd(time.day() as u8),
        encode_bcd(time.hour() as u8),
        encode_bcd(time.minute() as u8),
        encode_bcd(time.second() as u8),
        zone,
    ]
}

/// Decodes a 7-octet timestamp.
///
/// Two-digit years 00-68 map to 20xx and 69-99 to 19xx. A units digit above 9
/// in the time zone (sent by some networks) carries into the tens digit.
pub fn decode_timestamp(octets: &[u8]) -> Result<DateTime<FixedOffset>, DecodingError> {
    let [year, month, day, hour, minute, second, zone] = *octets else {
        return Err(DecodingError::Truncated { field: "timestamp" });
    };

    let year = decode_bcd(year) as i32;
    let year = if year <= 68 { 2000 + year } else { 1900 + year };

    let quarters = (zone & 0x07) as i32 * 10 + (zone >> 4) as i32;
    let mut offset_secs = quarters * QUARTER_HOUR;
    if zone & NEGATIVE_ZONE != 0 {
        offset_secs = -offset_secs;
    }

    let offset = FixedOffset::east_opt(offset_secs).ok_or(DecodingError::InvalidTimestamp)?;
    let naive = NaiveDate::from_ymd_opt(year, decode_bcd(month) as u32, decode_bcd(day) as u32)
        .and_then(|date| {
            date.and_hms_opt(
                decode_bcd(hour) as u32,
                decode_bcd(minute) as u32,
                decode_bcd(second) as u32,
            )
        })
        .ok_or(DecodingError::InvalidTimestamp)?;

    offset
        .from_local_datetime(&naive)
        .single()
        .ok_or(DecodingError::InvalidTimestamp)
}
