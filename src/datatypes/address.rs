// ABOUTME: TP address and SMSC address fields (length indicator, type of address, value)
// ABOUTME: Handles international, national/unknown and alphanumeric numbers in both length conventions

use crate::codec::{DecodingError, EncodingError, decode_bytes, decode_u8};
use crate::datatypes::gsm7::{decode_gsm7, encode_gsm7};
use crate::datatypes::numeric_plan_indicator::type_of_address;
use crate::datatypes::semi_octet::{decode_semi_octets, encode_semi_octets};
use crate::datatypes::septets::{pack_septets, unpack_septets};
use crate::datatypes::{NumericPlanIndicator, TypeOfNumber};
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::io::Cursor;

/// Address values are at most 10 octets long (3GPP TS 23.040 §9.1.2.5)
const MAX_SEMI_OCTETS: usize = 20;

/// A phone number or alphanumeric sender together with its type of address
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    /// Digits (prefixed with `+` when international) or alphanumeric text
    pub number: String,
    pub ton: TypeOfNumber,
    pub npi: NumericPlanIndicator,
}

impl Address {
    /// Classifies a number for encoding.
    ///
    /// A leading `+` followed by digits is international, plain digits use
    /// `local_ton` (national or unknown), anything else is alphanumeric.
    pub fn parse(number: &str, local_ton: TypeOfNumber) -> Result<Self, EncodingError> {
        let is_digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());

        if let Some(digits) = number.strip_prefix('+') {
            if !is_digits(digits) {
                return Err(EncodingError::InvalidAddress(number.to_string()));
            }
            Ok(Self {
                number: number.to_string(),
                ton: TypeOfNumber::International,
                npi: NumericPlanIndicator::Isdn,
            })
        } else if is_digits(number) {
            Ok(Self {
                number: number.to_string(),
                ton: local_ton,
                npi: NumericPlanIndicator::Isdn,
            })
        } else if number.is_empty() {
            Err(EncodingError::InvalidAddress(number.to_string()))
        } else {
            Ok(Self {
                number: number.to_string(),
                ton: TypeOfNumber::Alphanumeric,
                npi: NumericPlanIndicator::Unknown,
            })
        }
    }

    pub fn type_of_address(&self) -> u8 {
        type_of_address(self.ton, self.npi)
    }

    fn digits(&self) -> &str {
        self.number.strip_prefix('+').unwrap_or(&self.number)
    }

    fn check_length(&self, semi_octets: usize) -> Result<u8, EncodingError> {
        if semi_octets > MAX_SEMI_OCTETS {
            return Err(EncodingError::InvalidAddress(self.number.clone()));
        }
        Ok(semi_octets as u8)
    }

    /// Encodes a TP address field whose length indicator counts digits
    /// (semi-octets for alphanumeric values)
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), EncodingError> {
        if self.ton == TypeOfNumber::Alphanumeric {
            let septets = encode_gsm7(&self.number, false)?;
            let packed = pack_septets(&septets, 0);
            let semi_octets = self.check_length((septets.len() * 7).div_ceil(4))?;
            buf.put_u8(semi_octets);
            buf.put_u8(self.type_of_address());
            buf.put_slice(&packed);
        } else {
            let digits = self.digits();
            buf.put_u8(self.check_length(digits.len())?);
            buf.put_u8(self.type_of_address());
            buf.put_slice(&encode_semi_octets(digits)?);
        }
        Ok(())
    }

    /// Encodes an SMSC address field whose length indicator counts octets
    /// (type of address plus digit octets)
    pub fn encode_smsc(&self, buf: &mut BytesMut) -> Result<(), EncodingError> {
        if self.ton == TypeOfNumber::Alphanumeric {
            return Err(EncodingError::InvalidAddress(self.number.clone()));
        }
        self.check_length(self.digits().len())?;
        let digits = encode_semi_octets(self.digits())?;
        buf.put_u8(digits.len() as u8 + 1);
        buf.put_u8(self.type_of_address());
        buf.put_slice(&digits);
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.number)
    }
}

/// Writes the SMSC field; `None` produces the single zero octet that tells the
/// modem to use its configured SMSC
pub fn encode_smsc_field(
    buf: &mut BytesMut,
    smsc: Option<&str>,
    local_ton: TypeOfNumber,
) -> Result<(), EncodingError> {
    match smsc {
        Some(number) => Address::parse(number, local_ton)?.encode_smsc(buf),
        None => {
            buf.put_u8(0x00);
            Ok(())
        }
    }
}

fn decode_value(ton: TypeOfNumber, raw: &[u8], semi_octets: usize) -> String {
    match ton {
        TypeOfNumber::Alphanumeric => {
            let septets = unpack_septets(raw, Some(semi_octets * 4 / 7), 0);
            decode_gsm7(&septets)
        }
        TypeOfNumber::International => format!("+{}", decode_semi_octets(raw)),
        _ => decode_semi_octets(raw),
    }
}

/// Decodes a TP address field. A zero length indicator still carries a
/// type-of-address octet and yields an empty number.
pub fn decode_address_field(buf: &mut Cursor<&[u8]>) -> Result<Address, DecodingError> {
    let semi_octets = decode_u8(buf, "address length")? as usize;
    let toa = decode_u8(buf, "address type")?;
    let raw = decode_bytes(buf, semi_octets.div_ceil(2), "address value")?;
    let ton = TypeOfNumber::from_toa(toa);
    Ok(Address {
        number: decode_value(ton, &raw, semi_octets),
        ton,
        npi: NumericPlanIndicator::from_toa(toa),
    })
}

/// Decodes the SMSC field; a zero length indicator means no SMSC is present
pub fn decode_smsc_field(buf: &mut Cursor<&[u8]>) -> Result<Option<Address>, DecodingError> {
    let octets = decode_u8(buf, "SMSC length")? as usize;
    if octets == 0 {
        return Ok(None);
    }
    let toa = decode_u8(buf, "SMSC type")?;
    let raw = decode_bytes(buf, octets - 1, "SMSC value")?;
    let ton = TypeOfNumber::from_toa(toa);
    if ton == TypeOfNumber::Alphanumeric {
        return Err(DecodingError::InvalidAddressType(toa));
    }
    Ok(Some(Address {
        number: decode_value(ton, &raw, (octets - 1) * 2),
        ton,
        npi: NumericPlanIndicator::from_toa(toa),
    }))
}
