// SMS TPDU codec (3GPP TS 23.038 / TS 23.040)
//
// Field-level encoders live in `datatypes`; this module assembles and parses
// whole PDUs. Everything here is pure: bytes in, values out.

use bytes::{Buf, Bytes};
use std::fmt;
use std::io::Cursor;
use std::time::Duration;
use thiserror::Error;

mod decode;
mod submit;

pub use decode::{SmsDeliver, SmsPdu, SmsStatusReport, SmsSubmit, decode_sms_pdu};
pub use submit::{SubmitOptions, encode_sms_submit_pdu};

/// Text or field values that cannot be represented in a PDU
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("Character {0:?} cannot be represented in the GSM 7-bit alphabet")]
    UnencodableCharacter(char),

    #[error("Invalid digit {0:?} in semi-octet string")]
    InvalidDigit(char),

    #[error("Invalid address: {0:?}")]
    InvalidAddress(String),

    #[error("Validity period {0:?} exceeds the 63 week maximum")]
    ValidityPeriodTooLong(Duration),

    #[error("Message needs {parts} parts, at most 255 are possible")]
    TooManyParts { parts: usize },
}

/// Malformed PDU data
#[derive(Debug, Error)]
pub enum DecodingError {
    #[error("Truncated PDU: {field} is missing")]
    Truncated { field: &'static str },

    #[error("Invalid {field} length: {length}")]
    InvalidLength { field: &'static str, length: usize },

    #[error("Unknown message type indicator: {0:#04x}")]
    UnknownMessageType(u8),

    #[error("Invalid SMSC type of address: {0:#04x}")]
    InvalidAddressType(u8),

    #[error("Invalid timestamp")]
    InvalidTimestamp,

    #[error("Invalid PDU hex data: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// An encoded PDU as handed to the modem: SMSC field followed by the TPDU
#[derive(Clone, PartialEq, Eq)]
pub struct Pdu {
    data: Bytes,
    tpdu_length: usize,
}

impl Pdu {
    pub fn new(data: Bytes, tpdu_length: usize) -> Self {
        Self { data, tpdu_length }
    }

    /// Parses hex text as read from `AT+CMGR` or `+CDS:`
    pub fn from_hex(text: &str) -> Result<Self, DecodingError> {
        let data = Bytes::from(hex::decode(text.trim())?);
        let smsc_len = data.first().map_or(0, |len| *len as usize + 1);
        if data.len() < smsc_len {
            return Err(DecodingError::Truncated { field: "SMSC value" });
        }
        let tpdu_length = data.len() - smsc_len;
        Ok(Self { data, tpdu_length })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Length in octets excluding the SMSC field, as `AT+CMGS=<length>` expects
    pub fn tpdu_length(&self) -> usize {
        self.tpdu_length
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.data)
    }
}

impl fmt::Display for Pdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Pdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pdu({}, tpdu_length={})", self.to_hex(), self.tpdu_length)
    }
}

/// Decode a single octet
pub fn decode_u8(buf: &mut Cursor<&[u8]>, field: &'static str) -> Result<u8, DecodingError> {
    if buf.remaining() < 1 {
        return Err(DecodingError::Truncated { field });
    }
    Ok(buf.get_u8())
}

/// Decode `len` octets
pub fn decode_bytes(
    buf: &mut Cursor<&[u8]>,
    len: usize,
    field: &'static str,
) -> Result<Bytes, DecodingError> {
    if buf.remaining() < len {
        return Err(DecodingError::Truncated { field });
    }
    Ok(buf.copy_to_bytes(len))
}
