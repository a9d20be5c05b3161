// ABOUTME: Parsing of SMS-DELIVER, SMS-SUBMIT and SMS-STATUS-REPORT TPDUs
// ABOUTME: User data decoding handles UDH fill bits, UCS-2 and 8-bit data

use super::{DecodingError, Pdu, decode_bytes, decode_u8};
use crate::datatypes::gsm7::decode_gsm7;
use crate::datatypes::septets::unpack_septets;
use crate::datatypes::ucs2::decode_ucs2;
use crate::datatypes::{
    Address, Alphabet, DataCoding, DeliveryStatus, InformationElement, MessageType,
    TIMESTAMP_LEN, ValidityPeriod, decode_address_field, decode_relative_validity,
    decode_smsc_field, decode_timestamp, decode_user_data_header,
};
use bytes::Buf;
use chrono::{DateTime, FixedOffset};
use std::io::Cursor;

const MORE_MESSAGES_TO_SEND: u8 = 0x04;
const VALIDITY_FORMAT_MASK: u8 = 0x18;
const STATUS_REPORT_FLAG: u8 = 0x20;
const USER_DATA_HEADER_INDICATOR: u8 = 0x40;

/// Enhanced validity period field length
const ENHANCED_VALIDITY_LEN: usize = 7;

/// A mobile-terminated message
#[derive(Clone, Debug, PartialEq)]
pub struct SmsDeliver {
    pub smsc: Option<Address>,
    pub originator: Address,
    pub protocol_id: u8,
    pub data_coding: DataCoding,
    pub timestamp: DateTime<FixedOffset>,
    pub user_data_header: Vec<InformationElement>,
    pub text: String,
    /// TP-MMS cleared: the SMSC has more messages waiting
    pub more_messages: bool,
    pub status_report_indicated: bool,
}

/// A mobile-originated message, as read back from a modem's outbox
#[derive(Clone, Debug, PartialEq)]
pub struct SmsSubmit {
    pub smsc: Option<Address>,
    pub reference: u8,
    pub destination: Address,
    pub protocol_id: u8,
    pub data_coding: DataCoding,
    pub validity: Option<ValidityPeriod>,
    pub user_data_header: Vec<InformationElement>,
    pub text: String,
    pub status_report_requested: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SmsStatusReport {
    pub smsc: Option<Address>,
    /// Reference of the SMS-SUBMIT this report belongs to
    pub reference: u8,
    pub recipient: Address,
    /// When the SMSC received the original message
    pub timestamp: DateTime<FixedOffset>,
    /// When the final status was reached (or the last delivery attempt)
    pub discharge_time: DateTime<FixedOffset>,
    /// Raw TP-Status octet
    pub status: u8,
}

impl SmsStatusReport {
    pub fn delivery_status(&self) -> DeliveryStatus {
        DeliveryStatus::from_tp_status(self.status)
    }
}

/// A decoded PDU of any of the supported message types
#[derive(Clone, Debug, PartialEq)]
pub enum SmsPdu {
    Deliver(SmsDeliver),
    Submit(SmsSubmit),
    StatusReport(SmsStatusReport),
}

impl SmsPdu {
    pub fn message_type(&self) -> MessageType {
        match self {
            SmsPdu::Deliver(_) => MessageType::Deliver,
            SmsPdu::Submit(_) => MessageType::Submit,
            SmsPdu::StatusReport(_) => MessageType::StatusReport,
        }
    }

    pub fn smsc(&self) -> Option<&Address> {
        match self {
            SmsPdu::Deliver(pdu) => pdu.smsc.as_ref(),
            SmsPdu::Submit(pdu) => pdu.smsc.as_ref(),
            SmsPdu::StatusReport(pdu) => pdu.smsc.as_ref(),
        }
    }
}

impl TryFrom<&Pdu> for SmsPdu {
    type Error = DecodingError;

    fn try_from(pdu: &Pdu) -> Result<Self, Self::Error> {
        decode_sms_pdu(pdu.data())
    }
}

impl std::str::FromStr for SmsPdu {
    type Err = DecodingError;

    /// Decodes PDU hex text as read from the modem
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SmsPdu::try_from(&Pdu::from_hex(s)?)
    }
}

/// Decodes a PDU (SMSC field followed by the TPDU)
pub fn decode_sms_pdu(data: &[u8]) -> Result<SmsPdu, DecodingError> {
    let mut buf = Cursor::new(data);
    let smsc = decode_smsc_field(&mut buf)?;
    let first_octet = decode_u8(&mut buf, "first octet")?;

    let message_type = MessageType::try_from(first_octet & MessageType::MASK)
        .map_err(|_| DecodingError::UnknownMessageType(first_octet))?;
    let has_header = first_octet & USER_DATA_HEADER_INDICATOR != 0;

    match message_type {
        MessageType::Deliver => {
            let originator = decode_address_field(&mut buf)?;
            let protocol_id = decode_u8(&mut buf, "protocol identifier")?;
            let data_coding = DataCoding::from_byte(decode_u8(&mut buf, "data coding scheme")?);
            let timestamp = decode_timestamp_field(&mut buf)?;
            let (user_data_header, text) = decode_user_data(&mut buf, data_coding, has_header)?;
            Ok(SmsPdu::Deliver(SmsDeliver {
                smsc,
                originator,
                protocol_id,
                data_coding,
                timestamp,
                user_data_header,
                text,
                more_messages: first_octet & MORE_MESSAGES_TO_SEND == 0,
                status_report_indicated: first_octet & STATUS_REPORT_FLAG != 0,
            }))
        }
        MessageType::Submit => {
            let reference = decode_u8(&mut buf, "message reference")?;
            let destination = decode_address_field(&mut buf)?;
            let protocol_id = decode_u8(&mut buf, "protocol identifier")?;
            let data_coding = DataCoding::from_byte(decode_u8(&mut buf, "data coding scheme")?);
            let validity = match first_octet & VALIDITY_FORMAT_MASK {
                0x10 => Some(ValidityPeriod::Relative(decode_relative_validity(
                    decode_u8(&mut buf, "validity period")?,
                ))),
                0x18 => Some(ValidityPeriod::Absolute(decode_timestamp_field(&mut buf)?)),
                0x08 => {
                    decode_bytes(&mut buf, ENHANCED_VALIDITY_LEN, "validity period")?;
                    None
                }
                _ => None,
            };
            let (user_data_header, text) = decode_user_data(&mut buf, data_coding, has_header)?;
            Ok(SmsPdu::Submit(SmsSubmit {
                smsc,
                reference,
                destination,
                protocol_id,
                data_coding,
                validity,
                user_data_header,
                text,
                status_report_requested: first_octet & STATUS_REPORT_FLAG != 0,
            }))
        }
        MessageType::StatusReport => {
            let reference = decode_u8(&mut buf, "message reference")?;
            let recipient = decode_address_field(&mut buf)?;
            let timestamp = decode_timestamp_field(&mut buf)?;
            let discharge_time = decode_timestamp_field(&mut buf)?;
            let status = decode_u8(&mut buf, "status")?;
            Ok(SmsPdu::StatusReport(SmsStatusReport {
                smsc,
                reference,
                recipient,
                timestamp,
                discharge_time,
                status,
            }))
        }
    }
}

fn decode_timestamp_field(
    buf: &mut Cursor<&[u8]>,
) -> Result<DateTime<FixedOffset>, DecodingError> {
    let octets = decode_bytes(buf, TIMESTAMP_LEN, "timestamp")?;
    decode_timestamp(&octets)
}

/// Decodes TP-UDL and TP-UD. A user data length larger than the data present
/// is tolerated; whatever data there is gets decoded.
fn decode_user_data(
    buf: &mut Cursor<&[u8]>,
    coding: DataCoding,
    has_header: bool,
) -> Result<(Vec<InformationElement>, String), DecodingError> {
    let length = decode_u8(buf, "user data length")? as usize;

    let (elements, header_len) = if has_header {
        decode_user_data_header(buf)?
    } else {
        (Vec::new(), 0)
    };
    let remaining = buf.chunk();

    let text = match coding.alphabet {
        Alphabet::Gsm7 => {
            // The header is padded with fill bits up to a septet boundary
            let header_bits = header_len * 8;
            let fill_bits = (7 - header_bits % 7) % 7;
            let header_septets = (header_bits + fill_bits) / 7;
            let septets = unpack_septets(
                remaining,
                Some(length.saturating_sub(header_septets)),
                fill_bits as u8,
            );
            decode_gsm7(&septets)
        }
        Alphabet::Ucs2 => {
            let len = length.saturating_sub(header_len).min(remaining.len());
            decode_ucs2(&remaining[..len])
        }
        Alphabet::EightBit => {
            let len = length.saturating_sub(header_len).min(remaining.len());
            remaining[..len].iter().map(|&b| b as char).collect()
        }
    };
    buf.set_position(buf.get_ref().len() as u64);
    Ok((elements, text))
}
