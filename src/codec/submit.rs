// ABOUTME: SMS-SUBMIT TPDU assembly, including concatenation of long messages
// ABOUTME: Produces one Pdu per message part with its TPDU length for AT+CMGS

use super::{EncodingError, Pdu};
use crate::datatypes::gsm7::{encode_gsm7, septet_len};
use crate::datatypes::septets::pack_septets;
use crate::datatypes::ucs2::encode_ucs2;
use crate::datatypes::{
    Address, Alphabet, DataCoding, InformationElement, MessageType, TypeOfNumber,
    ValidityPeriod, encode_relative_validity, encode_smsc_field, encode_timestamp,
    encode_user_data_header,
};
use bytes::{BufMut, BytesMut};

const REJECT_DUPLICATES: u8 = 0x04;
const STATUS_REPORT_REQUEST: u8 = 0x20;
const USER_DATA_HEADER_INDICATOR: u8 = 0x40;

/// Options for building SMS-SUBMIT PDUs
#[derive(Clone, Debug)]
pub struct SubmitOptions {
    /// TP message reference
    pub reference: u8,
    /// Reference shared by all parts of a concatenated message
    /// (defaults to the message reference)
    pub concat_reference: Option<u16>,
    pub validity: Option<ValidityPeriod>,
    /// SMSC to use instead of the one configured in the modem
    pub smsc: Option<String>,
    pub request_status_report: bool,
    pub reject_duplicates: bool,
    /// Send as a class 0 message displayed immediately by the handset
    pub flash: bool,
    /// Type of number used for all-digit numbers without a leading `+`
    pub local_ton: TypeOfNumber,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            reference: 0,
            concat_reference: None,
            validity: None,
            smsc: None,
            request_status_report: false,
            reject_duplicates: false,
            flash: false,
            local_ton: TypeOfNumber::National,
        }
    }
}

impl SubmitOptions {
    pub fn with_reference(mut self, reference: u8) -> Self {
        self.reference = reference;
        self
    }

    pub fn with_validity(mut self, validity: impl Into<ValidityPeriod>) -> Self {
        self.validity = Some(validity.into());
        self
    }

    pub fn with_smsc(mut self, smsc: impl Into<String>) -> Self {
        self.smsc = Some(smsc.into());
        self
    }

    pub fn with_status_report(mut self, request: bool) -> Self {
        self.request_status_report = request;
        self
    }

    pub fn with_reject_duplicates(mut self, reject: bool) -> Self {
        self.reject_duplicates = reject;
        self
    }

    pub fn with_flash(mut self, flash: bool) -> Self {
        self.flash = flash;
        self
    }

    pub fn with_local_ton(mut self, ton: TypeOfNumber) -> Self {
        self.local_ton = ton;
        self
    }
}

/// Splits GSM-7 text into parts of at most `limit` septets without
/// separating an escape sequence from its extension code
fn split_gsm7(text: &str, limit: usize) -> Result<Vec<&str>, EncodingError> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut size = 0;
    for (index, c) in text.char_indices() {
        let len = septet_len(c).ok_or(EncodingError::UnencodableCharacter(c))?;
        if size + len > limit {
            parts.push(&text[start..index]);
            start = index;
            size = 0;
        }
        size += len;
    }
    if size > 0 {
        parts.push(&text[start..]);
    }
    Ok(parts)
}

/// Splits text into parts of at most `limit` UTF-16 code units, keeping
/// surrogate pairs together
fn split_ucs2(text: &str, limit: usize) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut size = 0;
    for (index, c) in text.char_indices() {
        let len = c.len_utf16();
        if size + len > limit {
            parts.push(&text[start..index]);
            start = index;
            size = 0;
        }
        size += len;
    }
    if size > 0 {
        parts.push(&text[start..]);
    }
    parts
}

/// Encodes `text` for `number` as one or more SMS-SUBMIT PDUs.
///
/// GSM-7 is used when the text allows it, UCS-2 otherwise. Text longer than a
/// single PDU is split and every part carries a concatenation element.
pub fn encode_sms_submit_pdu(
    number: &str,
    text: &str,
    options: &SubmitOptions,
) -> Result<Vec<Pdu>, EncodingError> {
    let destination = Address::parse(number, options.local_ton)?;
    let mut coding = DataCoding::for_text(text);
    if options.flash {
        coding = coding.flash();
    }

    let length = match coding.alphabet {
        Alphabet::Gsm7 => encode_gsm7(text, false)?.len(),
        _ => text.encode_utf16().count(),
    };
    let parts = if length > coding.max_single_sms_length() {
        match coding.alphabet {
            Alphabet::Gsm7 => split_gsm7(text, coding.max_part_length())?,
            _ => split_ucs2(text, coding.max_part_length()),
        }
    } else {
        vec![text]
    };
    if parts.len() > u8::MAX as usize {
        return Err(EncodingError::TooManyParts { parts: parts.len() });
    }

    let mut first_octet = MessageType::Submit as u8;
    if let Some(validity) = &options.validity {
        first_octet |= validity.format_flags();
    }
    if options.reject_duplicates {
        first_octet |= REJECT_DUPLICATES;
    }
    if options.request_status_report {
        first_octet |= STATUS_REPORT_REQUEST;
    }
    let concatenated = parts.len() > 1;
    if concatenated {
        first_octet |= USER_DATA_HEADER_INDICATOR;
    }

    let validity = match &options.validity {
        Some(ValidityPeriod::Relative(period)) => vec![encode_relative_validity(*period)?],
        Some(ValidityPeriod::Absolute(time)) => encode_timestamp(time).to_vec(),
        None => Vec::new(),
    };
    let concat_reference = options
        .concat_reference
        .unwrap_or(options.reference as u16);

    let mut pdus = Vec::with_capacity(parts.len());
    for (index, part) in parts.iter().enumerate() {
        let mut buf = BytesMut::with_capacity(176);
        encode_smsc_field(&mut buf, options.smsc.as_deref(), options.local_ton)?;
        let smsc_len = buf.len();

        buf.put_u8(first_octet);
        buf.put_u8(options.reference);
        destination.encode(&mut buf)?;
        buf.put_u8(0x00); // protocol identifier
        buf.put_u8(coding.to_byte());
        buf.put_slice(&validity);

        let header = if concatenated {
            encode_user_data_header(&[InformationElement::Concatenation {
                reference: concat_reference,
                parts: parts.len() as u8,
                number: index as u8 + 1,
            }])
        } else {
            Vec::new()
        };

        match coding.alphabet {
            Alphabet::Gsm7 => {
                let septets = encode_gsm7(part, false)?;
                let header_bits = header.len() * 8;
                let fill_bits = (7 - header_bits % 7) % 7;
                let header_septets = (header_bits + fill_bits) / 7;
                buf.put_u8((header_septets + septets.len()) as u8);
                buf.put_slice(&header);
                buf.put_slice(&pack_septets(&septets, fill_bits as u8));
            }
            _ => {
                let data = encode_ucs2(part);
                buf.put_u8((header.len() + data.len()) as u8);
                buf.put_slice(&header);
                buf.put_slice(&data);
            }
        }

        let tpdu_length = buf.len() - smsc_len;
        pdus.push(Pdu::new(buf.freeze(), tpdu_length));
    }
    Ok(pdus)
}
