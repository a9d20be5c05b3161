// ABOUTME: User data header information elements (concatenation, application port addressing)
// ABOUTME: Encodes the UDH including its length octet and parses it back into typed elements

use crate::codec::{DecodingError, decode_bytes, decode_u8};
use bytes::{Buf, BufMut, BytesMut};
use std::io::Cursor;

const IEI_CONCAT_8BIT: u8 = 0x00;
const IEI_PORT_8BIT: u8 = 0x04;
const IEI_PORT_16BIT: u8 = 0x05;
const IEI_CONCAT_16BIT: u8 = 0x08;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InformationElement {
    /// Part `number` (1-based) of a message split into `parts` PDUs
    Concatenation { reference: u16, parts: u8, number: u8 },
    /// Application port addressing
    PortAddress { destination: u16, source: u16 },
    /// Any element this crate does not interpret
    Other { id: u8, data: Vec<u8> },
}

impl InformationElement {
    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            InformationElement::Concatenation {
                reference,
                parts,
                number,
            } => {
                if *reference > 0xFF {
                    buf.put_slice(&[IEI_CONCAT_16BIT, 4]);
                    buf.put_u16(*reference);
                } else {
                    buf.put_slice(&[IEI_CONCAT_8BIT, 3, *reference as u8]);
                }
                buf.put_slice(&[*parts, *number]);
            }
            InformationElement::PortAddress {
                destination,
                source,
            } => {
                if *destination > 0xFF || *source > 0xFF {
                    buf.put_slice(&[IEI_PORT_16BIT, 4]);
                    buf.put_u16(*destination);
                    buf.put_u16(*source);
                } else {
                    buf.put_slice(&[IEI_PORT_8BIT, 2, *destination as u8, *source as u8]);
                }
            }
            InformationElement::Other { id, data } => {
                buf.put_u8(*id);
                buf.put_u8(data.len() as u8);
                buf.put_slice(data);
            }
        }
    }

    fn decode(id: u8, data: &[u8]) -> Self {
        let mut cursor = Cursor::new(data);
        match (id, data.len()) {
            (IEI_CONCAT_8BIT, 3) => InformationElement::Concatenation {
                reference: cursor.get_u8() as u16,
                parts: cursor.get_u8(),
                number: cursor.get_u8(),
            },
            (IEI_CONCAT_16BIT, 4) => InformationElement::Concatenation {
                reference: cursor.get_u16(),
                parts: cursor.get_u8(),
                number: cursor.get_u8(),
            },
            (IEI_PORT_8BIT, 2) => InformationElement::PortAddress {
                destination: cursor.get_u8() as u16,
                source: cursor.get_u8() as u16,
            },
            (IEI_PORT_16BIT, 4) => InformationElement::PortAddress {
                destination: cursor.get_u16(),
                source: cursor.get_u16(),
            },
            _ => InformationElement::Other {
                id,
                data: data.to_vec(),
            },
        }
    }
}

/// Encodes a complete user data header, length octet included
pub fn encode_user_data_header(elements: &[InformationElement]) -> Vec<u8> {
    let mut body = BytesMut::new();
    for element in elements {
        element.encode(&mut body);
    }
    let mut header = Vec::with_capacity(body.len() + 1);
    header.push(body.len() as u8);
    header.extend_from_slice(&body);
    header
}

/// Parses a user data header starting at its length octet. Returns the
/// elements and the header size in octets, length octet included.
pub fn decode_user_data_header(
    buf: &mut Cursor<&[u8]>,
) -> Result<(Vec<InformationElement>, usize), DecodingError> {
    let length = decode_u8(buf, "user data header length")? as usize;
    let body = decode_bytes(buf, length, "user data header")?;
    let mut cursor = Cursor::new(&body[..]);
    let mut elements = Vec::new();
    while cursor.has_remaining() {
        let id = decode_u8(&mut cursor, "information element id")?;
        let len = decode_u8(&mut cursor, "information element length")? as usize;
        let data = decode_bytes(&mut cursor, len, "information element")?;
        elements.push(InformationElement::decode(id, &data));
    }
    Ok((elements, length + 1))
}
