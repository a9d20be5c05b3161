// ABOUTME: GSM 03.38 default alphabet and extension table conversions
// ABOUTME: Maps text to one septet per byte (escape pairs for extension characters) and back

use crate::codec::EncodingError;

/// Escape code introducing a character from the extension table
pub const ESCAPE: u8 = 0x1B;

/// The 128-entry GSM 7-bit default alphabet, indexed by septet value.
/// Position 0x1B holds the escape code itself.
const BASIC_TABLE: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å', //
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', '\x1b', 'Æ', 'æ', 'ß', 'É', //
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', //
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?', //
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', //
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '`', //
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', //
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à', //
];

/// Extension table entries as (character, code following the escape)
const EXTENSION_TABLE: [(char, u8); 10] = [
    ('\x0c', 0x0A),
    ('^', 0x14),
    ('{', 0x28),
    ('}', 0x29),
    ('\\', 0x2F),
    ('[', 0x3C),
    ('~', 0x3D),
    (']', 0x3E),
    ('|', 0x40),
    ('€', 0x65),
];

fn basic_code(c: char) -> Option<u8> {
    BASIC_TABLE.iter().position(|&b| b == c).map(|i| i as u8)
}

fn extension_code(c: char) -> Option<u8> {
    EXTENSION_TABLE
        .iter()
        .find(|(ext, _)| *ext == c)
        .map(|&(_, code)| code)
}

/// Returns true if every character of `text` has a GSM-7 representation
pub fn is_gsm7_text(text: &str) -> bool {
    text.chars()
        .all(|c| basic_code(c).is_some() || extension_code(c).is_some())
}

/// Number of septets `c` occupies once encoded (2 for extension characters)
pub fn septet_len(c: char) -> Option<usize> {
    if basic_code(c).is_some() {
        Some(1)
    } else if extension_code(c).is_some() {
        Some(2)
    } else {
        None
    }
}

/// Encodes text as GSM-7 septets, one per byte.
///
/// Characters found in neither table are dropped when `discard_invalid` is
/// set, otherwise they fail the whole encode.
pub fn encode_gsm7(text: &str, discard_invalid: bool) -> Result<Vec<u8>, EncodingError> {
    let mut septets = Vec::with_capacity(text.len());
    for c in text.chars() {
        if let Some(code) = basic_code(c) {
            septets.push(code);
        } else if let Some(code) = extension_code(c) {
            septets.push(ESCAPE);
            septets.push(code);
        } else if !discard_invalid {
            return Err(EncodingError::UnencodableCharacter(c));
        }
    }
    Ok(septets)
}

/// Decodes GSM-7 septets (one per byte) into text.
///
/// An escape followed by a code missing from the extension table decodes to
/// the basic-table character for that code. A trailing escape is ignored.
pub fn decode_gsm7(septets: &[u8]) -> String {
    let mut text = String::with_capacity(septets.len());
    let mut iter = septets.iter().map(|b| b & 0x7F);
    while let Some(code) = iter.next() {
        if code == ESCAPE {
            let Some(ext) = iter.next() else { break };
            match EXTENSION_TABLE.iter().find(|(_, c)| *c == ext) {
                Some(&(ch, _)) => text.push(ch),
                None => text.push(BASIC_TABLE[ext as usize]),
            }
        } else {
            text.push(BASIC_TABLE[code as usize]);
        }
    }
    text
}
