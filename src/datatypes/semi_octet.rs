// ABOUTME: Nibble-swapped BCD (semi-octet) encoding used by address fields and timestamps
// ABOUTME: Odd-length input is padded with the 0xF filler nibble, which decoding strips

use crate::codec::EncodingError;

const FILLER: u8 = 0x0F;

fn digit_value(c: char) -> Option<u8> {
    match c {
        '0'..='9' => Some(c as u8 - b'0'),
        '*' => Some(0x0A),
        '#' => Some(0x0B),
        'a' | 'A' => Some(0x0C),
        'b' | 'B' => Some(0x0D),
        'c' | 'C' => Some(0x0E),
        _ => None,
    }
}

fn digit_char(nibble: u8) -> char {
    match nibble {
        0..=9 => (b'0' + nibble) as char,
        0x0A => '*',
        0x0B => '#',
        0x0C => 'a',
        0x0D => 'b',
        _ => 'c',
    }
}

/// Encodes a digit string as semi-octets: "1234" becomes `[0x21, 0x43]`
pub fn encode_semi_octets(digits: &str) -> Result<Vec<u8>, EncodingError> {
    let nibbles = digits
        .chars()
        .map(|c| digit_value(c).ok_or(EncodingError::InvalidDigit(c)))
        .collect::<Result<Vec<u8>, _>>()?;

    Ok(nibbles
        .chunks(2)
        .map(|pair| {
            let high = pair.get(1).copied().unwrap_or(FILLER);
            (high << 4) | pair[0]
        })
        .collect())
}

/// Decodes semi-octets into a digit string, stopping at the filler nibble
pub fn decode_semi_octets(octets: &[u8]) -> String {
    let mut digits = String::with_capacity(octets.len() * 2);
    for &octet in octets {
        let low = octet & 0x0F;
        let high = octet >> 4;
        if low == FILLER {
            break;
        }
        digits.push(digit_char(low));
        if high == FILLER {
            break;
        }
        digits.push(digit_char(high));
    }
    digits
}

/// Decodes a single nibble-swapped BCD octet into its numeric value
pub fn decode_bcd(octet: u8) -> u8 {
    (octet & 0x0F) * 10 + (octet >> 4)
}

/// Encodes a value in 0..=99 as one nibble-swapped BCD octet
pub fn encode_bcd(value: u8) -> u8 {
    ((value % 10) << 4) | (value / 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_semi_octets() {
        assert_eq!(
            encode_semi_octets("15125551234").unwrap(),
            vec![0x51, 0x21, 0x55, 0x15, 0x32, 0xF4]
        );
        assert_eq!(encode_semi_octets("123").unwrap(), vec![0x21, 0xF3]);
        assert_eq!(encode_semi_octets("1234").unwrap(), vec![0x21, 0x43]);
        assert_eq!(encode_semi_octets("").unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_encode_rejects_non_digits() {
        assert!(matches!(
            encode_semi_octets("12x4"),
            Err(EncodingError::InvalidDigit('x'))
        ));
    }

    #[test]
    fn test_decode_semi_octets() {
        assert_eq!(
            decode_semi_octets(&[0x51, 0x21, 0x55, 0x15, 0x32, 0xF4]),
            "15125551234"
        );
        assert_eq!(decode_semi_octets(&[0x21, 0xF3]), "123");
        assert_eq!(decode_semi_octets(&[0x21, 0x43]), "1234");
    }

    #[test]
    fn test_semi_octet_roundtrip_even_and_odd() {
        for digits in ["", "1", "12", "123", "27820001111", "0123456789", "*#1"] {
            let encoded = encode_semi_octets(digits).unwrap();
            assert_eq!(decode_semi_octets(&encoded), digits);
        }
    }

    #[test]
    fn test_bcd_octets() {
        assert_eq!(decode_bcd(0x31), 13);
        assert_eq!(decode_bcd(0x80), 8);
        assert_eq!(encode_bcd(13), 0x31);
        assert_eq!(encode_bcd(59), 0x95);
    }
}
