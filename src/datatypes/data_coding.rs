// ABOUTME: TP data coding scheme (3GPP TS 23.038) with alphabet and message class
// ABOUTME: Selects GSM-7 or UCS-2 automatically for outgoing text

use crate::datatypes::gsm7::is_gsm7_text;
use num_enum::TryFromPrimitive;
use std::fmt;

/// Character set of the user data
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub enum Alphabet {
    /// GSM 7-bit default alphabet, septet packed
    #[default]
    Gsm7,
    /// 8-bit data
    EightBit,
    /// UCS-2, big-endian 16-bit code units
    Ucs2,
}

/// Message class for SMS delivery
#[derive(TryFromPrimitive)]
#[repr(u8)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum MessageClass {
    /// Flash SMS (displayed immediately, not stored)
    Flash = 0,
    /// Mobile Equipment specific message
    MobileEquipment = 1,
    /// SIM-specific message (stored on SIM card)
    SimSpecific = 2,
    /// Terminal Equipment specific message
    TerminalEquipment = 3,
}

/// Decoded data coding scheme octet
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default)]
pub struct DataCoding {
    pub alphabet: Alphabet,
    pub class: Option<MessageClass>,
    pub compressed: bool,
}

impl DataCoding {
    pub fn gsm7() -> Self {
        Self::default()
    }

    pub fn ucs2() -> Self {
        Self {
            alphabet: Alphabet::Ucs2,
            ..Self::default()
        }
    }

    /// Picks GSM-7 when the whole text fits the default alphabet, UCS-2 otherwise
    pub fn for_text(text: &str) -> Self {
        if is_gsm7_text(text) {
            Self::gsm7()
        } else {
            Self::ucs2()
        }
    }

    /// Marks the coding as class 0 (flash)
    pub fn flash(mut self) -> Self {
        self.class = Some(MessageClass::Flash);
        self
    }

    pub fn is_flash(&self) -> bool {
        self.class == Some(MessageClass::Flash)
    }

    /// Interprets a data coding scheme octet. Coding groups this crate does
    /// not model fall back to GSM-7.
    pub fn from_byte(value: u8) -> Self {
        let class = MessageClass::try_from(value & 0x03).ok();
        match value >> 4 {
            // General data coding, with or without automatic deletion
            0x0..=0x7 => Self {
                alphabet: match (value >> 2) & 0x03 {
                    0x01 => Alphabet::EightBit,
                    0x02 => Alphabet::Ucs2,
                    _ => Alphabet::Gsm7,
                },
                class: if value & 0x10 != 0 { class } else { None },
                compressed: value & 0x20 != 0,
            },
            // Message waiting indication, store message, UCS-2
            0xE => Self::ucs2(),
            // Data coding / message class
            0xF => Self {
                alphabet: if value & 0x04 != 0 {
                    Alphabet::EightBit
                } else {
                    Alphabet::Gsm7
                },
                class,
                compressed: false,
            },
            _ => Self::gsm7(),
        }
    }

    /// Returns the general data coding octet for this scheme
    pub fn to_byte(&self) -> u8 {
        let alphabet = match self.alphabet {
            Alphabet::Gsm7 => 0x00,
            Alphabet::EightBit => 0x04,
            Alphabet::Ucs2 => 0x08,
        };
        let class = self.class.map_or(0x00, |class| 0x10 | class as u8);
        let compressed = if self.compressed { 0x20 } else { 0x00 };
        compressed | class | alphabet
    }

    /// Characters (septets for GSM-7, octets for 8-bit) that fit one PDU
    pub fn max_single_sms_length(&self) -> usize {
        match self.alphabet {
            Alphabet::Gsm7 => 160,
            Alphabet::EightBit => 140,
            Alphabet::Ucs2 => 70,
        }
    }

    /// Characters that fit one part of a concatenated message
    pub fn max_part_length(&self) -> usize {
        match self.alphabet {
            Alphabet::Gsm7 => 153,
            Alphabet::EightBit => 134,
            Alphabet::Ucs2 => 67,
        }
    }
}

impl fmt::Display for DataCoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.alphabet {
            Alphabet::Gsm7 => "GSM 7-bit Default",
            Alphabet::EightBit => "8-bit data",
            Alphabet::Ucs2 => "UCS-2",
        };
        write!(f, "{name}")?;
        if let Some(class) = self.class {
            write!(f, " (class {})", class as u8)?;
        }
        Ok(())
    }
}

impl From<u8> for DataCoding {
    fn from(value: u8) -> Self {
        Self::from_byte(value)
    }
}

impl From<DataCoding> for u8 {
    fn from(data_coding: DataCoding) -> Self {
        data_coding.to_byte()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_coding_to_byte() {
        assert_eq!(DataCoding::gsm7().to_byte(), 0x00);
        assert_eq!(DataCoding::gsm7().flash().to_byte(), 0x10);
        assert_eq!(DataCoding::ucs2().to_byte(), 0x08);
        assert_eq!(DataCoding::ucs2().flash().to_byte(), 0x18);
    }

    #[test]
    fn test_data_coding_from_byte() {
        assert_eq!(DataCoding::from_byte(0x00), DataCoding::gsm7());
        assert_eq!(DataCoding::from_byte(0x08), DataCoding::ucs2());
        assert_eq!(DataCoding::from_byte(0x04).alphabet, Alphabet::EightBit);
        assert!(DataCoding::from_byte(0x10).is_flash());
        assert!(DataCoding::from_byte(0xF0).is_flash());
        assert_eq!(DataCoding::from_byte(0xF4).alphabet, Alphabet::EightBit);
        assert_eq!(
            DataCoding::from_byte(0x11).class,
            Some(MessageClass::MobileEquipment)
        );
        // Class bits are ignored unless bit 4 is set
        assert_eq!(DataCoding::from_byte(0x01).class, None);
    }

    #[test]
    fn test_data_coding_unmodelled_groups() {
        assert_eq!(DataCoding::from_byte(0xC0), DataCoding::gsm7());
        assert_eq!(DataCoding::from_byte(0xE0).alphabet, Alphabet::Ucs2);
        assert_eq!(DataCoding::from_byte(0x90), DataCoding::gsm7());
    }

    #[test]
    fn test_data_coding_for_text() {
        assert_eq!(DataCoding::for_text("Hello {World}"), DataCoding::gsm7());
        assert_eq!(DataCoding::for_text("あ叶葉"), DataCoding::ucs2());
        assert_eq!(DataCoding::for_text("hello あ").max_single_sms_length(), 70);
    }
}
