use num_enum::TryFromPrimitive;

/// Type of number, bits 6..4 of the type-of-address octet
#[derive(TryFromPrimitive)]
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum TypeOfNumber {
    #[default]
    Unknown = 0b000,
    International = 0b001,
    National = 0b010,
    NetworkSpecific = 0b011,
    SubscriberNumber = 0b100,
    Alphanumeric = 0b101,
    Abbreviated = 0b110,
    Reserved = 0b111,
}

impl TypeOfNumber {
    /// Extracts the type of number from a type-of-address octet
    pub fn from_toa(toa: u8) -> Self {
        // Three bits always map onto a variant
        Self::try_from((toa >> 4) & 0x07).unwrap_or(TypeOfNumber::Unknown)
    }
}
