use num_enum::TryFromPrimitive;

/// Numbering plan identification, bits 3..0 of the type-of-address octet
#[derive(TryFromPrimitive)]
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum NumericPlanIndicator {
    #[default]
    Unknown = 0b0000,
    Isdn = 0b0001,
    Data = 0b0011,
    Telex = 0b0100,
    ServiceCentreSpecific = 0b0101,
    ServiceCentreSpecific2 = 0b0110,
    National = 0b1000,
    Private = 0b1001,
    Ermes = 0b1010,
    Reserved = 0b1111,
}

impl NumericPlanIndicator {
    /// Extracts the numbering plan from a type-of-address octet, mapping
    /// unassigned values to `Unknown`
    pub fn from_toa(toa: u8) -> Self {
        Self::try_from(toa & 0x0F).unwrap_or(NumericPlanIndicator::Unknown)
    }
}

/// Builds a type-of-address octet (bit 7 always set)
pub fn type_of_address(ton: crate::datatypes::TypeOfNumber, npi: NumericPlanIndicator) -> u8 {
    0x80 | ((ton as u8) << 4) | npi as u8
}
