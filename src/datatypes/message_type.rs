use num_enum::TryFromPrimitive;

/// TP message type indicator, the low two bits of the first TPDU octet.
/// Values are for the mobile-terminated direction (except `Submit`, which is
/// what a modem hands back when reading its own outbox).
#[derive(TryFromPrimitive)]
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageType {
    Deliver = 0b00,
    Submit = 0b01,
    StatusReport = 0b10,
    // 0b11 is reserved
}

impl MessageType {
    pub const MASK: u8 = 0x03;
}
