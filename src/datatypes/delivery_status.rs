// ABOUTME: TP-Status values carried in SMS-STATUS-REPORT
// ABOUTME: Collapses the status ranges of 3GPP TS 23.040 into a delivery outcome

/// Outcome of a submitted message as reported by the SMSC
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default)]
pub enum DeliveryStatus {
    /// Accepted by the SMSC, no final report yet
    #[default]
    Enroute,
    /// Short message transaction completed
    Delivered,
    /// Permanent error, or the SMSC stopped retrying
    Failed,
}

impl DeliveryStatus {
    /// Maps a raw TP-Status octet
    ///
    /// * `0x00-0x1F` transaction completed
    /// * `0x20-0x3F` temporary error, SMSC still trying
    /// * `0x40-0x7F` permanent error or temporary error with retries abandoned
    pub fn from_tp_status(status: u8) -> Self {
        match status {
            0x00..=0x1F => DeliveryStatus::Delivered,
            0x20..=0x3F => DeliveryStatus::Enroute,
            _ => DeliveryStatus::Failed,
        }
    }
}
