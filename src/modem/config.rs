// ABOUTME: Modem configuration with defaults and builder-style setters
// ABOUTME: Covers the serial line, command timeouts, SMS mode, SIM PIN and queue sizes

use crate::datatypes::TypeOfNumber;
use crate::modem::call::CallStatusDialect;
use crate::serial::SerialSettings;
use std::time::Duration;

/// Configuration for [`GsmModem`](crate::modem::GsmModem)
#[derive(Clone, Debug)]
pub struct ModemConfig {
    /// Serial device path, e.g. `/dev/ttyUSB0`
    pub port: String,
    pub baud_rate: u32,
    /// Default deadline for a command response
    pub command_timeout: Duration,
    /// Use SMS text mode (`AT+CMGF=1`) instead of PDU mode
    pub sms_text_mode: bool,
    /// SMSC number written with `AT+CSCA` during initialisation
    pub smsc: Option<String>,
    /// SIM PIN entered when the SIM asks for one
    pub pin: Option<String>,
    /// Forces a call status dialect instead of probing the modem
    pub call_dialect: Option<CallStatusDialect>,
    /// How long `dial` waits for the modem to report the call
    pub dial_timeout: Duration,
    /// An incoming call that stops ringing for this long without being
    /// answered is taken as abandoned by the caller
    pub ring_timeout: Duration,
    /// Capacity of the queue between the reader and the notification handler
    pub notification_queue: usize,
    /// Capacity of the [`ModemEvent`](crate::modem::ModemEvent) broadcast channel
    pub event_capacity: usize,
    /// Encode all-digit numbers as "unknown" rather than "national"
    pub national_numbers_as_unknown: bool,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 115200,
            command_timeout: Duration::from_secs(5),
            sms_text_mode: false,
            smsc: None,
            pin: None,
            call_dialect: None,
            dial_timeout: Duration::from_secs(5),
            ring_timeout: Duration::from_secs(15),
            notification_queue: 32,
            event_capacity: 64,
            national_numbers_as_unknown: false,
        }
    }
}

impl ModemConfig {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Default::default()
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_sms_text_mode(mut self, text_mode: bool) -> Self {
        self.sms_text_mode = text_mode;
        self
    }

    pub fn with_smsc(mut self, smsc: impl Into<String>) -> Self {
        self.smsc = Some(smsc.into());
        self
    }

    pub fn with_pin(mut self, pin: impl Into<String>) -> Self {
        self.pin = Some(pin.into());
        self
    }

    pub fn with_call_dialect(mut self, dialect: CallStatusDialect) -> Self {
        self.call_dialect = Some(dialect);
        self
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout = timeout;
        self
    }

    pub fn with_notification_queue(mut self, capacity: usize) -> Self {
        self.notification_queue = capacity;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_national_numbers_as_unknown(mut self, unknown: bool) -> Self {
        self.national_numbers_as_unknown = unknown;
        self
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings::new(&self.port, self.baud_rate)
    }

    /// Type of number used when encoding all-digit numbers
    pub fn local_ton(&self) -> TypeOfNumber {
        if self.national_numbers_as_unknown {
            TypeOfNumber::Unknown
        } else {
            TypeOfNumber::National
        }
    }
}
