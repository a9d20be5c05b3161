// ABOUTME: Modem error types covering transport faults, AT command failures and call state violations
// ABOUTME: Codec errors convert in automatically so every operation returns a single GsmResult

use crate::codec::{DecodingError, EncodingError};
use crate::frame::Line;
use num_enum::TryFromPrimitive;
use std::fmt;
use std::io;
use thiserror::Error;

/// Which family of final result code reported a command failure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorDomain {
    /// `+CME ERROR: <code>`, mobile equipment failures
    Cme,
    /// `+CMS ERROR: <code>`, message service failures
    Cms,
    /// Bare `ERROR` (or an error line without a usable code)
    Generic,
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDomain::Cme => f.write_str("CME"),
            ErrorDomain::Cms => f.write_str("CMS"),
            ErrorDomain::Generic => f.write_str("generic"),
        }
    }
}

/// `+CME ERROR` codes (3GPP TS 27.007 §9.2) the modem layer reacts to
#[derive(TryFromPrimitive)]
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CmeError {
    PhoneFailure = 0,
    NoConnection = 1,
    OperationNotAllowed = 3,
    OperationNotSupported = 4,
    SimNotInserted = 10,
    SimPinRequired = 11,
    SimPukRequired = 12,
    SimFailure = 13,
    SimBusy = 14,
    SimWrong = 15,
    IncorrectPassword = 16,
    MemoryFull = 20,
    NotFound = 22,
    NoNetworkService = 30,
    NetworkTimeout = 31,
    EmergencyCallsOnly = 32,
    Unknown = 100,
    /// Vendor code used by several modems for "busy, retry later"
    DeviceBusy = 515,
}

/// Error type for all modem operations
#[derive(Debug, Error)]
pub enum GsmError {
    /// Serial port failure (open, read or write)
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// The transport is closed or its reader stopped after a fault
    #[error("Not connected")]
    NotConnected,

    /// No final result code within the deadline. Lines received so far are
    /// kept for diagnostics.
    #[error("Timeout waiting for response ({} partial lines)", .partial.len())]
    Timeout { partial: Vec<Line> },

    /// The modem answered with an error result code
    #[error("Command {command:?} failed: {domain} error{}", .code.map(|c| format!(" {c}")).unwrap_or_default())]
    Command {
        command: String,
        domain: ErrorDomain,
        code: Option<u16>,
    },

    /// Operation not valid in the call's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An operation in progress was cut short, e.g. DTMF playback on a call
    /// that ended
    #[error("Interrupted: {reason}")]
    Interrupted { reason: String },

    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    #[error("Decoding error: {0}")]
    Decoding(#[from] DecodingError),

    /// The modem lacks a feature the operation needs
    #[error("Not supported: {0}")]
    Unsupported(String),

    /// A response did not have the expected shape
    #[error("Unexpected response to {command:?}: {response:?}")]
    UnexpectedResponse {
        command: String,
        response: Vec<String>,
    },
}

/// Result type alias for modem operations
pub type GsmResult<T> = Result<T, GsmError>;

impl GsmError {
    pub(crate) fn unexpected(command: &str, lines: &[Line]) -> Self {
        GsmError::UnexpectedResponse {
            command: command.to_string(),
            response: lines.iter().map(|line| line.to_string()).collect(),
        }
    }

    /// The CME error code, if this is a `+CME ERROR`
    pub fn cme_code(&self) -> Option<u16> {
        match self {
            GsmError::Command {
                domain: ErrorDomain::Cme,
                code,
                ..
            } => *code,
            _ => None,
        }
    }

    /// The CMS error code, if this is a `+CMS ERROR`
    pub fn cms_code(&self) -> Option<u16> {
        match self {
            GsmError::Command {
                domain: ErrorDomain::Cms,
                code,
                ..
            } => *code,
            _ => None,
        }
    }

    pub fn is_cme(&self, error: CmeError) -> bool {
        self.cme_code() == Some(error as u16)
    }

    pub fn cme_error(&self) -> Option<CmeError> {
        self.cme_code()
            .and_then(|code| CmeError::try_from(code).ok())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GsmError::Timeout { .. })
    }
}
