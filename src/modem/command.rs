// ABOUTME: AT command layer over the transport: write terminators, deadlines and result codes
// ABOUTME: Maps +CME/+CMS ERROR lines to GsmError and retries commands rejected as "busy"

use crate::REGEX_COMP_ERROR;
use crate::error::{CmeError, ErrorDomain, GsmError, GsmResult};
use crate::frame::Line;
use crate::transport::Transport;
use bytes::{BufMut, BytesMut};
use regex::Regex;
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Ends an SMS body at the `> ` prompt
pub const CTRL_Z: &[u8] = b"\x1a";
/// Cancels an SMS body at the `> ` prompt
pub const ESC: &[u8] = b"\x1b";

const DEFAULT_TERMINATOR: &[u8] = b"\r";

const MAX_BUSY_RETRIES: u32 = 10;
const BUSY_BACKOFF_STEP: Duration = Duration::from_millis(200);
const BUSY_SETTLE_WAIT: Duration = Duration::from_millis(100);

/// `+CME ERROR: 14` (SIM busy) is retried like the vendor busy code
const SIM_BUSY: u16 = CmeError::SimBusy as u16;

static CM_ERROR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+(CM[ES]) ERROR:\s*(.*)$").expect(REGEX_COMP_ERROR));

/// One AT command and how to wait for its response
#[derive(Clone, Copy, Debug)]
pub struct CommandRequest<'a> {
    pub command: &'a str,
    /// Appended to the command text, `\r` unless overridden
    pub terminator: &'a [u8],
    /// Wait for a response at all
    pub wait: bool,
    /// Turn error result codes into [`GsmError::Command`]
    pub parse_error: bool,
    /// Overrides the default command timeout
    pub timeout: Option<Duration>,
    /// Completes the response when the input ends with this sequence
    pub expected: Option<&'a [u8]>,
}

impl<'a> CommandRequest<'a> {
    pub fn new(command: &'a str) -> Self {
        Self {
            command,
            terminator: DEFAULT_TERMINATOR,
            wait: true,
            parse_error: true,
            timeout: None,
            expected: None,
        }
    }

    pub fn terminated_by(mut self, terminator: &'a [u8]) -> Self {
        self.terminator = terminator;
        self
    }

    /// Fire and forget
    pub fn no_response(mut self) -> Self {
        self.wait = false;
        self
    }

    /// Return the response lines even if they end in an error
    pub fn unparsed(mut self) -> Self {
        self.parse_error = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn expecting(mut self, sequence: &'a [u8]) -> Self {
        self.expected = Some(sequence);
        self
    }
}

/// Issues AT commands and interprets their final result codes
pub struct CommandProtocol {
    transport: Transport,
    timeout: Duration,
    /// Pause after every write, raised while the modem reports it is busy
    write_wait: Mutex<Duration>,
}

impl CommandProtocol {
    pub fn new(transport: Transport, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            write_wait: Mutex::new(Duration::ZERO),
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn default_timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends `command` with the default terminator and timeout
    pub async fn write(&self, command: &str) -> GsmResult<Vec<Line>> {
        self.execute(CommandRequest::new(command)).await
    }

    /// Sends `command` and returns its response whatever the result code
    pub async fn write_unparsed(&self, command: &str) -> GsmResult<Vec<Line>> {
        self.execute(CommandRequest::new(command).unparsed()).await
    }

    pub async fn execute(&self, request: CommandRequest<'_>) -> GsmResult<Vec<Line>> {
        let mut data = BytesMut::with_capacity(request.command.len() + request.terminator.len());
        data.put_slice(request.command.as_bytes());
        data.put_slice(request.terminator);
        let timeout = request.timeout.unwrap_or(self.timeout);

        let mut retries = 0;
        let mut settle = None;
        loop {
            let lines = self
                .transport
                .write(&data, request.wait, timeout, request.expected)
                .await?;
            let wait = self.write_wait();
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            if !request.wait || !request.parse_error {
                return Ok(lines);
            }

            let result = check_result(request.command, &lines);
            match result {
                Err(e) if retries < MAX_BUSY_RETRIES && is_busy(&e) => {
                    retries += 1;
                    settle = Some(if busy_code(&e) == Some(SIM_BUSY) {
                        Duration::ZERO
                    } else {
                        BUSY_SETTLE_WAIT
                    });
                    let wait = wait + BUSY_BACKOFF_STEP;
                    warn!(
                        command = request.command,
                        retries,
                        wait_ms = wait.as_millis() as u64,
                        "Modem busy, retrying"
                    );
                    self.set_write_wait(wait);
                    tokio::time::sleep(wait).await;
                }
                result => {
                    if let Some(settle) = settle {
                        debug!(wait_ms = settle.as_millis() as u64, "Modem recovered from busy state");
                        self.set_write_wait(settle);
                    }
                    return result.map(|()| lines);
                }
            }
        }
    }

    /// Cancels text entry at the `> ` prompt
    pub async fn abort_entry(&self) -> GsmResult<()> {
        debug!("Aborting SMS entry");
        self.execute(CommandRequest::new("").terminated_by(ESC).no_response())
            .await
            .map(|_| ())
    }

    fn write_wait(&self) -> Duration {
        *self.write_wait.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_write_wait(&self, wait: Duration) {
        *self.write_wait.lock().unwrap_or_else(PoisonError::into_inner) = wait;
    }
}

fn busy_code(error: &GsmError) -> Option<u16> {
    match error {
        GsmError::Command {
            domain: ErrorDomain::Cme | ErrorDomain::Cms,
            code,
            ..
        } => *code,
        _ => None,
    }
}

fn is_busy(error: &GsmError) -> bool {
    matches!(busy_code(error), Some(code) if code == CmeError::DeviceBusy as u16 || code == SIM_BUSY)
}

/// Inspects the final line of a response
pub(crate) fn check_result(command: &str, lines: &[Line]) -> GsmResult<()> {
    let Some(status) = lines.last() else {
        return Ok(());
    };
    let status = status.as_str().trim_end();
    if status.contains("ERROR") {
        let (domain, code) = match CM_ERROR.captures(status) {
            Some(caps) if &caps[1] == "CME" => (ErrorDomain::Cme, caps[2].trim().parse().ok()),
            Some(caps) => (ErrorDomain::Cms, caps[2].trim().parse().ok()),
            None => (ErrorDomain::Generic, None),
        };
        return Err(GsmError::Command {
            command: command.to_string(),
            domain,
            code,
        });
    }
    // Some Huawei firmware answers unknown commands with this instead of ERROR
    if status == "COMMAND NOT SUPPORT" {
        return Err(GsmError::Command {
            command: command.to_string(),
            domain: ErrorDomain::Generic,
            code: None,
        });
    }
    Ok(())
}
