// ABOUTME: GsmModem handle tying together transport, command protocol, calls and SMS
// ABOUTME: Routes notification batches to call and SMS handling and broadcasts ModemEvents

pub mod call;
pub mod command;
pub mod config;
mod init;
pub mod sms;

pub use call::{
    Call, CallDirection, CallId, CallState, CallStatus, CallStatusDialect, CallTracker, CallType,
    CallUpdate, CallerId, DtmfCommand,
};
pub use command::{CTRL_Z, CommandProtocol, CommandRequest, ESC};
pub use config::ModemConfig;
pub use sms::{ReceivedSms, SentSms, SmsStatus, StatusReport, StoredMessage};

use crate::REGEX_COMP_ERROR;
use crate::dispatcher::{NotificationDispatcher, NotificationHandler};
use crate::error::{GsmError, GsmResult};
use crate::frame::Line;
use crate::serial::ModemPort;
use crate::transport::{Transport, is_response_terminator};
use regex::Regex;
use sms::SmsState;
use std::io;
use std::sync::{Arc, LazyLock, Mutex, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, trace, warn};

const COVERAGE_POLL_INTERVAL: Duration = Duration::from_millis(500);

static CSQ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+CSQ:\s*(\d+),").expect(REGEX_COMP_ERROR));
static COPS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\+COPS:\s*(\d+),(\d+),"(.+)"(?:,\d+)?$"#).expect(REGEX_COMP_ERROR)
});
static CREG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+CREG:\s*(?:\d+,)?(\d+)").expect(REGEX_COMP_ERROR));

/// Something the modem reported on its own
#[derive(Clone, Debug)]
pub enum ModemEvent {
    /// A call is ringing. Sent again on every further RING of the same call.
    IncomingCall(Call),
    CallAnswered(Call),
    CallEnded(Call),
    SmsReceived(ReceivedSms),
    StatusReport(StatusReport),
    /// The serial port failed and the modem is no longer usable
    FatalError(Arc<io::Error>),
}

/// Modem features found during initialisation
#[derive(Clone, Copy, Debug)]
struct Capabilities {
    dialect: CallStatusDialect,
    dtmf: Option<DtmfCommand>,
    /// `AT+CLIP=1` accepted
    caller_id: bool,
    /// `AT+CRC=1` accepted: rings arrive as `+CRING: <type>`
    extended_ring: bool,
}

struct ModemInner {
    config: ModemConfig,
    commands: CommandProtocol,
    calls: CallTracker,
    sms: SmsState,
    capabilities: Mutex<Capabilities>,
    events: broadcast::Sender<ModemEvent>,
    dispatcher: Mutex<Option<NotificationDispatcher>>,
}

/// A GSM modem attached to a serial port.
///
/// Cloning is cheap; all clones control the same modem. Unsolicited events
/// are delivered to receivers obtained from [`GsmModem::subscribe`].
#[derive(Clone)]
pub struct GsmModem {
    inner: Arc<ModemInner>,
}

/// Bridges the notification dispatcher back to the modem without keeping
/// it alive
struct ModemNotifications {
    modem: Weak<ModemInner>,
}

impl NotificationHandler for ModemNotifications {
    async fn on_notification(&self, lines: Vec<Line>) {
        if let Some(inner) = self.modem.upgrade() {
            GsmModem { inner }.handle_notification(lines).await;
        }
    }

    async fn on_fatal_error(&self, error: Arc<io::Error>) {
        if let Some(inner) = self.modem.upgrade() {
            error!(error = %error, "Modem connection lost");
            GsmModem { inner }.emit(ModemEvent::FatalError(error));
        }
    }
}

impl GsmModem {
    /// Opens the configured serial port and initialises the modem
    pub async fn connect(config: ModemConfig) -> GsmResult<Self> {
        let port = config.serial_settings().open()?;
        info!(port = %config.port, baud_rate = config.baud_rate, "Serial port open");
        let modem = Self::from_port(port, config);
        if let Err(e) = modem.init().await {
            error!(error = %e, "Modem initialisation failed");
            modem.close().await;
            return Err(e);
        }
        Ok(modem)
    }

    /// Wraps an already open port without initialising the modem.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_port<P: ModemPort>(port: P, config: ModemConfig) -> Self {
        let (notifications, notification_rx) = mpsc::channel(config.notification_queue.max(1));
        let transport = Transport::spawn(port, notifications);
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let capabilities = Capabilities {
            dialect: config.call_dialect.unwrap_or_default(),
            dtmf: Some(DtmfCommand::Vts),
            caller_id: true,
            extended_ring: false,
        };

        let inner = Arc::new(ModemInner {
            commands: CommandProtocol::new(transport, config.command_timeout),
            calls: CallTracker::default(),
            sms: SmsState::new(config.sms_text_mode),
            capabilities: Mutex::new(capabilities),
            events,
            dispatcher: Mutex::new(None),
            config,
        });
        let handler = ModemNotifications {
            modem: Arc::downgrade(&inner),
        };
        let dispatcher = NotificationDispatcher::spawn(notification_rx, handler);
        *inner
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(dispatcher);
        Self { inner }
    }

    /// Receiver for unsolicited events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ModemEvent> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> &ModemConfig {
        &self.inner.config
    }

    pub fn is_connected(&self) -> bool {
        self.inner.commands.transport().is_alive()
    }

    /// Stops the reader and releases the serial port
    pub async fn close(&self) {
        self.inner.commands.transport().close().await;
        let dispatcher = self
            .inner
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(dispatcher) = dispatcher {
            dispatcher.abort();
        }
        info!("Modem closed");
    }

    /// Sends a raw AT command (without terminator) and returns its response
    pub async fn write(&self, command: &str) -> GsmResult<Vec<Line>> {
        self.inner.commands.write(command).await
    }

    pub async fn execute(&self, request: CommandRequest<'_>) -> GsmResult<Vec<Line>> {
        self.inner.commands.execute(request).await
    }

    pub fn call_dialect(&self) -> CallStatusDialect {
        self.capabilities().dialect
    }

    /// Whether `+CLIP` caller identification is used. Assumed until
    /// initialisation finds the modem rejecting it.
    pub fn caller_id_enabled(&self) -> bool {
        self.capabilities().caller_id
    }

    pub fn extended_ring_enabled(&self) -> bool {
        self.capabilities().extended_ring
    }

    fn dtmf_command(&self) -> Option<DtmfCommand> {
        self.capabilities().dtmf
    }

    fn capabilities(&self) -> Capabilities {
        *self
            .inner
            .capabilities
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_capabilities(&self, capabilities: Capabilities) {
        *self
            .inner
            .capabilities
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = capabilities;
    }

    fn emit(&self, event: ModemEvent) {
        if self.inner.events.send(event).is_err() {
            trace!("No event subscribers");
        }
    }

    /// Processes one batch of unsolicited lines, in order
    async fn handle_notification(&self, lines: Vec<Line>) {
        let dialect = self.call_dialect();
        let text_mode = self.inner.sms.text_mode();
        let mut lines = lines.into_iter().peekable();

        // A +CDS header that ended the previous batch
        if let Some(header) = self.inner.sms.take_pending_report() {
            let pdu = lines.next_if(|next| !next.as_str().starts_with('+'));
            self.handle_direct_report(&header, pdu.as_ref());
        }

        while let Some(line) = lines.next() {
            let text = line.as_str();
            if text == "RING" || text.starts_with("+CRING:") {
                let clip = lines.next_if(|next| next.as_str().starts_with("+CLIP"));
                self.handle_ring(&line, clip.as_ref());
            } else if text.starts_with("+CLIP") {
                self.handle_caller_id(&line);
            } else if text.starts_with("+CMTI") || text.starts_with("+CDSI") {
                self.handle_stored_indication(&line).await;
            } else if text.starts_with("+CDS:") {
                // PDU mode: the report PDU follows on its own line
                if !text_mode && lines.peek().is_none() {
                    trace!(line = %line, "Status report PDU still to come");
                    self.inner.sms.set_pending_report(line);
                    continue;
                }
                let pdu = if text_mode {
                    None
                } else {
                    lines.next_if(|next| !next.as_str().starts_with('+'))
                };
                self.handle_direct_report(&line, pdu.as_ref());
            } else if let Some(status) = dialect.classify(text) {
                self.handle_call_status(status);
            } else {
                debug!(line = %line, "Unhandled notification");
            }
        }
    }

    /// Manufacturer (`AT+CGMI`)
    pub async fn manufacturer(&self) -> GsmResult<String> {
        self.query("AT+CGMI", "+CGMI:").await
    }

    /// Model (`AT+CGMM`)
    pub async fn model(&self) -> GsmResult<String> {
        self.query("AT+CGMM", "+CGMM:").await
    }

    /// Firmware revision (`AT+CGMR`), `None` if the modem does not say
    pub async fn revision(&self) -> GsmResult<Option<String>> {
        match self.query("AT+CGMR", "+CGMR:").await {
            Ok(revision) => Ok(Some(revision)),
            Err(GsmError::Command { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Serial number (`AT+CGSN`)
    pub async fn imei(&self) -> GsmResult<String> {
        self.query("AT+CGSN", "+CGSN:").await
    }

    /// Subscriber identity of the SIM (`AT+CIMI`)
    pub async fn imsi(&self) -> GsmResult<String> {
        self.query("AT+CIMI", "+CIMI:").await
    }

    /// Name of the network operator, `None` if not registered
    pub async fn network_name(&self) -> GsmResult<Option<String>> {
        let lines = self.inner.commands.write("AT+COPS?").await?;
        Ok(lines
            .iter()
            .find_map(|line| COPS.captures(line.as_str()))
            .map(|caps| caps[3].to_string()))
    }

    /// Received signal strength (`AT+CSQ`, 0-31), `None` if not known
    pub async fn signal_strength(&self) -> GsmResult<Option<u8>> {
        let lines = self.inner.commands.write("AT+CSQ").await?;
        let rssi: u8 = lines
            .iter()
            .find_map(|line| CSQ.captures(line.as_str()))
            .and_then(|caps| caps[1].parse().ok())
            .ok_or_else(|| GsmError::unexpected("AT+CSQ", &lines))?;
        Ok((rssi != 99).then_some(rssi))
    }

    /// Commands the modem lists in `AT+CLAC`, `None` if it cannot list them
    pub async fn supported_commands(&self) -> GsmResult<Option<Vec<String>>> {
        match self.inner.commands.write("AT+CLAC").await {
            Ok(lines) => Ok(Some(parse_command_list(&lines))),
            Err(e @ (GsmError::Command { .. } | GsmError::Timeout { .. })) => {
                debug!(error = %e, "Command list not available");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Waits until the modem is registered with a network (home or roaming)
    /// and has signal. Returns the signal strength.
    pub async fn wait_for_network_coverage(&self, timeout: Duration) -> GsmResult<u8> {
        match tokio::time::timeout(timeout, self.poll_network_coverage()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis() as u64, "No network coverage");
                Err(GsmError::Timeout {
                    partial: Vec::new(),
                })
            }
        }
    }

    async fn poll_network_coverage(&self) -> GsmResult<u8> {
        loop {
            let lines = self.inner.commands.write("AT+CREG?").await?;
            let status = lines
                .iter()
                .find_map(|line| CREG.captures(line.as_str()))
                .and_then(|caps| caps[1].parse::<u8>().ok());
            match status {
                // Registered, home network or roaming
                Some(1 | 5) => break,
                Some(3) => {
                    return Err(GsmError::InvalidState(
                        "network registration denied".to_string(),
                    ));
                }
                _ => tokio::time::sleep(COVERAGE_POLL_INTERVAL).await,
            }
        }
        loop {
            if let Some(signal) = self.signal_strength().await? {
                if signal > 0 {
                    return Ok(signal);
                }
            }
            tokio::time::sleep(COVERAGE_POLL_INTERVAL).await;
        }
    }

    /// First line of an information response, without the echoed prefix
    async fn query(&self, command: &str, prefix: &str) -> GsmResult<String> {
        let lines = self.inner.commands.write(command).await?;
        let value = lines
            .first()
            .filter(|line| !is_response_terminator(line.as_str()))
            .map(|line| {
                let text = line.as_str();
                text.strip_prefix(prefix)
                    .unwrap_or(text)
                    .trim()
                    .trim_matches('"')
                    .to_string()
            });
        value.ok_or_else(|| GsmError::unexpected(command, &lines))
    }
}

/// Command names from an `AT+CLAC` response, listed one per line or
/// comma-separated after `+CLAC:`
fn parse_command_list(lines: &[Line]) -> Vec<String> {
    lines
        .iter()
        .map(Line::as_str)
        .filter(|line| !is_response_terminator(line))
        .flat_map(|line| line.strip_prefix("+CLAC:").unwrap_or(line).split(','))
        .map(str::trim)
        .filter(|command| !command.is_empty())
        .map(str::to_string)
        .collect()
}
