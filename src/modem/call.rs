//! Voice calls: the call registry and the modem dialects reporting call progress
//!
//! Calls are plain values. The registry in [`CallTracker`] owns the current
//! state of every active call; the [`Call`] values handed to applications are
//! snapshots identified by [`CallId`], and every operation on a call goes
//! through [`GsmModem`] with that id.
//!
//! Modems do not agree on how call progress is reported, so the unsolicited
//! lines are interpreted through a [`CallStatusDialect`] chosen when the modem
//! is initialised.

use super::{GsmModem, ModemEvent};
use crate::REGEX_COMP_ERROR;
use crate::codec::EncodingError;
use crate::error::{CmeError, GsmError, GsmResult};
use crate::frame::Line;
use crate::modem::command::CommandRequest;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Identifier of a call, as reported by the modem where the dialect has one
pub type CallId = u32;

static CLIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\+CLIP:\s*"([^"]*)",(\d+)(?:,[^,]*,[^,]*,(?:"([^"]*)")?)?"#)
        .expect(REGEX_COMP_ERROR)
});
static WAVECOM_INITIATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+WIND: 5,(\d+)$").expect(REGEX_COMP_ERROR));
static WAVECOM_ENDED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+WIND: 6,(\d+)$").expect(REGEX_COMP_ERROR));
static HUAWEI_ORIG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\^ORIG:\s*(\d+),(\d+)$").expect(REGEX_COMP_ERROR));
static HUAWEI_CONN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\^CONN:\s*(\d+),(\d+)$").expect(REGEX_COMP_ERROR));
static HUAWEI_CEND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\^CEND:\s*(\d+),").expect(REGEX_COMP_ERROR));

const DTMF_BASE_TIMEOUT: Duration = Duration::from_secs(5);
const DTMF_TONE_TIME: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallState {
    Ringing,
    Answered,
    Ended,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CallType {
    #[default]
    Voice,
    Fax,
    Data,
    Unknown,
}

impl CallType {
    /// Maps the `<type>` of `+CRING: <type>` (3GPP TS 27.007 §6.11)
    pub fn from_cring(kind: &str) -> Self {
        let kind = kind.trim();
        if kind.starts_with("VOICE") || kind.starts_with("ALT VOICE") {
            CallType::Voice
        } else if kind.starts_with("FAX") || kind.starts_with("ALT FAX") {
            CallType::Fax
        } else if kind.contains("SYNC") || kind.starts_with("GPRS") || kind == "DATA" {
            CallType::Data
        } else {
            CallType::Unknown
        }
    }

    /// Maps the numeric call type of Huawei `^ORIG`/`^CONN`
    pub fn from_code(code: u8) -> Self {
        match code {
            0 | 9 => CallType::Voice,
            1 | 2 => CallType::Data,
            _ => CallType::Unknown,
        }
    }
}

/// Snapshot of a call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Call {
    pub id: CallId,
    pub direction: CallDirection,
    pub call_type: CallType,
    /// Remote number; `None` when withheld or not reported
    pub number: Option<String>,
    /// Type of address reported with the caller's number
    pub ton: Option<u8>,
    pub caller_name: Option<String>,
    pub state: CallState,
    pub ring_count: u32,
}

impl Call {
    pub fn is_active(&self) -> bool {
        self.state != CallState::Ended
    }
}

/// Caller identification from a `+CLIP` line
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallerId {
    pub number: Option<String>,
    pub ton: Option<u8>,
    pub name: Option<String>,
}

/// Parses `+CLIP: "<number>",<type>[,<subaddr>,<satype>,"<alpha>"]`
pub fn parse_clip(line: &str) -> Option<CallerId> {
    let caps = CLIP.captures(line.trim_end())?;
    let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
    Some(CallerId {
        number: non_empty(&caps[1]),
        ton: caps[2].parse().ok(),
        name: caps.get(3).and_then(|name| non_empty(name.as_str())),
    })
}

/// A change in call progress reported by the modem
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallStatus {
    /// An outgoing call was set up
    Initiated {
        id: Option<CallId>,
        call_type: CallType,
    },
    /// The remote party answered. Generic modems report this with
    /// `+COLP` when connected line identification is enabled.
    Answered { id: Option<CallId> },
    /// The call ended remotely
    Ended { id: Option<CallId> },
}

/// How a modem reports call progress
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum CallStatusDialect {
    /// `+WIND` indications (`AT+WIND=50`). `ATD` is only answered once the
    /// call connects, which then shows up as an unsolicited `OK`.
    Wavecom,
    /// `^ORIG`, `^CONN` and `^CEND` notifications
    Huawei,
    /// Final result codes only: `NO CARRIER`, `BUSY` and `NO ANSWER` end a
    /// call, `+COLP` (`AT+COLP=1`) marks it answered
    #[default]
    Generic,
}

impl CallStatusDialect {
    pub fn classify(&self, line: &str) -> Option<CallStatus> {
        let line = line.trim_end();
        let id = |caps: &regex::Captures<'_>| -> Option<CallId> { caps[1].parse().ok() };
        match self {
            CallStatusDialect::Wavecom => {
                if let Some(caps) = WAVECOM_INITIATED.captures(line) {
                    Some(CallStatus::Initiated {
                        id: id(&caps),
                        call_type: CallType::Voice,
                    })
                } else if line == "OK" {
                    Some(CallStatus::Answered { id: None })
                } else {
                    WAVECOM_ENDED
                        .captures(line)
                        .map(|caps| CallStatus::Ended { id: id(&caps) })
                }
            }
            CallStatusDialect::Huawei => {
                if let Some(caps) = HUAWEI_ORIG.captures(line) {
                    Some(CallStatus::Initiated {
                        id: id(&caps),
                        call_type: caps[2].parse().map(CallType::from_code).unwrap_or_default(),
                    })
                } else if let Some(caps) = HUAWEI_CONN.captures(line) {
                    Some(CallStatus::Answered { id: id(&caps) })
                } else {
                    HUAWEI_CEND
                        .captures(line)
                        .map(|caps| CallStatus::Ended { id: id(&caps) })
                }
            }
            CallStatusDialect::Generic => match line {
                "NO CARRIER" | "BUSY" | "NO ANSWER" => Some(CallStatus::Ended { id: None }),
                _ if line.starts_with("+COLP:") => Some(CallStatus::Answered { id: None }),
                _ => None,
            },
        }
    }

    /// Whether `ATD` gets a response before the call is answered
    pub fn dial_waits_for_response(&self) -> bool {
        !matches!(self, CallStatusDialect::Wavecom)
    }

    /// Whether dialling completes with a call-initiated notification
    pub fn reports_dial(&self) -> bool {
        !matches!(self, CallStatusDialect::Generic)
    }
}

/// Command used to play DTMF tones
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DtmfCommand {
    /// `AT+VTS=<tone>`
    Vts,
    /// `AT^DTMF=<call id>,<tone>`
    Huawei,
}

impl DtmfCommand {
    /// Builds one command line playing all `tones`
    pub fn command(&self, id: CallId, tones: &str) -> String {
        let base = match self {
            DtmfCommand::Vts => "+VTS=".to_string(),
            DtmfCommand::Huawei => format!("^DTMF={id},"),
        };
        let tones: Vec<String> = tones.chars().map(|tone| format!("{base}{tone}")).collect();
        format!("AT{}", tones.join(";"))
    }
}

fn is_dtmf_tone(c: char) -> bool {
    matches!(c, '0'..='9' | '*' | '#' | 'A'..='D')
}

struct PendingDial {
    number: String,
    reply: oneshot::Sender<Call>,
}

/// Outcome of registering or updating a call
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallUpdate {
    pub call: Call,
    /// A call that ended because the modem reused its id for `call`
    pub displaced: Option<Call>,
}

impl From<Call> for CallUpdate {
    fn from(call: Call) -> Self {
        Self {
            call,
            displaced: None,
        }
    }
}

fn is_ringing_incoming(call: &Call) -> bool {
    call.direction == CallDirection::Incoming && call.state == CallState::Ringing
}

/// Registry of active calls
#[derive(Default)]
pub struct CallTracker {
    calls: Mutex<BTreeMap<CallId, Call>>,
    last_ring: Mutex<BTreeMap<CallId, Instant>>,
    pending_dial: Mutex<Option<PendingDial>>,
}

impl CallTracker {
    fn calls(&self) -> MutexGuard<'_, BTreeMap<CallId, Call>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn last_ring(&self) -> MutexGuard<'_, BTreeMap<CallId, Instant>> {
        self.last_ring.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending_dial(&self) -> MutexGuard<'_, Option<PendingDial>> {
        self.pending_dial.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, id: CallId) -> Option<Call> {
        self.calls().get(&id).cloned()
    }

    pub fn active(&self) -> Vec<Call> {
        self.calls().values().cloned().collect()
    }

    /// Records a RING. A caller already ringing rings once more, anyone else
    /// becomes a new incoming call. A RING without caller identification
    /// (its `+CLIP` may still be on the way) belongs to the only ringing
    /// incoming call, if there is exactly one.
    pub fn ring(&self, call_type: CallType, caller: Option<CallerId>) -> Call {
        let mut calls = self.calls();
        let ringing: Vec<CallId> = calls
            .values()
            .filter(|call| is_ringing_incoming(call))
            .map(|call| call.id)
            .collect();
        let number = caller.as_ref().and_then(|caller| caller.number.as_ref());
        let existing = match (&caller, ringing.as_slice()) {
            (None, [only]) => Some(*only),
            _ => ringing
                .iter()
                .copied()
                .find(|id| calls.get(id).is_some_and(|call| call.number.as_ref() == number)),
        };
        if let Some(call) = existing.and_then(|id| calls.get_mut(&id)) {
            call.ring_count += 1;
            self.last_ring().insert(call.id, Instant::now());
            return call.clone();
        }

        let caller = caller.unwrap_or_default();
        let call = Call {
            id: next_id(&calls),
            direction: CallDirection::Incoming,
            call_type,
            number: caller.number,
            ton: caller.ton,
            caller_name: caller.name,
            state: CallState::Ringing,
            ring_count: 1,
        };
        calls.insert(call.id, call.clone());
        self.last_ring().insert(call.id, Instant::now());
        call
    }

    /// Ends an incoming call that has not rung for `timeout` and was never
    /// answered
    pub fn expire_ringing(&self, id: CallId, timeout: Duration) -> Option<Call> {
        let mut calls = self.calls();
        if !calls.get(&id).is_some_and(is_ringing_incoming) {
            return None;
        }
        let mut last_ring = self.last_ring();
        if last_ring.get(&id).is_some_and(|rung| rung.elapsed() < timeout) {
            return None;
        }
        last_ring.remove(&id);
        let mut call = calls.remove(&id)?;
        call.state = CallState::Ended;
        Some(call)
    }

    /// Attaches a late `+CLIP` to the newest ringing call without a number
    pub fn identify_caller(&self, caller: CallerId) -> Option<Call> {
        let mut calls = self.calls();
        let call = calls.values_mut().rev().find(|call| {
            call.direction == CallDirection::Incoming
                && call.state == CallState::Ringing
                && call.number.is_none()
        })?;
        call.number = caller.number;
        call.ton = caller.ton;
        call.caller_name = caller.name;
        Some(call.clone())
    }

    /// Registers interest in the next call-initiated notification. A dial
    /// still waiting is superseded.
    pub fn expect_dial(&self, number: &str) -> oneshot::Receiver<Call> {
        let (reply, waiter) = oneshot::channel();
        *self.pending_dial() = Some(PendingDial {
            number: number.to_string(),
            reply,
        });
        waiter
    }

    pub fn cancel_dial(&self) {
        self.pending_dial().take();
    }

    /// Adds an outgoing call in the ringing state. A call already registered
    /// under the id the modem reported is displaced: it is removed and
    /// returned in the ended state.
    pub fn outgoing(&self, id: Option<CallId>, number: &str, call_type: CallType) -> CallUpdate {
        let mut calls = self.calls();
        let id = id.unwrap_or_else(|| next_id(&calls));
        let displaced = calls.remove(&id).map(|mut call| {
            self.last_ring().remove(&id);
            call.state = CallState::Ended;
            call
        });
        let call = Call {
            id,
            direction: CallDirection::Outgoing,
            call_type,
            number: Some(number.to_string()),
            ton: None,
            caller_name: None,
            state: CallState::Ringing,
            ring_count: 0,
        };
        calls.insert(call.id, call.clone());
        CallUpdate { call, displaced }
    }

    /// Applies a call status notification. Returns the affected call, if the
    /// notification matched one.
    pub fn apply(&self, status: CallStatus) -> Option<CallUpdate> {
        match status {
            CallStatus::Initiated { id, call_type } => {
                let pending = self.pending_dial().take()?;
                let update = self.outgoing(id, &pending.number, call_type);
                if pending.reply.send(update.call.clone()).is_err() {
                    debug!(id = update.call.id, "Dial no longer waiting for call setup");
                }
                Some(update)
            }
            CallStatus::Answered { id } => {
                let mut calls = self.calls();
                let call = match id {
                    Some(id) => calls.get_mut(&id)?,
                    // Without an id the oldest outgoing call still ringing is meant
                    None => calls.values_mut().find(|call| {
                        call.direction == CallDirection::Outgoing
                            && call.state == CallState::Ringing
                    })?,
                };
                call.state = CallState::Answered;
                Some(call.clone().into())
            }
            CallStatus::Ended { id } => {
                let id = match id {
                    Some(id) => id,
                    None => *self.calls().keys().next()?,
                };
                self.remove(id).map(CallUpdate::from)
            }
        }
    }

    pub fn set_state(&self, id: CallId, state: CallState) -> Option<Call> {
        let mut calls = self.calls();
        let call = calls.get_mut(&id)?;
        call.state = state;
        Some(call.clone())
    }

    /// Removes a call, returning it in the ended state
    pub fn remove(&self, id: CallId) -> Option<Call> {
        let mut call = self.calls().remove(&id)?;
        self.last_ring().remove(&id);
        call.state = CallState::Ended;
        Some(call)
    }
}

/// Lowest id not in use
fn next_id(calls: &BTreeMap<CallId, Call>) -> CallId {
    (1..).find(|id| !calls.contains_key(id)).unwrap_or(CallId::MAX)
}

fn inactive(id: CallId) -> GsmError {
    GsmError::InvalidState(format!("call {id} is not active"))
}

impl GsmModem {
    /// Places a voice call.
    ///
    /// Returns once the modem reports the call as set up (or, for modems
    /// without call progress notifications, once `ATD` is accepted). The
    /// call is ringing at that point.
    pub async fn dial(&self, number: &str) -> GsmResult<Call> {
        let dialect = self.call_dialect();
        let command = format!("ATD{number};");
        info!(number, ?dialect, "Dialling");

        if !dialect.reports_dial() {
            let lines = self.inner.commands.write(&command).await?;
            let call = self.inner.calls.outgoing(None, number, CallType::Voice).call;
            // Modems holding ATD until the remote party answers report +COLP in it
            for line in &lines {
                if let Some(status) = dialect.classify(line.as_str()) {
                    self.handle_call_status(status);
                }
            }
            return Ok(self.inner.calls.get(call.id).unwrap_or(call));
        }

        // Registered first: the notification may beat the response
        let waiter = self.inner.calls.expect_dial(number);
        let mut request = CommandRequest::new(&command);
        if !dialect.dial_waits_for_response() {
            request = request.no_response();
        }
        match self.inner.commands.execute(request).await {
            Ok(lines) => {
                // Progress lines that arrived inside the ATD response
                for line in &lines {
                    if let Some(status) = dialect.classify(line.as_str()) {
                        self.handle_call_status(status);
                    }
                }
            }
            Err(e) => {
                self.inner.calls.cancel_dial();
                return Err(e);
            }
        }

        match tokio::time::timeout(self.inner.config.dial_timeout, waiter).await {
            Ok(Ok(call)) => Ok(call),
            Ok(Err(_)) => Err(GsmError::Interrupted {
                reason: "superseded by another dial".to_string(),
            }),
            Err(_) => {
                self.inner.calls.cancel_dial();
                warn!(number, "No call setup notification after dialling");
                Err(GsmError::Timeout {
                    partial: Vec::new(),
                })
            }
        }
    }

    /// Answers a ringing incoming call
    pub async fn answer(&self, id: CallId) -> GsmResult<Call> {
        let call = self.inner.calls.get(id).ok_or_else(|| inactive(id))?;
        if call.direction != CallDirection::Incoming || call.state != CallState::Ringing {
            return Err(GsmError::InvalidState(format!(
                "call {id} is not ringing ({:?})",
                call.state
            )));
        }
        self.inner.commands.write("ATA").await?;
        let call = self
            .inner
            .calls
            .set_state(id, CallState::Answered)
            .ok_or_else(|| GsmError::Interrupted {
                reason: "call ended while answering".to_string(),
            })?;
        info!(id, "Call answered");
        self.emit(ModemEvent::CallAnswered(call.clone()));
        Ok(call)
    }

    /// Ends a call, ringing or answered
    pub async fn hangup(&self, id: CallId) -> GsmResult<()> {
        if self.inner.calls.get(id).is_none() {
            return Err(inactive(id));
        }
        self.inner.commands.write("ATH").await?;
        if let Some(call) = self.inner.calls.remove(id) {
            info!(id, "Call hung up");
            self.emit(ModemEvent::CallEnded(call));
        }
        Ok(())
    }

    /// Plays DTMF tones (`0-9`, `*`, `#`, `A-D`) on an answered call
    pub async fn send_dtmf(&self, id: CallId, tones: &str) -> GsmResult<()> {
        let call = self.inner.calls.get(id).ok_or_else(|| inactive(id))?;
        if call.state != CallState::Answered {
            return Err(GsmError::InvalidState(format!(
                "call {id} has not been answered"
            )));
        }
        let Some(dtmf) = self.dtmf_command() else {
            return Err(GsmError::Unsupported("DTMF tones".to_string()));
        };
        if let Some(c) = tones.chars().find(|&c| !is_dtmf_tone(c)) {
            return Err(EncodingError::InvalidDigit(c).into());
        }
        if tones.is_empty() {
            return Ok(());
        }

        let command = dtmf.command(id, tones);
        let timeout = DTMF_BASE_TIMEOUT + DTMF_TONE_TIME * tones.chars().count() as u32;
        let result = self
            .inner
            .commands
            .execute(CommandRequest::new(&command).with_timeout(timeout))
            .await;
        match result {
            Ok(_) => Ok(()),
            // The call ended during playback
            Err(e) if e.is_cme(CmeError::NoNetworkService) => Err(GsmError::Interrupted {
                reason: "no network service".to_string(),
            }),
            Err(e) if e.is_cme(CmeError::OperationNotAllowed) => Err(GsmError::Interrupted {
                reason: "operation not allowed".to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    pub fn call(&self, id: CallId) -> Option<Call> {
        self.inner.calls.get(id)
    }

    pub fn active_calls(&self) -> Vec<Call> {
        self.inner.calls.active()
    }

    /// `RING` or `+CRING`, optionally followed by `+CLIP`
    pub(super) fn handle_ring(&self, ring: &Line, clip: Option<&Line>) {
        let call_type = ring
            .as_str()
            .strip_prefix("+CRING:")
            .map(CallType::from_cring)
            .unwrap_or_default();
        let caller = clip
            .filter(|_| self.caller_id_enabled())
            .and_then(|line| parse_clip(line.as_str()));
        let call = self.inner.calls.ring(call_type, caller);
        if call.ring_count == 1 {
            info!(id = call.id, number = ?call.number, ?call_type, "Incoming call");
        } else {
            debug!(id = call.id, ring_count = call.ring_count, "Call ringing");
        }
        self.expire_after_ring_timeout(call.id);
        self.emit(ModemEvent::IncomingCall(call));
    }

    /// Ends the call once it stops ringing without being answered
    fn expire_after_ring_timeout(&self, id: CallId) {
        let modem = Arc::downgrade(&self.inner);
        let timeout = self.inner.config.ring_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let Some(inner) = modem.upgrade() else { return };
            if let Some(call) = inner.calls.expire_ringing(id, timeout) {
                info!(id, "Incoming call abandoned by caller");
                GsmModem { inner }.emit(ModemEvent::CallEnded(call));
            }
        });
    }

    /// A `+CLIP` that arrived apart from its RING
    pub(super) fn handle_caller_id(&self, clip: &Line) {
        if !self.caller_id_enabled() {
            debug!(line = %clip, "Caller identification not enabled");
            return;
        }
        match parse_clip(clip.as_str()).and_then(|caller| self.inner.calls.identify_caller(caller)) {
            Some(call) => debug!(id = call.id, number = ?call.number, "Caller identified"),
            None => debug!(line = %clip, "Caller id without a ringing call"),
        }
    }

    pub(super) fn handle_call_status(&self, status: CallStatus) {
        let Some(CallUpdate { call, displaced }) = self.inner.calls.apply(status) else {
            debug!(?status, "Call status for unknown call");
            return;
        };
        if let Some(ended) = displaced {
            warn!(id = ended.id, "Modem reused the id of a tracked call, ending it");
            self.emit(ModemEvent::CallEnded(ended));
        }
        match status {
            CallStatus::Initiated { .. } => debug!(id = call.id, "Outgoing call set up"),
            CallStatus::Answered { .. } => {
                info!(id = call.id, "Call answered by remote party");
                self.emit(ModemEvent::CallAnswered(call));
            }
            CallStatus::Ended { .. } => {
                info!(id = call.id, "Call ended by remote party");
                self.emit(ModemEvent::CallEnded(call));
            }
        }
    }
}
