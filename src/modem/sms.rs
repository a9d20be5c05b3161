// ABOUTME: Sending, receiving and tracking delivery of SMS messages in text or PDU mode
// ABOUTME: Turns +CMTI/+CDSI/+CDS notifications into ReceivedSms and StatusReport events

use super::{GsmModem, ModemEvent};
use crate::REGEX_COMP_ERROR;
use crate::codec::{
    DecodingError, SmsDeliver, SmsPdu, SmsStatusReport, SubmitOptions, encode_sms_submit_pdu,
};
use crate::datatypes::gsm7::is_gsm7_text;
use crate::datatypes::{DeliveryStatus, InformationElement};
use crate::error::{GsmError, GsmResult};
use crate::frame::Line;
use crate::modem::command::{CTRL_Z, CommandRequest};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone};
use num_enum::TryFromPrimitive;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Prompt after `AT+CMGS` asking for the message body
const PROMPT: &[u8] = b"> ";
const PROMPT_TIMEOUT: Duration = Duration::from_secs(3);
const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Message storage selected during initialisation
pub(crate) const DEFAULT_STORAGE: &str = "SM";

/// Status reports kept for senders that start waiting after the report arrived
const RECENT_REPORTS: usize = 16;

static CMGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+CMGS:\s*(\d+)").expect(REGEX_COMP_ERROR));
static INDICATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\+(?:CMTI|CDSI):\s*"?([^",]+)"?,\s*(\d+)$"#).expect(REGEX_COMP_ERROR)
});
static CMGR_TEXT_DELIVER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\+CMGR:\s*"([^"]+)","([^"]+)",[^,]*,"([^"]+)""#).expect(REGEX_COMP_ERROR)
});
static CMGR_TEXT_REPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\+CMGR:\s*"([^"]+)",(\d+),(\d+),"([^"]*)",(\d+),"([^"]+)","([^"]+)",(\d+)$"#)
        .expect(REGEX_COMP_ERROR)
});
static CMGR_PDU: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+CMGR:\s*(\d+),[^,]*,(\d+)$").expect(REGEX_COMP_ERROR));
static CDS_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\+CDS:\s*(\d+),(\d+),"([^"]*)",(\d+),"([^"]+)","([^"]+)",(\d+)$"#)
        .expect(REGEX_COMP_ERROR)
});
static CSCA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^\+CSCA:\s*"([^"]*)""#).expect(REGEX_COMP_ERROR));

/// Storage status of a message (`<stat>` of `AT+CMGR`)
#[derive(TryFromPrimitive)]
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SmsStatus {
    ReceivedUnread = 0,
    ReceivedRead = 1,
    StoredUnsent = 2,
    StoredSent = 3,
}

impl SmsStatus {
    /// Parses the text mode form, e.g. `REC UNREAD`
    pub fn from_text(status: &str) -> Option<Self> {
        match status {
            "REC UNREAD" => Some(SmsStatus::ReceivedUnread),
            "REC READ" => Some(SmsStatus::ReceivedRead),
            "STO UNSENT" => Some(SmsStatus::StoredUnsent),
            "STO SENT" => Some(SmsStatus::StoredSent),
            _ => None,
        }
    }
}

/// A message received by the modem
#[derive(Clone, Debug, PartialEq)]
pub struct ReceivedSms {
    pub status: SmsStatus,
    pub number: String,
    pub time: DateTime<FixedOffset>,
    pub text: String,
    /// Service centre that delivered the message (PDU mode only)
    pub smsc: Option<String>,
    /// Header elements, e.g. the part number of a concatenated message
    pub user_data_header: Vec<InformationElement>,
}

impl ReceivedSms {
    fn from_deliver(status: SmsStatus, deliver: SmsDeliver) -> Self {
        Self {
            status,
            number: deliver.originator.number,
            time: deliver.timestamp,
            text: deliver.text,
            smsc: deliver.smsc.map(|smsc| smsc.number),
            user_data_header: deliver.user_data_header,
        }
    }
}

/// Delivery report for a sent message
#[derive(Clone, Debug, PartialEq)]
pub struct StatusReport {
    /// Message reference of the submitted message
    pub reference: u8,
    pub recipient: String,
    pub status: DeliveryStatus,
    /// Raw TP-Status
    pub tp_status: u8,
    /// When the service centre received the message
    pub sent_time: DateTime<FixedOffset>,
    /// When the status was reached
    pub delivery_time: DateTime<FixedOffset>,
    pub smsc: Option<String>,
}

impl From<SmsStatusReport> for StatusReport {
    fn from(report: SmsStatusReport) -> Self {
        Self {
            reference: report.reference,
            recipient: report.recipient.number.clone(),
            status: report.delivery_status(),
            tp_status: report.status,
            sent_time: report.timestamp,
            delivery_time: report.discharge_time,
            smsc: report.smsc.map(|smsc| smsc.number),
        }
    }
}

/// A message sent by the modem
#[derive(Clone, Debug, PartialEq)]
pub struct SentSms {
    pub number: String,
    pub text: String,
    /// Reference assigned by the modem (of the last part, for long messages)
    pub reference: Option<u8>,
    pub report: Option<StatusReport>,
}

impl SentSms {
    pub fn status(&self) -> DeliveryStatus {
        self.report
            .as_ref()
            .map(|report| report.status)
            .unwrap_or_default()
    }
}

/// A message read from storage
#[derive(Clone, Debug, PartialEq)]
pub enum StoredMessage {
    Received(ReceivedSms),
    StatusReport(StatusReport),
}

#[derive(Default)]
struct ReportRegistry {
    waiters: HashMap<u8, oneshot::Sender<StatusReport>>,
    recent: VecDeque<StatusReport>,
}

/// SMS state shared by senders and the notification handler
pub(crate) struct SmsState {
    text_mode: AtomicBool,
    reference: AtomicU8,
    reports: Mutex<ReportRegistry>,
    /// `+CDS` header whose PDU line has not been read yet
    pending_report: Mutex<Option<Line>>,
}

impl SmsState {
    pub(crate) fn new(text_mode: bool) -> Self {
        Self {
            text_mode: AtomicBool::new(text_mode),
            reference: AtomicU8::new(0),
            reports: Mutex::new(ReportRegistry::default()),
            pending_report: Mutex::new(None),
        }
    }

    pub(crate) fn set_pending_report(&self, header: Line) {
        *self
            .pending_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(header);
    }

    pub(crate) fn take_pending_report(&self) -> Option<Line> {
        self.pending_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub(crate) fn text_mode(&self) -> bool {
        self.text_mode.load(Ordering::SeqCst)
    }

    fn set_text_mode(&self, text_mode: bool) {
        self.text_mode.store(text_mode, Ordering::SeqCst);
    }

    fn next_reference(&self) -> u8 {
        self.reference.fetch_add(1, Ordering::SeqCst)
    }

    fn reports(&self) -> MutexGuard<'_, ReportRegistry> {
        self.reports.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_for_report(&self, reference: u8) -> oneshot::Receiver<StatusReport> {
        let (tx, rx) = oneshot::channel();
        let mut reports = self.reports();
        match reports.recent.iter().position(|r| r.reference == reference) {
            Some(position) => {
                if let Some(report) = reports.recent.remove(position) {
                    let _ = tx.send(report);
                }
            }
            None => {
                reports.waiters.insert(reference, tx);
            }
        }
        rx
    }

    fn cancel_report(&self, reference: u8) {
        self.reports().waiters.remove(&reference);
    }

    /// Hands a report to its waiting sender, or keeps it for a while.
    /// Returns whether a sender was waiting.
    fn deliver_report(&self, report: &StatusReport) -> bool {
        let mut reports = self.reports();
        if let Some(waiter) = reports.waiters.remove(&report.reference) {
            if waiter.send(report.clone()).is_ok() {
                return true;
            }
        }
        if reports.recent.len() == RECENT_REPORTS {
            reports.recent.pop_front();
        }
        reports.recent.push_back(report.clone());
        false
    }
}

/// Parses a text mode timestamp such as `12/12/24,16:47:51+08` (zone in
/// quarter hours)
pub(crate) fn parse_text_timestamp(value: &str) -> GsmResult<DateTime<FixedOffset>> {
    let invalid = || GsmError::Decoding(DecodingError::InvalidTimestamp);
    let split = value.rfind(['+', '-']).filter(|&index| index > 8);
    let (time, zone) = match split {
        Some(index) => (&value[..index], &value[index..]),
        None => (value, "+0"),
    };
    let quarters: i32 = zone.parse().map_err(|_| invalid())?;
    let offset = FixedOffset::east_opt(quarters * 15 * 60).ok_or_else(invalid)?;
    let time = NaiveDateTime::parse_from_str(time, "%y/%m/%d,%H:%M:%S").map_err(|_| invalid())?;
    offset
        .from_local_datetime(&time)
        .single()
        .ok_or_else(invalid)
}

/// `<mem>` and `<index>` of `+CMTI`/`+CDSI`
pub(crate) fn parse_indication(line: &str) -> Option<(String, u32)> {
    let caps = INDICATION.captures(line.trim_end())?;
    Some((caps[1].to_string(), caps[2].parse().ok()?))
}

fn parse_cmgs(lines: &[Line]) -> Option<u8> {
    lines
        .iter()
        .find_map(|line| CMGS.captures(line.as_str()))
        .and_then(|caps| caps[1].parse().ok())
}

/// Status report fields of text mode `+CDS`/`+CMGR` (from `<mr>` on)
fn text_status_report(
    reference: &str,
    recipient: &str,
    sent: &str,
    delivered: &str,
    status: &str,
) -> GsmResult<StatusReport> {
    let tp_status: u8 = status
        .parse()
        .map_err(|_| GsmError::Decoding(DecodingError::InvalidLength {
            field: "status",
            length: status.len(),
        }))?;
    Ok(StatusReport {
        reference: reference.parse().unwrap_or_default(),
        recipient: recipient.to_string(),
        status: DeliveryStatus::from_tp_status(tp_status),
        tp_status,
        sent_time: parse_text_timestamp(sent)?,
        delivery_time: parse_text_timestamp(delivered)?,
        smsc: None,
    })
}

fn parse_text_cmgr(command: &str, lines: &[Line]) -> GsmResult<StoredMessage> {
    let header = lines
        .first()
        .map(Line::as_str)
        .ok_or_else(|| GsmError::unexpected(command, lines))?;

    if let Some(caps) = CMGR_TEXT_DELIVER.captures(header) {
        let status =
            SmsStatus::from_text(&caps[1]).ok_or_else(|| GsmError::unexpected(command, lines))?;
        // Body lines sit between the header and the final OK
        let body = &lines[1..lines.len().saturating_sub(1).max(1)];
        let text = body.iter().map(Line::as_str).collect::<Vec<_>>().join("\n");
        return Ok(StoredMessage::Received(ReceivedSms {
            status,
            number: caps[2].to_string(),
            time: parse_text_timestamp(&caps[3])?,
            text,
            smsc: None,
            user_data_header: Vec::new(),
        }));
    }
    if let Some(caps) = CMGR_TEXT_REPORT.captures(header) {
        let report = text_status_report(&caps[3], &caps[4], &caps[6], &caps[7], &caps[8])?;
        return Ok(StoredMessage::StatusReport(report));
    }
    Err(GsmError::unexpected(command, lines))
}

fn parse_pdu_cmgr(command: &str, lines: &[Line]) -> GsmResult<StoredMessage> {
    let (Some(header), Some(pdu)) = (lines.first(), lines.get(1)) else {
        return Err(GsmError::unexpected(command, lines));
    };
    let status = CMGR_PDU
        .captures(header.as_str())
        .and_then(|caps| caps[1].parse::<u8>().ok())
        .and_then(|stat| SmsStatus::try_from(stat).ok())
        .ok_or_else(|| GsmError::unexpected(command, lines))?;

    match pdu.as_str().trim().parse::<SmsPdu>()? {
        SmsPdu::Deliver(deliver) => Ok(StoredMessage::Received(ReceivedSms::from_deliver(
            status, deliver,
        ))),
        SmsPdu::StatusReport(report) => Ok(StoredMessage::StatusReport(report.into())),
        SmsPdu::Submit(_) => Err(GsmError::Unsupported(
            "reading stored outgoing messages".to_string(),
        )),
    }
}

impl GsmModem {
    /// Sends an SMS, split into several parts if it is too long for one.
    ///
    /// In text mode, text that the modem's character set cannot carry is sent
    /// in PDU mode instead.
    pub async fn send_sms(&self, number: &str, text: &str) -> GsmResult<SentSms> {
        self.send(number, text, false).await
    }

    /// Sends an SMS with a status report request and waits up to `timeout`
    /// for the report. Without a report in time the message is returned
    /// with its status still en route.
    pub async fn send_sms_with_report(
        &self,
        number: &str,
        text: &str,
        timeout: Duration,
    ) -> GsmResult<SentSms> {
        let mut sent = self.send(number, text, true).await?;
        let Some(reference) = sent.reference else {
            warn!(number, "Modem did not report a message reference");
            return Ok(sent);
        };
        let waiter = self.inner.sms.wait_for_report(reference);
        match tokio::time::timeout(timeout, waiter).await {
            Ok(Ok(report)) => sent.report = Some(report),
            _ => {
                self.inner.sms.cancel_report(reference);
                warn!(reference, "No status report received");
            }
        }
        Ok(sent)
    }

    async fn send(&self, number: &str, text: &str, status_report: bool) -> GsmResult<SentSms> {
        let reference = if !self.inner.sms.text_mode() {
            self.send_pdu_mode(number, text, status_report).await?
        } else if is_gsm7_text(text) {
            self.send_text_mode(number, text).await?
        } else {
            debug!(number, "Text needs PDU mode");
            self.set_sms_text_mode(false).await?;
            let sent = self.send_pdu_mode(number, text, status_report).await;
            let restored = self.set_sms_text_mode(true).await;
            let reference = sent?;
            restored?;
            reference
        };
        info!(number, ?reference, "SMS sent");
        Ok(SentSms {
            number: number.to_string(),
            text: text.to_string(),
            reference,
            report: None,
        })
    }

    async fn send_text_mode(&self, number: &str, text: &str) -> GsmResult<Option<u8>> {
        let command = format!("AT+CMGS=\"{number}\"");
        self.inner
            .commands
            .execute(
                CommandRequest::new(&command)
                    .expecting(PROMPT)
                    .with_timeout(PROMPT_TIMEOUT),
            )
            .await?;
        let lines = self.write_sms_body(text).await?;
        Ok(parse_cmgs(&lines))
    }

    async fn send_pdu_mode(
        &self,
        number: &str,
        text: &str,
        status_report: bool,
    ) -> GsmResult<Option<u8>> {
        let options = SubmitOptions::default()
            .with_reference(self.inner.sms.next_reference())
            .with_status_report(status_report)
            .with_local_ton(self.inner.config.local_ton());
        let pdus = encode_sms_submit_pdu(number, text, &options)?;
        debug!(number, parts = pdus.len(), "Sending SMS in PDU mode");

        let mut reference = None;
        for pdu in &pdus {
            let command = format!("AT+CMGS={}", pdu.tpdu_length());
            self.inner
                .commands
                .execute(
                    CommandRequest::new(&command)
                        .expecting(PROMPT)
                        .with_timeout(PROMPT_TIMEOUT),
                )
                .await?;
            let lines = self.write_sms_body(&pdu.to_hex()).await?;
            reference = parse_cmgs(&lines);
        }
        Ok(reference)
    }

    /// Writes the body at the `> ` prompt, cancelling the entry on failure
    async fn write_sms_body(&self, body: &str) -> GsmResult<Vec<Line>> {
        let request = CommandRequest::new(body)
            .terminated_by(CTRL_Z)
            .with_timeout(SEND_TIMEOUT);
        match self.inner.commands.execute(request).await {
            Ok(lines) => Ok(lines),
            Err(e) => {
                if let Err(abort) = self.inner.commands.abort_entry().await {
                    debug!(error = %abort, "Could not abort SMS entry");
                }
                Err(e)
            }
        }
    }

    /// Switches between SMS text mode and PDU mode
    pub async fn set_sms_text_mode(&self, text_mode: bool) -> GsmResult<()> {
        let command = format!("AT+CMGF={}", u8::from(text_mode));
        self.inner.commands.write(&command).await?;
        self.inner.sms.set_text_mode(text_mode);
        Ok(())
    }

    pub fn sms_text_mode(&self) -> bool {
        self.inner.sms.text_mode()
    }

    /// Reads the message at `index` of the current storage
    pub async fn read_stored_sms(&self, index: u32) -> GsmResult<StoredMessage> {
        let command = format!("AT+CMGR={index}");
        let lines = self.inner.commands.write(&command).await?;
        if self.inner.sms.text_mode() {
            parse_text_cmgr(&command, &lines)
        } else {
            parse_pdu_cmgr(&command, &lines)
        }
    }

    pub async fn delete_stored_sms(&self, index: u32) -> GsmResult<()> {
        self.inner
            .commands
            .write(&format!("AT+CMGD={index}"))
            .await
            .map(|_| ())
    }

    /// The service centre number configured in the modem
    pub async fn smsc(&self) -> GsmResult<Option<String>> {
        let lines = self.inner.commands.write("AT+CSCA?").await?;
        let caps = lines
            .iter()
            .find_map(|line| CSCA.captures(line.as_str()))
            .ok_or_else(|| GsmError::unexpected("AT+CSCA?", &lines))?;
        Ok(Some(caps[1].to_string()).filter(|number| !number.is_empty()))
    }

    pub async fn set_smsc(&self, number: &str) -> GsmResult<()> {
        self.inner
            .commands
            .write(&format!("AT+CSCA=\"{number}\""))
            .await
            .map(|_| ())
    }

    /// Reads and deletes the message an indication points at
    async fn take_stored(&self, memory: &str, index: u32) -> GsmResult<StoredMessage> {
        let other_storage = memory != DEFAULT_STORAGE;
        if other_storage {
            self.inner
                .commands
                .write(&format!("AT+CPMS=\"{memory}\""))
                .await?;
        }
        let result = self.read_and_delete(index).await;
        if other_storage {
            let restore = format!("AT+CPMS=\"{DEFAULT_STORAGE}\"");
            if let Err(e) = self.inner.commands.write(&restore).await {
                warn!(error = %e, "Could not restore message storage");
            }
        }
        result
    }

    async fn read_and_delete(&self, index: u32) -> GsmResult<StoredMessage> {
        let message = self.read_stored_sms(index).await?;
        self.delete_stored_sms(index).await?;
        Ok(message)
    }

    /// `+CMTI` (new message) or `+CDSI` (new status report)
    pub(super) async fn handle_stored_indication(&self, line: &Line) {
        let Some((memory, index)) = parse_indication(line.as_str()) else {
            debug!(line = %line, "Malformed message indication");
            return;
        };
        match self.take_stored(&memory, index).await {
            Ok(StoredMessage::Received(sms)) => {
                info!(number = %sms.number, index, "SMS received");
                self.emit(ModemEvent::SmsReceived(sms));
            }
            Ok(StoredMessage::StatusReport(report)) => self.handle_status_report(report),
            Err(e) => warn!(error = %e, memory, index, "Failed to read stored message"),
        }
    }

    /// `+CDS`: a status report routed directly, followed by its PDU in PDU mode
    pub(super) fn handle_direct_report(&self, line: &Line, pdu: Option<&Line>) {
        let report = match pdu {
            Some(pdu) => pdu
                .as_str()
                .trim()
                .parse::<SmsPdu>()
                .map_err(GsmError::from)
                .and_then(|decoded| match decoded {
                    SmsPdu::StatusReport(report) => Ok(StatusReport::from(report)),
                    _ => Err(GsmError::unexpected("+CDS", &[line.clone(), pdu.clone()])),
                }),
            None => match CDS_TEXT.captures(line.as_str()) {
                Some(caps) => text_status_report(&caps[2], &caps[3], &caps[5], &caps[6], &caps[7]),
                None => Err(GsmError::unexpected("+CDS", std::slice::from_ref(line))),
            },
        };
        match report {
            Ok(report) => self.handle_status_report(report),
            Err(e) => warn!(error = %e, "Failed to decode status report"),
        }
    }

    fn handle_status_report(&self, report: StatusReport) {
        let awaited = self.inner.sms.deliver_report(&report);
        info!(
            reference = report.reference,
            status = ?report.status,
            awaited,
            "Status report received"
        );
        self.emit(ModemEvent::StatusReport(report));
    }
}
