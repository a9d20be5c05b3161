//! Serial transport: one IO task owns the modem port.
//!
//! The task reads whatever the modem sends, frames it into lines and decides
//! for each line whether it belongs to the command currently in flight or is
//! an unsolicited notification. Writes reach the task over a request channel,
//! so the port never needs to be shared or split.
//!
//! ```text
//!  Transport::write ──Request──▶ ┌──────────┐ ──bytes──▶ modem
//!        ▲                       │ IO task  │
//!        └──oneshot(lines)────── │ + framer │ ◀──bytes── modem
//!                                └──────────┘
//!                                     │ TransportEvent (bounded mpsc)
//!                                     ▼
//!                          NotificationDispatcher
//! ```
//!
//! At most one command is pending at a time. `write` holds an async lock from
//! issuing the bytes until the response completes or the deadline passes, so
//! response lines can never be attributed to the wrong command.
//!
//! Notification lines are collected until the port reports no queued input
//! and then handed on as one batch. The IO task never waits for the
//! dispatcher: batches that do not fit the queue are kept in a capped local
//! backlog and forwarded as capacity frees up. A handler that issues commands
//! while the queue is full therefore cannot stall the reader that has to
//! deliver those commands' responses.

use crate::REGEX_COMP_ERROR;
use crate::error::{GsmError, GsmResult};
use crate::frame::{Line, LineFramer};
use crate::serial::ModemPort;
use bytes::Bytes;
use regex::Regex;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

/// Batches held back while the dispatcher queue is full
pub const MAX_NOTIFICATION_BACKLOG: usize = 256;

const READ_BUFFER_SIZE: usize = 1024;
const REQUEST_QUEUE: usize = 8;

/// Final result codes that complete a pending command
static RESPONSE_TERMINATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(OK|ERROR|\+CM[ES] ERROR:.*|COMMAND NOT SUPPORT)$").expect(REGEX_COMP_ERROR)
});

pub(crate) fn is_response_terminator(line: &str) -> bool {
    RESPONSE_TERMINATOR.is_match(line.trim_end())
}

/// What the IO task hands to the notification dispatcher
#[derive(Debug)]
pub enum TransportEvent {
    /// Unsolicited lines that arrived together, in arrival order
    Notification(Vec<Line>),
    /// The port failed; the IO task has stopped. Sent once, last.
    Fatal(Arc<io::Error>),
}

/// The command awaiting its final result code
struct PendingCommand {
    lines: Vec<Line>,
    /// Alternate terminator, e.g. the `> ` prompt before an SMS body
    expected: Option<Bytes>,
    reply: oneshot::Sender<Vec<Line>>,
}

enum Request {
    Write {
        data: Bytes,
        pending: Option<PendingCommand>,
        ack: oneshot::Sender<io::Result<()>>,
    },
    Close,
}

#[derive(Default)]
struct Shared {
    alive: AtomicBool,
    pending: Mutex<Option<PendingCommand>>,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, Option<PendingCommand>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to a running transport
pub struct Transport {
    shared: Arc<Shared>,
    requests: mpsc::Sender<Request>,
    write_lock: tokio::sync::Mutex<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Transport {
    /// Starts the IO task on `port`. Notification batches and the fatal
    /// error (if any) are delivered on `events`.
    pub fn spawn<P: ModemPort>(port: P, events: mpsc::Sender<TransportEvent>) -> Self {
        let shared = Arc::new(Shared::default());
        shared.alive.store(true, Ordering::SeqCst);
        let (requests, request_rx) = mpsc::channel(REQUEST_QUEUE);
        let task = tokio::spawn(io_loop(port, Arc::clone(&shared), request_rx, events));
        Self {
            shared,
            requests,
            write_lock: tokio::sync::Mutex::new(()),
            task: Mutex::new(Some(task)),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.shared.alive.load(Ordering::SeqCst)
    }

    /// Writes raw bytes and, if `wait` is set, waits for the response.
    ///
    /// The response is complete when a final result code arrives or, when
    /// `expected` is given, when the input ends with that sequence. Returns
    /// every line received for the command, terminator included. On timeout
    /// the lines received so far are carried in [`GsmError::Timeout`].
    pub async fn write(
        &self,
        data: &[u8],
        wait: bool,
        timeout: Duration,
        expected: Option<&[u8]>,
    ) -> GsmResult<Vec<Line>> {
        let _guard = self.write_lock.lock().await;
        if !self.is_alive() {
            return Err(GsmError::NotConnected);
        }
        let deadline = Instant::now() + timeout;

        let (reply, mut response) = oneshot::channel();
        let pending = wait.then(|| PendingCommand {
            lines: Vec::new(),
            expected: expected.map(Bytes::copy_from_slice),
            reply,
        });
        let (ack, ack_rx) = oneshot::channel();
        self.requests
            .send(Request::Write {
                data: Bytes::copy_from_slice(data),
                pending,
                ack,
            })
            .await
            .map_err(|_| GsmError::NotConnected)?;

        match tokio::time::timeout_at(deadline, ack_rx).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(e))) => return Err(GsmError::Connection(e)),
            Ok(Err(_)) => return Err(GsmError::NotConnected),
            Err(_) => return self.timed_out(&mut response),
        }
        if !wait {
            return Ok(Vec::new());
        }

        match tokio::time::timeout_at(deadline, &mut response).await {
            Ok(Ok(lines)) => Ok(lines),
            // Pending command dropped by a stopping IO task
            Ok(Err(_)) => Err(GsmError::NotConnected),
            Err(_) => self.timed_out(&mut response),
        }
    }

    fn timed_out(&self, response: &mut oneshot::Receiver<Vec<Line>>) -> GsmResult<Vec<Line>> {
        let partial = self.shared.pending().take().map(|pending| pending.lines);
        match partial {
            Some(partial) => {
                warn!(partial = partial.len(), "Timeout waiting for response");
                Err(GsmError::Timeout { partial })
            }
            // Completed between the deadline and taking the pending command
            None => response.try_recv().map_err(|_| GsmError::Timeout {
                partial: Vec::new(),
            }),
        }
    }

    /// Stops the IO task and waits for it to release the port
    pub async fn close(&self) {
        self.shared.alive.store(false, Ordering::SeqCst);
        let _ = self.requests.send(Request::Close).await;
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        if let Some(task) = self
            .task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

async fn io_loop<P: ModemPort>(
    mut port: P,
    shared: Arc<Shared>,
    mut requests: mpsc::Receiver<Request>,
    events: mpsc::Sender<TransportEvent>,
) {
    let mut framer = LineFramer::new();
    let mut notifications = Vec::new();
    let mut backlog = VecDeque::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    let fault = loop {
        tokio::select! {
            biased;

            request = requests.recv() => match request {
                Some(Request::Write { data, pending, ack }) => {
                    framer.set_alternate(pending.as_ref().and_then(|p| p.expected.as_deref()));
                    *shared.pending() = pending;
                    trace!(data = %String::from_utf8_lossy(&data).escape_debug(), "write");
                    match write_all(&mut port, &data).await {
                        Ok(()) => {
                            let _ = ack.send(Ok(()));
                        }
                        Err(e) => {
                            let _ = ack.send(Err(io::Error::new(e.kind(), e.to_string())));
                            break Some(e);
                        }
                    }
                }
                Some(Request::Close) | None => {
                    debug!("Transport closing");
                    break None;
                }
            },

            permit = events.reserve(), if !backlog.is_empty() => match permit {
                Ok(permit) => {
                    if let Some(event) = backlog.pop_front() {
                        permit.send(event);
                    }
                }
                Err(_) => backlog.clear(),
            },

            read = port.read(&mut buf) => match read {
                Ok(0) => break Some(io::Error::new(io::ErrorKind::UnexpectedEof, "serial port closed")),
                Ok(n) => {
                    for &byte in &buf[..n] {
                        if let Some(line) = framer.push(byte) {
                            route_line(line, &shared, &mut framer, &mut notifications);
                        }
                    }
                    if !notifications.is_empty() {
                        match port.bytes_to_read() {
                            Ok(0) => {
                                let batch = std::mem::take(&mut notifications);
                                debug!(lines = batch.len(), "Notification batch");
                                deliver(&events, &mut backlog, TransportEvent::Notification(batch));
                            }
                            Ok(_) => {}
                            Err(e) => break Some(e),
                        }
                    }
                }
                Err(e) => break Some(e),
            },
        }
    };

    shared.alive.store(false, Ordering::SeqCst);
    // Wakes a waiting writer with NotConnected
    shared.pending().take();

    let Some(fault) = fault else {
        return;
    };
    error!(error = %fault, "Serial port fault, transport stopped");
    if !notifications.is_empty() {
        backlog.push_back(TransportEvent::Notification(notifications));
    }
    backlog.push_back(TransportEvent::Fatal(Arc::new(fault)));
    for event in backlog {
        if events.send(event).await.is_err() {
            break;
        }
    }
}

async fn write_all<P: ModemPort>(port: &mut P, data: &[u8]) -> io::Result<()> {
    port.write_all(data).await?;
    port.flush().await
}

fn route_line(
    line: Line,
    shared: &Shared,
    framer: &mut LineFramer,
    notifications: &mut Vec<Line>,
) {
    let mut pending = shared.pending();
    let Some(command) = pending.as_mut() else {
        framer.set_alternate(None);
        notifications.push(line);
        return;
    };

    let complete = line.is_alternate() || is_response_terminator(line.as_str());
    command.lines.push(line);
    if complete {
        framer.set_alternate(None);
        if let Some(command) = pending.take() {
            trace!(lines = ?command.lines, "response");
            let _ = command.reply.send(command.lines);
        }
    }
}

fn deliver(
    events: &mpsc::Sender<TransportEvent>,
    backlog: &mut VecDeque<TransportEvent>,
    event: TransportEvent,
) {
    if backlog.is_empty() {
        match events.try_send(event) {
            Ok(()) => return,
            Err(TrySendError::Closed(_)) => return,
            Err(TrySendError::Full(event)) => backlog.push_back(event),
        }
    } else {
        backlog.push_back(event);
    }
    if backlog.len() > MAX_NOTIFICATION_BACKLOG {
        backlog.pop_front();
        warn!(
            capacity = MAX_NOTIFICATION_BACKLOG,
            "Notification backlog full, dropped oldest batch"
        );
    }
}
