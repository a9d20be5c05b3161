// ABOUTME: Scripted in-memory modem implementing ModemPort for unit and scenario tests
// ABOUTME: Replies to written commands from a script and injects unsolicited lines on demand

use crate::serial::ModemPort;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

const CTRL_Z: u8 = 0x1A;
const ESC: u8 = 0x1B;

const DEFAULT_REPLY: &str = "\r\nOK\r\n";

#[derive(Default)]
struct State {
    input: VecDeque<u8>,
    read_chunk: Option<usize>,
    reader: Option<Waker>,
    fault: Option<io::ErrorKind>,
    eof: bool,
    partial: Vec<u8>,
    written: Vec<String>,
    script: HashMap<String, VecDeque<String>>,
}

impl State {
    fn push_input(&mut self, data: &[u8]) {
        self.input.extend(data);
        if let Some(waker) = self.reader.take() {
            waker.wake();
        }
    }

    fn reply_to(&mut self, command: String) {
        let reply = match self.script.get_mut(&command) {
            Some(replies) if replies.len() > 1 => replies.pop_front(),
            Some(replies) => replies.front().cloned(),
            None => Some(DEFAULT_REPLY.to_string()),
        };
        self.written.push(command);
        if let Some(reply) = reply {
            self.push_input(reply.as_bytes());
        }
    }
}

/// Test double for a modem on the other end of the serial line.
///
/// Commands are recognised by their terminator (`\r`, Ctrl-Z after an SMS
/// body, or ESC). Each command gets the next scripted reply; the last one
/// repeats. Unscripted commands get `OK`.
#[derive(Clone, Default)]
pub(crate) struct FakeModem {
    state: Arc<Mutex<State>>,
}

impl FakeModem {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Scripts the raw reply to `command` (written without its terminator).
    /// An empty reply means the modem stays silent.
    pub(crate) fn on(&self, command: &str, reply: &str) -> &Self {
        self.state()
            .script
            .entry(command.to_string())
            .or_default()
            .push_back(reply.to_string());
        self
    }

    /// Injects unsolicited output
    pub(crate) fn push_unsolicited(&self, data: &str) {
        self.state().push_input(data.as_bytes());
    }

    /// Limits how many bytes a single read returns
    pub(crate) fn set_read_chunk(&self, size: usize) {
        self.state().read_chunk = Some(size);
    }

    /// Makes the next read fail
    pub(crate) fn fail(&self, kind: io::ErrorKind) {
        let mut state = self.state();
        state.fault = Some(kind);
        if let Some(waker) = state.reader.take() {
            waker.wake();
        }
    }

    /// Commands written so far, without terminators
    pub(crate) fn written(&self) -> Vec<String> {
        self.state().written.clone()
    }

    pub(crate) fn port(&self) -> FakePort {
        FakePort {
            state: Arc::clone(&self.state),
        }
    }
}

pub(crate) struct FakePort {
    state: Arc<Mutex<State>>,
}

impl Drop for FakePort {
    fn drop(&mut self) {
        self.state.lock().unwrap().eof = true;
    }
}

impl AsyncRead for FakePort {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut state = self.state.lock().unwrap();
        if let Some(kind) = state.fault.take() {
            return Poll::Ready(Err(io::Error::new(kind, "simulated port failure")));
        }
        if state.input.is_empty() {
            if state.eof {
                return Poll::Ready(Ok(()));
            }
            state.reader = Some(cx.waker().clone());
            return Poll::Pending;
        }
        let limit = state.read_chunk.unwrap_or(usize::MAX).min(buf.remaining());
        let count = limit.min(state.input.len());
        let chunk: Vec<u8> = state.input.drain(..count).collect();
        buf.put_slice(&chunk);
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for FakePort {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut state = self.state.lock().unwrap();
        for &byte in data {
            match byte {
                b'\r' | CTRL_Z | ESC => {
                    let command = String::from_utf8_lossy(&state.partial).into_owned();
                    state.partial.clear();
                    if byte == ESC {
                        state.written.push(format!("{command}<ESC>"));
                    } else {
                        state.reply_to(command);
                    }
                }
                _ => state.partial.push(byte),
            }
        }
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl ModemPort for FakePort {
    fn bytes_to_read(&self) -> io::Result<u32> {
        Ok(self.state.lock().unwrap().input.len() as u32)
    }
}
