// ABOUTME: Notification dispatcher task draining transport events in FIFO order
// ABOUTME: Runs handlers off the IO task so they may issue further commands

use crate::frame::Line;
use crate::transport::TransportEvent;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Receives what the transport reports outside of command responses
pub trait NotificationHandler: Send + Sync + 'static {
    /// One batch of unsolicited lines
    fn on_notification(&self, lines: Vec<Line>) -> impl Future<Output = ()> + Send;

    /// The serial port failed; nothing follows
    fn on_fatal_error(&self, error: Arc<io::Error>) -> impl Future<Output = ()> + Send;
}

/// Task invoking a [`NotificationHandler`] for every transport event.
///
/// Events are handled one at a time in arrival order. A handler that awaits a
/// command delays later notifications but never the IO task.
pub struct NotificationDispatcher {
    task: JoinHandle<()>,
}

impl NotificationDispatcher {
    pub fn spawn<H: NotificationHandler>(
        mut events: mpsc::Receiver<TransportEvent>,
        handler: H,
    ) -> Self {
        let task = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    TransportEvent::Notification(lines) => handler.on_notification(lines).await,
                    TransportEvent::Fatal(error) => {
                        handler.on_fatal_error(error).await;
                        break;
                    }
                }
            }
            debug!("Notification dispatcher stopped");
        });
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}
