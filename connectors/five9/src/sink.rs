//! Notification delivery to the embedding application.

use std::io::Write;

use tokio::sync::mpsc;
use tracing::warn;

use crate::types::{ErrorReport, NormalizedNotification};

/// Receives normalized notifications and the one-time error report.
pub trait NotificationSink: Send + Sync {
    /// A recognized event arrived on the socket.
    fn on_notification(&self, notification: NormalizedNotification);

    /// Initial configuration failed. Called at most once.
    fn on_error(&self, report: ErrorReport);
}

/// A message delivered through a [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkMessage {
    Notification(NormalizedNotification),
    Error(ErrorReport),
}

/// Forwards everything into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SinkMessage>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SinkMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn deliver(&self, message: SinkMessage) {
        if self.tx.send(message).is_err() {
            warn!("Notification receiver dropped");
        }
    }
}

impl NotificationSink for ChannelSink {
    fn on_notification(&self, notification: NormalizedNotification) {
        self.deliver(SinkMessage::Notification(notification));
    }

    fn on_error(&self, report: ErrorReport) {
        self.deliver(SinkMessage::Error(report));
    }
}

/// Writes one JSON document per line to stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLinesSink;

impl JsonLinesSink {
    fn emit<T: serde::Serialize>(value: &T) {
        let mut stdout = std::io::stdout().lock();
        let written = serde_json::to_writer(&mut stdout, value)
            .map_err(std::io::Error::from)
            .and_then(|()| stdout.write_all(b"\n"))
            .and_then(|()| stdout.flush());
        if let Err(e) = written {
            warn!(error = %e, "Failed to write notification");
        }
    }
}

impl NotificationSink for JsonLinesSink {
    fn on_notification(&self, notification: NormalizedNotification) {
        Self::emit(&notification);
    }

    fn on_error(&self, report: ErrorReport) {
        Self::emit(&report);
    }
}
