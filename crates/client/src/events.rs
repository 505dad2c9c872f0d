//! Connection notifications
//!
//! Protocol events go through the `EventRouter`. The notifier only carries
//! what the client itself reports about its own connection.

use std::fmt;

use tokio::sync::broadcast;

/// Few notifications are ever in flight; a slow listener sees `Lagged`.
const BACKLOG: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    /// The pending-command table just drained to zero
    Ready,
    /// The transport went away without `close()` being called
    Disconnected,
}

impl ClientEvent {
    /// No notification follows this one
    pub fn is_terminal(self) -> bool {
        matches!(self, ClientEvent::Disconnected)
    }
}

impl fmt::Display for ClientEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientEvent::Ready => f.write_str("ready"),
            ClientEvent::Disconnected => f.write_str("disconnected"),
        }
    }
}

pub(crate) struct Notifier {
    tx: broadcast::Sender<ClientEvent>,
}

impl Notifier {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(BACKLOG);
        Self { tx }
    }

    pub(crate) fn notify(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("No one listening for {}", event);
        }
    }

    /// Receives notifications published from now on
    pub(crate) fn listen(&self) -> broadcast::Receiver<ClientEvent> {
        self.tx.subscribe()
    }
}
