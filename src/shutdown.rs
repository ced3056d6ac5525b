//! Listens for the connection-close signal so the router's read loop
//! can unwind promptly instead of waiting for the peer to close its
//! side of the socket.
//!
//! Adapted from the teacher's server-shutdown broadcast: there, many
//! connection handlers raced a shared `Shutdown` against their own
//! socket reads; here there is exactly one router task doing the same
//! race against [`Client::close`](crate::client::Client::close).

use tokio::sync::broadcast;

/// One shot, many listeners: a single `()` is ever sent down the
/// channel, so there is never a lag error to handle.
pub(crate) struct Shutdown {
    shutdown: bool,
    notify: broadcast::Receiver<()>,
}

impl Shutdown {
    pub(crate) fn new(notify: broadcast::Receiver<()>) -> Shutdown {
        Shutdown {
            shutdown: false,
            notify,
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    /// Waits for the shutdown notification, or returns immediately if
    /// it already fired.
    pub(crate) async fn recv(&mut self) {
        if self.shutdown {
            return;
        }

        let _ = self.notify.recv().await;
        self.shutdown = true;
    }
}
