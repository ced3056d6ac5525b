//! Response router: demultiplexes inbound frames by token and delivers
//! each to the sink registered for that token.
//!
//! The inflight map is a concurrent hash map (`DashMap`) of bounded
//! per-token channels, as called for in spec.md §9 ("prefer a
//! concurrent hash map with per-entry bounded channels" over the
//! pub/sub bus the original driver used). The router owns the inbound
//! half of the socket exclusively; the dispatcher never reads from it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::sync::mpsc;
use tracing::{instrument, warn};

use crate::frame;
use crate::shutdown::Shutdown;

/// Capacity of each per-token delivery channel (spec.md §4.4 step 4).
pub(crate) const SINK_CAPACITY: usize = 10;

pub(crate) type Sink = mpsc::Sender<Bytes>;
pub(crate) type SinkReceiver = mpsc::Receiver<Bytes>;

/// Shared inflight registry: `token -> sink`. Cloning an `Inflight`
/// clones the `Arc`, giving the connection, the dispatcher and the
/// router their own handle onto the same map.
#[derive(Clone)]
pub(crate) struct Inflight {
    map: Arc<DashMap<u64, Sink>>,
    closed: Arc<AtomicBool>,
}

impl Inflight {
    pub(crate) fn new() -> Self {
        Inflight {
            map: Arc::new(DashMap::new()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Registers a new sink for `token`, or returns `None` if the
    /// connection is already closed. Rechecks `closed` after inserting
    /// so a `shutdown()` racing this call can never leave a token
    /// registered in an already-torn-down map with nothing to ever
    /// deliver to or drop its sink (spec.md §3: `closed` is terminal;
    /// every blocked caller must be unblocked with an error, never left
    /// to hang). Panics if `token` is already inflight — tokens are
    /// allocated by a single monotonically increasing counter and must
    /// never collide (spec.md §3 invariant).
    pub(crate) fn register(&self, token: u64) -> Option<SinkReceiver> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }

        let (tx, rx) = mpsc::channel(SINK_CAPACITY);
        if self.map.insert(token, tx).is_some() {
            panic!("token {token} registered twice; token allocator is broken");
        }

        if self.closed.load(Ordering::Acquire) {
            self.map.remove(&token);
            return None;
        }

        Some(rx)
    }

    /// Removes `token` from the inflight set. Idempotent.
    pub(crate) fn unregister(&self, token: u64) {
        self.map.remove(&token);
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Snapshot of every currently-inflight token, used by
    /// [`crate::connection::ConnectionState::close`] to issue a
    /// best-effort STOP for each before tearing down.
    pub(crate) fn tokens(&self) -> Vec<u64> {
        self.map.iter().map(|entry| *entry.key()).collect()
    }

    /// Drains every sink (dropping it closes the corresponding
    /// receiver) and marks the connection closed. Idempotent.
    pub(crate) fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.map.clear();
    }
}

/// Owns the inbound half of the socket after the handshake and runs
/// the demultiplexing loop until the socket closes or errors.
pub(crate) struct Router {
    read_half: OwnedReadHalf,
    inflight: Inflight,
    shutdown: Shutdown,
    buf: BytesMut,
}

impl Router {
    pub(crate) fn new(read_half: OwnedReadHalf, inflight: Inflight, shutdown: Shutdown) -> Self {
        Router {
            read_half,
            inflight,
            shutdown,
            buf: BytesMut::with_capacity(4 * 1024),
        }
    }

    /// Runs until the socket half-closes, a read fails, or
    /// [`crate::client::Client::close`] fires the shutdown signal;
    /// either way the inflight map is drained and marked closed before
    /// returning.
    #[instrument(skip(self), name = "router_run")]
    pub(crate) async fn run(mut self) {
        loop {
            match frame::decode(&mut self.buf) {
                Ok(Some((token, payload))) => {
                    self.dispatch(token, payload).await;
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "malformed frame on inbound socket, closing connection");
                    break;
                }
            }

            if self.shutdown.is_shutdown() {
                break;
            }

            tokio::select! {
                biased;

                _ = self.shutdown.recv() => break,
                result = self.read_half.read_buf(&mut self.buf) => match result {
                    Ok(0) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(error = %e, "i/o error reading from socket, closing connection");
                        break;
                    }
                },
            }
        }

        self.inflight.shutdown();
    }

    async fn dispatch(&self, token: u64, payload: Bytes) {
        // Clone the sender and drop the DashMap shard guard before
        // awaiting: holding a `Ref` across `.await` would keep that
        // shard's lock held while the consumer drains it, which could
        // block an unrelated `register`/`unregister` hashing to the
        // same shard.
        let sink = self.inflight.map.get(&token).map(|entry| entry.value().clone());

        match sink {
            Some(sink) => {
                // A full sink applies back-pressure to this loop, which
                // is acceptable: it means the consumer for `token` is
                // not keeping up, and every other token is independent.
                if sink.send(payload).await.is_err() {
                    warn!(token, "sink for inflight token closed before delivery");
                }
            }
            None => {
                warn!(token, "response for unknown or cancelled token, discarding");
            }
        }
    }
}
