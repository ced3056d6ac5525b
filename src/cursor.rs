//! The lazy, back-pressured paged-result stream returned for
//! `SUCCESS_PARTIAL`/`SUCCESS_FEED` responses (spec.md §4.5).
//!
//! A `Cursor` is single-consumer: it owns the receiving half of its
//! token's sink and the only path back to the dispatcher is through
//! its own `client` handle. Closing — explicitly or by drop — always
//! either observes a terminal response already or emits STOP; no code
//! path leaks an inflight token.

use std::collections::VecDeque;

use serde_json::Value;
use tracing::instrument;

use crate::client::{Client, ContinueOutcome};
use crate::error::Result;
use crate::router::SinkReceiver;

/// A lazy, paged stream over one token's successive partial batches.
pub struct Cursor {
    client: Client,
    token: u64,
    rx: Option<SinkReceiver>,
    buffered: VecDeque<Value>,
    /// `true` while more batches may still arrive; cleared once a
    /// terminal (non-partial) frame has been observed.
    pending: bool,
    closed: bool,
}

impl Cursor {
    pub(crate) fn new(
        client: Client,
        token: u64,
        rx: SinkReceiver,
        first_batch: Vec<Value>,
    ) -> Self {
        Cursor {
            client,
            token,
            rx: Some(rx),
            buffered: first_batch.into(),
            pending: true,
            closed: false,
        }
    }

    /// Yields the next value, transparently fetching the next batch
    /// with CONTINUE when the current one is drained and more may be
    /// coming. Returns `Ok(None)` at end of stream.
    #[instrument(skip(self), fields(token = self.token))]
    pub async fn next(&mut self) -> Result<Option<Value>> {
        loop {
            if let Some(value) = self.buffered.pop_front() {
                return Ok(Some(value));
            }

            if self.closed || !self.pending {
                return Ok(None);
            }

            let rx = self
                .rx
                .as_mut()
                .expect("rx is only taken on close, which also clears pending");

            match self.client.continue_(self.token, rx).await {
                Ok(ContinueOutcome::Batch(batch)) => {
                    self.buffered = batch.into();
                    // An empty partial batch is legal; loop around and
                    // issue another CONTINUE rather than reporting a
                    // spurious end of stream.
                }
                Ok(ContinueOutcome::Final(batch)) => {
                    self.pending = false;
                    self.buffered = batch.into();
                }
                Err(e) => {
                    self.pending = false;
                    self.closed = true;
                    return Err(e);
                }
            }
        }
    }

    /// Sends STOP (once) and transitions to closed. Subsequent calls
    /// to `next` report end of stream; subsequent calls to `close` are
    /// no-ops.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }

        if self.pending {
            self.client.stop(self.token).await;
        }

        self.pending = false;
        self.closed = true;
        self.rx = None;
    }
}

impl Drop for Cursor {
    fn drop(&mut self) {
        if self.closed || !self.pending {
            return;
        }

        let client = self.client.clone();
        let token = self.token;
        tokio::spawn(async move { client.stop(token).await });
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("token", &self.token)
            .field("buffered", &self.buffered.len())
            .field("pending", &self.pending)
            .field("closed", &self.closed)
            .finish()
    }
}
