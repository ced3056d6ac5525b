//! Query dispatcher: allocates tokens, sends START/CONTINUE/STOP, and
//! turns the first response frame for a query into a value, a full
//! sequence, or a [`Cursor`].
//!
//! `Client` is the single public handle onto a connection. Cloning it
//! is cheap (an `Arc` bump) and every clone shares the same socket,
//! inflight registry and token counter — this is the "cloneable handle
//! to the dispatcher" cursors hold (spec.md §3).

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::connection::{self, ConnectionState};
use crate::cursor::Cursor;
use crate::error::{Error, Result};

const DB_TERM_ID: i64 = 14;

const RESPONSE_SUCCESS_ATOM: i64 = 1;
const RESPONSE_SUCCESS_SEQUENCE: i64 = 2;
const RESPONSE_SUCCESS_PARTIAL: i64 = 3;
const RESPONSE_SUCCESS_FEED: i64 = 5;
const RESPONSE_CLIENT_ERROR: i64 = 16;
const RESPONSE_COMPILE_ERROR: i64 = 17;
const RESPONSE_RUNTIME_ERROR: i64 = 18;

const QUERY_START: i64 = 1;
const QUERY_CONTINUE: i64 = 2;
const QUERY_STOP: i64 = 3;

/// What a freshly-started query resolved to.
#[derive(Debug)]
pub enum RunResult {
    /// A `SUCCESS_ATOM` response: a single decoded value.
    Atom(Value),
    /// A `SUCCESS_SEQUENCE` response: the full, already-complete sequence.
    Sequence(Vec<Value>),
    /// A `SUCCESS_PARTIAL`/`SUCCESS_FEED` response: a lazy paged cursor.
    Cursor(Cursor),
}

/// What advancing a cursor one batch resolved to.
pub(crate) enum ContinueOutcome {
    /// Another partial batch; more may follow.
    Batch(Vec<Value>),
    /// The final batch; the cursor is now exhausted.
    Final(Vec<Value>),
}

#[derive(serde::Deserialize)]
struct ResponseEnvelope {
    t: i64,
    #[serde(default)]
    r: Value,
    #[serde(default)]
    b: Option<Value>,
}

/// A connected session. Cheap to clone; every clone shares one socket.
#[derive(Clone)]
pub struct Client {
    state: Arc<ConnectionState>,
}

/// Establishes the TCP connection and performs the opening handshake.
/// The connection is admitted only if the server's handshake banner is
/// exactly `"SUCCESS"` (spec.md §4.2).
#[instrument(skip(config), fields(host = %config.host, port = %config.port))]
pub async fn connect(config: Config) -> Result<Client> {
    let (state, read_half, shutdown) = connection::connect(&config).await?;
    let state = Arc::new(state);

    let router = crate::router::Router::new(read_half, state.inflight.clone(), shutdown);
    tokio::spawn(router.run());

    Ok(Client { state })
}

impl Client {
    /// Starts a new query and awaits its first response frame
    /// (spec.md §4.4 `start`).
    #[instrument(skip(self, query), fields(endpoint = %self.state.endpoint))]
    pub async fn run(&self, query: Value) -> Result<RunResult> {
        if self.state.inflight.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let token = self.state.next_token();
        let query = self.with_default_db(query);
        let wire = self.start_wire_array(&query);
        let payload = serde_json::to_vec(&wire)?;

        debug!(token, "sending START");
        let mut rx = match self.state.inflight.register(token) {
            Some(rx) => rx,
            None => return Err(Error::ConnectionClosed),
        };

        if let Err(e) = self.state.write_frame(token, &payload).await {
            self.state.inflight.unregister(token);
            return Err(e);
        }

        let frame = match rx.recv().await {
            Some(frame) => frame,
            None => return Err(Error::ConnectionClosed),
        };

        let envelope: ResponseEnvelope = serde_json::from_slice(&frame)
            .map_err(|e| Error::Protocol(format!("malformed response envelope: {e}")))?;

        match envelope.t {
            RESPONSE_SUCCESS_ATOM => {
                self.state.inflight.unregister(token);
                let value = first_element(envelope.r)?;
                Ok(RunResult::Atom(value))
            }
            RESPONSE_SUCCESS_SEQUENCE => {
                self.state.inflight.unregister(token);
                Ok(RunResult::Sequence(as_array(envelope.r)?))
            }
            RESPONSE_SUCCESS_PARTIAL | RESPONSE_SUCCESS_FEED => {
                let batch = as_array(envelope.r)?;
                Ok(RunResult::Cursor(Cursor::new(
                    self.clone(),
                    token,
                    rx,
                    batch,
                )))
            }
            RESPONSE_CLIENT_ERROR | RESPONSE_COMPILE_ERROR | RESPONSE_RUNTIME_ERROR => {
                self.state.inflight.unregister(token);
                Err(server_error(envelope, query))
            }
            other => {
                self.state.inflight.unregister(token);
                Err(Error::Protocol(format!("unknown response type {other}")))
            }
        }
    }

    /// Sends CONTINUE for `token` and awaits the next response frame
    /// (spec.md §4.4 `continue`).
    pub(crate) async fn continue_(
        &self,
        token: u64,
        rx: &mut crate::router::SinkReceiver,
    ) -> Result<ContinueOutcome> {
        if self.state.inflight.is_closed() {
            return Err(Error::ConnectionClosed);
        }

        let payload = serde_json::to_vec(&serde_json::json!([QUERY_CONTINUE]))?;
        self.state.write_frame(token, &payload).await?;

        let frame = match rx.recv().await {
            Some(frame) => frame,
            None => return Err(Error::ConnectionClosed),
        };

        let envelope: ResponseEnvelope = serde_json::from_slice(&frame)
            .map_err(|e| Error::Protocol(format!("malformed response envelope: {e}")))?;

        match envelope.t {
            RESPONSE_SUCCESS_PARTIAL | RESPONSE_SUCCESS_FEED => {
                Ok(ContinueOutcome::Batch(as_array(envelope.r)?))
            }
            RESPONSE_SUCCESS_SEQUENCE => {
                self.state.inflight.unregister(token);
                Ok(ContinueOutcome::Final(as_array(envelope.r)?))
            }
            RESPONSE_CLIENT_ERROR | RESPONSE_COMPILE_ERROR | RESPONSE_RUNTIME_ERROR => {
                self.state.inflight.unregister(token);
                Err(server_error(envelope, Value::Null))
            }
            other => {
                self.state.inflight.unregister(token);
                Err(Error::Protocol(format!("unknown response type {other}")))
            }
        }
    }

    /// Sends STOP for `token` and unregisters it immediately. Does not
    /// wait for an acknowledgement — a subsequent response for this
    /// token is silently discarded by the router (spec.md §4.4 `stop`).
    pub(crate) async fn stop(&self, token: u64) {
        let payload = match serde_json::to_vec(&serde_json::json!([QUERY_STOP])) {
            Ok(p) => p,
            Err(_) => return,
        };
        let _ = self.state.write_frame(token, &payload).await;
        self.state.inflight.unregister(token);
    }

    /// Closes the connection: STOPs every inflight token best-effort,
    /// then marks the connection closed so every other waiting caller
    /// fails with [`Error::ConnectionClosed`]. Idempotent.
    pub async fn close(&self) {
        self.state.close().await;
    }

    fn with_default_db(&self, query: Value) -> Value {
        let needs_db = self.state.default_db.is_some()
            && matches!(&query, Value::Array(elems) if elems.len() == 2);

        if !needs_db {
            return query;
        }

        let db = self.state.default_db.as_ref().expect("checked above");
        let mut elems = match query {
            Value::Array(elems) => elems,
            other => return other,
        };
        elems.push(serde_json::json!({ "db": [DB_TERM_ID, [db]] }));
        Value::Array(elems)
    }

    fn start_wire_array(&self, query: &Value) -> Value {
        match query {
            Value::Array(elems) => {
                let mut wire = Vec::with_capacity(elems.len() + 1);
                wire.push(Value::from(QUERY_START));
                wire.extend(elems.iter().cloned());
                Value::Array(wire)
            }
            other => Value::Array(vec![Value::from(QUERY_START), other.clone()]),
        }
    }
}

fn first_element(value: Value) -> Result<Value> {
    match value {
        Value::Array(mut elems) if !elems.is_empty() => Ok(elems.remove(0)),
        Value::Array(_) => Ok(Value::Null),
        other => Ok(other),
    }
}

fn as_array(value: Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(elems) => Ok(elems),
        other => Err(Error::Protocol(format!(
            "expected response payload array, got {other}"
        ))),
    }
}

fn server_error(envelope: ResponseEnvelope, query: Value) -> Error {
    let message = match &envelope.r {
        Value::Array(elems) => elems
            .first()
            .and_then(|v| v.as_str())
            .map(|s| s.to_owned())
            .unwrap_or_else(|| envelope.r.to_string()),
        other => other.to_string(),
    };

    Error::Server {
        message,
        backtrace: envelope.b,
        query,
    }
}
