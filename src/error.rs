//! Error taxonomy for the connection, router, dispatcher and cursor.
//!
//! Unlike the teacher crate's `Box<dyn std::error::Error + Send + Sync>`
//! alias, callers of a database driver need to match on error *kind*
//! (retry a server error, never retry a handshake failure, treat a
//! closed connection as fatal) so this crate spends a `thiserror` enum
//! instead of a boxed trait object.

use serde_json::Value;
use std::io;

/// Errors produced by the core networking and multiplexing layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The server refused the handshake or replied with a banner other
    /// than `"SUCCESS"`.
    #[error("handshake with {endpoint} failed: {banner}")]
    Handshake { endpoint: String, banner: String },

    /// A socket-level read or write failure. Fatal to the connection.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// A malformed frame, an unrecognized response type, or any other
    /// violation of the wire contract.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Failure to serialize an outgoing query-type array. Only possible
    /// for values that are not representable as JSON (e.g. non-finite
    /// floats), which `serde_json` rejects rather than this crate.
    #[error("failed to encode query: {0}")]
    Encode(#[from] serde_json::Error),

    /// A `CLIENT_ERROR` / `COMPILE_ERROR` / `RUNTIME_ERROR` response.
    /// Local to the query that produced it; the connection stays usable.
    #[error("server error: {message}")]
    Server {
        message: String,
        backtrace: Option<Value>,
        query: Value,
    },

    /// An operation on an exhausted or closed cursor.
    #[error("cursor error: {0}")]
    Cursor(&'static str),

    /// Raised to every caller whose query is still in-flight when the
    /// connection transitions to closed.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, Error>;
