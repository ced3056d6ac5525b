//! Core networking and query-multiplexing layer for a RethinkDB
//! wire-protocol client.
//!
//! This crate owns the socket, the handshake, the length-prefixed
//! framing, and the token-keyed multiplexing of many concurrent
//! logical queries over one TCP connection. It does not know how to
//! build a ReQL query AST or decode a server's pseudo-types (times,
//! binary, grouped data) — both are external collaborators: callers
//! hand this crate an already-built [`serde_json::Value`] and get back
//! an opaque [`serde_json::Value`] (or a [`Cursor`] of them).
//!
//! # Layout
//!
//! - [`config`]: connection configuration and defaults.
//! - [`frame`]: the length-prefixed wire codec and the pre-session
//!   handshake frame.
//! - `connection`: owns the socket and performs the handshake.
//! - `router`: demultiplexes inbound frames by token.
//! - [`client`]: allocates tokens and dispatches START/CONTINUE/STOP.
//! - [`cursor`]: the lazy, back-pressured paged-result stream.
//! - [`error`]: the typed error enum every operation in this crate
//!   returns.

pub mod client;
pub use client::{connect, Client, RunResult};

pub mod config;
pub use config::{Config, Protocol, Version};

mod connection;

pub mod cursor;
pub use cursor::Cursor;

pub mod error;
pub use error::{Error, Result};

pub mod frame;

mod router;

mod shutdown;

/// Default RethinkDB driver port.
pub const DEFAULT_PORT: u16 = 28015;
