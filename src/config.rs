//! Connection configuration.
//!
//! A plain struct with builder-style setters, matching the pack's
//! general preference for hand-rolled builders over a derive-builder
//! crate when the struct is this small.

use std::time::Duration;

/// Pre-auth handshake version magic (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Version {
    V1,
    V2,
    V3,
    V4,
}

impl Version {
    pub(crate) fn magic(self) -> u32 {
        match self {
            Version::V1 => 0x3F61BA36,
            Version::V2 => 0x723081E1,
            Version::V3 => 0x5F75E83E,
            Version::V4 => 0x400C2D20,
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::V4
    }
}

/// Wire sub-protocol. Only `Json` is implemented; `Protobuf` is kept so
/// the magic is recognized, but selecting it is a programmer error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Json,
    Protobuf,
}

impl Protocol {
    pub(crate) fn magic(self) -> u32 {
        match self {
            Protocol::Protobuf => 0x271FFC41,
            Protocol::Json => 0x7E6970C7,
        }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Protocol::Json
    }
}

/// Connection configuration, with the defaults from spec.md §6.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub auth_key: String,
    pub default_db: Option<String>,
    pub version: Version,
    pub protocol: Protocol,
    pub token_seed: u64,
    pub connect_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "127.0.0.1".to_owned(),
            port: 28015,
            auth_key: String::new(),
            default_db: None,
            version: Version::V4,
            protocol: Protocol::Json,
            token_seed: 0,
            connect_timeout: Duration::from_secs(20),
        }
    }
}

impl Config {
    /// Starts a config with `host` set and every other field defaulted.
    pub fn new(host: impl Into<String>) -> Self {
        Config {
            host: host.into(),
            ..Config::default()
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn auth_key(mut self, auth_key: impl Into<String>) -> Self {
        self.auth_key = auth_key.into();
        self
    }

    pub fn default_db(mut self, db: impl Into<String>) -> Self {
        self.default_db = Some(db.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn token_seed(mut self, seed: u64) -> Self {
        self.token_seed = seed;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}
