//! Owns the TCP socket, performs the opening handshake, and hands back
//! the split read/write halves plus the shared inflight registry that
//! [`crate::client::Client`] and [`crate::router::Router`] both need.
//!
//! The handshake itself (spec.md §4.1, §4.2) is synchronous: it
//! completes fully before the connection is exposed to callers.

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::frame;
use crate::router::Inflight;
use crate::shutdown::Shutdown;

/// State shared by every clone of a [`crate::client::Client`].
pub(crate) struct ConnectionState {
    pub(crate) write_half: Mutex<OwnedWriteHalf>,
    pub(crate) inflight: Inflight,
    pub(crate) next_token: std::sync::atomic::AtomicU64,
    pub(crate) default_db: Option<String>,
    pub(crate) endpoint: String,
    notify_shutdown: broadcast::Sender<()>,
}

/// Performs the TCP connect and the version/auth/protocol handshake,
/// then returns the connection state plus the still-unspawned read
/// half and shutdown listener for the router task.
#[instrument(skip(config), fields(host = %config.host, port = %config.port))]
pub(crate) async fn connect(
    config: &Config,
) -> Result<(ConnectionState, OwnedReadHalf, Shutdown)> {
    let endpoint = format!("{}:{}", config.host, config.port);

    // spec.md §6 / SPEC_FULL.md §4.7: `connect_timeout` bounds the dial
    // *and* the handshake round-trip, not just the TCP connect — a
    // server that accepts the socket but never answers the handshake
    // must not hang `connect()` forever.
    let (read_half, write_half, banner) =
        tokio::time::timeout(config.connect_timeout, dial_and_handshake(config, &endpoint))
            .await
            .map_err(|_| {
                Error::Io(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connecting to {endpoint} timed out"),
                ))
            })??;

    debug!(%banner, "received handshake banner");

    if banner != frame::HANDSHAKE_SUCCESS {
        return Err(Error::Handshake {
            endpoint,
            banner,
        });
    }

    let (notify_shutdown, shutdown_rx) = broadcast::channel(1);

    let state = ConnectionState {
        write_half: Mutex::new(write_half),
        inflight: Inflight::new(),
        next_token: std::sync::atomic::AtomicU64::new(config.token_seed),
        default_db: config.default_db.clone(),
        endpoint,
        notify_shutdown,
    };

    Ok((state, read_half, Shutdown::new(shutdown_rx)))
}

/// Dials the TCP socket and runs the handshake write + banner read.
/// Split out so the whole sequence can be wrapped in a single
/// `connect_timeout` (spec.md §6 / SPEC_FULL.md §4.7) rather than just
/// the initial `TcpStream::connect`.
async fn dial_and_handshake(
    config: &Config,
    endpoint: &str,
) -> Result<(OwnedReadHalf, OwnedWriteHalf, String)> {
    use tokio::io::AsyncWriteExt;

    let stream = TcpStream::connect(endpoint).await?;
    stream.set_nodelay(true).ok();

    let (mut read_half, mut write_half) = stream.into_split();

    let handshake = frame::encode_handshake(config.version, &config.auth_key, config.protocol);
    write_half.write_all(&handshake).await?;
    write_half.flush().await?;

    let banner = frame::read_banner(&mut read_half).await?;

    Ok((read_half, write_half, banner))
}

impl ConnectionState {
    /// Writes one already-encoded frame to the socket. Serializes all
    /// writers behind the single mutex (spec.md §5's "writer mutex").
    pub(crate) async fn write_frame(&self, token: u64, payload: &[u8]) -> Result<()> {
        use tokio::io::AsyncWriteExt;

        let frame = frame::encode(token, payload);
        let mut write_half = self.write_half.lock().await;
        write_half.write_all(&frame).await?;
        write_half.flush().await?;
        Ok(())
    }

    pub(crate) fn next_token(&self) -> u64 {
        self.next_token
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    /// STOP for every still-inflight token (best effort), then marks
    /// the connection closed. Idempotent — a second call finds an
    /// already-empty inflight map and closed flag already set.
    pub(crate) async fn close(&self) {
        if self.inflight.is_closed() {
            return;
        }

        let tokens: Vec<u64> = self.inflight.tokens();
        for token in tokens {
            let stop = serde_json::to_vec(&serde_json::json!([3])).expect("STOP is valid json");
            let _ = self.write_frame(token, &stop).await;
        }

        self.inflight.shutdown();
        let _ = self.notify_shutdown.send(());

        let mut write_half = self.write_half.lock().await;
        use tokio::io::AsyncWriteExt;
        let _ = write_half.shutdown().await;
    }
}
