//! Shared scaffolding for the integration tests: a hand-written mock
//! server that speaks the exact wire format of spec.md §6, used in
//! place of a real `rethinkdb` process.

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use reethink_core::Config;

/// Binds a loopback listener on an OS-assigned port and returns the
/// `Config` a client should use to reach it.
pub async fn mock_server() -> (TcpListener, Config) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let config = Config::new("127.0.0.1").port(port);
    (listener, config)
}

/// Accepts one connection and performs the server side of the
/// handshake, admitting it with the canonical `"SUCCESS"` banner.
pub async fn accept_and_handshake(listener: &TcpListener) -> TcpStream {
    let (mut stream, _) = listener.accept().await.unwrap();

    let _version = stream.read_u32_le().await.unwrap();
    let auth_len = stream.read_u32_le().await.unwrap();
    let mut auth = vec![0u8; auth_len as usize];
    stream.read_exact(&mut auth).await.unwrap();
    let _protocol = stream.read_u32_le().await.unwrap();

    stream.write_all(b"SUCCESS\0").await.unwrap();
    stream.flush().await.unwrap();

    stream
}

/// Reads one post-handshake frame and parses its JSON payload as the
/// request array.
pub async fn read_request(stream: &mut TcpStream) -> (u64, Value) {
    let token = stream.read_u64_le().await.unwrap();
    let len = stream.read_u32_le().await.unwrap();
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await.unwrap();
    let value: Value = serde_json::from_slice(&payload).unwrap();
    (token, value)
}

/// Writes one response envelope `{"t": t, "r": r, "b": b?}` framed
/// under `token`.
pub async fn write_response(stream: &mut TcpStream, token: u64, t: i64, r: Value, b: Option<Value>) {
    let mut envelope = serde_json::json!({ "t": t, "r": r });
    if let Some(b) = b {
        envelope["b"] = b;
    }
    let payload = serde_json::to_vec(&envelope).unwrap();

    stream.write_u64_le(token).await.unwrap();
    stream.write_u32_le(payload.len() as u32).await.unwrap();
    stream.write_all(&payload).await.unwrap();
    stream.flush().await.unwrap();
}
