//! Wire framing: the length-prefixed frame used on both directions of
//! the socket after the handshake, plus the one-shot handshake frame
//! and banner read used before the session starts.
//!
//! Mirrors the teacher's `Connection`-owned buffer approach: bytes
//! arrive in arbitrary chunks from the socket and are accumulated into
//! a `BytesMut`; [`decode`] pulls as many whole frames out of that
//! buffer as are available and leaves the remainder for the next read.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::{Protocol, Version};
use crate::error::{Error, Result};

/// Canonical banner the server sends back on a successful handshake.
pub const HANDSHAKE_SUCCESS: &str = "SUCCESS";

/// Encodes one post-handshake frame: `u64_le token || u32_le len || json`.
pub fn encode(token: u64, payload: &[u8]) -> BytesMut {
    let mut buf = BytesMut::with_capacity(8 + 4 + payload.len());
    buf.put_u64_le(token);
    buf.put_u32_le(payload.len() as u32);
    buf.put_slice(payload);
    buf
}

/// Attempts to pull one whole frame out of `buf`. Returns `None` (without
/// consuming anything) if `buf` does not yet hold a complete frame; the
/// caller is expected to read more bytes from the socket and retry.
pub fn decode(buf: &mut BytesMut) -> Result<Option<(u64, Bytes)>> {
    if buf.len() < 12 {
        return Ok(None);
    }

    let mut token_bytes = &buf[0..8];
    let token = token_bytes.get_u64_le();
    let mut len_bytes = &buf[8..12];
    let len = len_bytes.get_u32_le() as usize;

    if buf.len() < 12 + len {
        return Ok(None);
    }

    buf.advance(12);
    let payload = buf.split_to(len).freeze();

    std::str::from_utf8(&payload)
        .map_err(|e| Error::Protocol(format!("non-utf8 frame payload: {e}")))?;

    Ok(Some((token, payload)))
}

/// Encodes the pre-session handshake frame:
/// `u32_le version || u32_le auth_len || auth_bytes || u32_le protocol`.
pub fn encode_handshake(version: Version, auth_key: &str, protocol: Protocol) -> BytesMut {
    let auth = auth_key.as_bytes();
    let mut buf = BytesMut::with_capacity(4 + 4 + auth.len() + 4);
    buf.put_u32_le(version.magic());
    buf.put_u32_le(auth.len() as u32);
    buf.put_slice(auth);
    buf.put_u32_le(protocol.magic());
    buf
}

/// Reads the server's handshake banner: bytes up to and including a NUL
/// terminator, with trailing non-word characters stripped.
pub async fn read_banner<R: AsyncRead + Unpin>(stream: &mut R) -> Result<String> {
    let mut raw = Vec::new();
    let mut byte = [0u8; 1];

    loop {
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed before handshake banner was received",
            )));
        }
        if byte[0] == 0 {
            break;
        }
        raw.push(byte[0]);
    }

    let banner =
        String::from_utf8(raw).map_err(|e| Error::Protocol(format!("invalid banner: {e}")))?;

    Ok(banner
        .trim_end_matches(|c: char| !c.is_ascii_alphanumeric())
        .to_owned())
}
