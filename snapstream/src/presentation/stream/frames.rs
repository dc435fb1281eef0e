// /////////////////////////////////////////////////////////////////////////////
// Snapstream
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Stream Wire Format
//!
//! Framing for the token-authenticated streaming sockets:
//!
//! - handshake: `u32` big-endian token length (0 < N ≤ 128), then N bytes
//!   of UTF-8 token id;
//! - server reply: `u32` big-endian length, then that many bytes of JSON
//!   (`status` ∈ {"started", "failed"});
//! - send-mode data: repeated (`u64` big-endian chunk length, bytes); a
//!   zero length terminates; one optional trailing frame after the zero
//!   carries an error string;
//! - receive-mode data: raw bytes until the client half-closes its write
//!   side.
//!
//! Any violation (zero or oversized token length, truncated reads) is a
//! [`ReplicationError::Unauthorized`]; the connection is closed without
//! further bytes.

use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use snapstream_domain::value_objects::MAX_TOKEN_ID_LEN;
use snapstream_domain::ReplicationError;

/// Chunk size for send-mode data frames.
pub const STREAM_CHUNK_SIZE: usize = 1024 * 1024;

/// Reads the handshake's token id, enforcing the length ceiling before
/// reading a single byte past the header.
pub async fn read_token<R>(reader: &mut R) -> Result<String, ReplicationError>
where
    R: AsyncRead + Unpin,
{
    let length = reader
        .read_u32()
        .await
        .map_err(|_| ReplicationError::Unauthorized("connection closed before token".to_string()))? as usize;
    if length == 0 {
        return Err(ReplicationError::Unauthorized("empty token".to_string()));
    }
    if length > MAX_TOKEN_ID_LEN {
        return Err(ReplicationError::Unauthorized("token too long".to_string()));
    }

    let mut token = vec![0u8; length];
    reader
        .read_exact(&mut token)
        .await
        .map_err(|_| ReplicationError::Unauthorized("truncated token".to_string()))?;
    String::from_utf8(token).map_err(|_| ReplicationError::Unauthorized("token is not UTF-8".to_string()))
}

/// Writes one length-prefixed JSON status frame.
pub async fn write_json<W>(writer: &mut W, value: &serde_json::Value) -> Result<(), ReplicationError>
where
    W: AsyncWrite + Unpin,
{
    let payload = serde_json::to_vec(value)?;
    writer.write_u32(payload.len() as u32).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// The failure reply: `{"error": reason, "status": "failed"}`.
pub async fn write_failure<W>(writer: &mut W, reason: &str) -> Result<(), ReplicationError>
where
    W: AsyncWrite + Unpin,
{
    write_json(writer, &json!({ "error": reason, "status": "failed" })).await
}

/// Writes one send-mode data chunk.
pub async fn write_chunk<W>(writer: &mut W, chunk: &[u8]) -> Result<(), ReplicationError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_u64(chunk.len() as u64).await?;
    writer.write_all(chunk).await?;
    Ok(())
}

/// Terminates the send-mode data stream.
pub async fn write_chunk_terminator<W>(writer: &mut W) -> Result<(), ReplicationError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_u64(0).await?;
    writer.flush().await?;
    Ok(())
}

/// The optional post-terminator error frame.
pub async fn write_trailing_error<W>(writer: &mut W, message: &str) -> Result<(), ReplicationError>
where
    W: AsyncWrite + Unpin,
{
    let payload = message.as_bytes();
    writer.write_u64(payload.len() as u64).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_token_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(256);
        client.write_u32(5).await.unwrap();
        client.write_all(b"abc12").await.unwrap();
        assert_eq!(read_token(&mut server).await.unwrap(), "abc12");
    }

    #[tokio::test]
    async fn test_read_token_rejects_empty() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_u32(0).await.unwrap();
        assert_eq!(read_token(&mut server).await.unwrap_err().kind(), "unauthorized");
    }

    #[tokio::test]
    async fn test_read_token_rejects_oversized_before_reading_body() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_u32((MAX_TOKEN_ID_LEN + 1) as u32).await.unwrap();
        // No body bytes are ever written; the length alone must reject.
        assert_eq!(read_token(&mut server).await.unwrap_err().kind(), "unauthorized");
    }

    #[tokio::test]
    async fn test_read_token_rejects_truncation() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_u32(10).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);
        assert_eq!(read_token(&mut server).await.unwrap_err().kind(), "unauthorized");
    }

    #[tokio::test]
    async fn test_json_frame_roundtrip() {
        let (mut client, mut server) = tokio::io::duplex(256);
        write_failure(&mut server, "expired").await.unwrap();

        let length = client.read_u32().await.unwrap() as usize;
        let mut payload = vec![0u8; length];
        client.read_exact(&mut payload).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(value["status"], "failed");
        assert_eq!(value["error"], "expired");
    }

    #[tokio::test]
    async fn test_chunk_framing() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_chunk(&mut server, b"payload").await.unwrap();
        write_chunk_terminator(&mut server).await.unwrap();
        write_trailing_error(&mut server, "send failed").await.unwrap();

        let length = client.read_u64().await.unwrap();
        assert_eq!(length, 7);
        let mut chunk = vec![0u8; 7];
        client.read_exact(&mut chunk).await.unwrap();
        assert_eq!(&chunk, b"payload");

        assert_eq!(client.read_u64().await.unwrap(), 0);

        let error_length = client.read_u64().await.unwrap() as usize;
        let mut error = vec![0u8; error_length];
        client.read_exact(&mut error).await.unwrap();
        assert_eq!(String::from_utf8(error).unwrap(), "send failed");
    }
}
