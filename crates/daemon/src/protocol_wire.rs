// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire framing for the IPC protocol: one JSON object per LF-terminated
//! line. `serde_json` never emits a raw newline inside a document, so the
//! line break is an unambiguous frame boundary, and a stream of frames is
//! readable with nothing more than a buffered reader — handy for
//! debugging a socket with `nc -U`.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

use super::{Request, Response};

#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame exceeds {MAX_FRAME_BYTES} bytes")]
    FrameTooLarge,

    #[error("connection closed")]
    Closed,

    #[error("timeout")]
    Timeout,
}

/// Upper bound on a single frame. Session views and event payloads sit
/// far below this; anything bigger is a protocol violation.
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;

/// Default IPC timeout
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Protocol version (from Cargo.toml)
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Write `msg` as one LF-terminated frame.
pub async fn send_frame<W, T>(writer: &mut W, msg: &T) -> Result<(), WireError>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let mut frame = serde_json::to_vec(msg)?;
    if frame.len() > MAX_FRAME_BYTES {
        return Err(WireError::FrameTooLarge);
    }
    frame.push(b'\n');
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame, decoding it as `T`. A connection that closes cleanly
/// between frames reports [`WireError::Closed`]; closing mid-frame is an
/// IO error, since bytes were lost.
pub async fn recv_frame<R, T>(reader: &mut R) -> Result<T, WireError>
where
    R: AsyncBufReadExt + Unpin,
    T: DeserializeOwned,
{
    let mut frame: Vec<u8> = Vec::new();
    loop {
        let chunk = reader.fill_buf().await?;
        if chunk.is_empty() {
            if frame.is_empty() {
                return Err(WireError::Closed);
            }
            return Err(WireError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-frame",
            )));
        }

        if let Some(pos) = chunk.iter().position(|&b| b == b'\n') {
            frame.extend_from_slice(&chunk[..pos]);
            reader.consume(pos + 1);
            break;
        }

        frame.extend_from_slice(chunk);
        let taken = chunk.len();
        reader.consume(taken);

        if frame.len() > MAX_FRAME_BYTES {
            return Err(WireError::FrameTooLarge);
        }
    }
    Ok(serde_json::from_slice(&frame)?)
}

/// Read a request with timeout
pub async fn read_request<R: AsyncBufReadExt + Unpin>(
    reader: &mut R,
    timeout: std::time::Duration,
) -> Result<Request, WireError> {
    tokio::time::timeout(timeout, recv_frame(reader))
        .await
        .map_err(|_| WireError::Timeout)?
}

/// Write a response with timeout. The timeout doubles as subscriber
/// write-backpressure detection: a reader that stops draining its socket
/// gets disconnected rather than stalling the daemon.
pub async fn write_response<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    response: &Response,
    timeout: std::time::Duration,
) -> Result<(), WireError> {
    tokio::time::timeout(timeout, send_frame(writer, response))
        .await
        .map_err(|_| WireError::Timeout)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn frame_round_trips_through_a_buffer() {
        let mut buf = Vec::new();
        send_frame(&mut buf, &Request::Ping).await.expect("send");
        assert_eq!(buf.last(), Some(&b'\n'));

        let mut reader = BufReader::new(Cursor::new(buf));
        let decoded: Request = recv_frame(&mut reader).await.expect("recv");
        assert!(matches!(decoded, Request::Ping));
    }

    #[tokio::test]
    async fn consecutive_frames_are_read_one_at_a_time() {
        let mut buf = Vec::new();
        send_frame(&mut buf, &Request::Ping).await.expect("send");
        send_frame(&mut buf, &Request::Shutdown).await.expect("send");

        let mut reader = BufReader::new(Cursor::new(buf));
        let first: Request = recv_frame(&mut reader).await.expect("first");
        let second: Request = recv_frame(&mut reader).await.expect("second");
        assert!(matches!(first, Request::Ping));
        assert!(matches!(second, Request::Shutdown));
    }

    #[tokio::test]
    async fn clean_close_between_frames_reports_closed() {
        let mut reader = BufReader::new(Cursor::new(Vec::new()));
        let err = recv_frame::<_, Request>(&mut reader).await.unwrap_err();
        assert!(matches!(err, WireError::Closed));
    }

    #[tokio::test]
    async fn close_mid_frame_is_an_io_error() {
        let mut reader = BufReader::new(Cursor::new(b"{\"type\":\"Pi".to_vec()));
        let err = recv_frame::<_, Request>(&mut reader).await.unwrap_err();
        assert!(matches!(err, WireError::Io(_)));
    }

    #[tokio::test]
    async fn unterminated_oversize_frame_is_rejected() {
        let mut garbage = vec![b'x'; MAX_FRAME_BYTES + 1];
        garbage.push(b'y'); // still no newline
        let mut reader = BufReader::new(Cursor::new(garbage));
        let err = recv_frame::<_, Request>(&mut reader).await.unwrap_err();
        assert!(matches!(err, WireError::FrameTooLarge));
    }
}
