//! Streaming frame reader/writer (C2): resync-tolerant reads, checksum
//! validation, and short-write detection on top of any async byte stream.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::UnpiError;
use crate::frame::{Frame, MINIMUM_FRAME_SIZE, START_OF_FRAME};

/// Read a single frame from `reader`.
///
/// 1. Resynchronise: discard bytes until `0xFE` is observed. Arbitrary prefix
///    junk is tolerated silently.
/// 2. Read the fixed 3-byte header tail (`LEN`, `TYPE|SUBSYS`, `CMD`).
/// 3. Read `LEN + 1` more bytes (payload plus the trailing FCS).
/// 4. Validate via [`Frame::decode`].
///
/// A read returning `ErrorKind::Interrupted` is retried transparently. Any
/// other I/O error — including EOF — propagates and is terminal for callers
/// that treat this as a pump loop.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, UnpiError> {
    let mut buf = vec![START_OF_FRAME; MINIMUM_FRAME_SIZE];

    seek_start_of_frame(reader).await?;

    read_exact_retrying(reader, &mut buf[1..4]).await?;

    let payload_len = buf[1] as usize;
    buf.resize(MINIMUM_FRAME_SIZE + payload_len, 0);
    read_exact_retrying(reader, &mut buf[4..]).await?;

    Frame::decode(&buf)
}

async fn seek_start_of_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<(), UnpiError> {
    let mut byte = [0u8; 1];
    loop {
        match reader.read_exact(&mut byte).await {
            Ok(_) => {
                if byte[0] == START_OF_FRAME {
                    return Ok(());
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(UnpiError::Io(e)),
        }
    }
}

async fn read_exact_retrying<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<(), UnpiError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]).await {
            Ok(0) => {
                return Err(UnpiError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "stream closed mid-frame",
                )));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(UnpiError::Io(e)),
        }
    }
    Ok(())
}

/// Encode `frame` and write it to `writer` in a single write call. A partial
/// write (`n < bytes.len()`) is reported as an I/O error even when the
/// underlying writer didn't itself return one.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> Result<(), UnpiError> {
    let bytes = frame.encode();
    let written = writer.write(&bytes).await.map_err(UnpiError::Io)?;
    if written < bytes.len() {
        return Err(UnpiError::Io(std::io::Error::new(
            std::io::ErrorKind::WriteZero,
            format!("writer did not accept whole frame: sent {}, written {written}", bytes.len()),
        )));
    }
    writer.flush().await.map_err(UnpiError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{MessageType, Subsystem};

    #[tokio::test]
    async fn reads_a_clean_frame() {
        let frame = Frame::new(MessageType::SREQ, Subsystem::ZDO, 0x37, vec![0x55, 0xDD]);
        let encoded = frame.encode();
        let mut cursor = std::io::Cursor::new(encoded);
        let decoded = read_frame(&mut cursor).await.unwrap();
        assert_eq!(decoded, frame);
    }

    /// P3: resync over an arbitrary junk prefix that does not itself contain
    /// a properly framed message.
    #[tokio::test]
    async fn resyncs_over_junk_prefix() {
        let frame = Frame::new(MessageType::AREQ, Subsystem::SYS, 0x20, vec![1, 2, 3]);
        let mut stream = vec![0x00, 0x01, 0x02, 0xAB, 0xCD];
        stream.extend_from_slice(&frame.encode());

        let mut cursor = std::io::Cursor::new(stream);
        let decoded = read_frame(&mut cursor).await.unwrap();
        assert_eq!(decoded, frame);
    }

    #[tokio::test]
    async fn short_stream_is_an_error() {
        let mut cursor = std::io::Cursor::new(vec![0xFE, 0x05, 0x00, 0x00]);
        assert!(read_frame(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn writes_produce_exact_wire_bytes() {
        let frame = Frame::new(MessageType::SREQ, Subsystem::ZDO, 0x37, vec![0x55, 0xDD]);
        let mut out = Vec::new();
        write_frame(&mut out, &frame).await.unwrap();
        assert_eq!(out, vec![0xFE, 0x02, 0x25, 0x37, 0x55, 0xDD, 0x98]);
    }

    /// P8: two frames written in order appear back to back, in order.
    #[tokio::test]
    async fn two_writes_append_in_order() {
        let a = Frame::new(MessageType::AREQ, Subsystem::SYS, 0x01, vec![0xAA]);
        let b = Frame::new(MessageType::AREQ, Subsystem::SYS, 0x02, vec![0xBB]);
        let mut out = Vec::new();
        write_frame(&mut out, &a).await.unwrap();
        write_frame(&mut out, &b).await.unwrap();

        let mut expected = a.encode();
        expected.extend_from_slice(&b.encode());
        assert_eq!(out, expected);
    }
}
