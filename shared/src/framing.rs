//! Length-prefixed message framing over async byte streams
//!
//! Every message on the wire is a 4-byte big-endian length followed by exactly
//! that many payload bytes. The framing layer is payload-agnostic: callers hand
//! it already-serialized envelopes (see `message`) and get raw buffers back.
//!
//! Reads loop over partial reads until the full prefix and payload have
//! arrived. A zero-byte read while a frame is still incomplete means the peer
//! went away, and is reported as `FrameError::Disconnected`.

use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the big-endian length prefix in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Largest payload accepted in either direction (16 MiB). Full game snapshots
/// are the largest messages and stay far below this.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("peer disconnected")]
    Disconnected,
    #[error("frame of {0} bytes exceeds the {max} byte limit", max = MAX_FRAME_SIZE)]
    TooLarge(usize),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl FrameError {
    /// Returns true when the error means the connection itself is gone
    /// (clean close, reset, broken pipe) rather than a bad frame.
    pub fn is_disconnect(&self) -> bool {
        match self {
            FrameError::Disconnected => true,
            FrameError::TooLarge(_) => false,
            FrameError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
            ),
        }
    }
}

/// Writes one frame: length prefix and payload coalesced into a single write.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    if payload.len() > MAX_FRAME_SIZE as usize {
        return Err(FrameError::TooLarge(payload.len()));
    }

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);

    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame, blocking until the whole payload has arrived.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    read_full(reader, &mut prefix).await?;

    let len = u32::from_be_bytes(prefix);
    if len > MAX_FRAME_SIZE {
        return Err(FrameError::TooLarge(len as usize));
    }

    let mut payload = vec![0u8; len as usize];
    read_full(reader, &mut payload).await?;
    Ok(payload)
}

async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), FrameError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(FrameError::Disconnected);
        }
        filled += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tokio::io::duplex;
    use tokio_test::io::Builder;

    fn encode_frame(payload: &[u8]) -> Vec<u8> {
        let mut frame = (payload.len() as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(payload);
        frame
    }

    #[tokio::test]
    async fn test_write_frame_prefixes_length() {
        let mut writer = Builder::new().write(&[0, 0, 0, 5]).write(b"hello").build();
        write_frame(&mut writer, b"hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_read_frame_across_partial_reads() {
        let mut reader = Builder::new()
            .read(&[0, 0])
            .read(&[0, 5, b'h'])
            .read(b"el")
            .read(b"lo")
            .build();

        let payload = read_frame(&mut reader).await.unwrap();
        assert_eq!(payload, b"hello");
    }

    #[tokio::test]
    async fn test_empty_payload_roundtrip() {
        let (mut a, mut b) = duplex(64);
        write_frame(&mut a, b"").await.unwrap();
        let payload = read_frame(&mut b).await.unwrap();
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn test_large_payload_roundtrip() {
        let big: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let (mut a, mut b) = duplex(4096);

        let expected = big.clone();
        let writer = tokio::spawn(async move {
            write_frame(&mut a, &big).await.unwrap();
        });

        let payload = read_frame(&mut b).await.unwrap();
        writer.await.unwrap();
        assert_eq!(payload, expected);
    }

    #[tokio::test]
    async fn test_multiple_frames_in_sequence() {
        let (mut a, mut b) = duplex(1024);
        for msg in [&b"first"[..], b"second", b"third"] {
            write_frame(&mut a, msg).await.unwrap();
        }

        assert_eq!(read_frame(&mut b).await.unwrap(), b"first");
        assert_eq!(read_frame(&mut b).await.unwrap(), b"second");
        assert_eq!(read_frame(&mut b).await.unwrap(), b"third");
    }

    #[tokio::test]
    async fn test_truncated_prefix_is_disconnect() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&[0, 0]).await.unwrap();
        drop(a);

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, FrameError::Disconnected));
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn test_truncated_payload_is_disconnect() {
        let (mut a, mut b) = duplex(64);
        a.write_all(&[0, 0, 0, 10]).await.unwrap();
        a.write_all(b"abc").await.unwrap();
        drop(a);

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, FrameError::Disconnected));
    }

    #[tokio::test]
    async fn test_clean_close_before_frame_is_disconnect() {
        let (a, mut b) = duplex(64);
        drop(a);

        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, FrameError::Disconnected));
    }

    #[tokio::test]
    async fn test_rejects_oversized_length_prefix() {
        let mut reader = Builder::new().read(&(MAX_FRAME_SIZE + 1).to_be_bytes()).build();

        let err = read_frame(&mut reader).await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge(_)));
        assert!(!err.is_disconnect());
    }

    #[tokio::test]
    async fn test_rejects_oversized_write() {
        let big = vec![0u8; MAX_FRAME_SIZE as usize + 1];
        let mut sink = tokio::io::sink();
        let err = write_frame(&mut sink, &big).await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge(n) if n == big.len()));
    }

    #[tokio::test]
    async fn test_write_to_closed_peer_is_disconnect() {
        let (mut a, b) = duplex(64);
        drop(b);

        let err = write_frame(&mut a, b"lost").await.unwrap_err();
        assert!(err.is_disconnect());
    }

    proptest! {
        #[test]
        fn prop_frame_survives_arbitrary_read_splits(
            payload in proptest::collection::vec(any::<u8>(), 0..2048),
            splits in proptest::collection::vec(1usize..64, 1..32),
        ) {
            let wire = encode_frame(&payload);

            let mut builder = Builder::new();
            let mut offset = 0;
            let mut split_iter = splits.iter().cycle();
            while offset < wire.len() {
                let step = (*split_iter.next().unwrap()).min(wire.len() - offset);
                builder.read(&wire[offset..offset + step]);
                offset += step;
            }
            let mut reader = builder.build();

            let received = tokio_test::block_on(read_frame(&mut reader)).unwrap();
            prop_assert_eq!(received, payload);
        }
    }
}
