//! Terminator-delimited framing over a byte stream.
//!
//! Messages are separated by a single `0x00` byte, which can never appear
//! inside a JSON text. There is no length prefix.

use tokio::io::{AsyncRead, AsyncReadExt};

pub const TERMINATOR: u8 = 0x00;

/// Reads terminator-delimited frames from an `AsyncRead`, buffering any
/// bytes read past the terminator for the next call.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
    scan_from: usize,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        FrameReader {
            inner,
            buf: Vec::with_capacity(4096),
            scan_from: 0,
        }
    }

    /// Returns the next frame (terminator stripped), or `None` on clean EOF
    /// with no partial frame pending.
    pub async fn next_frame(&mut self) -> std::io::Result<Option<Vec<u8>>> {
        loop {
            if let Some(pos) = self.buf[self.scan_from..]
                .iter()
                .position(|&b| b == TERMINATOR)
            {
                let split_at = self.scan_from + pos;
                let frame = self.buf[..split_at].to_vec();
                self.buf.drain(..=split_at);
                self.scan_from = 0;
                return Ok(Some(frame));
            }
            self.scan_from = self.buf.len();

            let mut chunk = [0u8; 4096];
            let n = self.inner.read(&mut chunk).await?;
            if n == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    // Partial frame with no terminator: treat as EOF, drop it.
                    self.buf.clear();
                    Ok(None)
                };
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn reads_two_frames_in_one_buffer() {
        let data = b"{\"a\":1}\x00{\"b\":2}\x00".to_vec();
        let mut reader = FrameReader::new(Cursor::new(data));
        assert_eq!(reader.next_frame().await.unwrap().unwrap(), b"{\"a\":1}");
        assert_eq!(reader.next_frame().await.unwrap().unwrap(), b"{\"b\":2}");
        assert_eq!(reader.next_frame().await.unwrap(), None);
    }

    #[tokio::test]
    async fn handles_zero_byte_payload_between_terminators() {
        let data = b"\x00{\"a\":1}\x00".to_vec();
        let mut reader = FrameReader::new(Cursor::new(data));
        assert_eq!(reader.next_frame().await.unwrap().unwrap(), Vec::<u8>::new());
        assert_eq!(reader.next_frame().await.unwrap().unwrap(), b"{\"a\":1}");
    }

    #[tokio::test]
    async fn frame_spanning_multiple_reads_is_reassembled() {
        struct Slow(Vec<u8>, usize);
        impl AsyncRead for Slow {
            fn poll_read(
                mut self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                if self.1 >= self.0.len() {
                    return std::task::Poll::Ready(Ok(()));
                }
                buf.put_slice(&[self.0[self.1]]);
                self.1 += 1;
                std::task::Poll::Ready(Ok(()))
            }
        }
        let mut reader = FrameReader::new(Slow(b"{\"x\":1}\x00".to_vec(), 0));
        assert_eq!(reader.next_frame().await.unwrap().unwrap(), b"{\"x\":1}");
    }
}
