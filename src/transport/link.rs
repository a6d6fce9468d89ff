//! Frame link over a pair of tokio byte streams.
//!
//! The inbound half feeds a [`FrameBuffer`]; the outbound half receives whole
//! frames. Works over TCP halves in production and `tokio::io::duplex` in
//! tests.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::{FrameTransport, ReadOutcome};
use crate::error::{RingError, Result};
use crate::protocol::{Frame, FrameBuffer, FRAME_OVERHEAD, MAX_PAYLOAD_SIZE};

/// How long `drain` waits for more bytes before declaring the stream quiet.
pub const DEFAULT_DRAIN_WINDOW: Duration = Duration::from_millis(2);

const READ_CHUNK: usize = 4 * (MAX_PAYLOAD_SIZE + FRAME_OVERHEAD);

/// A node's inbound and outbound stream halves.
pub struct FrameLink<R, W> {
    reader: Option<R>,
    writer: Option<W>,
    buffer: FrameBuffer,
    scratch: Vec<u8>,
    drain_window: Duration,
    eof: bool,
}

impl<R, W> FrameLink<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    /// Create a link from an inbound reader and an outbound writer.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Some(reader),
            writer: Some(writer),
            buffer: FrameBuffer::new(),
            scratch: vec![0u8; READ_CHUNK],
            drain_window: DEFAULT_DRAIN_WINDOW,
            eof: false,
        }
    }

    /// Set the quiet period used by `drain`.
    pub fn with_drain_window(mut self, window: Duration) -> Self {
        self.drain_window = window;
        self
    }

    /// Quiet period `drain` waits for.
    pub fn drain_window(&self) -> Duration {
        self.drain_window
    }

    /// Check whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.reader.is_none() && self.writer.is_none()
    }
}

#[async_trait::async_trait]
impl<R, W> FrameTransport for FrameLink<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn read_frame(&mut self, timeout: Duration) -> Result<ReadOutcome> {
        loop {
            if let Some(frame) = self.buffer.next_frame() {
                return Ok(ReadOutcome::Frame(frame));
            }

            if self.eof {
                // Stream ended mid-frame: hand the fragment up as a garbled frame
                return self
                    .buffer
                    .take_partial()
                    .map(ReadOutcome::Frame)
                    .ok_or(RingError::ConnectionClosed);
            }

            let reader = self.reader.as_mut().ok_or(RingError::ConnectionClosed)?;
            match tokio::time::timeout(timeout, reader.read(&mut self.scratch)).await {
                Err(_) => {
                    return Ok(self
                        .buffer
                        .take_partial()
                        .map(ReadOutcome::Frame)
                        .unwrap_or(ReadOutcome::Timeout));
                }
                Ok(Ok(0)) => self.eof = true,
                Ok(Ok(n)) => self.buffer.extend(&self.scratch[..n]),
                Ok(Err(e)) => return Err(RingError::Io(e)),
            }
        }
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(RingError::ConnectionClosed)?;
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn drain(&mut self) -> Result<usize> {
        let mut discarded = self.buffer.len();
        self.buffer.clear();

        let Some(reader) = self.reader.as_mut() else {
            return Ok(discarded);
        };
        if self.eof {
            return Ok(discarded);
        }

        loop {
            match tokio::time::timeout(self.drain_window, reader.read(&mut self.scratch)).await {
                Err(_) => break,
                Ok(Ok(0)) => {
                    self.eof = true;
                    break;
                }
                Ok(Ok(n)) => discarded += n,
                Ok(Err(e)) => return Err(RingError::Io(e)),
            }
        }

        Ok(discarded)
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("Outbound shutdown failed: {}", e);
            }
        }
        self.reader = None;
        self.buffer.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};

    /// Link whose inbound is fed by the returned stream and whose outbound
    /// lands in the other returned stream.
    fn test_link() -> (FrameLink<DuplexStream, DuplexStream>, DuplexStream, DuplexStream) {
        let (inbound_read, inbound_feed) = duplex(4096);
        let (outbound_write, outbound_sink) = duplex(4096);
        (
            FrameLink::new(inbound_read, outbound_write),
            inbound_feed,
            outbound_sink,
        )
    }

    const WAIT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_read_frame_from_stream() {
        let (mut link, mut feed, _sink) = test_link();
        feed.write_all(Frame::data(3, 1, b"hello").as_bytes())
            .await
            .unwrap();

        let outcome = link.read_frame(WAIT).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Frame(Frame::data(3, 1, b"hello")));
    }

    #[tokio::test]
    async fn test_read_frames_split_across_writes() {
        let (mut link, mut feed, _sink) = test_link();
        let token = Frame::token();
        let data = Frame::data(2, 1, b"abc");
        let mut bytes = token.as_bytes().to_vec();
        bytes.extend_from_slice(data.as_bytes());

        let handle = tokio::spawn(async move {
            for chunk in bytes.chunks(4) {
                feed.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
            feed
        });

        assert_eq!(link.read_frame(WAIT).await.unwrap(), ReadOutcome::Frame(token));
        assert_eq!(link.read_frame(WAIT).await.unwrap(), ReadOutcome::Frame(data));
        let _feed = handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_read_timeout_without_traffic() {
        let (mut link, _feed, _sink) = test_link();
        let outcome = link.read_frame(Duration::from_millis(20)).await.unwrap();
        assert_eq!(outcome, ReadOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_stall_mid_frame_yields_partial() {
        let (mut link, mut feed, _sink) = test_link();
        let bytes = Frame::data(3, 1, b"hello").as_bytes().to_vec();
        feed.write_all(&bytes[..7]).await.unwrap();

        match link.read_frame(Duration::from_millis(20)).await.unwrap() {
            ReadOutcome::Frame(frame) => {
                assert_eq!(frame.len(), 7);
                assert!(!frame.is_healthy());
            }
            ReadOutcome::Timeout => panic!("expected partial frame"),
        }
    }

    #[tokio::test]
    async fn test_underrun_on_close_yields_truncated_frame() {
        let (mut link, mut feed, _sink) = test_link();
        let bytes = Frame::data(3, 1, b"hello").as_bytes().to_vec();
        feed.write_all(&bytes[..5]).await.unwrap();
        drop(feed);

        match link.read_frame(WAIT).await.unwrap() {
            ReadOutcome::Frame(frame) => {
                assert_eq!(frame.len(), 5);
                assert!(!frame.is_healthy());
            }
            ReadOutcome::Timeout => panic!("expected truncated frame"),
        }
        assert!(matches!(
            link.read_frame(WAIT).await,
            Err(RingError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_write_frame_reaches_successor() {
        let (mut link, _feed, mut sink) = test_link();
        let frame = Frame::completion(4);
        link.write_frame(&frame).await.unwrap();

        let mut buf = vec![0u8; frame.len()];
        sink.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, frame.as_bytes());
    }

    #[tokio::test]
    async fn test_garbled_frame_swallows_following_completion() {
        let (mut link, mut feed, _sink) = test_link();
        let garbled = Frame::data(3, 1, b"hello").with_omitted_byte(4);
        let completion = Frame::completion(2);
        feed.write_all(garbled.as_bytes()).await.unwrap();
        feed.write_all(completion.as_bytes()).await.unwrap();

        let quick = Duration::from_millis(20);
        match link.read_frame(quick).await.unwrap() {
            ReadOutcome::Frame(frame) => {
                assert!(!frame.is_healthy());
                assert_eq!(frame.len(), garbled.len() + completion.len());
                assert!(frame.as_bytes().ends_with(completion.as_bytes()));
            }
            ReadOutcome::Timeout => panic!("expected garbled frame"),
        }
        // The completion never surfaces as a frame of its own
        assert_eq!(link.read_frame(quick).await.unwrap(), ReadOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_drain_discards_buffered_and_pending_bytes() {
        let (mut link, mut feed, _sink) = test_link();
        let garbled = Frame::data(3, 1, b"hello").with_omitted_byte(4);
        feed.write_all(garbled.as_bytes()).await.unwrap();
        feed.write_all(Frame::token().as_bytes()).await.unwrap();

        // Size byte is now 'h', so the garbled frame stalls as a partial.
        let outcome = link.read_frame(Duration::from_millis(20)).await.unwrap();
        assert!(matches!(outcome, ReadOutcome::Frame(ref f) if !f.is_healthy()));

        feed.write_all(b"junk").await.unwrap();
        let discarded = link.drain().await.unwrap();
        assert_eq!(discarded, 4);

        feed.write_all(Frame::token().as_bytes()).await.unwrap();
        assert_eq!(
            link.read_frame(WAIT).await.unwrap(),
            ReadOutcome::Frame(Frame::token())
        );
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_half_closes() {
        let (mut link, _feed, mut sink) = test_link();
        link.close().await.unwrap();
        link.close().await.unwrap();
        assert!(link.is_closed());

        let mut buf = [0u8; 1];
        assert_eq!(sink.read(&mut buf).await.unwrap(), 0);
        assert!(matches!(
            link.write_frame(&Frame::token()).await,
            Err(RingError::ConnectionClosed)
        ));
    }
}
