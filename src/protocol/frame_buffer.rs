//! Frame buffer for accumulating partial reads.
//!
//! Uses `bytes::BytesMut` for zero-copy buffer management.
//! Implements a state machine for handling fragmented frames:
//! - `WaitingForHeader`: Need at least 5 bytes
//! - `WaitingForBody`: Header parsed, need `data_size + 1` more bytes
//!
//! The buffer trusts the size byte it reads. A frame that lost a header byte
//! upstream therefore swallows bytes of the frames behind it; the monitor
//! recovers from that misalignment by draining the stream and calling
//! [`FrameBuffer::clear`].
//!
//! # Example
//!
//! ```
//! use ringwire::protocol::{Frame, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new();
//! let bytes = Frame::data(3, 1, b"hello");
//!
//! assert!(buffer.push(&bytes.as_bytes()[..4]).is_empty());
//! let frames = buffer.push(&bytes.as_bytes()[4..]);
//! assert_eq!(frames.len(), 1);
//! assert_eq!(frames[0].payload(), b"hello");
//! ```

use bytes::BytesMut;

use super::wire_format::{Header, FRAME_OVERHEAD, HEADER_SIZE, MAX_PAYLOAD_SIZE};
use super::Frame;

/// State machine for frame parsing.
#[derive(Debug, Clone, Copy)]
enum State {
    /// Waiting for complete header (need 5 bytes).
    WaitingForHeader,
    /// Header seen, waiting until the whole frame is buffered.
    WaitingForBody { frame_len: usize },
}

/// Buffer for accumulating incoming bytes and extracting complete frames.
pub struct FrameBuffer {
    /// Accumulated bytes from socket reads.
    buffer: BytesMut,
    /// Current parsing state.
    state: State,
}

impl FrameBuffer {
    /// Create a new frame buffer sized for a handful of maximum frames.
    pub fn new() -> Self {
        Self::with_capacity(4 * (MAX_PAYLOAD_SIZE + FRAME_OVERHEAD))
    }

    /// Create a new frame buffer with custom capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            state: State::WaitingForHeader,
        }
    }

    /// Push data into the buffer and extract all complete frames.
    ///
    /// Partial data is kept for the next push.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.extend(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Append data to the buffer without extracting frames.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Extract a single complete frame, `None` if more data is needed.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                State::WaitingForHeader => {
                    let header = Header::decode(&self.buffer[..])?;
                    self.state = State::WaitingForBody {
                        frame_len: header.frame_len(),
                    };
                }
                State::WaitingForBody { frame_len } => {
                    if self.buffer.len() < frame_len {
                        return None;
                    }
                    let raw = self.buffer.split_to(frame_len);
                    self.state = State::WaitingForHeader;
                    return Some(Frame::from_bytes(raw));
                }
            }
        }
    }

    /// Take whatever partial frame is buffered.
    ///
    /// Called when the stream ended or stalled mid-frame. The returned frame is
    /// shorter than its header claims, so it classifies as garbled.
    pub fn take_partial(&mut self) -> Option<Frame> {
        if self.buffer.is_empty() {
            return None;
        }
        let len = match self.state {
            State::WaitingForHeader => self.buffer.len().min(HEADER_SIZE),
            State::WaitingForBody { frame_len } => self.buffer.len().min(frame_len),
        };
        let raw = self.buffer.split_to(len);
        self.state = State::WaitingForHeader;
        Some(Frame::from_bytes(raw))
    }

    /// Get the number of buffered bytes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer and reset state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = State::WaitingForHeader;
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match &self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForBody { .. } => "WaitingForBody",
        }
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_of(frame: &Frame) -> Vec<u8> {
        frame.as_bytes().to_vec()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&bytes_of(&Frame::data(3, 1, b"hello")));

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0], Frame::data(3, 1, b"hello"));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();

        let mut combined = bytes_of(&Frame::data(2, 1, b"first"));
        combined.extend(bytes_of(&Frame::token()));
        combined.extend(bytes_of(&Frame::data(3, 2, b"third")));

        let frames = buffer.push(&combined);

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload(), b"first");
        assert!(frames[1].is_token());
        assert_eq!(frames[2].source(), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = FrameBuffer::new();
        let bytes = bytes_of(&Frame::data(3, 1, b"test"));

        assert!(buffer.push(&bytes[..3]).is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");

        let frames = buffer.push(&bytes[3..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"test");
    }

    #[test]
    fn test_fragmented_body() {
        let mut buffer = FrameBuffer::new();
        let bytes = bytes_of(&Frame::data(3, 1, b"a longer payload that fragments"));

        assert!(buffer.push(&bytes[..HEADER_SIZE + 4]).is_empty());
        assert_eq!(buffer.state_name(), "WaitingForBody");

        let frames = buffer.push(&bytes[HEADER_SIZE + 4..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"a longer payload that fragments");
    }

    #[test]
    fn test_empty_payload_still_needs_status_byte() {
        let mut buffer = FrameBuffer::new();
        let bytes = bytes_of(&Frame::token());

        assert!(buffer.push(&bytes[..HEADER_SIZE]).is_empty());
        let frames = buffer.push(&bytes[HEADER_SIZE..]);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_token());
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let bytes = bytes_of(&Frame::data(1, 2, b"hi"));

        let mut all = Vec::new();
        for byte in &bytes {
            all.extend(buffer.push(&[*byte]));
        }

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].payload(), b"hi");
    }

    #[test]
    fn test_take_partial_after_header() {
        let mut buffer = FrameBuffer::new();
        let bytes = bytes_of(&Frame::data(3, 1, b"hello"));

        assert!(buffer.push(&bytes[..7]).is_empty());
        let partial = buffer.take_partial().unwrap();
        assert_eq!(partial.len(), 7);
        assert!(!partial.is_healthy());
        assert!(buffer.is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");
    }

    #[test]
    fn test_take_partial_short_header() {
        let mut buffer = FrameBuffer::new();
        buffer.push(&[0, 1]);
        let partial = buffer.take_partial().unwrap();
        assert_eq!(partial.len(), 2);
        assert!(!partial.is_healthy());
        assert!(buffer.take_partial().is_none());
    }

    #[test]
    fn test_garbled_frame_swallows_following_bytes() {
        let mut buffer = FrameBuffer::new();
        // Dropping the size byte makes 'h' (104) the size.
        let garbled = Frame::data(3, 1, b"hello").with_omitted_byte(4);
        let mut bytes = bytes_of(&garbled);
        bytes.extend(bytes_of(&Frame::token()));

        assert!(buffer.push(&bytes).is_empty());
        assert_eq!(buffer.state_name(), "WaitingForBody");

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.state_name(), "WaitingForHeader");
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = FrameBuffer::new();
        let first = bytes_of(&Frame::data(2, 1, b"first"));
        let second = bytes_of(&Frame::data(3, 1, b"second"));

        let mut data = first.clone();
        data.extend_from_slice(&second[..5]);

        let frames = buffer.push(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(buffer.len(), 5);

        let frames = buffer.push(&second[5..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload(), b"second");
    }
}
