//! Frame struct with typed accessors.
//!
//! A frame is stored as its raw wire bytes in a `bytes::BytesMut`. Frames read
//! off the wire may be garbled (wrong length, out-of-range fields), so every
//! accessor is total: missing bytes read as zero and `is_healthy` is the single
//! place that decides whether the structure is sound.
//!
//! # Example
//!
//! ```
//! use ringwire::protocol::{Frame, FrameStatus};
//!
//! let mut frame = Frame::from_line("3,5,hello", 1).unwrap();
//! assert_eq!(frame.destination(), 3);
//! assert_eq!(frame.payload(), b"hello");
//! assert!(frame.is_healthy());
//!
//! frame.set_status(FrameStatus::Accepted);
//! assert_eq!(frame.frame_status(), Some(FrameStatus::Accepted));
//! ```

use std::fmt;

use bytes::{BufMut, BytesMut};

use super::wire_format::{
    access, FrameControl, FrameStatus, Header, ACCESS_CONTROL_OFFSET, DATA_SIZE_OFFSET,
    DESTINATION_OFFSET, FRAME_CONTROL_OFFSET, FRAME_OVERHEAD, HEADER_SIZE, MAX_PAYLOAD_SIZE,
    SOURCE_OFFSET,
};
use crate::error::{RingError, Result};

/// A frame as it travels the ring.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    raw: BytesMut,
}

impl Frame {
    /// Wrap raw wire bytes without validating them.
    pub fn from_bytes(raw: BytesMut) -> Self {
        Self { raw }
    }

    /// Create a frame from raw bytes (copies data).
    pub fn from_slice(raw: &[u8]) -> Self {
        Self {
            raw: BytesMut::from(raw),
        }
    }

    /// Build a new data frame. Payloads longer than 255 bytes are truncated.
    pub fn data(destination: u8, source: u8, payload: &[u8]) -> Self {
        let payload = &payload[..payload.len().min(MAX_PAYLOAD_SIZE)];
        let header = Header::new(
            0,
            FrameControl::Data,
            destination,
            source,
            payload.len() as u8,
        );
        Self::from_bytes(build_frame(&header, payload, FrameStatus::New))
    }

    /// Build a data frame from an outbound line `"<destination>,<size>,<data>"`.
    ///
    /// The payload is the data field cut to `min(size, data length, 255)` bytes.
    pub fn from_line(line: &str, source: u8) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut fields = line.splitn(3, ',');

        let destination = fields
            .next()
            .map(str::trim)
            .ok_or_else(|| RingError::malformed(line, "missing destination"))?
            .parse::<u8>()
            .map_err(|e| RingError::malformed(line, format!("bad destination: {e}")))?;
        let declared = fields
            .next()
            .ok_or_else(|| RingError::malformed(line, "missing size"))?
            .trim()
            .parse::<usize>()
            .map_err(|e| RingError::malformed(line, format!("bad size: {e}")))?;
        let data = fields
            .next()
            .ok_or_else(|| RingError::malformed(line, "missing data"))?
            .as_bytes();

        let len = declared.min(data.len());
        Ok(Self::data(destination, source, &data[..len]))
    }

    /// Build a fresh token.
    pub fn token() -> Self {
        let header = Header::new(access::TOKEN, FrameControl::Token, 0, 0, 0);
        Self::from_bytes(build_frame(&header, &[], FrameStatus::New))
    }

    /// Build a completion signal for `source`.
    pub fn completion(source: u8) -> Self {
        let header = Header::new(0, FrameControl::Token, 0, source, 0);
        Self::from_bytes(build_frame(&header, &[], FrameStatus::Completion))
    }

    /// Build a ring-wide kill signal.
    pub fn kill() -> Self {
        let header = Header::new(0, FrameControl::Token, 0, 0, 0);
        Self::from_bytes(build_frame(&header, &[], FrameStatus::Kill))
    }

    /// Raw wire bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Stored length in bytes (may disagree with `data_size` when garbled).
    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    #[inline]
    fn byte_at(&self, offset: usize) -> u8 {
        self.raw.get(offset).copied().unwrap_or(0)
    }

    /// Decoded header, `None` if fewer than 5 bytes are present.
    pub fn header(&self) -> Option<Header> {
        Header::decode(&self.raw)
    }

    #[inline]
    pub fn access_control(&self) -> u8 {
        self.byte_at(ACCESS_CONTROL_OFFSET)
    }

    #[inline]
    pub fn frame_control(&self) -> u8 {
        self.byte_at(FRAME_CONTROL_OFFSET)
    }

    #[inline]
    pub fn destination(&self) -> u8 {
        self.byte_at(DESTINATION_OFFSET)
    }

    #[inline]
    pub fn source(&self) -> u8 {
        self.byte_at(SOURCE_OFFSET)
    }

    #[inline]
    pub fn data_size(&self) -> u8 {
        self.byte_at(DATA_SIZE_OFFSET)
    }

    /// Raw status byte (last byte of the frame).
    #[inline]
    pub fn status(&self) -> u8 {
        self.raw.last().copied().unwrap_or(0)
    }

    /// Parsed status byte, `None` if out of range.
    #[inline]
    pub fn frame_status(&self) -> Option<FrameStatus> {
        FrameStatus::from_byte(self.status())
    }

    /// Payload bytes between the header and the status byte.
    pub fn payload(&self) -> &[u8] {
        if self.raw.len() < FRAME_OVERHEAD {
            return &[];
        }
        &self.raw[HEADER_SIZE..self.raw.len() - 1]
    }

    /// Structural validity: length matches `data_size + 6`, frame control and
    /// status are within their enumerated ranges.
    pub fn is_healthy(&self) -> bool {
        let Some(header) = self.header() else {
            return false;
        };
        self.raw.len() == header.frame_len()
            && header.validate().is_ok()
            && self.frame_status().is_some()
    }

    /// Frame control 0 or the token flag set.
    #[inline]
    pub fn is_token(&self) -> bool {
        self.frame_control() == FrameControl::Token as u8
            || access::has_flag(self.access_control(), access::TOKEN)
    }

    #[inline]
    pub fn is_monitor_seen(&self) -> bool {
        access::has_flag(self.access_control(), access::MONITOR_SEEN)
    }

    /// A non-token frame the monitor has already marked once.
    #[inline]
    pub fn is_orphan(&self) -> bool {
        !self.is_token() && self.is_monitor_seen()
    }

    #[inline]
    pub fn is_kill(&self) -> bool {
        self.frame_status() == Some(FrameStatus::Kill)
    }

    #[inline]
    pub fn is_completion(&self) -> bool {
        self.frame_status() == Some(FrameStatus::Completion)
    }

    /// Set the monitor-seen flag.
    pub fn mark_seen(&mut self) {
        if let Some(byte) = self.raw.get_mut(ACCESS_CONTROL_OFFSET) {
            *byte |= access::MONITOR_SEEN;
        }
    }

    /// Clear the monitor-seen flag, leaving the other access-control bits.
    pub fn clear_seen(&mut self) {
        if let Some(byte) = self.raw.get_mut(ACCESS_CONTROL_OFFSET) {
            *byte &= !access::MONITOR_SEEN;
        }
    }

    /// Overwrite the trailing status byte.
    pub fn set_status(&mut self, status: FrameStatus) {
        if let Some(byte) = self.raw.last_mut() {
            *byte = status as u8;
        }
    }

    /// Copy of this frame with one header byte removed, one byte shorter.
    ///
    /// `index` is clamped into the header. The first payload byte (or the
    /// status byte) shifts into the size slot, so the result fails
    /// `is_healthy` unless that byte happens to equal the old size minus one.
    pub fn with_omitted_byte(&self, index: usize) -> Self {
        let index = index.min(HEADER_SIZE - 1);
        let mut raw = BytesMut::with_capacity(self.raw.len().saturating_sub(1));
        for (i, byte) in self.raw.iter().enumerate() {
            if i != index {
                raw.put_u8(*byte);
            }
        }
        Self { raw }
    }

    /// Same message regardless of status and monitor bit.
    ///
    /// Used to match a returning frame against the sender's awaiting-ack set.
    pub fn same_message(&self, other: &Frame) -> bool {
        self.source() == other.source()
            && self.destination() == other.destination()
            && self.payload() == other.payload()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("ac", &format_args!("{:#04x}", self.access_control()))
            .field("fc", &self.frame_control())
            .field("dst", &self.destination())
            .field("src", &self.source())
            .field("size", &self.data_size())
            .field("status", &self.status())
            .field("len", &self.len())
            .finish()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_token() {
            write!(f, "token(status={})", self.status())
        } else {
            write!(
                f,
                "{}->{} ({} bytes, status={})",
                self.source(),
                self.destination(),
                self.data_size(),
                self.status()
            )
        }
    }
}

/// Build a complete frame as a single byte buffer.
///
/// # Example
///
/// ```
/// use ringwire::protocol::{build_frame, FrameControl, FrameStatus, Header};
///
/// let header = Header::new(0, FrameControl::Data, 3, 1, 5);
/// let bytes = build_frame(&header, b"hello", FrameStatus::New);
/// assert_eq!(bytes.len(), 5 + 6);
/// ```
pub fn build_frame(header: &Header, payload: &[u8], status: FrameStatus) -> BytesMut {
    let mut buf = BytesMut::with_capacity(FRAME_OVERHEAD + payload.len());
    buf.put_slice(&header.encode());
    buf.put_slice(payload);
    buf.put_u8(status as u8);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_data_frame_layout() {
        let frame = Frame::data(3, 1, b"hello");
        assert_eq!(frame.as_bytes(), &[0, 1, 3, 1, 5, b'h', b'e', b'l', b'l', b'o', 0]);
        assert_eq!(frame.len(), 11);
        assert!(frame.is_healthy());
        assert!(!frame.is_token());
        assert_eq!(frame.frame_status(), Some(FrameStatus::New));
    }

    #[test]
    fn test_data_frame_caps_payload() {
        let payload = vec![b'x'; 300];
        let frame = Frame::data(2, 1, &payload);
        assert_eq!(frame.data_size(), 255);
        assert_eq!(frame.len(), 261);
        assert!(frame.is_healthy());
    }

    #[test]
    fn test_from_line() {
        let frame = Frame::from_line("3,5,hello\n", 1).unwrap();
        assert_eq!(frame.destination(), 3);
        assert_eq!(frame.source(), 1);
        assert_eq!(frame.payload(), b"hello");
    }

    #[test]
    fn test_from_line_keeps_commas_in_data() {
        let frame = Frame::from_line("2,7,a,b,c,d", 4).unwrap();
        assert_eq!(frame.payload(), b"a,b,c,d");
    }

    #[test]
    fn test_from_line_size_clamps_to_data() {
        assert_eq!(Frame::from_line("2,3,hello", 1).unwrap().payload(), b"hel");
        assert_eq!(Frame::from_line("2,40,hi", 1).unwrap().payload(), b"hi");
    }

    #[test]
    fn test_from_line_rejects_garbage() {
        assert!(Frame::from_line("", 1).is_err());
        assert!(Frame::from_line("x,5,hello", 1).is_err());
        assert!(Frame::from_line("300,5,hello", 1).is_err());
        assert!(Frame::from_line("3,five,hello", 1).is_err());
        assert!(Frame::from_line("3,5", 1).is_err());
    }

    #[test]
    fn test_synthetic_frames() {
        let token = Frame::token();
        assert!(token.is_token());
        assert!(token.is_healthy());
        assert_eq!(token.len(), 6);

        let completion = Frame::completion(7);
        assert!(completion.is_completion());
        assert_eq!(completion.source(), 7);
        assert!(completion.is_healthy());

        let kill = Frame::kill();
        assert!(kill.is_kill());
        assert!(kill.is_healthy());
    }

    #[test]
    fn test_unhealthy_field_ranges() {
        let mut bytes = Frame::data(3, 1, b"hi").as_bytes().to_vec();
        bytes[1] = 2;
        assert!(!Frame::from_slice(&bytes).is_healthy());

        let mut bytes = Frame::data(3, 1, b"hi").as_bytes().to_vec();
        *bytes.last_mut().unwrap() = 1;
        assert!(!Frame::from_slice(&bytes).is_healthy());

        let mut bytes = Frame::data(3, 1, b"hi").as_bytes().to_vec();
        *bytes.last_mut().unwrap() = 6;
        assert!(!Frame::from_slice(&bytes).is_healthy());
    }

    #[test]
    fn test_altered_data_size_is_unhealthy() {
        let mut bytes = Frame::data(3, 1, b"hello").as_bytes().to_vec();
        bytes[DATA_SIZE_OFFSET] = 9;
        assert!(!Frame::from_slice(&bytes).is_healthy());
    }

    #[test]
    fn test_short_frames_are_total() {
        let frame = Frame::from_slice(&[0, 1, 3]);
        assert!(!frame.is_healthy());
        assert!(frame.header().is_none());
        assert_eq!(frame.data_size(), 0);
        assert!(frame.payload().is_empty());

        let empty = Frame::from_slice(&[]);
        assert!(!empty.is_healthy());
        assert_eq!(empty.status(), 0);
    }

    #[test]
    fn test_monitor_seen_and_orphan() {
        let mut frame = Frame::data(3, 1, b"hi");
        assert!(!frame.is_orphan());
        frame.mark_seen();
        assert!(frame.is_monitor_seen());
        assert!(frame.is_orphan());
        frame.clear_seen();
        assert!(!frame.is_monitor_seen());

        let mut token = Frame::token();
        token.mark_seen();
        assert!(!token.is_orphan());
    }

    #[test]
    fn test_clear_seen_keeps_other_bits() {
        let mut bytes = Frame::data(3, 1, b"hi").as_bytes().to_vec();
        bytes[0] = 0b1010_0101 | access::MONITOR_SEEN;
        let mut frame = Frame::from_slice(&bytes);
        frame.clear_seen();
        assert_eq!(frame.access_control(), 0b1010_0101);
    }

    #[test]
    fn test_set_status() {
        let mut frame = Frame::data(3, 1, b"hi");
        frame.set_status(FrameStatus::Rejected);
        assert_eq!(frame.frame_status(), Some(FrameStatus::Rejected));
        assert_eq!(frame.payload(), b"hi");
    }

    #[test]
    fn test_same_message_ignores_status_and_seen() {
        let original = Frame::data(3, 1, b"hi");
        let mut returned = original.clone();
        returned.mark_seen();
        returned.set_status(FrameStatus::Accepted);
        assert!(original.same_message(&returned));
        assert!(!original.same_message(&Frame::data(3, 1, b"ho")));
        assert!(!original.same_message(&Frame::data(2, 1, b"hi")));
    }

    #[test]
    fn test_display() {
        assert_eq!(Frame::data(3, 1, b"hi").to_string(), "1->3 (2 bytes, status=0)");
        assert_eq!(Frame::token().to_string(), "token(status=0)");
    }

    proptest! {
        #[test]
        fn prop_encoded_frames_are_healthy(
            dst in any::<u8>(),
            src in any::<u8>(),
            payload in proptest::collection::vec(any::<u8>(), 0..=255),
        ) {
            let frame = Frame::data(dst, src, &payload);
            prop_assert!(frame.is_healthy());
            prop_assert_eq!(frame.len(), payload.len() + FRAME_OVERHEAD);
            let decoded = Frame::from_slice(frame.as_bytes());
            prop_assert_eq!(decoded.payload(), &payload[..]);
            prop_assert_eq!(decoded.destination(), dst);
            prop_assert_eq!(decoded.source(), src);
        }

        #[test]
        fn prop_omitted_header_byte_is_garbled(
            payload in proptest::collection::vec(any::<u8>(), 0..=255),
            index in 0usize..HEADER_SIZE,
        ) {
            // The first payload byte slides into the size slot; if it happens
            // to equal the shortened length the frame still lines up.
            prop_assume!(payload.is_empty() || payload[0] as usize + 1 != payload.len());
            let frame = Frame::data(3, 1, &payload).with_omitted_byte(index);
            prop_assert_eq!(frame.len(), payload.len() + FRAME_OVERHEAD - 1);
            prop_assert!(!frame.is_healthy());
        }

        #[test]
        fn prop_length_mismatch_is_unhealthy(
            payload in proptest::collection::vec(any::<u8>(), 0..=200),
            size in any::<u8>(),
        ) {
            prop_assume!(size as usize != payload.len());
            let mut bytes = Frame::data(3, 1, &payload).as_bytes().to_vec();
            bytes[DATA_SIZE_OFFSET] = size;
            prop_assert!(!Frame::from_slice(&bytes).is_healthy());
        }
    }
}
