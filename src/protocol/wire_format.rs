//! Wire format encoding and decoding.
//!
//! Implements the 5-byte frame header plus trailing status byte:
//! ```text
//! ┌────────┬─────────┬──────┬─────┬──────┬───────────┬────────┐
//! │ Access │ Frame   │ Dest │ Src │ Size │ Payload   │ Status │
//! │ Control│ Control │      │     │  N   │ N bytes   │        │
//! │ 1 byte │ 1 byte  │1 byte│1 b. │1 byte│ 0..=255   │ 1 byte │
//! └────────┴─────────┴──────┴─────┴──────┴───────────┴────────┘
//! ```
//!
//! A well-formed frame is always exactly `N + 6` bytes long.

use crate::error::{RingError, Result};

/// Header size in bytes (fixed, exactly 5).
pub const HEADER_SIZE: usize = 5;

/// Header plus trailing status byte.
pub const FRAME_OVERHEAD: usize = HEADER_SIZE + 1;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD_SIZE: usize = 255;

/// Ring address reserved for the monitor node.
pub const MONITOR_ADDRESS: u8 = 0;

pub const ACCESS_CONTROL_OFFSET: usize = 0;
pub const FRAME_CONTROL_OFFSET: usize = 1;
pub const DESTINATION_OFFSET: usize = 2;
pub const SOURCE_OFFSET: usize = 3;
pub const DATA_SIZE_OFFSET: usize = 4;

/// Access-control bit layout.
pub mod access {
    /// Priority bits 0-2 (carried, not acted upon).
    pub const PRIORITY_MASK: u8 = 0b0000_0111;
    /// Token flag.
    pub const TOKEN: u8 = 0b0000_1000;
    /// Set by the monitor on a frame's first pass.
    pub const MONITOR_SEEN: u8 = 0b0001_0000;
    /// Reservation bits 5-7 (carried, not acted upon).
    pub const RESERVATION_MASK: u8 = 0b1110_0000;

    /// Check if a specific bit is set.
    #[inline]
    pub fn has_flag(access_control: u8, flag: u8) -> bool {
        access_control & flag != 0
    }
}

/// Frame control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameControl {
    Token = 0,
    Data = 1,
}

impl FrameControl {
    /// Parse the raw byte, `None` if out of range.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Token),
            1 => Some(Self::Data),
            _ => None,
        }
    }
}

/// Trailing frame status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameStatus {
    /// Freshly built, not yet seen by its destination.
    New = 0,
    /// Destination accepted the payload (ACK).
    Accepted = 2,
    /// Destination declined the payload (NAK).
    Rejected = 3,
    /// Ring-wide termination.
    Kill = 4,
    /// Source has exhausted its data and every frame was acknowledged.
    Completion = 5,
}

impl FrameStatus {
    /// Parse the raw byte, `None` if out of range.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::New),
            2 => Some(Self::Accepted),
            3 => Some(Self::Rejected),
            4 => Some(Self::Kill),
            5 => Some(Self::Completion),
            _ => None,
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub access_control: u8,
    pub frame_control: u8,
    pub destination: u8,
    pub source: u8,
    /// Payload length in bytes.
    pub data_size: u8,
}

impl Header {
    /// Create a new header.
    pub fn new(
        access_control: u8,
        frame_control: FrameControl,
        destination: u8,
        source: u8,
        data_size: u8,
    ) -> Self {
        Self {
            access_control,
            frame_control: frame_control as u8,
            destination,
            source,
            data_size,
        }
    }

    /// Encode header to bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use ringwire::protocol::{FrameControl, Header};
    ///
    /// let header = Header::new(0, FrameControl::Data, 3, 1, 5);
    /// assert_eq!(header.encode(), [0, 1, 3, 1, 5]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (5 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[ACCESS_CONTROL_OFFSET] = self.access_control;
        buf[FRAME_CONTROL_OFFSET] = self.frame_control;
        buf[DESTINATION_OFFSET] = self.destination;
        buf[SOURCE_OFFSET] = self.source;
        buf[DATA_SIZE_OFFSET] = self.data_size;
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            access_control: buf[ACCESS_CONTROL_OFFSET],
            frame_control: buf[FRAME_CONTROL_OFFSET],
            destination: buf[DESTINATION_OFFSET],
            source: buf[SOURCE_OFFSET],
            data_size: buf[DATA_SIZE_OFFSET],
        })
    }

    /// Total length a frame with this header must have.
    #[inline]
    pub fn frame_len(&self) -> usize {
        self.data_size as usize + FRAME_OVERHEAD
    }

    /// Validate the header's enumerated fields.
    pub fn validate(&self) -> Result<()> {
        if FrameControl::from_byte(self.frame_control).is_none() {
            return Err(RingError::Protocol(format!(
                "Frame control {} out of range",
                self.frame_control
            )));
        }
        Ok(())
    }

    #[inline]
    pub fn is_token(&self) -> bool {
        self.frame_control == FrameControl::Token as u8
            || access::has_flag(self.access_control, access::TOKEN)
    }

    #[inline]
    pub fn is_monitor_seen(&self) -> bool {
        access::has_flag(self.access_control, access::MONITOR_SEEN)
    }

    #[inline]
    pub fn priority(&self) -> u8 {
        self.access_control & access::PRIORITY_MASK
    }

    #[inline]
    pub fn reservation(&self) -> u8 {
        (self.access_control & access::RESERVATION_MASK) >> 5
    }
}
