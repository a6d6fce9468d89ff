//! Protocol module - wire format, framing, and frame types.
//!
//! This module implements the binary token-ring frame format:
//! - 5-byte header encoding/decoding plus trailing status byte
//! - Frame buffer for reconstructing frames from a byte stream
//! - Frame struct with typed accessors and control-bit mutation

mod frame;
mod frame_buffer;
mod wire_format;

pub use frame::{build_frame, Frame};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    access, FrameControl, FrameStatus, Header, FRAME_OVERHEAD, HEADER_SIZE, MAX_PAYLOAD_SIZE,
    MONITOR_ADDRESS,
};
