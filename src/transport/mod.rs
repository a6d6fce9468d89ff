//! Transport module - moving frames between adjacent ring positions.
//!
//! Provides:
//! - [`FrameTransport`]: the seam the node engines are written against
//! - [`FrameLink`]: frame reconstruction over any tokio byte stream pair
//! - [`RingSocket`]: TCP listener/connector used by ring assembly

mod link;
mod tcp;

use std::time::Duration;

use crate::error::Result;
use crate::protocol::Frame;

pub use link::{FrameLink, DEFAULT_DRAIN_WINDOW};
pub use tcp::{RetryPolicy, RingSocket, TcpLink, DEFAULT_PORT_RANGE};

/// Result of waiting for the next inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    /// A frame arrived (possibly garbled).
    Frame(Frame),
    /// Nothing arrived before the deadline.
    Timeout,
}

/// Duplex frame channel of one node: inbound from the predecessor, outbound to
/// the successor.
#[async_trait::async_trait]
pub trait FrameTransport: Send {
    /// Wait up to `timeout` for the next frame from the predecessor.
    async fn read_frame(&mut self, timeout: Duration) -> Result<ReadOutcome>;

    /// Write one frame to the successor.
    async fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Discard inbound bytes until none are ready. Returns the discarded count.
    async fn drain(&mut self) -> Result<usize>;

    /// Half-close the outbound side and release both endpoints. Idempotent.
    async fn close(&mut self) -> Result<()>;
}
