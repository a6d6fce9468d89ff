//! TCP endpoints for ring positions.
//!
//! Every node owns one listener that accepts exactly one predecessor and one
//! outbound connection to its successor's listener.
//!
//! # Example
//!
//! ```ignore
//! use ringwire::transport::{RetryPolicy, RingSocket};
//!
//! let mut socket = RingSocket::bind("127.0.0.1".parse()?, 1025..49151).await?;
//! socket.connect(successor_addr, &RetryPolicy::default()).await?;
//! let link = socket.accept().await?;
//! ```

use std::net::{IpAddr, SocketAddr};
use std::ops::Range;
use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use super::link::{FrameLink, DEFAULT_DRAIN_WINDOW};
use crate::error::{RingError, Result};

/// Non-privileged, non-dynamic ports.
pub const DEFAULT_PORT_RANGE: Range<u16> = 1025..49151;

/// Frame link over a TCP connection pair.
pub type TcpLink = FrameLink<OwnedReadHalf, OwnedWriteHalf>;

/// Connection retry settings for reaching a successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total connection attempts before giving up.
    pub attempts: u32,
    /// Pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_secs(1),
        }
    }
}

/// A bound ring endpoint, before its predecessor has connected.
pub struct RingSocket {
    listener: TcpListener,
    local_addr: SocketAddr,
    outbound: Option<OwnedWriteHalf>,
    drain_window: Duration,
}

impl RingSocket {
    /// Bind the first free port in `ports`.
    ///
    /// A range starting at 0 lets the OS pick an ephemeral port.
    pub async fn bind(ip: IpAddr, ports: Range<u16>) -> Result<Self> {
        if ports.start == 0 {
            return Self::from_listener(TcpListener::bind((ip, 0)).await?);
        }

        for port in ports.clone() {
            match TcpListener::bind((ip, port)).await {
                Ok(listener) => return Self::from_listener(listener),
                Err(e) => {
                    tracing::trace!(port, "Port unavailable: {}", e);
                }
            }
        }

        Err(RingError::NoFreePort {
            start: ports.start,
            end: ports.end,
        })
    }

    fn from_listener(listener: TcpListener) -> Result<Self> {
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            outbound: None,
            drain_window: DEFAULT_DRAIN_WINDOW,
        })
    }

    /// Address the predecessor must connect to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Set the quiet period the resulting link uses when draining.
    pub fn set_drain_window(&mut self, window: Duration) {
        self.drain_window = window;
    }

    /// Check whether the outbound connection is established.
    pub fn is_connected(&self) -> bool {
        self.outbound.is_some()
    }

    /// Connect to the successor's listener, retrying per `retry`.
    pub async fn connect(&mut self, successor: SocketAddr, retry: &RetryPolicy) -> Result<()> {
        let attempts = retry.attempts.max(1);

        for attempt in 1..=attempts {
            match TcpStream::connect(successor).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    let (_read, write) = stream.into_split();
                    self.outbound = Some(write);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        %successor,
                        attempt,
                        "Could not connect to successor: {}",
                        e
                    );
                    if attempt < attempts {
                        tokio::time::sleep(retry.delay).await;
                    }
                }
            }
        }

        Err(RingError::ConnectionFailed {
            addr: successor,
            attempts,
        })
    }

    /// Accept the single predecessor connection and produce the node's link.
    ///
    /// The listener is closed afterwards; no further peers are accepted.
    pub async fn accept(self) -> Result<TcpLink> {
        let outbound = self.outbound.ok_or_else(|| {
            RingError::Protocol("accept called before connecting to successor".to_string())
        })?;

        let (stream, peer) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        tracing::debug!(%peer, local = %self.local_addr, "Accepted predecessor");

        let (inbound, _write) = stream.into_split();
        Ok(FrameLink::new(inbound, outbound).with_drain_window(self.drain_window))
    }
}
