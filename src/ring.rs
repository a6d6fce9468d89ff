//! Ring assembly.
//!
//! Builds the directed cycle `monitor -> 1 -> 2 -> ... -> N -> monitor` over
//! loopback TCP, then runs every node as its own task. Nodes hold only their
//! own link; the cycle exists only in the connections.
//!
//! # Example
//!
//! ```ignore
//! use ringwire::RingBuilder;
//!
//! let report = RingBuilder::new(3)
//!     .tht(150)
//!     .seed(7)
//!     .run()
//!     .await?;
//! println!("{} relays finished", report.relays.len());
//! ```

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RingError, Result};
use crate::faults::{FaultConfig, FaultInjector};
use crate::io::{DeliverySink, FrameLog, LineSource, MemorySink, OutboundSource, VecSource};
use crate::node::{Membership, MonitorNode, MonitorStats, NodeConfig, RelayNode, RelayStats};
use crate::protocol::MONITOR_ADDRESS;
use crate::transport::{RetryPolicy, RingSocket, TcpLink, DEFAULT_PORT_RANGE};

/// Smallest ring the launcher accepts.
pub const MIN_NODES: u8 = 2;

/// Largest ring: addresses 1..=254 plus the monitor.
pub const MAX_NODES: u8 = 254;

/// Default per-node share of the read timeout, in milliseconds.
pub const DEFAULT_TIMEOUT_MULTIPLIER_MS: u64 = 10;

/// Default pause between connection attempts, in milliseconds.
pub const DEFAULT_CONNECT_DELAY_MS: u64 = 1000;

/// Default number of connection attempts.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;

/// Default quiet period when draining after a garbled frame, in milliseconds.
pub const DEFAULT_DRAIN_WINDOW_MS: u64 = 2;

pub const DEFAULT_INPUT_PATTERN: &str = "input-file-";
pub const DEFAULT_OUTPUT_PATTERN: &str = "output-file-";

/// Whole-ring settings. Loadable from JSON; missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Relay count; relays get addresses `1..=node_count`.
    pub node_count: u8,
    /// Token-Holding-Time budget in payload bytes.
    pub tht: usize,
    /// Read timeout is `node_count * timeout_multiplier_ms`.
    pub timeout_multiplier_ms: u64,
    pub bind_ip: IpAddr,
    /// First port tried. 0 lets the OS choose.
    pub port_start: u16,
    pub port_end: u16,
    pub connect_attempts: u32,
    pub connect_delay_ms: u64,
    /// Quiet period that ends a drain.
    pub drain_window_ms: u64,
    pub faults: FaultConfig,
    /// Fixed seed for reproducible fault decisions.
    pub seed: Option<u64>,
    pub input_pattern: String,
    pub output_pattern: String,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            node_count: MIN_NODES,
            tht: crate::node::DEFAULT_THT,
            timeout_multiplier_ms: DEFAULT_TIMEOUT_MULTIPLIER_MS,
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port_start: DEFAULT_PORT_RANGE.start,
            port_end: DEFAULT_PORT_RANGE.end,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            connect_delay_ms: DEFAULT_CONNECT_DELAY_MS,
            drain_window_ms: DEFAULT_DRAIN_WINDOW_MS,
            faults: FaultConfig::default(),
            seed: None,
            input_pattern: DEFAULT_INPUT_PATTERN.to_string(),
            output_pattern: DEFAULT_OUTPUT_PATTERN.to_string(),
        }
    }
}

impl RingConfig {
    /// Load settings from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    /// Read timeout shared by every node.
    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.node_count) * self.timeout_multiplier_ms)
    }

    pub fn drain_window(&self) -> Duration {
        Duration::from_millis(self.drain_window_ms)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.connect_attempts,
            delay: Duration::from_millis(self.connect_delay_ms),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_NODES..=MAX_NODES).contains(&self.node_count) {
            return Err(RingError::Config(format!(
                "node count must be within {MIN_NODES}..={MAX_NODES}, got {}",
                self.node_count
            )));
        }
        if self.tht == 0 {
            return Err(RingError::Config("THT must be positive".to_string()));
        }
        if self.timeout_multiplier_ms == 0 {
            return Err(RingError::Config(
                "timeout multiplier must be positive".to_string(),
            ));
        }
        if self.port_start != 0 && self.port_start >= self.port_end {
            return Err(RingError::Config(format!(
                "empty port range {}..{}",
                self.port_start, self.port_end
            )));
        }
        self.faults.validate()
    }
}

/// Where relays get their data and record deliveries.
#[derive(Debug, Clone)]
pub enum DataPlan {
    /// `<input_pattern><N>` and `<output_pattern><N>` files.
    Files,
    /// Lines per address held in memory, every delivery into one sink.
    Memory {
        lines: BTreeMap<u8, Vec<String>>,
        sink: MemorySink,
    },
}

/// Builder for a ring run.
pub struct RingBuilder {
    config: RingConfig,
    data: DataPlan,
}

impl RingBuilder {
    /// Ring of `node_count` relays plus the monitor, default settings.
    pub fn new(node_count: u8) -> Self {
        Self::from_config(RingConfig {
            node_count,
            ..RingConfig::default()
        })
    }

    pub fn from_config(config: RingConfig) -> Self {
        Self {
            config,
            data: DataPlan::Files,
        }
    }

    pub fn tht(mut self, tht: usize) -> Self {
        self.config.tht = tht;
        self
    }

    pub fn timeout_multiplier_ms(mut self, ms: u64) -> Self {
        self.config.timeout_multiplier_ms = ms;
        self
    }

    pub fn bind_ip(mut self, ip: IpAddr) -> Self {
        self.config.bind_ip = ip;
        self
    }

    /// Ports to scan when binding. `0..0` uses OS-assigned ports.
    pub fn port_range(mut self, start: u16, end: u16) -> Self {
        self.config.port_start = start;
        self.config.port_end = end;
        self
    }

    pub fn connect_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.config.connect_attempts = attempts;
        self.config.connect_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn drain_window(mut self, window: Duration) -> Self {
        self.config.drain_window_ms = window.as_millis() as u64;
        self
    }

    pub fn faults(mut self, faults: FaultConfig) -> Self {
        self.config.faults = faults;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn input_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.input_pattern = pattern.into();
        self
    }

    pub fn output_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.config.output_pattern = pattern.into();
        self
    }

    /// Use in-memory data instead of files.
    pub fn memory_data<I, L>(mut self, lines: I, sink: MemorySink) -> Self
    where
        I: IntoIterator<Item = (u8, L)>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        let lines: BTreeMap<u8, Vec<String>> = lines
            .into_iter()
            .map(|(address, l)| (address, l.into_iter().map(Into::into).collect::<Vec<String>>()))
            .collect();
        self.data = DataPlan::Memory { lines, sink };
        self
    }

    pub fn config(&self) -> &RingConfig {
        &self.config
    }

    /// Bind, connect and accept every link.
    pub async fn build(self) -> Result<Ring> {
        let config = self.config;
        config.validate()?;

        let ports = config.port_start..config.port_end;
        let retry = config.retry_policy();
        let count = usize::from(config.node_count) + 1;

        // Position 0 is the monitor, position i is relay i
        let mut sockets = Vec::with_capacity(count);
        for _ in 0..count {
            let mut socket = RingSocket::bind(config.bind_ip, ports.clone()).await?;
            socket.set_drain_window(config.drain_window());
            sockets.push(socket);
        }
        let addresses: Vec<SocketAddr> = sockets.iter().map(RingSocket::local_addr).collect();
        tracing::debug!(?addresses, "Ring endpoints bound");

        for (position, socket) in sockets.iter_mut().enumerate() {
            let successor = addresses[(position + 1) % count];
            socket.connect(successor, &retry).await?;
        }

        let mut links: Vec<TcpLink> = Vec::with_capacity(count);
        for socket in sockets {
            links.push(socket.accept().await?);
        }

        let timeout = config.node_timeout();
        let mut links = links.into_iter();
        let monitor_link = links
            .next()
            .ok_or_else(|| RingError::Config("ring has no monitor link".to_string()))?;
        let monitor = MonitorNode::new(
            NodeConfig::monitor().with_timeout(timeout),
            monitor_link,
            Membership::new(config.node_count),
        );

        let mut relays = Vec::with_capacity(count - 1);
        for (link, address) in links.zip(1..=config.node_count) {
            let node_config = NodeConfig::new(address)
                .with_tht(config.tht)
                .with_timeout(timeout);
            node_config.validate_relay()?;
            let (source, sink) = collaborators(&config, &self.data, address)?;
            let faults = match config.seed {
                Some(seed) => {
                    FaultInjector::seeded(config.faults, seed.wrapping_add(u64::from(address)))
                }
                None => FaultInjector::from_entropy(config.faults),
            };
            relays.push(RelayNode::new(node_config, link, source, sink, faults));
        }

        tracing::info!(
            nodes = config.node_count,
            tht = config.tht,
            timeout_ms = timeout.as_millis() as u64,
            "Ring assembled"
        );

        Ok(Ring {
            node_count: config.node_count,
            addresses,
            monitor,
            relays,
        })
    }

    /// Build and run to completion.
    pub async fn run(self) -> Result<RingReport> {
        self.build().await?.run().await
    }
}

fn collaborators(
    config: &RingConfig,
    data: &DataPlan,
    address: u8,
) -> Result<(Box<dyn OutboundSource>, Box<dyn DeliverySink>)> {
    match data {
        DataPlan::Files => Ok((
            Box::new(LineSource::open(&config.input_pattern, address)?),
            Box::new(FrameLog::create(&config.output_pattern, address)?),
        )),
        DataPlan::Memory { lines, sink } => {
            let lines = lines.get(&address).cloned().unwrap_or_default();
            Ok((Box::new(VecSource::new(lines)), Box::new(sink.clone())))
        }
    }
}

/// An assembled ring, every link connected, nothing running yet.
pub struct Ring {
    node_count: u8,
    addresses: Vec<SocketAddr>,
    monitor: MonitorNode<TcpLink>,
    relays: Vec<RelayNode<TcpLink>>,
}

impl Ring {
    /// Listening address of each position, monitor first.
    pub fn addresses(&self) -> &[SocketAddr] {
        &self.addresses
    }

    pub fn node_count(&self) -> u8 {
        self.node_count
    }

    /// Run every node as its own task until the kill signal has gone round.
    pub async fn run(self) -> Result<RingReport> {
        let monitor = tokio::spawn(self.monitor.run());
        let relays: Vec<_> = self
            .relays
            .into_iter()
            .map(|relay| (relay.address(), tokio::spawn(relay.run())))
            .collect();

        let mut failure = None;

        let monitor = match join(MONITOR_ADDRESS, monitor).await {
            Ok(stats) => stats,
            Err(e) => {
                failure.get_or_insert(e);
                MonitorStats::default()
            }
        };

        let mut relay_stats = Vec::with_capacity(relays.len());
        for (address, handle) in relays {
            match join(address, handle).await {
                Ok(stats) => relay_stats.push(stats),
                Err(e) => {
                    failure.get_or_insert(e);
                    relay_stats.push(RelayStats {
                        address,
                        ..RelayStats::default()
                    });
                }
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }

        tracing::info!(nodes = self.node_count, "Ring shut down");
        Ok(RingReport {
            node_count: self.node_count,
            monitor,
            relays: relay_stats,
        })
    }
}

async fn join<S>(address: u8, handle: tokio::task::JoinHandle<Result<S>>) -> Result<S> {
    let reason = match handle.await {
        Ok(Ok(stats)) => return Ok(stats),
        Ok(Err(e)) => e.to_string(),
        Err(e) => e.to_string(),
    };
    tracing::error!(node = address, "Node failed: {}", reason);
    Err(RingError::NodeFailed { address, reason })
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RingReport {
    pub node_count: u8,
    pub monitor: MonitorStats,
    pub relays: Vec<RelayStats>,
}

impl RingReport {
    /// Frames accepted across all relays.
    pub fn total_delivered(&self) -> u64 {
        self.relays.iter().map(|r| r.delivered).sum()
    }
}
