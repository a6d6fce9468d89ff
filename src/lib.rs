//! # ringwire
//!
//! Token-passing ring (802.5-style) data-link protocol simulator.
//!
//! A monitor node (address 0) and relay nodes `1..=N` are wired into a
//! directed cycle of TCP connections. A single token grants the right to
//! transmit; the monitor recovers lost tokens, garbled frames and orphaned
//! traffic, and ends the run with a kill signal once every relay has sent all
//! of its data and seen it acknowledged.
//!
//! ## Architecture
//!
//! - **Protocol**: fixed wire format (`AC FC DST SRC SIZE payload STATUS`)
//!   and stream reassembly
//! - **Transport**: per-node inbound/outbound link with read timeouts and
//!   draining
//! - **Nodes**: relay Listen/Transmit engine and the supervising monitor
//! - **Ring**: assembly of the cycle and the run report
//!
//! ## Example
//!
//! ```ignore
//! use ringwire::{FaultConfig, MemorySink, RingBuilder};
//!
//! #[tokio::main]
//! async fn main() -> ringwire::Result<()> {
//!     let sink = MemorySink::new();
//!     let report = RingBuilder::new(3)
//!         .faults(FaultConfig::reliable())
//!         .memory_data([(1, vec!["3,5,hello"])], sink.clone())
//!         .run()
//!         .await?;
//!
//!     assert_eq!(report.total_delivered(), 1);
//!     Ok(())
//! }
//! ```

pub mod control;
pub mod error;
pub mod faults;
pub mod io;
pub mod node;
pub mod protocol;
pub mod ring;
pub mod transport;

pub use error::{Result, RingError};
pub use faults::{FaultConfig, FaultInjector};
pub use io::{Delivery, DeliverySink, FrameLog, LineSource, MemorySink, OutboundSource, VecSource};
pub use node::{MonitorNode, MonitorStats, NodeConfig, RelayNode, RelayStats};
pub use protocol::Frame;
pub use ring::{Ring, RingBuilder, RingConfig, RingReport, MAX_NODES, MIN_NODES};
