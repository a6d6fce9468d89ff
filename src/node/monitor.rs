//! Monitor node engine (address 0).
//!
//! The monitor holds no data. It repairs the ring: it reissues the token when
//! nothing arrives in time, resynchronizes after garbled frames, removes
//! orphans, and ends the run with a kill signal once every relay reports
//! completion.

use std::collections::BTreeMap;

use serde::Serialize;

use super::NodeConfig;
use crate::error::Result;
use crate::protocol::{access, Frame};
use crate::transport::{FrameTransport, ReadOutcome};

/// Completion state of every relay address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Membership {
    members: BTreeMap<u8, bool>,
}

impl Membership {
    /// Relays `1..=relay_count`, none complete.
    pub fn new(relay_count: u8) -> Self {
        Self::from_addresses(1..=relay_count)
    }

    pub fn from_addresses(addresses: impl IntoIterator<Item = u8>) -> Self {
        Self {
            members: addresses.into_iter().map(|a| (a, false)).collect(),
        }
    }

    /// Mark `address` complete. Returns false for an unknown address.
    pub fn mark_complete(&mut self, address: u8) -> bool {
        match self.members.get_mut(&address) {
            Some(done) => {
                *done = true;
                true
            }
            None => false,
        }
    }

    pub fn is_complete(&self, address: u8) -> bool {
        self.members.get(&address).copied().unwrap_or(false)
    }

    pub fn are_all_complete(&self) -> bool {
        self.members.values().all(|done| *done)
    }

    /// Addresses that have not signaled completion yet.
    pub fn pending(&self) -> Vec<u8> {
        self.members
            .iter()
            .filter(|(_, done)| !**done)
            .map(|(address, _)| *address)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// What one monitor step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorEvent {
    /// Read timed out, a fresh token was sent.
    TokenReissued,
    /// Timed out while waiting for the kill signal to come back.
    AwaitingKill,
    /// Garbled frame: inbound drained, fresh token sent.
    GarbledRecovered { drained: usize },
    /// Already-seen frame removed from the ring.
    OrphanDiscarded,
    /// First pass of a data frame: flag set, forwarded.
    MarkedSeen,
    /// Completion recorded, ring not finished yet.
    CompletionRecorded { source: u8 },
    /// Last completion recorded, kill signal sent.
    KillIssued,
    /// Frame absorbed because the kill signal is already out.
    Absorbed,
    /// Token passed on.
    TokenForwarded,
    /// Anything else passed on unchanged.
    Forwarded,
    /// Kill signal came back, monitor closed.
    Terminated,
}

/// Counters reported when the monitor shuts down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    pub timeouts: u64,
    pub tokens_issued: u64,
    pub tokens_forwarded: u64,
    pub garbled_recovered: u64,
    pub bytes_drained: u64,
    pub orphans_discarded: u64,
    pub frames_marked: u64,
    pub frames_forwarded: u64,
    pub completions: u64,
    pub kill_issued: bool,
    pub inconsistent_shutdown: bool,
}

/// Supervising engine of the ring.
pub struct MonitorNode<T> {
    config: NodeConfig,
    transport: T,
    membership: Membership,
    kill_sent: bool,
    stats: MonitorStats,
}

impl<T: FrameTransport> MonitorNode<T> {
    pub fn new(config: NodeConfig, transport: T, membership: Membership) -> Self {
        Self {
            config,
            transport,
            membership,
            kill_sent: false,
            stats: MonitorStats::default(),
        }
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn stats(&self) -> &MonitorStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Run until the kill signal completes its loop.
    pub async fn run(mut self) -> Result<MonitorStats> {
        while self.step().await? != MonitorEvent::Terminated {}
        Ok(self.stats)
    }

    /// Read and handle one inbound frame (or timeout).
    pub async fn step(&mut self) -> Result<MonitorEvent> {
        let mut frame = match self.transport.read_frame(self.config.timeout).await? {
            ReadOutcome::Frame(frame) => frame,
            ReadOutcome::Timeout => {
                self.stats.timeouts += 1;
                if self.kill_sent {
                    tracing::debug!("Waiting for kill signal to return");
                    return Ok(MonitorEvent::AwaitingKill);
                }
                tracing::warn!("No frame within timeout, reissuing token");
                self.issue_token().await?;
                return Ok(MonitorEvent::TokenReissued);
            }
        };

        if !frame.is_healthy() {
            let drained = self.transport.drain().await?;
            self.stats.garbled_recovered += 1;
            self.stats.bytes_drained += drained as u64;
            tracing::warn!(len = frame.len(), drained, "Garbled frame, resynchronizing");
            if self.kill_sent {
                return Ok(MonitorEvent::Absorbed);
            }
            self.issue_token().await?;
            return Ok(MonitorEvent::GarbledRecovered { drained });
        }

        if frame.is_kill() {
            if !self.membership.are_all_complete() {
                self.stats.inconsistent_shutdown = true;
                tracing::error!(
                    pending = ?self.membership.pending(),
                    "Kill signal arrived before every node completed"
                );
            }
            self.transport.close().await?;
            tracing::info!("Kill signal returned, monitor closed");
            return Ok(MonitorEvent::Terminated);
        }

        // Once the kill is out nothing else goes downstream
        if self.kill_sent {
            tracing::debug!(%frame, "Absorbing frame after kill");
            return Ok(MonitorEvent::Absorbed);
        }

        if !frame.is_token() {
            if frame.is_orphan() {
                self.stats.orphans_discarded += 1;
                tracing::warn!(%frame, "Discarding orphan frame");
                return Ok(MonitorEvent::OrphanDiscarded);
            }
            frame.mark_seen();
            self.stats.frames_marked += 1;
            tracing::debug!(%frame, "Marked frame");
            self.transport.write_frame(&frame).await?;
            return Ok(MonitorEvent::MarkedSeen);
        }

        if frame.is_completion() {
            return self.record_completion(frame.source()).await;
        }

        if access::has_flag(frame.access_control(), access::TOKEN) {
            self.stats.tokens_forwarded += 1;
            self.transport.write_frame(&frame).await?;
            return Ok(MonitorEvent::TokenForwarded);
        }

        self.stats.frames_forwarded += 1;
        self.transport.write_frame(&frame).await?;
        Ok(MonitorEvent::Forwarded)
    }

    async fn record_completion(&mut self, source: u8) -> Result<MonitorEvent> {
        self.stats.completions += 1;
        if self.membership.mark_complete(source) {
            tracing::info!(node = source, "Node completed");
        } else {
            tracing::warn!(node = source, "Completion from unknown address");
        }

        if !self.membership.are_all_complete() {
            return Ok(MonitorEvent::CompletionRecorded { source });
        }

        tracing::info!("All nodes completed, issuing kill signal");
        self.transport.write_frame(&Frame::kill()).await?;
        self.kill_sent = true;
        self.stats.kill_issued = true;
        Ok(MonitorEvent::KillIssued)
    }

    async fn issue_token(&mut self) -> Result<()> {
        self.stats.tokens_issued += 1;
        self.transport.write_frame(&Frame::token()).await
    }
}
