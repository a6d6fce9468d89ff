//! Relay node engine.
//!
//! A relay alternates between two states:
//!
//! ```text
//!            token                      budget spent / data exhausted
//! Listen ─────────────► Transmit ─────────────────────────────► Listen
//!   │ kill
//!   ▼
//! closed
//! ```
//!
//! In Listen it forwards traffic, accepts or rejects frames addressed to it
//! and collects its own frames as they come back around. In Transmit it sends
//! retransmissions first, then new lines from its data source, until the
//! Token-Holding-Time budget is used up or the data runs out.

use std::collections::VecDeque;

use serde::Serialize;

use super::{NodeConfig, SEED_ADDRESS};
use crate::error::Result;
use crate::faults::{FaultInjector, Outcome};
use crate::io::{Delivery, DeliverySink, OutboundSource};
use crate::protocol::{Frame, FrameStatus};
use crate::transport::{FrameTransport, ReadOutcome};

/// Why Listen returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenExit {
    /// Token captured, go transmit.
    Token,
    /// Kill signal forwarded, shut down.
    Kill,
}

/// Why Transmit returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitExit {
    /// THT budget used up, more data may remain.
    BudgetSpent,
    /// Data source has no more lines.
    Exhausted,
}

/// Counters reported when a relay shuts down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RelayStats {
    pub address: u8,
    pub frames_sent: u64,
    pub retransmissions: u64,
    pub corrupted_sends: u64,
    pub acknowledged: u64,
    pub rejected_by_peer: u64,
    pub delivered: u64,
    pub rejected: u64,
    pub orphans_created: u64,
    pub garbled_forwarded: u64,
    pub malformed_lines: u64,
    pub timeouts: u64,
    pub tokens_passed: u64,
    pub tokens_lost: u64,
    pub completion_signaled: bool,
}

/// Relay engine for one ring address.
pub struct RelayNode<T> {
    config: NodeConfig,
    transport: T,
    source: Box<dyn OutboundSource>,
    sink: Box<dyn DeliverySink>,
    faults: FaultInjector,
    /// Frames to resend, head first.
    retransmit: VecDeque<Frame>,
    /// Frames sent but not yet seen coming back.
    awaiting_ack: Vec<Frame>,
    completion_sent: bool,
    stats: RelayStats,
}

impl<T: FrameTransport> RelayNode<T> {
    pub fn new(
        config: NodeConfig,
        transport: T,
        source: Box<dyn OutboundSource>,
        sink: Box<dyn DeliverySink>,
        faults: FaultInjector,
    ) -> Self {
        Self {
            config,
            transport,
            source,
            sink,
            faults,
            retransmit: VecDeque::new(),
            awaiting_ack: Vec::new(),
            completion_sent: false,
            stats: RelayStats {
                address: config.address,
                ..RelayStats::default()
            },
        }
    }

    pub fn address(&self) -> u8 {
        self.config.address
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Frames queued for retransmission, head first.
    pub fn retransmit_queue(&self) -> &VecDeque<Frame> {
        &self.retransmit
    }

    /// Frames sent and not yet returned.
    pub fn awaiting_ack(&self) -> &[Frame] {
        &self.awaiting_ack
    }

    pub fn completion_sent(&self) -> bool {
        self.completion_sent
    }

    /// Run until a kill signal passes through, then close the transport.
    pub async fn run(mut self) -> Result<RelayStats> {
        let node = self.config.address;

        if node == SEED_ADDRESS {
            tracing::info!(node, "Seeding token");
            self.transport.write_frame(&Frame::token()).await?;
            self.stats.tokens_passed += 1;
        }

        loop {
            match self.listen().await? {
                ListenExit::Kill => {
                    self.transport.close().await?;
                    tracing::info!(node, "Kill signal forwarded, node closed");
                    return Ok(self.stats);
                }
                ListenExit::Token => {
                    self.requeue_unacknowledged();
                    self.transmit().await?;
                }
            }
        }
    }

    /// Listen state: process inbound frames until a token or kill arrives.
    pub async fn listen(&mut self) -> Result<ListenExit> {
        loop {
            let frame = match self.transport.read_frame(self.config.timeout).await? {
                ReadOutcome::Timeout => {
                    self.stats.timeouts += 1;
                    tracing::debug!(node = self.config.address, "Listen timed out");
                    continue;
                }
                ReadOutcome::Frame(frame) => frame,
            };

            if let Some(exit) = self.handle_frame(frame).await? {
                return Ok(exit);
            }
        }
    }

    /// Apply the Listen rules to one inbound frame.
    async fn handle_frame(&mut self, frame: Frame) -> Result<Option<ListenExit>> {
        let node = self.config.address;

        // Repairing garbled frames is the monitor's job
        if !frame.is_healthy() {
            self.stats.garbled_forwarded += 1;
            tracing::debug!(node, len = frame.len(), "Forwarding garbled frame");
            self.transport.write_frame(&frame).await?;
            return Ok(None);
        }

        if frame.is_kill() {
            self.transport.write_frame(&frame).await?;
            return Ok(Some(ListenExit::Kill));
        }

        if frame.is_completion() {
            if frame.source() == node {
                tracing::warn!(node, "Own completion signal came back, dropping it");
            } else {
                self.transport.write_frame(&frame).await?;
            }
            return Ok(None);
        }

        if frame.is_token() {
            return Ok(Some(ListenExit::Token));
        }

        if frame.destination() == node && frame.frame_status() == Some(FrameStatus::New) {
            let answered = self.receive(frame)?;
            if answered.source() == node {
                // Addressed to ourselves: the loop is already complete
                self.collect_returned(answered).await?;
            } else {
                // Send it on so the sender learns the outcome
                self.transport.write_frame(&answered).await?;
            }
            return Ok(None);
        }

        if frame.source() == node {
            self.collect_returned(frame).await?;
            return Ok(None);
        }

        tracing::trace!(node, %frame, "Forwarding");
        self.transport.write_frame(&frame).await?;
        Ok(None)
    }

    /// Decide on a new frame addressed to this node and return it with its
    /// status set.
    fn receive(&mut self, mut frame: Frame) -> Result<Frame> {
        let node = self.config.address;

        match self.faults.decide_outcome() {
            Outcome::Rejected => {
                frame.set_status(FrameStatus::Rejected);
                self.stats.rejected += 1;
                tracing::debug!(node, %frame, "Rejected frame");
            }
            Outcome::Accepted => {
                frame.set_status(FrameStatus::Accepted);
                self.sink.record_accepted(&Delivery {
                    source: frame.source(),
                    destination: frame.destination(),
                    size: frame.data_size(),
                    payload: frame.payload().to_vec(),
                })?;
                self.stats.delivered += 1;
                tracing::debug!(node, %frame, "Accepted frame");
            }
        }

        Ok(frame)
    }

    /// One of our own frames completed a loop.
    async fn collect_returned(&mut self, mut frame: Frame) -> Result<()> {
        let node = self.config.address;

        if let Some(pos) = self.awaiting_ack.iter().position(|f| f.same_message(&frame)) {
            self.awaiting_ack.remove(pos);
        }

        match frame.frame_status() {
            Some(FrameStatus::Rejected) => {
                self.stats.rejected_by_peer += 1;
                frame.set_status(FrameStatus::New);
                frame.clear_seen();
                tracing::debug!(node, %frame, "Frame rejected, queued for retransmission");
                self.retransmit.push_front(frame);
            }
            Some(FrameStatus::Accepted) => {
                self.stats.acknowledged += 1;
                if self.faults.make_orphan() {
                    self.stats.orphans_created += 1;
                    tracing::warn!(node, %frame, "Simulating orphan frame");
                    self.transport.write_frame(&frame).await?;
                }
            }
            _ => {
                // Nobody claimed it; the monitor will discard it next pass
                self.transport.write_frame(&frame).await?;
            }
        }
        Ok(())
    }

    /// Move every frame still awaiting acknowledgment into the retransmission
    /// queue.
    pub fn requeue_unacknowledged(&mut self) {
        if self.awaiting_ack.is_empty() {
            return;
        }
        tracing::debug!(
            node = self.config.address,
            count = self.awaiting_ack.len(),
            "Requeueing unacknowledged frames"
        );
        self.retransmit.extend(self.awaiting_ack.drain(..));
    }

    /// Transmit state: send until the THT budget is spent or data runs out.
    pub async fn transmit(&mut self) -> Result<TransmitExit> {
        let node = self.config.address;
        let mut budget_used = 0usize;

        while budget_used < self.config.tht {
            if let Some(frame) = self.retransmit.pop_front() {
                budget_used += frame.data_size() as usize;
                self.stats.retransmissions += 1;
                self.send_data(frame).await?;
                continue;
            }

            let Some(line) = self.source.next_line()? else {
                if !self.completion_sent && self.awaiting_ack.is_empty() {
                    tracing::info!(node, "Data exhausted, signaling completion");
                    self.transport
                        .write_frame(&Frame::completion(node))
                        .await?;
                    self.completion_sent = true;
                    self.stats.completion_signaled = true;
                }
                self.pass_token().await?;
                return Ok(TransmitExit::Exhausted);
            };

            let frame = match Frame::from_line(&line, node) {
                Ok(frame) => frame,
                Err(e) => {
                    self.stats.malformed_lines += 1;
                    tracing::warn!(node, "Skipping input line: {}", e);
                    continue;
                }
            };

            budget_used += frame.data_size() as usize;
            self.stats.frames_sent += 1;
            self.send_data(frame).await?;
        }

        self.pass_token().await?;
        Ok(TransmitExit::BudgetSpent)
    }

    async fn send_data(&mut self, frame: Frame) -> Result<()> {
        match self.faults.corrupt(&frame) {
            Some(corrupted) => {
                self.stats.corrupted_sends += 1;
                tracing::warn!(node = self.config.address, %frame, "Simulating garbled frame");
                self.transport.write_frame(&corrupted).await?;
            }
            None => self.transport.write_frame(&frame).await?,
        }
        self.awaiting_ack.push(frame);
        Ok(())
    }

    async fn pass_token(&mut self) -> Result<()> {
        if self.faults.lose_token() {
            self.stats.tokens_lost += 1;
            tracing::warn!(node = self.config.address, "Simulating token loss");
            return Ok(());
        }
        self.stats.tokens_passed += 1;
        self.transport.write_frame(&Frame::token()).await
    }
}
