//! Fault injection and destination decisions.
//!
//! Every random choice a node makes goes through a [`FaultInjector`], which
//! owns a seedable generator. Tests pin probabilities to 0.0 or 1.0 (or fix
//! the seed) to get deterministic behavior.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{RingError, Result};
use crate::protocol::{Frame, HEADER_SIZE};

/// Default chance a destination rejects a new frame.
pub const DEFAULT_REJECT_PROBABILITY: f64 = 0.20;

/// Default chance an outbound frame loses a header byte.
pub const DEFAULT_CORRUPTION_PROBABILITY: f64 = 0.0;

/// Default chance a sender re-forwards an acknowledged frame.
pub const DEFAULT_ORPHAN_PROBABILITY: f64 = 0.02;

/// Default chance a relay fails to pass the token on.
pub const DEFAULT_TOKEN_LOSS_PROBABILITY: f64 = 0.05;

/// Fault probabilities, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaultConfig {
    pub reject_probability: f64,
    /// A garbled frame can throw the next relay's framing off and swallow
    /// the frames behind it, completion signals included. Completion is sent
    /// once, so a nonzero value can leave the run without a kill signal.
    pub corruption_probability: f64,
    pub orphan_probability: f64,
    pub token_loss_probability: f64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            reject_probability: DEFAULT_REJECT_PROBABILITY,
            corruption_probability: DEFAULT_CORRUPTION_PROBABILITY,
            orphan_probability: DEFAULT_ORPHAN_PROBABILITY,
            token_loss_probability: DEFAULT_TOKEN_LOSS_PROBABILITY,
        }
    }
}

impl FaultConfig {
    /// No faults at all: every frame is accepted and nothing is lost.
    pub fn reliable() -> Self {
        Self {
            reject_probability: 0.0,
            corruption_probability: 0.0,
            orphan_probability: 0.0,
            token_loss_probability: 0.0,
        }
    }

    pub fn with_reject_probability(mut self, p: f64) -> Self {
        self.reject_probability = p;
        self
    }

    pub fn with_corruption_probability(mut self, p: f64) -> Self {
        self.corruption_probability = p;
        self
    }

    pub fn with_orphan_probability(mut self, p: f64) -> Self {
        self.orphan_probability = p;
        self
    }

    pub fn with_token_loss_probability(mut self, p: f64) -> Self {
        self.token_loss_probability = p;
        self
    }

    /// Check every probability lies in `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("reject_probability", self.reject_probability),
            ("corruption_probability", self.corruption_probability),
            ("orphan_probability", self.orphan_probability),
            ("token_loss_probability", self.token_loss_probability),
        ];
        for (name, p) in fields {
            if !(0.0..=1.0).contains(&p) {
                return Err(RingError::Config(format!(
                    "{name} must be within [0, 1], got {p}"
                )));
            }
        }
        Ok(())
    }
}

/// What a destination does with a new frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    Rejected,
}

/// Seedable decision source for one node.
pub struct FaultInjector {
    config: FaultConfig,
    rng: StdRng,
}

impl FaultInjector {
    /// Injector with a fixed seed.
    pub fn seeded(config: FaultConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Injector seeded from OS entropy.
    pub fn from_entropy(config: FaultConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn config(&self) -> &FaultConfig {
        &self.config
    }

    fn chance(&mut self, p: f64) -> bool {
        if p.is_nan() || p <= 0.0 {
            return false;
        }
        self.rng.gen_bool(p.min(1.0))
    }

    /// Accept or reject a frame that reached its destination.
    pub fn decide_outcome(&mut self) -> Outcome {
        if self.chance(self.config.reject_probability) {
            Outcome::Rejected
        } else {
            Outcome::Accepted
        }
    }

    /// Possibly drop one random header byte from an outbound frame.
    pub fn corrupt(&mut self, frame: &Frame) -> Option<Frame> {
        if !self.chance(self.config.corruption_probability) {
            return None;
        }
        let index = self.rng.gen_range(0..HEADER_SIZE);
        Some(frame.with_omitted_byte(index))
    }

    /// Whether an acknowledged frame should be re-sent as an orphan.
    pub fn make_orphan(&mut self) -> bool {
        self.chance(self.config.orphan_probability)
    }

    /// Whether the token about to be passed on should vanish.
    pub fn lose_token(&mut self) -> bool {
        self.chance(self.config.token_loss_probability)
    }
}
