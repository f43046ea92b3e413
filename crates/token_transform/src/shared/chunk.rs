//! Chunks and ranks.

use std::fmt;

use super::error::ConfigurationError;
use super::token::Token;

/// Position of a token in the overall transform ordering.
///
/// Registered transform ranks live in `[0, 3)`. Phase one ends at 1, the
/// asynchronous phase at 2 and phase three at 3; a chunk stamped with a
/// phase's end rank is final for that phase.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "f64", into = "f64"))]
pub struct Rank(f64);

impl Rank {
    pub const ZERO: Rank = Rank(0.0);
    pub const PHASE1_END: Rank = Rank(1.0);
    pub const PHASE2_END: Rank = Rank(2.0);
    pub const PHASE3_END: Rank = Rank(3.0);

    /// Validated rank for a transform registration.
    pub fn new(value: f64) -> Result<Rank, ConfigurationError> {
        if (0.0..3.0).contains(&value) {
            Ok(Rank(value))
        } else {
            Err(ConfigurationError::InvalidRank { value })
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Rank {
    type Error = ConfigurationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        // Stamped chunk ranks may sit on the final phase boundary.
        if value == Rank::PHASE3_END.0 {
            return Ok(Rank::PHASE3_END);
        }
        Rank::new(value)
    }
}

impl From<Rank> for f64 {
    fn from(rank: Rank) -> f64 {
        rank.0
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered token sequence plus its rank watermark.
///
/// `rank == None` means unstamped. `async_mode` signals that more tokens for
/// this position may still arrive out of band; on deliveries between
/// accumulator nodes it is the "more to come" flag.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Chunk {
    pub tokens: Vec<Token>,
    pub rank: Option<Rank>,
    pub async_mode: bool,
}

impl Chunk {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            rank: None,
            async_mode: false,
        }
    }

    pub fn ranked(tokens: Vec<Token>, rank: Rank) -> Self {
        Self {
            tokens,
            rank: Some(rank),
            async_mode: false,
        }
    }

    /// Empty, final chunk: the "no more input" signal between nodes.
    pub fn end_signal() -> Self {
        Self::default()
    }

    pub fn with_rank(mut self, rank: Option<Rank>) -> Self {
        self.rank = rank;
        self
    }

    pub fn with_async(mut self, async_mode: bool) -> Self {
        self.async_mode = async_mode;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rank_bounds() {
        assert!(Rank::new(0.0).is_ok());
        assert!(Rank::new(2.99).is_ok());
        assert!(Rank::new(3.0).is_err());
        assert!(Rank::new(-0.5).is_err());
        assert!(Rank::new(f64::NAN).is_err());
        assert_eq!(Rank::try_from(3.0), Ok(Rank::PHASE3_END));
    }

    #[test]
    fn phase_ends_are_ordered() {
        assert!(Rank::ZERO < Rank::PHASE1_END);
        assert!(Rank::PHASE1_END < Rank::PHASE2_END);
        assert!(Rank::PHASE2_END < Rank::PHASE3_END);
    }
}
