//! Anti-automation challenge solver.
//!
//! After `Init`, the server sends two seeds and expects a 16-bit answer
//! computed by a deliberately awkward modular-exponentiation-style loop.
//! A wrong or late answer gets the connection dropped, so both functions
//! below are kept bit-exact with the server, formulas and constants
//! included. The server changed the puzzle once; which one to answer is an
//! explicit [`ChallengeVariant`] chosen alongside the protocol version.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

const CURRENT_ROUNDS: u64 = 11;
const LEGACY_ROUNDS: u64 = 51;

const BASE_ITERATIONS: u64 = 65536;
const ITERATION_MASK: u64 = 16383;

const LOW_MIN: u64 = 16384;
const LOW_MAX: u64 = 65536;
const HIGH_MIN: u64 = 1 << 18;
const HIGH_MAX: u64 = 1 << 20;

/// Which puzzle the server expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ChallengeVariant {
    /// The older 51-round puzzle.
    Legacy,
    /// The 11-round puzzle with the `+ 7` iteration offset.
    #[default]
    Current,
}

impl ChallengeVariant {
    /// Solves the challenge for the given seeds with this variant.
    pub fn solve(self, low: u32, high: u32) -> Result<u16, ProtocolError> {
        match self {
            Self::Legacy => solve_legacy(low, high),
            Self::Current => solve_current(low, high),
        }
    }
}

/// `min + (base * multiplier + 137) mod (max - min)`
fn clamp(base: u64, multiplier: u64, min: u64, max: u64) -> u64 {
    min + (base * multiplier + 137) % (max - min)
}

fn check_seeds(low: u32, high: u32) -> Result<(), ProtocolError> {
    if high == 0 {
        return Err(ProtocolError::InvalidChallenge(low, high));
    }
    Ok(())
}

/// Current puzzle: 11 rounds, iteration count offset by 7.
pub fn solve_current(low: u32, high: u32) -> Result<u16, ProtocolError> {
    check_seeds(low, high)?;
    let (mut low, mut high) = (u64::from(low), u64::from(high));
    let mut result: u64 = 1;
    for round in 0..CURRENT_ROUNDS {
        let iterations = BASE_ITERATIONS + ((result * round + 7) & ITERATION_MASK);
        for _ in 0..iterations {
            result = 1 + (result * low) % high;
        }
        low = clamp(low, result, LOW_MIN, LOW_MAX);
        high = clamp(high, result, HIGH_MIN, HIGH_MAX);
    }
    Ok(((result - 1) & 0xFFFF) as u16)
}

/// Legacy puzzle: 51 rounds, no iteration offset.
pub fn solve_legacy(low: u32, high: u32) -> Result<u16, ProtocolError> {
    check_seeds(low, high)?;
    let (mut low, mut high) = (u64::from(low), u64::from(high));
    let mut result: u64 = 1;
    for round in 0..LEGACY_ROUNDS {
        let iterations = BASE_ITERATIONS + ((result * round) & ITERATION_MASK);
        for _ in 0..iterations {
            result = 1 + (result * low) % high;
        }
        low = clamp(low, result, LOW_MIN, LOW_MAX);
        high = clamp(high, result, HIGH_MIN, HIGH_MAX);
    }
    Ok(((result - 1) & 0xFFFF) as u16)
}
