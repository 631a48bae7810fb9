//! Weighted vote aggregation and quorum/threshold verdicts.
//!
//! All arithmetic runs on 256-bit base units. Percentages are floor-divided integers, so
//! a verdict never flips because of rounding near a boundary.

use crate::amount::TokenAmount;
use crate::types::{GovernanceSettings, Vote};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

/// Aggregated figures for one proposal's vote list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tally {
    /// Number of votes reported, duplicates included
    pub vote_count: usize,
    /// Sum of all weight
    pub total_weight: TokenAmount,
    /// Weight in favour
    pub for_weight: TokenAmount,
    /// Weight against
    pub against_weight: TokenAmount,
    /// Cast weight over total supply, in basis points
    pub participation_bps: u64,
    /// For weight over cast weight, in basis points
    pub approval_bps: u64,
    /// Participation reached the quorum
    pub quorum_met: bool,
    /// Approval reached the voting threshold
    pub threshold_met: bool,
}

impl Tally {
    /// Quorum and threshold both met
    pub fn passed(&self) -> bool {
        self.quorum_met && self.threshold_met
    }
}

fn ratio(numerator: U256, denominator: U256, scale: u64) -> U256 {
    if denominator.is_zero() {
        return U256::ZERO;
    }
    numerator.saturating_mul(U256::from(scale)) / denominator
}

fn saturate_u64(value: U256) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

/// Reduce a vote list against an organization's supply and settings.
///
/// The same voter may appear more than once; every reported vote is counted.
pub fn tally(votes: &[Vote], total_supply: TokenAmount, settings: &GovernanceSettings) -> Tally {
    let total_weight: TokenAmount = votes.iter().map(|v| v.weight).sum();
    let for_weight: TokenAmount = votes.iter().filter(|v| v.support).map(|v| v.weight).sum();
    let against_weight = total_weight
        .checked_sub(for_weight)
        .unwrap_or(TokenAmount::ZERO);

    let total = total_weight.base_units();
    let supply = total_supply.base_units();

    let participation_percent = ratio(total, supply, 100);
    let approval_percent = ratio(for_weight.base_units(), total, 100);

    let has_votes = !votes.is_empty();
    let quorum_met =
        has_votes && participation_percent >= U256::from(settings.quorum_percent);
    let threshold_met =
        has_votes && approval_percent >= U256::from(settings.voting_threshold_percent);

    Tally {
        vote_count: votes.len(),
        total_weight,
        for_weight,
        against_weight,
        participation_bps: saturate_u64(ratio(total, supply, 10_000)),
        approval_bps: saturate_u64(ratio(for_weight.base_units(), total, 10_000)),
        quorum_met,
        threshold_met,
    }
}
