//! Proposal lifecycle derivation.
//!
//! State is a pure function of the supplied time, the proposal's voting window, the
//! executed flag and the tally verdicts. Nothing in here reads a clock.

use crate::tally::Tally;
use crate::types::{ProposalRecord, ProposalState, Timestamp};

/// Map chain facts to a lifecycle state.
///
/// Priority: executed, then before the window, inside the window (inclusive on both ends),
/// then the verdict once the window has closed.
pub fn derive_status(
    now: Timestamp,
    start_time: Timestamp,
    end_time: Timestamp,
    executed: bool,
    quorum_met: bool,
    threshold_met: bool,
) -> ProposalState {
    if executed {
        ProposalState::Executed
    } else if now < start_time {
        ProposalState::Pending
    } else if now <= end_time {
        ProposalState::Active
    } else if quorum_met && threshold_met {
        ProposalState::Succeeded
    } else {
        ProposalState::Defeated
    }
}

/// Resolve the state of a backend record, passing through an explicit cancellation.
pub fn resolve_state(now: Timestamp, record: &ProposalRecord, tally: &Tally) -> ProposalState {
    if record.cancelled && !record.executed {
        return ProposalState::Cancelled;
    }
    derive_status(
        now,
        record.start_time,
        record.end_time,
        record.executed,
        tally.quorum_met,
        tally.threshold_met,
    )
}

/// Earliest time a succeeded proposal may be executed
pub fn executable_at(end_time: Timestamp, execution_delay: u64) -> Timestamp {
    let delay = Timestamp::try_from(execution_delay).unwrap_or(Timestamp::MAX);
    end_time.saturating_add(delay)
}

/// Whether a proposal in `state` may be executed at `now`
pub fn is_executable(
    now: Timestamp,
    state: ProposalState,
    end_time: Timestamp,
    execution_delay: u64,
) -> bool {
    state == ProposalState::Succeeded && now >= executable_at(end_time, execution_delay)
}
