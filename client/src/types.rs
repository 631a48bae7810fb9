//! Common types used across the governance client.
//!
//! This module defines the organization, proposal, vote, member and treasury records the
//! catalog assembles, plus the raw records the chain backend reports.

use crate::amount::TokenAmount;
use crate::backend::wire;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Organization identifier (index in the factory registry)
pub type OrganizationId = u64;

/// Proposal identifier (1-based index within an organization)
pub type ProposalId = u64;

/// Account or contract address
pub type Address = String;

/// Unix timestamp in seconds
pub type Timestamp = i64;

/// Organization status. Only changed by explicit governance action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrganizationStatus {
    /// Operating normally
    Active,
    /// Temporarily halted
    Paused,
    /// Wound down
    Dissolved,
    /// Registered but not yet live
    Pending,
}

impl fmt::Display for OrganizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrganizationStatus::Active => write!(f, "ACTIVE"),
            OrganizationStatus::Paused => write!(f, "PAUSED"),
            OrganizationStatus::Dissolved => write!(f, "DISSOLVED"),
            OrganizationStatus::Pending => write!(f, "PENDING"),
        }
    }
}

/// Category an organization lists itself under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    /// Decentralized finance
    Defi,
    /// NFT collectives
    Nft,
    /// Gaming guilds
    Gaming,
    /// Social communities
    Social,
    /// Protocol governance
    Governance,
    /// Investment clubs
    Investment,
    /// Education
    Education,
    /// Anything else
    #[default]
    Other,
}

/// Off-chain descriptive metadata supplied at registration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationMetadata {
    /// Long-form description
    pub description: String,
    /// Listing category
    pub category: Category,
    /// Free-form tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Logo URL
    pub logo: Option<String>,
    /// Website URL
    pub website: Option<String>,
    /// Twitter handle or URL
    pub twitter: Option<String>,
    /// Discord invite
    pub discord: Option<String>,
    /// GitHub organization
    pub github: Option<String>,
}

/// Governance rules an organization was created with. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GovernanceSettings {
    /// Shortest allowed voting period (seconds)
    pub min_voting_period: u64,
    /// Longest allowed voting period (seconds)
    pub max_voting_period: u64,
    /// Share of total supply that must vote, in percent
    pub quorum_percent: u8,
    /// Share of cast weight that must support, in percent
    pub voting_threshold_percent: u8,
    /// Balance a proposer must hold
    pub min_proposal_tokens: TokenAmount,
    /// Wait between success and executability (seconds)
    pub execution_delay: u64,
}

impl Default for GovernanceSettings {
    fn default() -> Self {
        Self {
            min_voting_period: 86_400,
            max_voting_period: 604_800,
            quorum_percent: 10,
            voting_threshold_percent: 50,
            min_proposal_tokens: TokenAmount::from_tokens(1_000),
            execution_delay: 0,
        }
    }
}

impl GovernanceSettings {
    /// Check the invariants settings must satisfy
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.min_voting_period > self.max_voting_period {
            return Err(format!(
                "minVotingPeriod ({}) exceeds maxVotingPeriod ({})",
                self.min_voting_period, self.max_voting_period
            ));
        }
        if self.quorum_percent > 100 {
            return Err(format!("quorum {}% is above 100%", self.quorum_percent));
        }
        if self.voting_threshold_percent > 100 {
            return Err(format!(
                "voting threshold {}% is above 100%",
                self.voting_threshold_percent
            ));
        }
        Ok(())
    }
}

/// Partial settings supplied with a registration request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsOverrides {
    /// See [`GovernanceSettings::min_voting_period`]
    pub min_voting_period: Option<u64>,
    /// See [`GovernanceSettings::max_voting_period`]
    pub max_voting_period: Option<u64>,
    /// See [`GovernanceSettings::quorum_percent`]
    pub quorum_percent: Option<u8>,
    /// See [`GovernanceSettings::voting_threshold_percent`]
    pub voting_threshold_percent: Option<u8>,
    /// Human-readable decimal, see [`GovernanceSettings::min_proposal_tokens`]
    pub min_proposal_tokens: Option<String>,
    /// See [`GovernanceSettings::execution_delay`]
    pub execution_delay: Option<u64>,
}

/// A registered governance entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    /// Registry index
    pub id: OrganizationId,
    /// Display name
    pub name: String,
    /// Token symbol (uppercase, at most 10 characters)
    pub symbol: String,
    /// Governance token contract
    pub token_address: Address,
    /// Governance contract
    pub governance_address: Address,
    /// Creator account
    pub creator: Address,
    /// Creation time
    pub created_at: Timestamp,
    /// Total token supply
    pub total_supply: TokenAmount,
    /// Number of token holders
    pub member_count: u64,
    /// Funds held by the treasury
    pub treasury_balance: TokenAmount,
    /// Lifecycle status
    pub status: OrganizationStatus,
    /// Governance rules
    pub settings: GovernanceSettings,
    /// Descriptive metadata
    pub metadata: OrganizationMetadata,
}

/// A single weighted vote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Voting account
    pub voter: Address,
    /// `true` for, `false` against
    pub support: bool,
    /// Token weight
    pub weight: TokenAmount,
    /// Optional justification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Cast time
    pub timestamp: Timestamp,
}

/// Lifecycle state of a proposal. Derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProposalState {
    /// Voting has not started
    Pending,
    /// Voting is open
    Active,
    /// Voting closed with quorum and threshold met
    Succeeded,
    /// Voting closed without quorum or threshold
    Defeated,
    /// Executed on chain
    Executed,
    /// Declared for parity with the backend; never derived locally
    Expired,
    /// Cancelled by an explicit backend-reported fact
    Cancelled,
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProposalState::Pending => "PENDING",
            ProposalState::Active => "ACTIVE",
            ProposalState::Succeeded => "SUCCEEDED",
            ProposalState::Defeated => "DEFEATED",
            ProposalState::Executed => "EXECUTED",
            ProposalState::Expired => "EXPIRED",
            ProposalState::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// A proposal assembled with its votes and derived figures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    /// 1-based index within the organization
    pub id: ProposalId,
    /// Owning organization
    pub organization_id: OrganizationId,
    /// Proposing account
    pub proposer: Address,
    /// Short title
    pub title: String,
    /// Full description
    pub description: String,
    /// Creation time
    pub created_at: Timestamp,
    /// Voting opens
    pub start_time: Timestamp,
    /// Voting closes
    pub end_time: Timestamp,
    /// Whether the proposal has been executed
    pub executed: bool,
    /// Execution time
    pub executed_at: Option<Timestamp>,
    /// Opaque execution payload (0x-prefixed hex)
    pub execution_payload: Option<String>,
    /// Votes in the order the backend reported them
    pub votes: Vec<Vote>,
    /// Sum of all vote weight
    pub total_votes: TokenAmount,
    /// Weight in favour
    pub for_votes: TokenAmount,
    /// Weight against
    pub against_votes: TokenAmount,
    /// Derived lifecycle state at assembly time
    pub state: ProposalState,
}

/// Member role within an organization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MemberRole {
    /// Token holder
    Member,
    /// Moderator
    Moderator,
    /// Administrator
    Admin,
    /// Organization creator
    Founder,
}

/// A token holder of an organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// Holder account
    pub address: Address,
    /// Organization
    pub organization_id: OrganizationId,
    /// Token balance
    pub balance: TokenAmount,
    /// Voting power (one token, one vote)
    pub voting_power: TokenAmount,
    /// First seen
    pub joined_at: Timestamp,
    /// Role
    pub role: MemberRole,
    /// Holds a non-zero balance
    pub is_active: bool,
}

/// Kind of treasury movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TreasuryTransactionKind {
    /// Funds in
    Deposit,
    /// Funds out to a member
    Withdrawal,
    /// Funds moved between accounts
    Transfer,
    /// Payment for work
    Payment,
    /// Incentive payout
    Reward,
}

/// A treasury movement, created only by an executed proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasuryTransaction {
    /// Identifier
    pub id: String,
    /// Organization
    pub organization_id: OrganizationId,
    /// Kind of movement
    #[serde(rename = "type")]
    pub kind: TreasuryTransactionKind,
    /// Amount moved
    pub amount: TokenAmount,
    /// Receiving account
    pub recipient: Address,
    /// Free-form note
    #[serde(default)]
    pub description: String,
    /// Executing account
    pub executed_by: Address,
    /// Execution time
    pub executed_at: Timestamp,
    /// Proposal that caused the movement
    pub proposal_id: Option<ProposalId>,
}

/// Treasury balance and history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Treasury {
    /// Organization
    pub organization_id: OrganizationId,
    /// Current balance
    pub balance: TokenAmount,
    /// Movements, oldest first
    pub transactions: Vec<TreasuryTransaction>,
}

/// Organization record as reported by `organizationAt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationRecord {
    /// Display name
    pub name: String,
    /// Token symbol
    pub symbol: String,
    /// Token contract
    pub token_ref: Address,
    /// Governance contract
    pub governance_ref: Address,
    /// Creator
    pub creator: Address,
    /// Creation time
    #[serde(deserialize_with = "wire::de_i64")]
    pub created_at: Timestamp,
}

/// Proposal record as reported by `proposalAt`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalRecord {
    /// Short title
    pub title: String,
    /// Full description
    pub description: String,
    /// Proposer
    pub proposer: Address,
    /// Creation time
    #[serde(deserialize_with = "wire::de_i64")]
    pub created_at: Timestamp,
    /// Voting opens
    #[serde(deserialize_with = "wire::de_i64")]
    pub start_time: Timestamp,
    /// Voting closes
    #[serde(deserialize_with = "wire::de_i64")]
    pub end_time: Timestamp,
    /// Executed flag
    pub executed: bool,
    /// Execution time
    #[serde(default, deserialize_with = "wire::de_opt_i64")]
    pub executed_at: Option<Timestamp>,
    /// Execution payload
    #[serde(default)]
    pub execution_payload: Option<String>,
    /// Explicit cancellation fact
    #[serde(default)]
    pub cancelled: bool,
}

/// Vote record as reported by `proposalVotes`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    /// Voter
    pub voter: Address,
    /// Support flag
    pub support: bool,
    /// Weight in base units
    pub weight: TokenAmount,
    /// Reason, empty strings are treated as absent
    #[serde(default)]
    pub reason: Option<String>,
    /// Cast time
    #[serde(deserialize_with = "wire::de_i64")]
    pub timestamp: Timestamp,
}

impl From<VoteRecord> for Vote {
    fn from(record: VoteRecord) -> Self {
        Vote {
            voter: record.voter,
            support: record.support,
            weight: record.weight,
            reason: record.reason.filter(|r| !r.is_empty()),
            timestamp: record.timestamp,
        }
    }
}

/// Member record as reported by `members`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberRecord {
    /// Holder account
    pub address: Address,
    /// Balance in base units
    pub balance: TokenAmount,
    /// First seen
    #[serde(deserialize_with = "wire::de_i64")]
    pub joined_at: Timestamp,
    /// Role
    pub role: MemberRole,
}

/// Treasury record as reported by `treasury`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasuryRecord {
    /// Balance in base units
    pub balance: TokenAmount,
    /// Movements, oldest first
    #[serde(default)]
    pub transactions: Vec<TreasuryTransaction>,
}

/// Page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Records in this page
    pub items: Vec<T>,
    /// Total number of records across all pages
    pub total: usize,
    /// 1-based page number
    pub page: usize,
    /// Page size
    pub limit: usize,
    /// A later page exists
    pub has_next: bool,
    /// An earlier page exists
    pub has_prev: bool,
}

/// Aggregate figures for one organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrganizationStats {
    /// Organization
    pub organization_id: OrganizationId,
    /// Proposals known to the catalog
    pub total_proposals: usize,
    /// Proposals currently open for voting
    pub active_proposals: usize,
    /// Token holders
    pub total_members: u64,
    /// Votes cast across all proposals
    pub total_votes: usize,
    /// Mean participation across proposals, in basis points
    pub average_participation_bps: u64,
    /// Treasury balance
    pub treasury_value: TokenAmount,
    /// Most recent creation, vote or execution timestamp
    pub last_activity: Timestamp,
}
