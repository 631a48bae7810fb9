//! Chain backend capability.
//!
//! The governance core never talks to a chain directly. It depends on [`ChainBackend`],
//! which exposes the factory and governance contract reads and writes plus confirmation
//! waiting. Two implementations exist: [`RpcBackend`] for a JSON-RPC governance gateway and
//! [`LocalChain`], an in-process simulation used for development and tests.

pub mod local;
pub mod monitor;
pub mod rpc;

pub use local::LocalChain;
pub use monitor::{ConfirmationMonitor, MonitorOptions, MonitorResult};
pub use rpc::RpcBackend;

use crate::amount::TokenAmount;
use crate::error::Result;
use crate::types::{
    Address, GovernanceSettings, MemberRecord, OrganizationRecord, ProposalId, ProposalRecord,
    Timestamp, TreasuryRecord, VoteRecord,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Handle to a submitted, not yet confirmed, transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxHandle {
    /// Transaction hash
    pub hash: String,
}

impl TxHandle {
    /// Wrap a transaction hash
    pub fn new(hash: impl Into<String>) -> Self {
        Self { hash: hash.into() }
    }
}

/// A log entry as emitted by a contract. Opaque to everything but the event decoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLog {
    /// Emitting contract
    pub address: Address,
    /// Indexed topics; the first is the event signature hash
    #[serde(default)]
    pub topics: Vec<String>,
    /// Named event fields
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Result of a confirmed transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    /// Transaction hash
    pub transaction_hash: String,
    /// Block that included the transaction
    #[serde(deserialize_with = "wire::de_u64")]
    pub block_number: u64,
    /// Block time, when the backend reports it
    #[serde(default, deserialize_with = "wire::de_opt_i64")]
    pub block_timestamp: Option<Timestamp>,
    /// Logs emitted by the transaction
    #[serde(default)]
    pub logs: Vec<RawLog>,
}

/// Read/write operations the governance core consumes.
///
/// Every call is a backend round trip. Implementations surface failures using the
/// crate's error taxonomy: `Network` for transport problems, `Rejected` when the signer
/// declines, `BackendRejected` for business-rule refusals and `NotFound` for unknown
/// indices.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainBackend: Send + Sync {
    /// Deploy a new organization through the factory, minting `initial_supply` to the
    /// signer and configuring its governance contract with `settings`
    async fn create_organization(
        &self,
        name: &str,
        symbol: &str,
        initial_supply: TokenAmount,
        settings: &GovernanceSettings,
    ) -> Result<TxHandle>;

    /// Number of organizations registered with the factory
    async fn organization_count(&self) -> Result<u64>;

    /// Organization record at `index`
    async fn organization_at(&self, index: u64) -> Result<OrganizationRecord>;

    /// Open a proposal on a governance contract
    async fn create_proposal(
        &self,
        governance: &str,
        title: &str,
        description: &str,
        execution_payload: &str,
    ) -> Result<TxHandle>;

    /// Cast a vote with the signer's full balance
    async fn cast_vote(
        &self,
        governance: &str,
        proposal_id: ProposalId,
        support: bool,
        reason: &str,
    ) -> Result<TxHandle>;

    /// Execute a proposal
    async fn execute_proposal(&self, governance: &str, proposal_id: ProposalId)
        -> Result<TxHandle>;

    /// Number of proposals on a governance contract
    async fn proposal_count(&self, governance: &str) -> Result<u64>;

    /// Proposal record by 1-based id
    async fn proposal_at(&self, governance: &str, proposal_id: ProposalId)
        -> Result<ProposalRecord>;

    /// Votes cast on a proposal, in cast order
    async fn proposal_votes(
        &self,
        governance: &str,
        proposal_id: ProposalId,
    ) -> Result<Vec<VoteRecord>>;

    /// Settings of a governance contract
    async fn governance_settings(&self, governance: &str) -> Result<GovernanceSettings>;

    /// Total supply of a governance token
    async fn total_supply(&self, token: &str) -> Result<TokenAmount>;

    /// Token holders of an organization
    async fn members(&self, governance: &str) -> Result<Vec<MemberRecord>>;

    /// Treasury balance and history of an organization
    async fn treasury(&self, governance: &str) -> Result<TreasuryRecord>;

    /// Wait until a submitted transaction is included
    async fn await_confirmation(&self, tx: &TxHandle) -> Result<Confirmation>;
}

/// Lenient integer decoding for values a gateway may send as JSON numbers, decimal
/// strings or `0x` hex strings.
pub(crate) mod wire {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireInt {
        Number(i64),
        Text(String),
    }

    fn parse_text(text: &str) -> Option<i64> {
        match text.strip_prefix("0x") {
            Some(hex_digits) => i64::from_str_radix(hex_digits, 16).ok(),
            None => text.parse().ok(),
        }
    }

    pub(crate) fn to_i64(value: &serde_json::Value) -> Option<i64> {
        match value {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => parse_text(s),
            _ => None,
        }
    }

    pub(crate) fn de_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        match WireInt::deserialize(deserializer)? {
            WireInt::Number(n) => Ok(n),
            WireInt::Text(text) => parse_text(&text)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid integer {:?}", text))),
        }
    }

    pub(crate) fn de_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let value = de_i64(deserializer)?;
        u64::try_from(value)
            .map_err(|_| serde::de::Error::custom(format!("negative value {}", value)))
    }

    pub(crate) fn de_opt_i64<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<i64>, D::Error> {
        match Option::<WireInt>::deserialize(deserializer)? {
            None => Ok(None),
            Some(WireInt::Number(n)) => Ok(Some(n)),
            Some(WireInt::Text(text)) => parse_text(&text)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid integer {:?}", text))),
        }
    }
}
