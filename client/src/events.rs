//! Event decoding for confirmed transactions.
//!
//! A confirmation carries an untyped log list. Each log is decoded independently into a
//! [`GovernanceEvent`]: a log whose first topic matches a known event signature is decoded
//! into that event's shape, anything else becomes [`GovernanceEvent::Unknown`]. Confirmation
//! and "the event was found" are separate facts; callers must not conflate them.

use crate::amount::TokenAmount;
use crate::backend::wire;
use crate::backend::RawLog;
use crate::error::{GovernanceError, Result};
use crate::types::{Address, OrganizationId, ProposalId, Timestamp};
use alloy_primitives::keccak256;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Keccak-256 topic of a canonical event signature, `0x`-prefixed lowercase hex
pub fn topic_for(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}

/// Emitted by the factory when an organization is registered
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationCreated {
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
    /// Registry index
    #[serde(deserialize_with = "wire::de_u64")]
    pub org_id: OrganizationId,
}

/// Emitted by a governance contract when a proposal is opened
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalCreated {
    /// 1-based proposal index
    #[serde(deserialize_with = "wire::de_u64")]
    pub proposal_id: ProposalId,
    /// Proposer
    pub proposer: Address,
    /// Title
    pub title: String,
    /// Description
    pub description: String,
    /// Voting opens
    #[serde(deserialize_with = "wire::de_i64")]
    pub start_time: Timestamp,
    /// Voting closes
    #[serde(deserialize_with = "wire::de_i64")]
    pub end_time: Timestamp,
}

/// Emitted by a governance contract when a vote is recorded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteCast {
    /// Proposal voted on
    #[serde(deserialize_with = "wire::de_u64")]
    pub proposal_id: ProposalId,
    /// Voter
    pub voter: Address,
    /// Support flag
    pub support: bool,
    /// Weight in base units
    pub weight: TokenAmount,
    /// Reason
    #[serde(default)]
    pub reason: String,
}

/// Emitted by a governance contract when a proposal is executed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalExecuted {
    /// Proposal executed
    #[serde(deserialize_with = "wire::de_u64")]
    pub proposal_id: ProposalId,
    /// Execution time
    #[serde(default, deserialize_with = "wire::de_opt_i64")]
    pub executed_at: Option<Timestamp>,
}

/// Every event the governance contracts emit, plus a catch-all
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GovernanceEvent {
    /// See [`OrganizationCreated`]
    OrganizationCreated(OrganizationCreated),
    /// See [`ProposalCreated`]
    ProposalCreated(ProposalCreated),
    /// See [`VoteCast`]
    VoteCast(VoteCast),
    /// See [`ProposalExecuted`]
    ProposalExecuted(ProposalExecuted),
    /// A log no known shape claims
    Unknown {
        /// First topic, if any
        topic: Option<String>,
    },
}

/// A typed event shape the decoder can search for
pub trait EventShape: Serialize + DeserializeOwned + Sized {
    /// Event name as the contract declares it
    const NAME: &'static str;
    /// Canonical Solidity signature
    const SIGNATURE: &'static str;

    /// Wrap into the tagged union
    fn into_event(self) -> GovernanceEvent;

    /// Unwrap from the tagged union
    fn from_event(event: GovernanceEvent) -> Option<Self>;

    /// Topic this shape is indexed under
    fn topic() -> String {
        topic_for(Self::SIGNATURE)
    }
}

impl EventShape for OrganizationCreated {
    const NAME: &'static str = "DAOCreated";
    const SIGNATURE: &'static str = "DAOCreated(string,string,address,address,address,uint256)";

    fn into_event(self) -> GovernanceEvent {
        GovernanceEvent::OrganizationCreated(self)
    }

    fn from_event(event: GovernanceEvent) -> Option<Self> {
        match event {
            GovernanceEvent::OrganizationCreated(e) => Some(e),
            _ => None,
        }
    }
}

impl EventShape for ProposalCreated {
    const NAME: &'static str = "ProposalCreated";
    const SIGNATURE: &'static str =
        "ProposalCreated(uint256,address,string,string,uint256,uint256)";

    fn into_event(self) -> GovernanceEvent {
        GovernanceEvent::ProposalCreated(self)
    }

    fn from_event(event: GovernanceEvent) -> Option<Self> {
        match event {
            GovernanceEvent::ProposalCreated(e) => Some(e),
            _ => None,
        }
    }
}

impl EventShape for VoteCast {
    const NAME: &'static str = "VoteCast";
    const SIGNATURE: &'static str = "VoteCast(uint256,address,bool,uint256,string)";

    fn into_event(self) -> GovernanceEvent {
        GovernanceEvent::VoteCast(self)
    }

    fn from_event(event: GovernanceEvent) -> Option<Self> {
        match event {
            GovernanceEvent::VoteCast(e) => Some(e),
            _ => None,
        }
    }
}

impl EventShape for ProposalExecuted {
    const NAME: &'static str = "ProposalExecuted";
    const SIGNATURE: &'static str = "ProposalExecuted(uint256)";

    fn into_event(self) -> GovernanceEvent {
        GovernanceEvent::ProposalExecuted(self)
    }

    fn from_event(event: GovernanceEvent) -> Option<Self> {
        match event {
            GovernanceEvent::ProposalExecuted(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Shape {
    OrganizationCreated,
    ProposalCreated,
    VoteCast,
    ProposalExecuted,
}

fn known_topics() -> &'static [(String, Shape)] {
    static TOPICS: OnceLock<Vec<(String, Shape)>> = OnceLock::new();
    TOPICS.get_or_init(|| {
        vec![
            (OrganizationCreated::topic(), Shape::OrganizationCreated),
            (ProposalCreated::topic(), Shape::ProposalCreated),
            (VoteCast::topic(), Shape::VoteCast),
            (ProposalExecuted::topic(), Shape::ProposalExecuted),
        ]
    })
}

fn decode_as<E: EventShape>(log: &RawLog) -> Result<GovernanceEvent> {
    serde_json::from_value::<E>(log.data.clone())
        .map(E::into_event)
        .map_err(|e| {
            GovernanceError::MalformedEvent(format!(
                "{} log from {} does not match its shape: {}",
                E::NAME,
                log.address,
                e
            ))
        })
}

/// Decode one log.
///
/// A log whose topic is unknown or missing is [`GovernanceEvent::Unknown`], never an error.
/// A log that claims a known topic but whose data does not fit is `MalformedEvent`.
pub fn decode_log(log: &RawLog) -> Result<GovernanceEvent> {
    let Some(topic) = log.topics.first() else {
        return Ok(GovernanceEvent::Unknown { topic: None });
    };
    let topic_lower = topic.to_lowercase();

    let shape = known_topics()
        .iter()
        .find(|(known, _)| *known == topic_lower)
        .map(|(_, shape)| *shape);

    match shape {
        Some(Shape::OrganizationCreated) => decode_as::<OrganizationCreated>(log),
        Some(Shape::ProposalCreated) => decode_as::<ProposalCreated>(log),
        Some(Shape::VoteCast) => decode_as::<VoteCast>(log),
        Some(Shape::ProposalExecuted) => decode_as::<ProposalExecuted>(log),
        None => Ok(GovernanceEvent::Unknown {
            topic: Some(topic.clone()),
        }),
    }
}

/// Decode every log; malformed entries are skipped with a warning
pub fn decode_logs(logs: &[RawLog]) -> Vec<GovernanceEvent> {
    logs.iter()
        .filter_map(|log| match decode_log(log) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!("Skipping undecodable log: {}", e);
                None
            }
        })
        .collect()
}

/// First log in `logs` that decodes as `E`, or `EventNotFound`
pub fn find_event<E: EventShape>(logs: &[RawLog]) -> Result<E> {
    for (index, log) in logs.iter().enumerate() {
        match decode_log(log) {
            Ok(event) => {
                if let Some(found) = E::from_event(event) {
                    debug!("Found {} at log index {}", E::NAME, index);
                    return Ok(found);
                }
            }
            Err(e) => warn!("Log {} skipped while searching for {}: {}", index, E::NAME, e),
        }
    }
    Err(GovernanceError::EventNotFound(format!(
        "no {} event among {} logs",
        E::NAME,
        logs.len()
    )))
}

/// Build the log a contract would emit for `event`
pub fn encode_log<E: EventShape>(address: &str, event: &E) -> Result<RawLog> {
    Ok(RawLog {
        address: address.to_string(),
        topics: vec![E::topic()],
        data: serde_json::to_value(event)?,
    })
}
