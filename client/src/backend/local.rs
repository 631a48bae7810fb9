//! In-process simulated chain.
//!
//! `LocalChain` keeps factory, token and governance state in memory and enforces the same
//! rules the governance contracts do. Writes are checked up front, the way a gateway's gas
//! estimation refuses a reverting call, and a successful write is mined into its own block
//! immediately. Several handles can share one chain with different signers via
//! [`LocalChain::connect`].

use crate::amount::TokenAmount;
use crate::backend::{ChainBackend, Confirmation, RawLog, TxHandle};
use crate::clock::Clock;
use crate::config::{ClientConfig, Network};
use crate::error::{GovernanceError, Result};
use crate::events::{
    encode_log, topic_for, OrganizationCreated, ProposalCreated, ProposalExecuted, VoteCast,
};
use crate::lifecycle;
use crate::tally::tally;
use crate::types::{
    Address, GovernanceSettings, MemberRecord, MemberRole, OrganizationId, OrganizationRecord,
    ProposalId, ProposalRecord, Timestamp, TreasuryRecord, TreasuryTransaction,
    TreasuryTransactionKind, Vote, VoteRecord,
};
use alloy_primitives::keccak256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
const TRANSFER_SIGNATURE: &str = "Transfer(address,address,uint256)";

/// Treasury movement carried in a proposal's execution payload.
///
/// Encoded as `0x`-prefixed hex of its JSON form. Executing a proposal whose payload
/// decodes to an instruction moves the funds out of the treasury.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreasuryInstruction {
    /// Kind of movement
    #[serde(rename = "type")]
    pub kind: TreasuryTransactionKind,
    /// Receiving account
    pub recipient: Address,
    /// Amount in base units
    pub amount: TokenAmount,
    /// Free-form note
    #[serde(default)]
    pub description: String,
}

impl TreasuryInstruction {
    /// Payload form
    pub fn encode(&self) -> Result<String> {
        Ok(format!("0x{}", hex::encode(serde_json::to_vec(self)?)))
    }

    /// Decode a payload; anything that is not an instruction yields `None`
    pub fn decode(payload: &str) -> Option<Self> {
        let bytes = hex::decode(payload.strip_prefix("0x").unwrap_or(payload)).ok()?;
        serde_json::from_slice(&bytes).ok()
    }
}

fn derive_address(label: &str) -> Address {
    let hash = keccak256(label.as_bytes());
    format!("0x{}", hex::encode(&hash[12..]))
}

fn rejected(reason: &str) -> GovernanceError {
    GovernanceError::backend_rejected(reason)
}

#[derive(Debug)]
struct Holder {
    address: Address,
    balance: TokenAmount,
    joined_at: Timestamp,
    role: MemberRole,
}

#[derive(Debug)]
struct LocalProposal {
    record: ProposalRecord,
    votes: Vec<VoteRecord>,
}

#[derive(Debug)]
struct LocalOrganization {
    id: OrganizationId,
    record: OrganizationRecord,
    settings: GovernanceSettings,
    total_supply: TokenAmount,
    holders: Vec<Holder>,
    proposals: Vec<LocalProposal>,
    treasury_balance: TokenAmount,
    treasury_transactions: Vec<TreasuryTransaction>,
}

impl LocalOrganization {
    fn balance_of(&self, account: &str) -> TokenAmount {
        self.holders
            .iter()
            .find(|h| h.address.eq_ignore_ascii_case(account))
            .map(|h| h.balance)
            .unwrap_or(TokenAmount::ZERO)
    }

    fn credit(&mut self, account: &str, amount: TokenAmount, now: Timestamp) -> Result<()> {
        let overflow = || rejected("Balance overflow");
        match self
            .holders
            .iter_mut()
            .find(|h| h.address.eq_ignore_ascii_case(account))
        {
            Some(holder) => {
                holder.balance = holder.balance.checked_add(amount).ok_or_else(overflow)?;
            }
            None => self.holders.push(Holder {
                address: account.to_string(),
                balance: amount,
                joined_at: now,
                role: MemberRole::Member,
            }),
        }
        Ok(())
    }

    fn proposal_mut(&mut self, proposal_id: ProposalId) -> Result<&mut LocalProposal> {
        let index = proposal_id
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok())
            .filter(|i| *i < self.proposals.len())
            .ok_or_else(|| rejected("Invalid proposal id"))?;
        Ok(&mut self.proposals[index])
    }

    fn proposal(&self, proposal_id: ProposalId) -> Result<&LocalProposal> {
        proposal_id
            .checked_sub(1)
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| self.proposals.get(i))
            .ok_or_else(|| {
                GovernanceError::NotFound(format!(
                    "proposal {} on {}",
                    proposal_id, self.record.governance_ref
                ))
            })
    }
}

#[derive(Debug, Default)]
struct ChainState {
    block_number: u64,
    tx_count: u64,
    organizations: Vec<LocalOrganization>,
    receipts: HashMap<String, Confirmation>,
}

impl ChainState {
    fn organization(&self, governance: &str) -> Result<&LocalOrganization> {
        self.organizations
            .iter()
            .find(|o| o.record.governance_ref.eq_ignore_ascii_case(governance))
            .ok_or_else(|| GovernanceError::NotFound(format!("governance contract {}", governance)))
    }

    fn organization_mut(&mut self, governance: &str) -> Result<&mut LocalOrganization> {
        self.organizations
            .iter_mut()
            .find(|o| o.record.governance_ref.eq_ignore_ascii_case(governance))
            .ok_or_else(|| GovernanceError::NotFound(format!("governance contract {}", governance)))
    }

    fn organization_by_token_mut(&mut self, token: &str) -> Result<&mut LocalOrganization> {
        self.organizations
            .iter_mut()
            .find(|o| o.record.token_ref.eq_ignore_ascii_case(token))
            .ok_or_else(|| GovernanceError::NotFound(format!("token contract {}", token)))
    }

    /// Mine a transaction carrying `logs` into a new block
    fn mine(&mut self, signer: &str, now: Timestamp, logs: Vec<RawLog>) -> TxHandle {
        self.tx_count += 1;
        self.block_number += 1;
        let hash = format!(
            "0x{}",
            hex::encode(keccak256(format!("{}:{}", signer, self.tx_count).as_bytes()))
        );
        debug!("Mined {} in block {}", hash, self.block_number);
        self.receipts.insert(
            hash.clone(),
            Confirmation {
                transaction_hash: hash.clone(),
                block_number: self.block_number,
                block_timestamp: Some(now),
                logs,
            },
        );
        TxHandle::new(hash)
    }
}

/// Simulated governance chain held in memory
#[derive(Clone)]
pub struct LocalChain {
    state: Arc<Mutex<ChainState>>,
    clock: Arc<dyn Clock>,
    factory: Address,
    signer: Address,
}

impl LocalChain {
    /// Empty chain whose writes are signed by `signer`
    pub fn new(signer: impl Into<Address>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ChainState::default())),
            clock,
            factory: Network::Local.default_factory_address().to_string(),
            signer: signer.into(),
        }
    }

    /// Empty chain signed by the configured signer, with the configured factory address
    pub fn from_config(config: &ClientConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            factory: config.factory_address.clone(),
            ..Self::new(config.signer_address.clone(), clock)
        }
    }

    /// Handle on the same chain that signs as `signer`
    pub fn connect(&self, signer: impl Into<Address>) -> Self {
        Self {
            state: Arc::clone(&self.state),
            clock: Arc::clone(&self.clock),
            factory: self.factory.clone(),
            signer: signer.into(),
        }
    }

    /// Account signing this handle's writes
    pub fn signer(&self) -> &str {
        &self.signer
    }

    /// Development faucet: mint `amount` governance tokens of `token` to `to`
    pub async fn mint(&self, token: &str, to: &str, amount: TokenAmount) -> Result<TxHandle> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let org = state.organization_by_token_mut(token)?;
        org.total_supply = org
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| rejected("Supply overflow"))?;
        org.credit(to, amount, now)?;
        let log = transfer_log(&org.record.token_ref, ZERO_ADDRESS, to, amount);
        info!("Minted {} {} to {}", amount, org.record.symbol, to);
        Ok(state.mine(&self.signer, now, vec![log]))
    }

    /// Deposit funds into an organization's treasury
    pub async fn fund_treasury(&self, governance: &str, amount: TokenAmount) -> Result<TxHandle> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let org = state.organization_mut(governance)?;
        org.treasury_balance = org
            .treasury_balance
            .checked_add(amount)
            .ok_or_else(|| rejected("Treasury overflow"))?;
        Ok(state.mine(&self.signer, now, vec![]))
    }

    /// Record an external cancellation of a proposal
    pub async fn cancel_proposal(&self, governance: &str, proposal_id: ProposalId) -> Result<()> {
        let mut state = self.state.lock().await;
        let proposal = state.organization_mut(governance)?.proposal_mut(proposal_id)?;
        if proposal.record.executed {
            return Err(rejected("Proposal already executed"));
        }
        proposal.record.cancelled = true;
        warn!("Proposal {} on {} cancelled", proposal_id, governance);
        Ok(())
    }
}

fn transfer_log(token: &str, from: &str, to: &str, amount: TokenAmount) -> RawLog {
    RawLog {
        address: token.to_string(),
        topics: vec![topic_for(TRANSFER_SIGNATURE)],
        data: serde_json::json!({ "from": from, "to": to, "value": amount }),
    }
}

#[async_trait]
impl ChainBackend for LocalChain {
    async fn create_organization(
        &self,
        name: &str,
        symbol: &str,
        initial_supply: TokenAmount,
        settings: &GovernanceSettings,
    ) -> Result<TxHandle> {
        if name.trim().is_empty() || symbol.trim().is_empty() {
            return Err(rejected("Name and symbol required"));
        }
        settings.validate().map_err(GovernanceError::backend_rejected)?;

        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let org_id = state.organizations.len() as OrganizationId;

        let record = OrganizationRecord {
            name: name.to_string(),
            symbol: symbol.to_string(),
            token_ref: derive_address(&format!("token:{}", org_id)),
            governance_ref: derive_address(&format!("governance:{}", org_id)),
            creator: self.signer.clone(),
            created_at: now,
        };

        let logs = vec![
            transfer_log(&record.token_ref, ZERO_ADDRESS, &self.signer, initial_supply),
            encode_log(
                &self.factory,
                &OrganizationCreated {
                    name: record.name.clone(),
                    symbol: record.symbol.clone(),
                    token_ref: record.token_ref.clone(),
                    governance_ref: record.governance_ref.clone(),
                    creator: self.signer.clone(),
                    org_id,
                },
            )?,
        ];

        info!(
            "Organization {} ({}) deployed at {}",
            org_id, record.symbol, record.governance_ref
        );

        state.organizations.push(LocalOrganization {
            id: org_id,
            holders: vec![Holder {
                address: self.signer.clone(),
                balance: initial_supply,
                joined_at: now,
                role: MemberRole::Founder,
            }],
            record,
            settings: settings.clone(),
            total_supply: initial_supply,
            proposals: Vec::new(),
            treasury_balance: TokenAmount::ZERO,
            treasury_transactions: Vec::new(),
        });

        Ok(state.mine(&self.signer, now, logs))
    }

    async fn organization_count(&self) -> Result<u64> {
        Ok(self.state.lock().await.organizations.len() as u64)
    }

    async fn organization_at(&self, index: u64) -> Result<OrganizationRecord> {
        let state = self.state.lock().await;
        usize::try_from(index)
            .ok()
            .and_then(|i| state.organizations.get(i))
            .map(|org| org.record.clone())
            .ok_or_else(|| GovernanceError::NotFound(format!("organization {}", index)))
    }

    async fn create_proposal(
        &self,
        governance: &str,
        title: &str,
        description: &str,
        execution_payload: &str,
    ) -> Result<TxHandle> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let org = state.organization_mut(governance)?;

        if org.balance_of(&self.signer) < org.settings.min_proposal_tokens {
            return Err(rejected("Insufficient tokens to create proposal"));
        }
        if title.trim().is_empty() {
            return Err(rejected("Title required"));
        }

        let proposal_id = org.proposals.len() as ProposalId + 1;
        let period = Timestamp::try_from(org.settings.min_voting_period).unwrap_or(Timestamp::MAX);
        let end_time = now.saturating_add(period);
        let record = ProposalRecord {
            title: title.to_string(),
            description: description.to_string(),
            proposer: self.signer.clone(),
            created_at: now,
            start_time: now,
            end_time,
            executed: false,
            executed_at: None,
            execution_payload: Some(execution_payload.to_string())
                .filter(|p| !p.is_empty() && p != "0x"),
            cancelled: false,
        };

        let log = encode_log(
            &org.record.governance_ref,
            &ProposalCreated {
                proposal_id,
                proposer: self.signer.clone(),
                title: record.title.clone(),
                description: record.description.clone(),
                start_time: now,
                end_time,
            },
        )?;

        info!(
            "Proposal {} opened on {} until {}",
            proposal_id, org.record.governance_ref, end_time
        );
        org.proposals.push(LocalProposal {
            record,
            votes: Vec::new(),
        });

        Ok(state.mine(&self.signer, now, vec![log]))
    }

    async fn cast_vote(
        &self,
        governance: &str,
        proposal_id: ProposalId,
        support: bool,
        reason: &str,
    ) -> Result<TxHandle> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let org = state.organization_mut(governance)?;
        let weight = org.balance_of(&self.signer);
        let governance_ref = org.record.governance_ref.clone();
        let proposal = org.proposal_mut(proposal_id)?;

        if proposal.record.cancelled || proposal.record.executed {
            return Err(rejected("Voting is not active"));
        }
        if now < proposal.record.start_time || now > proposal.record.end_time {
            return Err(rejected("Voting is not active"));
        }
        if proposal
            .votes
            .iter()
            .any(|v| v.voter.eq_ignore_ascii_case(&self.signer))
        {
            return Err(rejected("Already voted"));
        }
        if weight.is_zero() {
            return Err(rejected("No voting power"));
        }

        proposal.votes.push(VoteRecord {
            voter: self.signer.clone(),
            support,
            weight,
            reason: Some(reason.to_string()).filter(|r| !r.is_empty()),
            timestamp: now,
        });

        let log = encode_log(
            &governance_ref,
            &VoteCast {
                proposal_id,
                voter: self.signer.clone(),
                support,
                weight,
                reason: reason.to_string(),
            },
        )?;

        debug!(
            "{} voted {} on proposal {} with {}",
            self.signer,
            if support { "for" } else { "against" },
            proposal_id,
            weight
        );
        Ok(state.mine(&self.signer, now, vec![log]))
    }

    async fn execute_proposal(&self, governance: &str, proposal_id: ProposalId) -> Result<TxHandle> {
        let now = self.clock.now();
        let mut state = self.state.lock().await;
        let org = state.organization_mut(governance)?;
        let settings = org.settings.clone();
        let total_supply = org.total_supply;

        let (record, votes) = {
            let proposal = org.proposal_mut(proposal_id)?;
            (proposal.record.clone(), proposal.votes.clone())
        };

        if record.executed {
            return Err(rejected("Proposal already executed"));
        }
        if record.cancelled {
            return Err(rejected("Proposal was cancelled"));
        }

        let votes: Vec<Vote> = votes.into_iter().map(Vote::from).collect();
        let outcome = tally(&votes, total_supply, &settings);
        let state_now = lifecycle::resolve_state(now, &record, &outcome);
        if now <= record.end_time {
            return Err(rejected("Voting has not ended"));
        }
        if !outcome.passed() {
            return Err(rejected("Proposal did not pass"));
        }
        if !lifecycle::is_executable(now, state_now, record.end_time, settings.execution_delay) {
            return Err(rejected("Execution delay has not elapsed"));
        }

        let instruction = record
            .execution_payload
            .as_deref()
            .and_then(TreasuryInstruction::decode);
        if let Some(instruction) = &instruction {
            let remaining = org
                .treasury_balance
                .checked_sub(instruction.amount)
                .ok_or_else(|| rejected("Insufficient treasury balance"))?;
            org.treasury_balance = remaining;
            org.treasury_transactions.push(TreasuryTransaction {
                id: format!("{}-{}", org.record.governance_ref, proposal_id),
                organization_id: org.id,
                kind: instruction.kind,
                amount: instruction.amount,
                recipient: instruction.recipient.clone(),
                description: instruction.description.clone(),
                executed_by: self.signer.clone(),
                executed_at: now,
                proposal_id: Some(proposal_id),
            });
            info!(
                "Treasury of {} paid {} to {}",
                org.record.governance_ref, instruction.amount, instruction.recipient
            );
        }

        let proposal = org.proposal_mut(proposal_id)?;
        proposal.record.executed = true;
        proposal.record.executed_at = Some(now);

        let log = encode_log(
            &org.record.governance_ref,
            &ProposalExecuted {
                proposal_id,
                executed_at: Some(now),
            },
        )?;

        info!("Proposal {} on {} executed", proposal_id, governance);
        Ok(state.mine(&self.signer, now, vec![log]))
    }

    async fn proposal_count(&self, governance: &str) -> Result<u64> {
        let state = self.state.lock().await;
        Ok(state.organization(governance)?.proposals.len() as u64)
    }

    async fn proposal_at(&self, governance: &str, proposal_id: ProposalId) -> Result<ProposalRecord> {
        let state = self.state.lock().await;
        Ok(state
            .organization(governance)?
            .proposal(proposal_id)?
            .record
            .clone())
    }

    async fn proposal_votes(
        &self,
        governance: &str,
        proposal_id: ProposalId,
    ) -> Result<Vec<VoteRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .organization(governance)?
            .proposal(proposal_id)?
            .votes
            .clone())
    }

    async fn governance_settings(&self, governance: &str) -> Result<GovernanceSettings> {
        let state = self.state.lock().await;
        Ok(state.organization(governance)?.settings.clone())
    }

    async fn total_supply(&self, token: &str) -> Result<TokenAmount> {
        let state = self.state.lock().await;
        state
            .organizations
            .iter()
            .find(|o| o.record.token_ref.eq_ignore_ascii_case(token))
            .map(|o| o.total_supply)
            .ok_or_else(|| GovernanceError::NotFound(format!("token contract {}", token)))
    }

    async fn members(&self, governance: &str) -> Result<Vec<MemberRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .organization(governance)?
            .holders
            .iter()
            .map(|h| MemberRecord {
                address: h.address.clone(),
                balance: h.balance,
                joined_at: h.joined_at,
                role: h.role,
            })
            .collect())
    }

    async fn treasury(&self, governance: &str) -> Result<TreasuryRecord> {
        let state = self.state.lock().await;
        let org = state.organization(governance)?;
        Ok(TreasuryRecord {
            balance: org.treasury_balance,
            transactions: org.treasury_transactions.clone(),
        })
    }

    async fn await_confirmation(&self, tx: &TxHandle) -> Result<Confirmation> {
        let state = self.state.lock().await;
        state
            .receipts
            .get(&tx.hash)
            .cloned()
            .ok_or_else(|| GovernanceError::NotFound(format!("transaction {}", tx.hash)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::events::find_event;
    use assert_matches::assert_matches;

    const FOUNDER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
    const HOLDER: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
    const START: Timestamp = 1_700_000_000;

    async fn chain_with_org() -> (LocalChain, FixedClock, OrganizationRecord) {
        let clock = FixedClock::new(START);
        let chain = LocalChain::new(FOUNDER, Arc::new(clock.clone()));
        let tx = chain
            .create_organization(
                "Test DAO",
                "TST",
                TokenAmount::from_tokens(1_000_000),
                &GovernanceSettings::default(),
            )
            .await
            .unwrap();
        chain.await_confirmation(&tx).await.unwrap();
        let record = chain.organization_at(0).await.unwrap();
        (chain, clock, record)
    }

    #[tokio::test]
    async fn test_create_organization_emits_event_after_mint() {
        let clock = FixedClock::new(START);
        let chain = LocalChain::new(FOUNDER, Arc::new(clock));
        let tx = chain
            .create_organization(
                "Test DAO",
                "TST",
                TokenAmount::from_tokens(1_000_000),
                &GovernanceSettings::default(),
            )
            .await
            .unwrap();
        let confirmation = chain.await_confirmation(&tx).await.unwrap();

        assert_eq!(confirmation.block_number, 1);
        assert_eq!(confirmation.logs.len(), 2);
        let event: OrganizationCreated = find_event(&confirmation.logs).unwrap();
        assert_eq!(event.org_id, 0);
        assert_eq!(event.symbol, "TST");

        let supply = chain.total_supply(&event.token_ref).await.unwrap();
        assert_eq!(supply, TokenAmount::from_tokens(1_000_000));
        assert_eq!(chain.organization_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_indices_are_not_found() {
        let (chain, _, org) = chain_with_org().await;
        assert_matches!(
            chain.organization_at(5).await,
            Err(GovernanceError::NotFound(_))
        );
        assert_matches!(
            chain.proposal_at(&org.governance_ref, 1).await,
            Err(GovernanceError::NotFound(_))
        );
        assert_matches!(
            chain.await_confirmation(&TxHandle::new("0xdead")).await,
            Err(GovernanceError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn test_proposer_needs_minimum_balance() {
        let (chain, _, org) = chain_with_org().await;
        let outsider = chain.connect(HOLDER);
        assert_matches!(
            outsider
                .create_proposal(&org.governance_ref, "Grant", "Fund it", "0x")
                .await,
            Err(GovernanceError::BackendRejected { reason }) if reason.contains("Insufficient tokens")
        );

        chain
            .mint(&org.token_ref, HOLDER, TokenAmount::from_tokens(1_000))
            .await
            .unwrap();
        assert!(outsider
            .create_proposal(&org.governance_ref, "Grant", "Fund it", "0x")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_voting_window_and_single_vote() {
        let (chain, clock, org) = chain_with_org().await;
        chain
            .create_proposal(&org.governance_ref, "Raise quorum", "to 20%", "0x")
            .await
            .unwrap();

        chain
            .cast_vote(&org.governance_ref, 1, true, "")
            .await
            .unwrap();
        assert_matches!(
            chain.cast_vote(&org.governance_ref, 1, false, "changed my mind").await,
            Err(GovernanceError::BackendRejected { reason }) if reason == "Already voted"
        );

        let votes = chain.proposal_votes(&org.governance_ref, 1).await.unwrap();
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].weight, TokenAmount::from_tokens(1_000_000));
        assert_eq!(votes[0].reason, None);

        clock.advance(86_401);
        chain
            .mint(&org.token_ref, HOLDER, TokenAmount::from_tokens(5))
            .await
            .unwrap();
        assert_matches!(
            chain.connect(HOLDER).cast_vote(&org.governance_ref, 1, true, "late").await,
            Err(GovernanceError::BackendRejected { reason }) if reason == "Voting is not active"
        );
    }

    #[tokio::test]
    async fn test_execution_rules_and_treasury_payment() {
        let (chain, clock, org) = chain_with_org().await;
        chain
            .fund_treasury(&org.governance_ref, TokenAmount::from_tokens(100))
            .await
            .unwrap();

        let instruction = TreasuryInstruction {
            kind: TreasuryTransactionKind::Payment,
            recipient: HOLDER.to_string(),
            amount: TokenAmount::from_tokens(40),
            description: "audit".to_string(),
        };
        chain
            .create_proposal(
                &org.governance_ref,
                "Pay auditor",
                "40 tokens",
                &instruction.encode().unwrap(),
            )
            .await
            .unwrap();
        chain
            .cast_vote(&org.governance_ref, 1, true, "ship it")
            .await
            .unwrap();

        assert_matches!(
            chain.execute_proposal(&org.governance_ref, 1).await,
            Err(GovernanceError::BackendRejected { reason }) if reason == "Voting has not ended"
        );

        clock.advance(86_401);
        let tx = chain.execute_proposal(&org.governance_ref, 1).await.unwrap();
        let confirmation = chain.await_confirmation(&tx).await.unwrap();
        let executed: ProposalExecuted = find_event(&confirmation.logs).unwrap();
        assert_eq!(executed.proposal_id, 1);

        let treasury = chain.treasury(&org.governance_ref).await.unwrap();
        assert_eq!(treasury.balance, TokenAmount::from_tokens(60));
        assert_eq!(treasury.transactions.len(), 1);
        assert_eq!(treasury.transactions[0].proposal_id, Some(1));
        assert_eq!(treasury.transactions[0].kind, TreasuryTransactionKind::Payment);

        assert_matches!(
            chain.execute_proposal(&org.governance_ref, 1).await,
            Err(GovernanceError::BackendRejected { reason }) if reason == "Proposal already executed"
        );
    }

    #[tokio::test]
    async fn test_defeated_proposal_cannot_execute() {
        let (chain, clock, org) = chain_with_org().await;
        chain
            .create_proposal(&org.governance_ref, "Dissolve", "wind down", "0x")
            .await
            .unwrap();
        chain
            .cast_vote(&org.governance_ref, 1, false, "no")
            .await
            .unwrap();
        clock.advance(90_000);
        assert_matches!(
            chain.execute_proposal(&org.governance_ref, 1).await,
            Err(GovernanceError::BackendRejected { reason }) if reason == "Proposal did not pass"
        );
    }

    #[tokio::test]
    async fn test_execution_delay_is_enforced() {
        let clock = FixedClock::new(START);
        let chain = LocalChain::new(FOUNDER, Arc::new(clock.clone()));
        let settings = GovernanceSettings {
            execution_delay: 3_600,
            ..GovernanceSettings::default()
        };
        chain
            .create_organization("Slow DAO", "SLOW", TokenAmount::from_tokens(10_000), &settings)
            .await
            .unwrap();
        let org = chain.organization_at(0).await.unwrap();
        chain
            .create_proposal(&org.governance_ref, "Wait", "for it", "")
            .await
            .unwrap();
        chain.cast_vote(&org.governance_ref, 1, true, "").await.unwrap();

        clock.advance(86_401);
        assert_matches!(
            chain.execute_proposal(&org.governance_ref, 1).await,
            Err(GovernanceError::BackendRejected { reason }) if reason == "Execution delay has not elapsed"
        );
        clock.advance(3_600);
        assert!(chain.execute_proposal(&org.governance_ref, 1).await.is_ok());
    }

    #[test]
    fn test_non_instruction_payloads_decode_to_none() {
        assert_eq!(TreasuryInstruction::decode("0x"), None);
        assert_eq!(TreasuryInstruction::decode("0xdeadbeef"), None);
        assert_eq!(TreasuryInstruction::decode("not hex"), None);
    }
}
