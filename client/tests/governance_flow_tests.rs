//! End-to-end governance flows against the in-process simulated chain

use async_trait::async_trait;
use dao_world_client::types::{
    MemberRecord, OrganizationRecord, ProposalRecord, TreasuryRecord, VoteRecord,
};
use dao_world_client::{
    CastVote, Category, ChainBackend, ClientConfig, Confirmation, ExecuteProposal, FixedClock,
    GovernanceCoordinator, GovernanceError, GovernanceSettings, LocalChain, Organization,
    OrganizationFilter, OrganizationMetadata, OrganizationStatus, ProposalId, ProposalState,
    RegisterOrganization, Result, SettingsOverrides, SubmitProposal, TokenAmount,
    TreasuryInstruction, TreasuryTransactionKind, TxHandle,
};
use std::sync::Arc;

const FOUNDER: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
const MEMBER: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";
const WHALE: &str = "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC";
const GENESIS: i64 = 1_700_000_000;
const DAY: i64 = 86_400;

struct Harness {
    chain: LocalChain,
    clock: FixedClock,
    founder: GovernanceCoordinator,
}

impl Harness {
    fn new() -> Self {
        let config = ClientConfig::simulated();
        let clock = FixedClock::new(GENESIS);
        let chain = LocalChain::new(FOUNDER, Arc::new(clock.clone()));
        let founder =
            GovernanceCoordinator::new(config, Arc::new(chain.clone()), Arc::new(clock.clone()));
        Self {
            chain,
            clock,
            founder,
        }
    }

    fn coordinator_for(&self, signer: &str) -> GovernanceCoordinator {
        GovernanceCoordinator::new(
            ClientConfig::simulated(),
            Arc::new(self.chain.connect(signer)),
            Arc::new(self.clock.clone()),
        )
    }

    async fn register(&self, name: &str, symbol: &str, supply: &str) -> Organization {
        self.founder
            .register_organization(RegisterOrganization {
                name: name.to_string(),
                symbol: symbol.to_string(),
                initial_supply: supply.to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
            .into_value()
            .unwrap()
    }

    async fn propose(&self, organization: &Organization, payload: Option<String>) -> ProposalId {
        self.founder
            .submit_proposal(SubmitProposal {
                organization_id: organization.id,
                title: "Fund the grant".to_string(),
                description: "Pay the grant from the treasury".to_string(),
                execution_payload: payload,
            })
            .await
            .unwrap()
            .value()
            .map(|p| p.id)
            .unwrap()
    }

    async fn vote(
        &self,
        coordinator: &GovernanceCoordinator,
        org: &Organization,
        id: ProposalId,
        support: bool,
    ) {
        coordinator
            .cast_vote(CastVote {
                organization_id: org.id,
                proposal_id: id,
                support,
                reason: None,
            })
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_registration_yields_active_organization() {
    let harness = Harness::new();
    let organization = harness.register("Test DAO", "TST", "1000000").await;

    assert_eq!(organization.status, OrganizationStatus::Active);
    assert_eq!(organization.total_supply.to_string(), "1000000");
    assert_eq!(organization.creator, FOUNDER);

    let fetched = harness.founder.organization(organization.id).await.unwrap();
    assert_eq!(fetched.total_supply, TokenAmount::from_tokens(1_000_000));
    assert_eq!(fetched.member_count, 1);

    let members = harness.founder.members(organization.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].voting_power, members[0].balance);
    assert!(members[0].is_active);
}

#[tokio::test]
async fn test_metadata_and_settings_survive_refresh() {
    let harness = Harness::new();
    harness
        .founder
        .register_organization(RegisterOrganization {
            name: "Guild".to_string(),
            symbol: "GLD".to_string(),
            initial_supply: "5000".to_string(),
            metadata: OrganizationMetadata {
                description: "Gaming guild".to_string(),
                category: Category::Gaming,
                ..Default::default()
            },
            settings: SettingsOverrides {
                quorum_percent: Some(30),
                ..Default::default()
            },
        })
        .await
        .unwrap();

    let snapshot = harness.founder.refresh().await.unwrap();
    let organization = snapshot.organization(0).unwrap();
    assert_eq!(organization.metadata.category, Category::Gaming);
    assert_eq!(organization.settings.quorum_percent, 30);

    let gaming = OrganizationFilter {
        category: Some(Category::Gaming),
        ..Default::default()
    };
    let page = harness
        .founder
        .search_organizations(&gaming, 1, 10)
        .await
        .unwrap();
    assert_eq!(page.total, 1);
}

/// Delegates to a local chain but fails to serve one organization index
struct FlakyBackend {
    inner: LocalChain,
    failing_index: u64,
}

#[async_trait]
impl ChainBackend for FlakyBackend {
    async fn create_organization(
        &self,
        name: &str,
        symbol: &str,
        initial_supply: TokenAmount,
        settings: &GovernanceSettings,
    ) -> Result<TxHandle> {
        self.inner
            .create_organization(name, symbol, initial_supply, settings)
            .await
    }

    async fn organization_count(&self) -> Result<u64> {
        self.inner.organization_count().await
    }

    async fn organization_at(&self, index: u64) -> Result<OrganizationRecord> {
        if index == self.failing_index {
            return Err(GovernanceError::Network("connection reset".to_string()));
        }
        self.inner.organization_at(index).await
    }

    async fn create_proposal(
        &self,
        governance: &str,
        title: &str,
        description: &str,
        execution_payload: &str,
    ) -> Result<TxHandle> {
        self.inner
            .create_proposal(governance, title, description, execution_payload)
            .await
    }

    async fn cast_vote(
        &self,
        governance: &str,
        proposal_id: ProposalId,
        support: bool,
        reason: &str,
    ) -> Result<TxHandle> {
        self.inner
            .cast_vote(governance, proposal_id, support, reason)
            .await
    }

    async fn execute_proposal(&self, governance: &str, proposal_id: ProposalId) -> Result<TxHandle> {
        self.inner.execute_proposal(governance, proposal_id).await
    }

    async fn proposal_count(&self, governance: &str) -> Result<u64> {
        self.inner.proposal_count(governance).await
    }

    async fn proposal_at(&self, governance: &str, proposal_id: ProposalId) -> Result<ProposalRecord> {
        self.inner.proposal_at(governance, proposal_id).await
    }

    async fn proposal_votes(
        &self,
        governance: &str,
        proposal_id: ProposalId,
    ) -> Result<Vec<VoteRecord>> {
        self.inner.proposal_votes(governance, proposal_id).await
    }

    async fn governance_settings(&self, governance: &str) -> Result<GovernanceSettings> {
        self.inner.governance_settings(governance).await
    }

    async fn total_supply(&self, token: &str) -> Result<TokenAmount> {
        self.inner.total_supply(token).await
    }

    async fn members(&self, governance: &str) -> Result<Vec<MemberRecord>> {
        self.inner.members(governance).await
    }

    async fn treasury(&self, governance: &str) -> Result<TreasuryRecord> {
        self.inner.treasury(governance).await
    }

    async fn await_confirmation(&self, tx: &TxHandle) -> Result<Confirmation> {
        self.inner.await_confirmation(tx).await
    }
}

#[tokio::test]
async fn test_listing_reports_drift_when_one_item_fails() {
    let clock = FixedClock::new(GENESIS);
    let chain = LocalChain::new(FOUNDER, Arc::new(clock.clone()));
    let backend = Arc::new(FlakyBackend {
        inner: chain,
        failing_index: 1,
    });
    let coordinator =
        GovernanceCoordinator::new(ClientConfig::simulated(), backend, Arc::new(clock));

    for (name, symbol) in [("First", "ONE"), ("Second", "TWO"), ("Third", "THREE")] {
        coordinator
            .register_organization(RegisterOrganization {
                name: name.to_string(),
                symbol: symbol.to_string(),
                initial_supply: "100".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let listing = coordinator.organizations().await.unwrap();
    assert_eq!(listing.reported, 3);
    assert_eq!(listing.returned, 2);
    let names: Vec<_> = listing.items.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["First", "Third"]);

    let snapshot = coordinator.refresh().await.unwrap();
    assert_eq!(snapshot.reported_organizations, 3);
    assert_eq!(snapshot.organizations.len(), 2);
}

#[tokio::test]
async fn test_succeeded_proposal_executes_treasury_payment() {
    let harness = Harness::new();
    let organization = harness.register("Test DAO", "TST", "1000000").await;
    harness
        .chain
        .fund_treasury(
            &organization.governance_address,
            TokenAmount::from_tokens(1_000),
        )
        .await
        .unwrap();

    let payment = TreasuryInstruction {
        kind: TreasuryTransactionKind::Payment,
        recipient: MEMBER.to_string(),
        amount: TokenAmount::from_tokens(250),
        description: "grant".to_string(),
    };
    let id = harness
        .propose(&organization, Some(payment.encode().unwrap()))
        .await;

    let proposal = harness.founder.proposal(organization.id, id).await.unwrap();
    assert_eq!(proposal.state, ProposalState::Active);

    harness.vote(&harness.founder, &organization, id, true).await;
    harness.clock.advance(DAY + 1);

    let proposal = harness.founder.proposal(organization.id, id).await.unwrap();
    assert_eq!(proposal.state, ProposalState::Succeeded);
    assert_eq!(proposal.for_votes, TokenAmount::from_tokens(1_000_000));

    let outcome = harness
        .founder
        .execute_proposal(ExecuteProposal {
            organization_id: organization.id,
            proposal_id: id,
        })
        .await
        .unwrap();
    assert_eq!(outcome.value().map(|e| e.proposal_id), Some(id));

    let proposal = harness.founder.proposal(organization.id, id).await.unwrap();
    assert_eq!(proposal.state, ProposalState::Executed);
    assert!(proposal.executed_at.is_some());

    let treasury = harness.founder.treasury(organization.id).await.unwrap();
    assert_eq!(treasury.balance, TokenAmount::from_tokens(750));
    assert_eq!(treasury.transactions.len(), 1);
    assert_eq!(treasury.transactions[0].recipient, MEMBER);

    // The catalog picked up the executed proposal
    let snapshot = harness.founder.catalog().snapshot().await;
    assert_eq!(
        snapshot.proposal(organization.id, id).map(|p| p.state),
        Some(ProposalState::Executed)
    );
}

#[tokio::test]
async fn test_defeated_by_threshold() {
    let harness = Harness::new();
    let organization = harness.register("Test DAO", "TST", "1000000").await;
    harness
        .chain
        .mint(
            &organization.token_address,
            MEMBER,
            TokenAmount::from_tokens(3_000_000),
        )
        .await
        .unwrap();

    let id = harness.propose(&organization, None).await;
    let member = harness.coordinator_for(MEMBER);
    harness.vote(&harness.founder, &organization, id, true).await;
    harness.vote(&member, &organization, id, false).await;
    harness.clock.advance(DAY + 1);

    let proposal = harness.founder.proposal(organization.id, id).await.unwrap();
    assert_eq!(proposal.state, ProposalState::Defeated);
    assert_eq!(proposal.total_votes, TokenAmount::from_tokens(4_000_000));

    let result = harness
        .founder
        .execute_proposal(ExecuteProposal {
            organization_id: organization.id,
            proposal_id: id,
        })
        .await;
    assert!(matches!(
        result,
        Err(GovernanceError::BackendRejected { .. })
    ));
}

#[tokio::test]
async fn test_defeated_by_quorum() {
    let harness = Harness::new();
    let organization = harness.register("Test DAO", "TST", "1000000").await;
    harness
        .chain
        .mint(
            &organization.token_address,
            WHALE,
            TokenAmount::from_tokens(99_000_000),
        )
        .await
        .unwrap();

    let id = harness.propose(&organization, None).await;
    harness.vote(&harness.founder, &organization, id, true).await;
    harness.clock.advance(DAY + 1);

    // 1% participation against a 10% quorum
    let proposal = harness.founder.proposal(organization.id, id).await.unwrap();
    assert_eq!(proposal.state, ProposalState::Defeated);

    let stats = harness.founder.stats(organization.id).await.unwrap();
    assert_eq!(stats.total_members, 2);
    assert_eq!(stats.total_votes, 1);
    assert_eq!(stats.average_participation_bps, 100);
    assert_eq!(stats.active_proposals, 0);
}

#[tokio::test]
async fn test_cancellation_passes_through() {
    let harness = Harness::new();
    let organization = harness.register("Test DAO", "TST", "1000000").await;
    let id = harness.propose(&organization, None).await;

    harness
        .chain
        .cancel_proposal(&organization.governance_address, id)
        .await
        .unwrap();

    let proposal = harness.founder.proposal(organization.id, id).await.unwrap();
    assert_eq!(proposal.state, ProposalState::Cancelled);
}

#[tokio::test]
async fn test_voting_twice_is_backend_policy() {
    let harness = Harness::new();
    let organization = harness.register("Test DAO", "TST", "1000000").await;
    let id = harness.propose(&organization, None).await;
    harness.vote(&harness.founder, &organization, id, true).await;

    let again = harness
        .founder
        .cast_vote(CastVote {
            organization_id: organization.id,
            proposal_id: id,
            support: false,
            reason: Some("changed my mind".to_string()),
        })
        .await;
    match again {
        Err(GovernanceError::BackendRejected { reason }) => assert_eq!(reason, "Already voted"),
        other => panic!("expected backend rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_organization_is_not_found() {
    let harness = Harness::new();
    assert!(matches!(
        harness.founder.organization(3).await,
        Err(GovernanceError::NotFound(_))
    ));
    assert!(matches!(
        harness
            .founder
            .submit_proposal(SubmitProposal {
                organization_id: 3,
                title: "Orphan".to_string(),
                description: "No such organization".to_string(),
                execution_payload: None,
            })
            .await,
        Err(GovernanceError::NotFound(_))
    ));
}
