//! In-memory view of organizations and proposals assembled from backend reads.
//!
//! Listings fetch a count and then every item by index with bounded concurrency. A failed
//! item is logged and skipped; the count the backend reported travels with the result so
//! callers can see the drift. The cached view is an immutable [`CatalogSnapshot`] that is
//! swapped whole on refresh, so a reader holding a snapshot never sees a partial update.
//!
//! Metadata and status exist only on this client. They are kept apart from the snapshot
//! and layered onto every organization the catalog hands out, so a failed fetch never
//! loses them.

use crate::amount::TokenAmount;
use crate::backend::ChainBackend;
use crate::clock::Clock;
use crate::error::{GovernanceError, Result};
use crate::lifecycle::resolve_state;
use crate::tally::tally;
use crate::types::{
    Address, GovernanceSettings, Member, Organization, OrganizationId, OrganizationMetadata,
    OrganizationStatus, Proposal, ProposalId, ProposalRecord, Timestamp, Treasury, Vote,
    VoteRecord,
};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Largest count a listing accepts from the backend unless configured otherwise
pub const DEFAULT_MAX_LISTED_ITEMS: u64 = 10_000;

/// Result of a listing: what came back and what the backend said exists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing<T> {
    /// Successfully fetched items, in index order
    pub items: Vec<T>,
    /// Count the backend reported
    pub reported: u64,
    /// Number of items returned
    pub returned: u64,
}

impl<T> Listing<T> {
    fn new(items: Vec<T>, reported: u64) -> Self {
        let returned = items.len() as u64;
        Self {
            items,
            reported,
            returned,
        }
    }

    /// Some reported items could not be fetched
    pub fn has_drift(&self) -> bool {
        self.reported != self.returned
    }
}

/// Immutable cached view of the registry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CatalogSnapshot {
    /// Organizations, ordered by id
    pub organizations: Vec<Organization>,
    /// Proposals per organization, ordered by id
    pub proposals: HashMap<OrganizationId, Vec<Proposal>>,
    /// Organization count reported at the last refresh
    pub reported_organizations: u64,
    /// Proposal counts reported per organization. Absent when no count was ever read.
    pub reported_proposals: HashMap<OrganizationId, u64>,
    /// Organizations whose proposal listing failed at the last refresh. Their proposals
    /// and reported count are carried over from the snapshot before.
    pub stale_proposals: BTreeSet<OrganizationId>,
    /// When the snapshot was built; `None` before the first refresh
    pub refreshed_at: Option<Timestamp>,
}

impl CatalogSnapshot {
    /// Cached organization by id
    pub fn organization(&self, id: OrganizationId) -> Option<&Organization> {
        self.organizations.iter().find(|o| o.id == id)
    }

    /// Cached proposals of an organization
    pub fn proposals(&self, organization_id: OrganizationId) -> &[Proposal] {
        self.proposals
            .get(&organization_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Cached proposal
    pub fn proposal(&self, organization_id: OrganizationId, id: ProposalId) -> Option<&Proposal> {
        self.proposals(organization_id).iter().find(|p| p.id == id)
    }

    /// Whether the proposals of an organization could not be re-read at the last refresh
    pub fn is_stale(&self, organization_id: OrganizationId) -> bool {
        self.stale_proposals.contains(&organization_id)
    }

    /// Anything the backend reported is missing from this snapshot
    pub fn has_drift(&self) -> bool {
        self.reported_organizations != self.organizations.len() as u64
            || !self.stale_proposals.is_empty()
            || self.organizations.iter().any(|org| {
                self.reported_proposals.get(&org.id).copied()
                    != Some(self.proposals(org.id).len() as u64)
            })
    }

    fn apply(&mut self, published: Published) {
        match published {
            Published::Organization(organization) => {
                self.reported_organizations = self
                    .reported_organizations
                    .max(organization.id.saturating_add(1));
                match self.organizations.iter_mut().find(|o| o.id == organization.id) {
                    Some(existing) => *existing = organization,
                    None => {
                        self.organizations.push(organization);
                        self.organizations.sort_by_key(|o| o.id);
                    }
                }
            }
            Published::Proposal(proposal) => {
                let reported = self
                    .reported_proposals
                    .entry(proposal.organization_id)
                    .or_insert(0);
                *reported = (*reported).max(proposal.id);
                let list = self.proposals.entry(proposal.organization_id).or_default();
                match list.iter_mut().find(|p| p.id == proposal.id) {
                    Some(existing) => *existing = proposal,
                    None => {
                        list.push(proposal);
                        list.sort_by_key(|p| p.id);
                    }
                }
            }
        }
    }
}

/// What proposal assembly needs to know about the owning organization
struct OrganizationContext {
    id: OrganizationId,
    governance: Address,
    total_supply: TokenAmount,
    settings: GovernanceSettings,
}

impl From<&Organization> for OrganizationContext {
    fn from(org: &Organization) -> Self {
        Self {
            id: org.id,
            governance: org.governance_address.clone(),
            total_supply: org.total_supply,
            settings: org.settings.clone(),
        }
    }
}

/// Build a proposal view from backend facts, deriving its figures and state at `now`
pub fn assemble_proposal(
    organization_id: OrganizationId,
    id: ProposalId,
    record: ProposalRecord,
    votes: Vec<VoteRecord>,
    total_supply: TokenAmount,
    settings: &GovernanceSettings,
    now: Timestamp,
) -> Proposal {
    let votes: Vec<Vote> = votes.into_iter().map(Vote::from).collect();
    let outcome = tally(&votes, total_supply, settings);
    let state = resolve_state(now, &record, &outcome);

    Proposal {
        id,
        organization_id,
        proposer: record.proposer,
        title: record.title,
        description: record.description,
        created_at: record.created_at,
        start_time: record.start_time,
        end_time: record.end_time,
        executed: record.executed,
        executed_at: record.executed_at,
        execution_payload: record.execution_payload,
        votes,
        total_votes: outcome.total_weight,
        for_votes: outcome.for_weight,
        against_votes: outcome.against_weight,
        state,
    }
}

/// Facts about an organization that only this client knows
#[derive(Debug, Clone, PartialEq)]
struct LocalFacts {
    metadata: OrganizationMetadata,
    status: OrganizationStatus,
}

impl LocalFacts {
    fn apply_to(&self, organization: &mut Organization) {
        organization.metadata = self.metadata.clone();
        organization.status = self.status;
    }
}

/// A write result published into the cache
#[derive(Debug, Clone)]
enum Published {
    Organization(Organization),
    Proposal(Proposal),
}

/// Everything behind the catalog lock
#[derive(Debug, Default)]
struct CacheState {
    snapshot: Arc<CatalogSnapshot>,
    local: HashMap<OrganizationId, LocalFacts>,
    /// Bumped on every publication
    sequence: u64,
    /// Publications a refresh in flight has not seen, tagged with their sequence
    journal: Vec<(u64, Published)>,
    /// Sequence at which each refresh in flight started
    refreshes_in_flight: Vec<u64>,
    /// Start sequence of the refresh that produced the current snapshot
    refreshed_from: Option<u64>,
}

impl CacheState {
    fn publish(&mut self, published: Published) {
        self.sequence += 1;
        let mut next = CatalogSnapshot::clone(&self.snapshot);
        if self.refreshes_in_flight.is_empty() {
            next.apply(published);
        } else {
            next.apply(published.clone());
            self.journal.push((self.sequence, published));
        }
        self.snapshot = Arc::new(next);
    }

    fn begin_refresh(&mut self) -> u64 {
        self.refreshes_in_flight.push(self.sequence);
        self.sequence
    }

    fn end_refresh(&mut self, started: u64) {
        if let Some(pos) = self.refreshes_in_flight.iter().position(|s| *s == started) {
            self.refreshes_in_flight.swap_remove(pos);
        }
        match self.refreshes_in_flight.iter().min().copied() {
            Some(oldest) => self.journal.retain(|(sequence, _)| *sequence > oldest),
            None => self.journal.clear(),
        }
    }
}

/// Organization and proposal cache over a [`ChainBackend`]
pub struct OrganizationCatalog {
    backend: Arc<dyn ChainBackend>,
    clock: Arc<dyn Clock>,
    concurrency: usize,
    max_items: u64,
    cache: RwLock<CacheState>,
}

impl OrganizationCatalog {
    /// Create an empty catalog fetching at most `concurrency` items at once
    pub fn new(backend: Arc<dyn ChainBackend>, clock: Arc<dyn Clock>, concurrency: usize) -> Self {
        Self {
            backend,
            clock,
            concurrency: concurrency.max(1),
            max_items: DEFAULT_MAX_LISTED_ITEMS,
            cache: RwLock::new(CacheState::default()),
        }
    }

    /// Reject listings whose reported count exceeds `max_items`
    pub fn with_max_items(mut self, max_items: u64) -> Self {
        self.max_items = max_items;
        self
    }

    /// Current snapshot
    pub async fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.cache.read().await.snapshot)
    }

    fn checked_count(&self, what: &str, reported: u64) -> Result<u64> {
        if reported > self.max_items {
            return Err(GovernanceError::InvalidResponse(format!(
                "backend reported {} {}s, more than the limit of {}",
                reported, what, self.max_items
            )));
        }
        Ok(reported)
    }

    /// Fetch every id with bounded concurrency into index-addressed slots.
    ///
    /// Failed fetches are logged and leave their slot empty.
    async fn fetch_indexed<T, F, Fut>(&self, what: &str, ids: Vec<u64>, fetch: F) -> Vec<T>
    where
        F: Fn(u64) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut slots: Vec<Option<T>> = ids.iter().map(|_| None).collect();

        let mut results = stream::iter(ids.into_iter().enumerate())
            .map(|(slot, id)| {
                let fetch = fetch(id);
                async move { (slot, id, fetch.await) }
            })
            .buffer_unordered(self.concurrency);

        while let Some((slot, id, result)) = results.next().await {
            match result {
                Ok(item) => slots[slot] = Some(item),
                Err(e) => warn!("Skipping {} {}: {}", what, id, e),
            }
        }

        slots.into_iter().flatten().collect()
    }

    /// Fetch one organization with its settings, supply, members and treasury
    async fn fetch_organization(&self, id: OrganizationId) -> Result<Organization> {
        let record = self.backend.organization_at(id).await?;

        let (settings, total_supply, members, treasury) = tokio::try_join!(
            self.backend.governance_settings(&record.governance_ref),
            self.backend.total_supply(&record.token_ref),
            self.backend.members(&record.governance_ref),
            self.backend.treasury(&record.governance_ref),
        )?;

        Ok(Organization {
            id,
            name: record.name,
            symbol: record.symbol,
            token_address: record.token_ref,
            governance_address: record.governance_ref,
            creator: record.creator,
            created_at: record.created_at,
            total_supply,
            member_count: members.iter().filter(|m| !m.balance.is_zero()).count() as u64,
            treasury_balance: treasury.balance,
            status: OrganizationStatus::Active,
            settings,
            metadata: OrganizationMetadata::default(),
        })
    }

    async fn apply_local_facts(&self, organizations: &mut [Organization]) {
        let state = self.cache.read().await;
        for org in organizations.iter_mut() {
            if let Some(facts) = state.local.get(&org.id) {
                facts.apply_to(org);
            }
        }
    }

    /// Context for proposal reads, read fresh from the backend
    async fn context(&self, organization_id: OrganizationId) -> Result<OrganizationContext> {
        let record = self.backend.organization_at(organization_id).await?;
        let (settings, total_supply) = tokio::try_join!(
            self.backend.governance_settings(&record.governance_ref),
            self.backend.total_supply(&record.token_ref),
        )?;
        Ok(OrganizationContext {
            id: organization_id,
            governance: record.governance_ref,
            total_supply,
            settings,
        })
    }

    async fn fetch_proposal(&self, ctx: &OrganizationContext, id: ProposalId) -> Result<Proposal> {
        let (record, votes) = tokio::try_join!(
            self.backend.proposal_at(&ctx.governance, id),
            self.backend.proposal_votes(&ctx.governance, id),
        )?;
        Ok(assemble_proposal(
            ctx.id,
            id,
            record,
            votes,
            ctx.total_supply,
            &ctx.settings,
            self.clock.now(),
        ))
    }

    async fn proposals_in(&self, ctx: &OrganizationContext) -> Result<Listing<Proposal>> {
        let reported = self.backend.proposal_count(&ctx.governance).await?;
        let reported = self.checked_count("proposal", reported)?;
        let ids: Vec<ProposalId> = (1..=reported).collect();
        let items = self
            .fetch_indexed("proposal", ids, |id| self.fetch_proposal(ctx, id))
            .await;

        debug!(
            "Listed {}/{} proposals of organization {}",
            items.len(),
            reported,
            ctx.id
        );
        Ok(Listing::new(items, reported))
    }

    /// List every organization, skipping items that fail to load
    pub async fn list_organizations(&self) -> Result<Listing<Organization>> {
        let reported = self.backend.organization_count().await?;
        let reported = self.checked_count("organization", reported)?;
        let ids: Vec<OrganizationId> = (0..reported).collect();
        let mut items = self
            .fetch_indexed("organization", ids, |id| self.fetch_organization(id))
            .await;
        self.apply_local_facts(&mut items).await;

        let listing = Listing::new(items, reported);
        if listing.has_drift() {
            warn!(
                "Listed {} of {} organizations",
                listing.returned, listing.reported
            );
        }
        Ok(listing)
    }

    /// One organization, or `NotFound`
    pub async fn get_organization(&self, id: OrganizationId) -> Result<Organization> {
        let mut org = self.fetch_organization(id).await?;
        self.apply_local_facts(std::slice::from_mut(&mut org)).await;
        Ok(org)
    }

    /// List an organization's proposals, skipping items that fail to load
    pub async fn list_proposals(&self, organization_id: OrganizationId) -> Result<Listing<Proposal>> {
        let ctx = self.context(organization_id).await?;
        self.proposals_in(&ctx).await
    }

    /// One proposal, or `NotFound`
    pub async fn get_proposal(
        &self,
        organization_id: OrganizationId,
        id: ProposalId,
    ) -> Result<Proposal> {
        let ctx = self.context(organization_id).await?;
        if id == 0 {
            return Err(GovernanceError::NotFound(format!(
                "proposal 0 of organization {}",
                organization_id
            )));
        }
        self.fetch_proposal(&ctx, id).await
    }

    /// Token holders of an organization
    pub async fn list_members(&self, organization_id: OrganizationId) -> Result<Vec<Member>> {
        let governance = self.governance_address(organization_id).await?;
        let members = self.backend.members(&governance).await?;
        Ok(members
            .into_iter()
            .map(|m| Member {
                address: m.address,
                organization_id,
                balance: m.balance,
                voting_power: m.balance,
                joined_at: m.joined_at,
                role: m.role,
                is_active: !m.balance.is_zero(),
            })
            .collect())
    }

    /// Treasury balance and history of an organization
    pub async fn treasury(&self, organization_id: OrganizationId) -> Result<Treasury> {
        let governance = self.governance_address(organization_id).await?;
        let record = self.backend.treasury(&governance).await?;
        Ok(Treasury {
            organization_id,
            balance: record.balance,
            transactions: record.transactions,
        })
    }

    /// Governance contract of an organization, from the snapshot or the backend
    pub async fn governance_address(&self, organization_id: OrganizationId) -> Result<Address> {
        if let Some(org) = self.snapshot().await.organization(organization_id) {
            return Ok(org.governance_address.clone());
        }
        Ok(self
            .backend
            .organization_at(organization_id)
            .await?
            .governance_ref)
    }

    /// Re-run the full listing and replace the cache in one step.
    ///
    /// An organization whose proposal listing fails keeps the proposals and count of the
    /// previous snapshot and is marked stale. Writes published while the listing runs are
    /// replayed onto the new snapshot. If the organization count itself cannot be read the
    /// cache is left untouched.
    pub async fn refresh(&self) -> Result<Arc<CatalogSnapshot>> {
        let started = self.cache.write().await.begin_refresh();
        let built = self.build_snapshot().await;
        let result = self.finish_refresh(started, built).await;
        if let Ok(snapshot) = &result {
            info!(
                "Catalog refreshed: {} organizations",
                snapshot.organizations.len()
            );
        }
        result
    }

    async fn build_snapshot(&self) -> Result<CatalogSnapshot> {
        let organizations = self.list_organizations().await?;
        let previous = self.snapshot().await;

        let mut proposals = HashMap::new();
        let mut reported_proposals = HashMap::new();
        let mut stale_proposals = BTreeSet::new();
        for org in &organizations.items {
            match self.proposals_in(&OrganizationContext::from(org)).await {
                Ok(listing) => {
                    reported_proposals.insert(org.id, listing.reported);
                    proposals.insert(org.id, listing.items);
                }
                Err(e) => {
                    warn!(
                        "Could not list proposals of organization {}, keeping cached ones: {}",
                        org.id, e
                    );
                    stale_proposals.insert(org.id);
                    if let Some(reported) = previous.reported_proposals.get(&org.id) {
                        reported_proposals.insert(org.id, *reported);
                    }
                    proposals.insert(org.id, previous.proposals(org.id).to_vec());
                }
            }
        }

        Ok(CatalogSnapshot {
            organizations: organizations.items,
            proposals,
            reported_organizations: organizations.reported,
            reported_proposals,
            stale_proposals,
            refreshed_at: Some(self.clock.now()),
        })
    }

    async fn finish_refresh(
        &self,
        started: u64,
        built: Result<CatalogSnapshot>,
    ) -> Result<Arc<CatalogSnapshot>> {
        let mut state = self.cache.write().await;
        let mut snapshot = match built {
            Ok(snapshot) => snapshot,
            Err(e) => {
                state.end_refresh(started);
                return Err(e);
            }
        };

        // A refresh that started later has already swapped in a newer view
        if state.refreshed_from.is_some_and(|newer| newer > started) {
            state.end_refresh(started);
            return Ok(Arc::clone(&state.snapshot));
        }

        for (_, published) in state.journal.iter().filter(|(seq, _)| *seq > started) {
            snapshot.apply(published.clone());
        }
        for org in &mut snapshot.organizations {
            if let Some(facts) = state.local.get(&org.id) {
                facts.apply_to(org);
            }
        }

        let snapshot = Arc::new(snapshot);
        state.snapshot = Arc::clone(&snapshot);
        state.refreshed_from = Some(started);
        state.end_refresh(started);
        Ok(snapshot)
    }

    /// Publish an organization into the cache, replacing any entry with the same id.
    ///
    /// Its metadata and status become the local facts for that id.
    pub async fn record_organization(&self, organization: Organization) {
        let mut state = self.cache.write().await;
        state.local.insert(
            organization.id,
            LocalFacts {
                metadata: organization.metadata.clone(),
                status: organization.status,
            },
        );
        state.publish(Published::Organization(organization));
    }

    /// Publish a proposal into the cache, replacing any entry with the same id
    pub async fn record_proposal(&self, proposal: Proposal) {
        self.cache
            .write()
            .await
            .publish(Published::Proposal(proposal));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockChainBackend;
    use crate::clock::FixedClock;
    use crate::types::{
        Category, MemberRecord, MemberRole, OrganizationRecord, ProposalState, TreasuryRecord,
    };
    use assert_matches::assert_matches;
    use mockall::predicate::eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn org_record(index: u64) -> OrganizationRecord {
        OrganizationRecord {
            name: format!("DAO {}", index),
            symbol: format!("D{}", index),
            token_ref: format!("0xtoken{}", index),
            governance_ref: format!("0xgov{}", index),
            creator: "0xcreator".to_string(),
            created_at: 1_000 + index as i64,
        }
    }

    fn stub_organization_reads(backend: &mut MockChainBackend) {
        backend
            .expect_governance_settings()
            .returning(|_| Ok(GovernanceSettings::default()));
        backend
            .expect_total_supply()
            .returning(|_| Ok(TokenAmount::from_tokens(1_000)));
        backend.expect_members().returning(|_| {
            Ok(vec![
                MemberRecord {
                    address: "0xcreator".to_string(),
                    balance: TokenAmount::from_tokens(1_000),
                    joined_at: 1_000,
                    role: MemberRole::Founder,
                },
                MemberRecord {
                    address: "0xleft".to_string(),
                    balance: TokenAmount::ZERO,
                    joined_at: 1_001,
                    role: MemberRole::Member,
                },
            ])
        });
        backend.expect_treasury().returning(|_| {
            Ok(TreasuryRecord {
                balance: TokenAmount::from_tokens(5),
                transactions: vec![],
            })
        });
    }

    fn catalog(backend: MockChainBackend, now: Timestamp) -> OrganizationCatalog {
        OrganizationCatalog::new(Arc::new(backend), Arc::new(FixedClock::new(now)), 2)
    }

    #[tokio::test]
    async fn test_list_organizations_skips_failed_item() {
        let mut backend = MockChainBackend::new();
        backend.expect_organization_count().returning(|| Ok(3));
        backend.expect_organization_at().returning(|index| {
            if index == 1 {
                Err(GovernanceError::Network("connection reset".to_string()))
            } else {
                Ok(org_record(index))
            }
        });
        stub_organization_reads(&mut backend);

        let listing = catalog(backend, 2_000).list_organizations().await.unwrap();
        assert_eq!(listing.reported, 3);
        assert_eq!(listing.returned, 2);
        assert!(listing.has_drift());
        let ids: Vec<_> = listing.items.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![0, 2]);
        assert_eq!(listing.items[0].member_count, 1);
        assert_eq!(listing.items[0].treasury_balance, TokenAmount::from_tokens(5));
    }

    #[tokio::test]
    async fn test_count_failure_is_surfaced() {
        let mut backend = MockChainBackend::new();
        backend
            .expect_organization_count()
            .returning(|| Err(GovernanceError::Network("down".to_string())));
        let catalog = catalog(backend, 0);
        assert_matches!(
            catalog.list_organizations().await,
            Err(GovernanceError::Network(_))
        );
        assert_matches!(catalog.refresh().await, Err(GovernanceError::Network(_)));
        assert_eq!(catalog.snapshot().await.refreshed_at, None);
    }

    #[tokio::test]
    async fn test_get_organization_not_found() {
        let mut backend = MockChainBackend::new();
        backend
            .expect_organization_at()
            .with(eq(9))
            .returning(|_| Err(GovernanceError::NotFound("organization 9".to_string())));
        assert_matches!(
            catalog(backend, 0).get_organization(9).await,
            Err(GovernanceError::NotFound(_))
        );
    }

    fn proposal_record() -> ProposalRecord {
        ProposalRecord {
            title: "Fund grant".to_string(),
            description: "10 tokens".to_string(),
            proposer: "0xcreator".to_string(),
            created_at: 100,
            start_time: 100,
            end_time: 200,
            executed: false,
            executed_at: None,
            execution_payload: None,
            cancelled: false,
        }
    }

    #[tokio::test]
    async fn test_list_proposals_derives_state_from_clock() {
        let mut backend = MockChainBackend::new();
        backend
            .expect_organization_at()
            .returning(|index| Ok(org_record(index)));
        stub_organization_reads(&mut backend);
        backend.expect_proposal_count().returning(|_| Ok(2));
        backend
            .expect_proposal_at()
            .returning(|_, _| Ok(proposal_record()));
        backend.expect_proposal_votes().returning(|_, id| {
            Ok(vec![VoteRecord {
                voter: "0xcreator".to_string(),
                support: id == 1,
                weight: TokenAmount::from_tokens(500),
                reason: None,
                timestamp: 150,
            }])
        });

        let listing = catalog(backend, 250).list_proposals(0).await.unwrap();
        assert!(!listing.has_drift());
        assert_eq!(listing.items.len(), 2);
        assert_eq!(listing.items[0].id, 1);
        assert_eq!(listing.items[0].state, ProposalState::Succeeded);
        assert_eq!(listing.items[1].state, ProposalState::Defeated);
        assert_eq!(listing.items[1].against_votes, TokenAmount::from_tokens(500));
    }

    #[tokio::test]
    async fn test_refresh_swaps_snapshot_and_keeps_old_readers_intact() {
        let mut backend = MockChainBackend::new();
        backend.expect_organization_count().returning(|| Ok(1));
        backend
            .expect_organization_at()
            .returning(|index| Ok(org_record(index)));
        stub_organization_reads(&mut backend);
        backend.expect_proposal_count().returning(|_| Ok(0));

        let catalog = catalog(backend, 500);
        let before = catalog.snapshot().await;
        let after = catalog.refresh().await.unwrap();

        assert!(before.organizations.is_empty());
        assert_eq!(after.organizations.len(), 1);
        assert_eq!(after.refreshed_at, Some(500));
        assert_eq!(after.reported_proposals.get(&0), Some(&0));
        assert!(Arc::ptr_eq(&after, &catalog.snapshot().await));
    }

    #[tokio::test]
    async fn test_record_proposal_is_copy_on_write() {
        let backend = MockChainBackend::new();
        let catalog = catalog(backend, 0);
        let before = catalog.snapshot().await;

        let proposal = assemble_proposal(
            3,
            1,
            proposal_record(),
            vec![],
            TokenAmount::from_tokens(1),
            &GovernanceSettings::default(),
            150,
        );
        catalog.record_proposal(proposal).await;

        assert!(before.proposals.is_empty());
        let after = catalog.snapshot().await;
        assert_eq!(after.proposals(3).len(), 1);
        assert_eq!(
            after.proposal(3, 1).map(|p| p.state),
            Some(ProposalState::Active)
        );
    }

    fn organization(
        id: OrganizationId,
        category: Category,
        status: OrganizationStatus,
    ) -> Organization {
        let record = org_record(id);
        Organization {
            id,
            name: record.name,
            symbol: record.symbol,
            token_address: record.token_ref,
            governance_address: record.governance_ref,
            creator: record.creator,
            created_at: record.created_at,
            total_supply: TokenAmount::from_tokens(1_000),
            member_count: 1,
            treasury_balance: TokenAmount::ZERO,
            status,
            settings: GovernanceSettings::default(),
            metadata: OrganizationMetadata {
                description: "Guild treasury".to_string(),
                category,
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn test_failed_proposal_listing_keeps_previous_proposals() {
        let mut backend = MockChainBackend::new();
        backend.expect_organization_count().returning(|| Ok(1));
        backend
            .expect_organization_at()
            .returning(|index| Ok(org_record(index)));
        stub_organization_reads(&mut backend);
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        backend.expect_proposal_count().returning(move |_| {
            if counted.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(2)
            } else {
                Err(GovernanceError::Network("gateway restarting".to_string()))
            }
        });
        backend
            .expect_proposal_at()
            .returning(|_, _| Ok(proposal_record()));
        backend.expect_proposal_votes().returning(|_, _| Ok(vec![]));

        let catalog = catalog(backend, 150);
        let first = catalog.refresh().await.unwrap();
        assert_eq!(first.proposals(0).len(), 2);
        assert!(!first.is_stale(0));
        assert!(!first.has_drift());

        let second = catalog.refresh().await.unwrap();
        assert!(second.is_stale(0));
        assert!(second.has_drift());
        assert_eq!(second.reported_proposals.get(&0), Some(&2));
        assert_eq!(second.proposals(0).len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unread_proposal_count_is_absent_not_zero() {
        let mut backend = MockChainBackend::new();
        backend.expect_organization_count().returning(|| Ok(1));
        backend
            .expect_organization_at()
            .returning(|index| Ok(org_record(index)));
        stub_organization_reads(&mut backend);
        backend
            .expect_proposal_count()
            .returning(|_| Err(GovernanceError::Network("down".to_string())));

        let snapshot = catalog(backend, 150).refresh().await.unwrap();
        assert_eq!(snapshot.organizations.len(), 1);
        assert!(snapshot.is_stale(0));
        assert_eq!(snapshot.reported_proposals.get(&0), None);
        assert!(snapshot.proposals(0).is_empty());
        assert!(snapshot.has_drift());
    }

    #[tokio::test]
    async fn test_local_facts_survive_transient_item_failure() {
        let mut backend = MockChainBackend::new();
        backend.expect_organization_count().returning(|| Ok(1));
        let calls = Arc::new(AtomicUsize::new(0));
        backend.expect_organization_at().returning(move |index| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(GovernanceError::Network("connection reset".to_string()))
            } else {
                Ok(org_record(index))
            }
        });
        stub_organization_reads(&mut backend);
        backend.expect_proposal_count().returning(|_| Ok(0));

        let catalog = catalog(backend, 500);
        catalog
            .record_organization(organization(0, Category::Gaming, OrganizationStatus::Paused))
            .await;

        let during = catalog.refresh().await.unwrap();
        assert!(during.organizations.is_empty());
        assert_eq!(during.reported_organizations, 1);
        assert!(during.has_drift());

        let after = catalog.refresh().await.unwrap();
        let org = after.organization(0).unwrap();
        assert_eq!(org.metadata.category, Category::Gaming);
        assert_eq!(org.metadata.description, "Guild treasury");
        assert_eq!(org.status, OrganizationStatus::Paused);

        let fetched = catalog.get_organization(0).await.unwrap();
        assert_eq!(fetched.metadata.category, Category::Gaming);
    }

    #[tokio::test]
    async fn test_refresh_replays_writes_published_while_listing() {
        let mut backend = MockChainBackend::new();
        backend.expect_organization_count().returning(|| Ok(1));
        backend
            .expect_organization_at()
            .returning(|index| Ok(org_record(index)));
        stub_organization_reads(&mut backend);
        backend.expect_proposal_count().returning(|_| Ok(0));

        let catalog = catalog(backend, 500);
        let started = catalog.cache.write().await.begin_refresh();
        let built = catalog.build_snapshot().await;

        // Published after the listing read its counts
        catalog
            .record_organization(organization(1, Category::Defi, OrganizationStatus::Active))
            .await;
        let proposal = assemble_proposal(
            0,
            1,
            proposal_record(),
            vec![],
            TokenAmount::from_tokens(1_000),
            &GovernanceSettings::default(),
            150,
        );
        catalog.record_proposal(proposal).await;

        let snapshot = catalog.finish_refresh(started, built).await.unwrap();
        let ids: Vec<_> = snapshot.organizations.iter().map(|o| o.id).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(snapshot.reported_organizations, 2);
        assert_eq!(
            snapshot.organization(1).map(|o| o.metadata.category),
            Some(Category::Defi)
        );
        assert!(snapshot.proposal(0, 1).is_some());
        assert!(Arc::ptr_eq(&snapshot, &catalog.snapshot().await));

        let state = catalog.cache.read().await;
        assert!(state.journal.is_empty());
        assert!(state.refreshes_in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_oversized_counts_are_rejected() {
        let mut backend = MockChainBackend::new();
        backend.expect_organization_count().returning(|| Ok(u64::MAX));
        backend
            .expect_organization_at()
            .returning(|index| Ok(org_record(index)));
        stub_organization_reads(&mut backend);
        backend.expect_proposal_count().returning(|_| Ok(101));

        let catalog = catalog(backend, 0).with_max_items(100);
        assert_matches!(
            catalog.list_organizations().await,
            Err(GovernanceError::InvalidResponse(_))
        );
        assert_matches!(
            catalog.list_proposals(0).await,
            Err(GovernanceError::InvalidResponse(_))
        );
        assert_matches!(catalog.refresh().await, Err(GovernanceError::InvalidResponse(_)));
        assert!(catalog.cache.read().await.refreshes_in_flight.is_empty());
    }
}
