//! Governance coordinator: the write path and the read path.
//!
//! Every write follows the same steps: validate locally, submit to the backend, wait for
//! confirmation, then look for the descriptive event in the confirmation's logs. A
//! confirmed write whose event cannot be found is still a success, reported as
//! [`WriteOutcome::Degraded`].

use crate::amount::TokenAmount;
use crate::backend::{ChainBackend, Confirmation, LocalChain, RpcBackend, TxHandle};
use crate::catalog::{assemble_proposal, CatalogSnapshot, Listing, OrganizationCatalog};
use crate::clock::{Clock, SystemClock};
use crate::config::{BackendKind, ClientConfig};
use crate::error::{GovernanceError, Result};
use crate::events::{
    find_event, OrganizationCreated, ProposalCreated, ProposalExecuted, VoteCast,
};
use crate::query::{organization_stats, paginate, OrganizationFilter, ProposalFilter};
use crate::types::{
    GovernanceSettings, Member, Organization, OrganizationId, OrganizationMetadata,
    OrganizationStats, OrganizationStatus, Page, Proposal, ProposalId, ProposalRecord,
    SettingsOverrides, Treasury, Vote,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Longest accepted token symbol
pub const MAX_SYMBOL_LEN: usize = 10;

/// Request to register a new organization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterOrganization {
    /// Display name
    pub name: String,
    /// Token symbol; normalized to uppercase
    pub symbol: String,
    /// Initial token supply as a decimal string, minted to the signer
    pub initial_supply: String,
    /// Description, category, tags and links
    pub metadata: OrganizationMetadata,
    /// Settings that differ from the configured defaults
    pub settings: SettingsOverrides,
}

/// Request to open a proposal
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubmitProposal {
    /// Organization voting on it
    pub organization_id: OrganizationId,
    /// Short title
    pub title: String,
    /// Full description
    pub description: String,
    /// Opaque `0x`-prefixed hex payload run on execution
    pub execution_payload: Option<String>,
}

/// Request to vote on a proposal with the signer's full balance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CastVote {
    /// Organization
    pub organization_id: OrganizationId,
    /// Proposal
    pub proposal_id: ProposalId,
    /// `true` for, `false` against
    pub support: bool,
    /// Optional justification
    pub reason: Option<String>,
}

/// Request to execute a proposal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecuteProposal {
    /// Organization
    pub organization_id: OrganizationId,
    /// Proposal
    pub proposal_id: ProposalId,
}

/// Result of a confirmed write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    /// Confirmed, and the descriptive event was decoded into `value`
    Enriched {
        /// Backend confirmation
        confirmation: Confirmation,
        /// Decoded result
        value: T,
    },
    /// Confirmed, but the descriptive event could not be found
    Degraded {
        /// Backend confirmation
        confirmation: Confirmation,
        /// Why enrichment failed
        reason: String,
    },
}

impl<T> WriteOutcome<T> {
    /// Confirmation backing this outcome
    pub fn confirmation(&self) -> &Confirmation {
        match self {
            WriteOutcome::Enriched { confirmation, .. } => confirmation,
            WriteOutcome::Degraded { confirmation, .. } => confirmation,
        }
    }

    /// Enriched value, if any
    pub fn value(&self) -> Option<&T> {
        match self {
            WriteOutcome::Enriched { value, .. } => Some(value),
            WriteOutcome::Degraded { .. } => None,
        }
    }

    /// Consume into the enriched value, if any
    pub fn into_value(self) -> Option<T> {
        match self {
            WriteOutcome::Enriched { value, .. } => Some(value),
            WriteOutcome::Degraded { .. } => None,
        }
    }

    /// Whether enrichment failed
    pub fn is_degraded(&self) -> bool {
        matches!(self, WriteOutcome::Degraded { .. })
    }
}

/// Trim and uppercase a symbol, rejecting empty, overlong or non-alphanumeric ones
pub fn normalize_symbol(symbol: &str) -> Result<String> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(GovernanceError::Validation("symbol is required".to_string()));
    }
    if symbol.chars().count() > MAX_SYMBOL_LEN {
        return Err(GovernanceError::Validation(format!(
            "symbol {:?} is longer than {} characters",
            symbol, MAX_SYMBOL_LEN
        )));
    }
    if !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(GovernanceError::Validation(format!(
            "symbol {:?} must be alphanumeric",
            symbol
        )));
    }
    Ok(symbol)
}

fn require(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(GovernanceError::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

fn require_proposal_id(proposal_id: ProposalId) -> Result<()> {
    if proposal_id == 0 {
        return Err(GovernanceError::Validation(
            "proposal ids start at 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_payload(payload: Option<&str>) -> Result<String> {
    let Some(payload) = payload.map(str::trim).filter(|p| !p.is_empty()) else {
        return Ok("0x".to_string());
    };
    let digits = payload.strip_prefix("0x").ok_or_else(|| {
        GovernanceError::Validation("execution payload must be 0x-prefixed hex".to_string())
    })?;
    hex::decode(digits).map_err(|e| {
        GovernanceError::Validation(format!("execution payload is not valid hex: {}", e))
    })?;
    Ok(payload.to_string())
}

/// Fill `overrides` on top of `defaults` and check the result
pub fn merge_settings(
    defaults: &GovernanceSettings,
    overrides: &SettingsOverrides,
) -> Result<GovernanceSettings> {
    let min_proposal_tokens = match overrides.min_proposal_tokens.as_deref() {
        Some(amount) => TokenAmount::parse_decimal(amount)?,
        None => defaults.min_proposal_tokens,
    };
    let settings = GovernanceSettings {
        min_voting_period: overrides
            .min_voting_period
            .unwrap_or(defaults.min_voting_period),
        max_voting_period: overrides
            .max_voting_period
            .unwrap_or(defaults.max_voting_period),
        quorum_percent: overrides.quorum_percent.unwrap_or(defaults.quorum_percent),
        voting_threshold_percent: overrides
            .voting_threshold_percent
            .unwrap_or(defaults.voting_threshold_percent),
        min_proposal_tokens,
        execution_delay: overrides.execution_delay.unwrap_or(defaults.execution_delay),
    };
    settings.validate().map_err(GovernanceError::Validation)?;
    Ok(settings)
}

/// Entry point for governance reads and writes
pub struct GovernanceCoordinator {
    config: Arc<ClientConfig>,
    backend: Arc<dyn ChainBackend>,
    clock: Arc<dyn Clock>,
    catalog: OrganizationCatalog,
}

impl GovernanceCoordinator {
    /// Create a coordinator over an explicit backend and clock
    pub fn new(config: ClientConfig, backend: Arc<dyn ChainBackend>, clock: Arc<dyn Clock>) -> Self {
        let catalog = OrganizationCatalog::new(
            Arc::clone(&backend),
            Arc::clone(&clock),
            config.listing_concurrency,
        )
        .with_max_items(config.max_listing_items);
        Self {
            config: Arc::new(config),
            backend,
            clock,
            catalog,
        }
    }

    /// Create a coordinator on the backend the configuration names
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let backend: Arc<dyn ChainBackend> = match config.backend {
            BackendKind::Rpc => {
                info!("Using governance gateway at {}", config.rpc_url);
                Arc::new(RpcBackend::new(Arc::new(config.clone()))?)
            }
            BackendKind::Local => {
                info!("Using in-process simulated chain");
                Arc::new(LocalChain::from_config(&config, Arc::clone(&clock)))
            }
        };
        Ok(Self::new(config, backend, clock))
    }

    /// Configuration in use
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Underlying catalog
    pub fn catalog(&self) -> &OrganizationCatalog {
        &self.catalog
    }

    async fn submit_and_confirm(&self, what: &str, tx: TxHandle) -> Result<Confirmation> {
        debug!("{} submitted as {}", what, tx.hash);
        let confirmation = self.backend.await_confirmation(&tx).await?;
        info!(
            "{} confirmed in block {} ({})",
            what, confirmation.block_number, confirmation.transaction_hash
        );
        Ok(confirmation)
    }

    fn confirmed_at(&self, confirmation: &Confirmation) -> i64 {
        confirmation
            .block_timestamp
            .unwrap_or_else(|| self.clock.now())
    }

    /// Re-read a proposal after a write and publish it; failures only cost freshness
    async fn republish_proposal(&self, organization_id: OrganizationId, proposal_id: ProposalId) {
        match self.catalog.get_proposal(organization_id, proposal_id).await {
            Ok(proposal) => self.catalog.record_proposal(proposal).await,
            Err(e) => warn!(
                "Could not re-read proposal {} of organization {}: {}",
                proposal_id, organization_id, e
            ),
        }
    }

    /// Register a new organization
    pub async fn register_organization(
        &self,
        request: RegisterOrganization,
    ) -> Result<WriteOutcome<Organization>> {
        let name = require("name", &request.name)?;
        let symbol = normalize_symbol(&request.symbol)?;
        let initial_supply = TokenAmount::parse_positive(&request.initial_supply)?;
        let settings = merge_settings(&self.config.default_settings, &request.settings)?;

        info!("Registering organization {} ({})", name, symbol);
        let tx = self
            .backend
            .create_organization(&name, &symbol, initial_supply, &settings)
            .await?;
        let confirmation = self.submit_and_confirm("Registration", tx).await?;

        let event = match find_event::<OrganizationCreated>(&confirmation.logs) {
            Ok(event) => event,
            Err(e) => {
                warn!("Registration confirmed without a creation event: {}", e);
                return Ok(WriteOutcome::Degraded {
                    confirmation,
                    reason: e.to_string(),
                });
            }
        };

        let organization = Organization {
            id: event.org_id,
            name: event.name,
            symbol: event.symbol,
            token_address: event.token_ref,
            governance_address: event.governance_ref,
            creator: event.creator,
            created_at: self.confirmed_at(&confirmation),
            total_supply: initial_supply,
            member_count: 1,
            treasury_balance: TokenAmount::ZERO,
            status: OrganizationStatus::Active,
            settings,
            metadata: request.metadata,
        };
        self.catalog.record_organization(organization.clone()).await;

        Ok(WriteOutcome::Enriched {
            confirmation,
            value: organization,
        })
    }

    /// Open a proposal
    pub async fn submit_proposal(&self, request: SubmitProposal) -> Result<WriteOutcome<Proposal>> {
        let title = require("title", &request.title)?;
        let description = require("description", &request.description)?;
        let payload = validate_payload(request.execution_payload.as_deref())?;

        let governance = self
            .catalog
            .governance_address(request.organization_id)
            .await?;
        let tx = self
            .backend
            .create_proposal(&governance, &title, &description, &payload)
            .await?;
        let confirmation = self.submit_and_confirm("Proposal", tx).await?;

        let event = match find_event::<ProposalCreated>(&confirmation.logs) {
            Ok(event) => event,
            Err(e) => {
                warn!("Proposal confirmed without a creation event: {}", e);
                return Ok(WriteOutcome::Degraded {
                    confirmation,
                    reason: e.to_string(),
                });
            }
        };

        let record = ProposalRecord {
            title: event.title,
            description: event.description,
            proposer: event.proposer,
            created_at: self.confirmed_at(&confirmation),
            start_time: event.start_time,
            end_time: event.end_time,
            executed: false,
            executed_at: None,
            execution_payload: Some(payload).filter(|p| p != "0x"),
            cancelled: false,
        };
        // No votes yet, so supply and settings do not affect the tally
        let proposal = assemble_proposal(
            request.organization_id,
            event.proposal_id,
            record,
            Vec::new(),
            TokenAmount::ZERO,
            &GovernanceSettings::default(),
            self.clock.now(),
        );
        self.catalog.record_proposal(proposal.clone()).await;

        Ok(WriteOutcome::Enriched {
            confirmation,
            value: proposal,
        })
    }

    /// Cast a vote
    pub async fn cast_vote(&self, request: CastVote) -> Result<WriteOutcome<Vote>> {
        require_proposal_id(request.proposal_id)?;
        let reason = request
            .reason
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_string();

        let governance = self
            .catalog
            .governance_address(request.organization_id)
            .await?;
        let tx = self
            .backend
            .cast_vote(&governance, request.proposal_id, request.support, &reason)
            .await?;
        let confirmation = self.submit_and_confirm("Vote", tx).await?;
        self.republish_proposal(request.organization_id, request.proposal_id)
            .await;

        match find_event::<VoteCast>(&confirmation.logs) {
            Ok(event) => {
                let vote = Vote {
                    voter: event.voter,
                    support: event.support,
                    weight: event.weight,
                    reason: Some(event.reason).filter(|r| !r.is_empty()),
                    timestamp: self.confirmed_at(&confirmation),
                };
                Ok(WriteOutcome::Enriched {
                    confirmation,
                    value: vote,
                })
            }
            Err(e) => {
                warn!("Vote confirmed without a vote event: {}", e);
                Ok(WriteOutcome::Degraded {
                    confirmation,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Execute a proposal
    pub async fn execute_proposal(
        &self,
        request: ExecuteProposal,
    ) -> Result<WriteOutcome<ProposalExecuted>> {
        require_proposal_id(request.proposal_id)?;

        let governance = self
            .catalog
            .governance_address(request.organization_id)
            .await?;
        let tx = self
            .backend
            .execute_proposal(&governance, request.proposal_id)
            .await?;
        let confirmation = self.submit_and_confirm("Execution", tx).await?;
        self.republish_proposal(request.organization_id, request.proposal_id)
            .await;

        match find_event::<ProposalExecuted>(&confirmation.logs) {
            Ok(event) => Ok(WriteOutcome::Enriched {
                confirmation,
                value: event,
            }),
            Err(e) => {
                warn!("Execution confirmed without an execution event: {}", e);
                Ok(WriteOutcome::Degraded {
                    confirmation,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Every organization, with partial-failure accounting
    pub async fn organizations(&self) -> Result<Listing<Organization>> {
        self.catalog.list_organizations().await
    }

    /// One organization
    pub async fn organization(&self, id: OrganizationId) -> Result<Organization> {
        self.catalog.get_organization(id).await
    }

    /// Every proposal of an organization, with partial-failure accounting
    pub async fn proposals(&self, organization_id: OrganizationId) -> Result<Listing<Proposal>> {
        self.catalog.list_proposals(organization_id).await
    }

    /// One proposal
    pub async fn proposal(
        &self,
        organization_id: OrganizationId,
        id: ProposalId,
    ) -> Result<Proposal> {
        self.catalog.get_proposal(organization_id, id).await
    }

    /// Token holders of an organization
    pub async fn members(&self, organization_id: OrganizationId) -> Result<Vec<Member>> {
        self.catalog.list_members(organization_id).await
    }

    /// Treasury of an organization
    pub async fn treasury(&self, organization_id: OrganizationId) -> Result<Treasury> {
        self.catalog.treasury(organization_id).await
    }

    /// Rebuild the cached view
    pub async fn refresh(&self) -> Result<Arc<CatalogSnapshot>> {
        self.catalog.refresh().await
    }

    /// Filter and page the cached organizations
    pub async fn search_organizations(
        &self,
        filter: &OrganizationFilter,
        page: usize,
        limit: usize,
    ) -> Result<Page<Organization>> {
        let snapshot = self.catalog.snapshot().await;
        paginate(&filter.apply(&snapshot.organizations), page, limit)
    }

    /// Filter and page the cached proposals of an organization
    pub async fn search_proposals(
        &self,
        organization_id: OrganizationId,
        filter: &ProposalFilter,
        page: usize,
        limit: usize,
    ) -> Result<Page<Proposal>> {
        let snapshot = self.catalog.snapshot().await;
        paginate(&filter.apply(snapshot.proposals(organization_id)), page, limit)
    }

    /// Aggregate figures for an organization, read fresh from the backend
    pub async fn stats(&self, organization_id: OrganizationId) -> Result<OrganizationStats> {
        let organization = self.catalog.get_organization(organization_id).await?;
        let proposals = self.catalog.list_proposals(organization_id).await?;
        if proposals.has_drift() {
            warn!(
                "Stats for organization {} cover {} of {} proposals",
                organization_id, proposals.returned, proposals.reported
            );
        }
        Ok(organization_stats(
            &organization,
            &proposals.items,
            self.clock.now(),
        ))
    }
}
