//! Filtering, sorting, pagination and statistics over catalog snapshots.

use crate::error::{GovernanceError, Result};
use crate::types::{
    Address, Category, Organization, OrganizationStats, OrganizationStatus, Page, Proposal,
    ProposalState, Timestamp,
};
use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest first
    Asc,
    /// Largest first
    #[default]
    Desc,
}

impl SortOrder {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// Organization sort keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrganizationSortKey {
    /// Creation time
    #[default]
    CreatedAt,
    /// Active token holders
    MemberCount,
    /// Treasury balance
    TreasuryBalance,
    /// Display name, case-insensitive
    Name,
}

/// Organization listing filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OrganizationFilter {
    /// Only this status
    pub status: Option<OrganizationStatus>,
    /// Only this category
    pub category: Option<Category>,
    /// Case-insensitive text matched against name, symbol, description and tags
    pub search: Option<String>,
    /// Lower bound on member count
    pub min_members: Option<u64>,
    /// Upper bound on member count
    pub max_members: Option<u64>,
    /// Sort key
    pub sort_by: OrganizationSortKey,
    /// Sort direction
    pub order: SortOrder,
}

impl OrganizationFilter {
    /// Whether `org` passes every criterion
    pub fn matches(&self, org: &Organization) -> bool {
        if self.status.is_some_and(|s| s != org.status) {
            return false;
        }
        if self.category.is_some_and(|c| c != org.metadata.category) {
            return false;
        }
        if self.min_members.is_some_and(|min| org.member_count < min) {
            return false;
        }
        if self.max_members.is_some_and(|max| org.member_count > max) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                org.name.to_lowercase().contains(&needle)
                    || org.symbol.to_lowercase().contains(&needle)
                    || org.metadata.description.to_lowercase().contains(&needle)
                    || org
                        .metadata
                        .tags
                        .iter()
                        .any(|t| t.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }

    fn compare(&self, a: &Organization, b: &Organization) -> Ordering {
        let ordering = match self.sort_by {
            OrganizationSortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            OrganizationSortKey::MemberCount => a.member_count.cmp(&b.member_count),
            OrganizationSortKey::TreasuryBalance => a.treasury_balance.cmp(&b.treasury_balance),
            OrganizationSortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        };
        self.order.apply(ordering).then_with(|| a.id.cmp(&b.id))
    }

    /// Matching organizations in sort order
    pub fn apply(&self, organizations: &[Organization]) -> Vec<Organization> {
        let mut matched: Vec<Organization> = organizations
            .iter()
            .filter(|o| self.matches(o))
            .cloned()
            .collect();
        matched.sort_by(|a, b| self.compare(a, b));
        matched
    }
}

/// Proposal sort keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProposalSortKey {
    /// Creation time
    #[default]
    CreatedAt,
    /// End of voting
    EndTime,
    /// Total weight cast
    TotalVotes,
}

/// Proposal listing filter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProposalFilter {
    /// Only this state
    pub state: Option<ProposalState>,
    /// Only this proposer (case-insensitive)
    pub proposer: Option<Address>,
    /// Voting opens at or after
    pub start_after: Option<Timestamp>,
    /// Voting closes at or before
    pub end_before: Option<Timestamp>,
    /// Sort key
    pub sort_by: ProposalSortKey,
    /// Sort direction
    pub order: SortOrder,
}

impl ProposalFilter {
    /// Whether `proposal` passes every criterion
    pub fn matches(&self, proposal: &Proposal) -> bool {
        self.state.map_or(true, |s| s == proposal.state)
            && self
                .proposer
                .as_deref()
                .map_or(true, |p| p.eq_ignore_ascii_case(&proposal.proposer))
            && self.start_after.map_or(true, |t| proposal.start_time >= t)
            && self.end_before.map_or(true, |t| proposal.end_time <= t)
    }

    fn compare(&self, a: &Proposal, b: &Proposal) -> Ordering {
        let ordering = match self.sort_by {
            ProposalSortKey::CreatedAt => a.created_at.cmp(&b.created_at),
            ProposalSortKey::EndTime => a.end_time.cmp(&b.end_time),
            ProposalSortKey::TotalVotes => a.total_votes.cmp(&b.total_votes),
        };
        self.order.apply(ordering).then_with(|| a.id.cmp(&b.id))
    }

    /// Matching proposals in sort order
    pub fn apply(&self, proposals: &[Proposal]) -> Vec<Proposal> {
        let mut matched: Vec<Proposal> = proposals
            .iter()
            .filter(|p| self.matches(p))
            .cloned()
            .collect();
        matched.sort_by(|a, b| self.compare(a, b));
        matched
    }
}

/// Cut one 1-based page out of `items`
pub fn paginate<T: Clone>(items: &[T], page: usize, limit: usize) -> Result<Page<T>> {
    if page == 0 {
        return Err(GovernanceError::Validation("page numbers start at 1".to_string()));
    }
    if limit == 0 {
        return Err(GovernanceError::Validation(
            "page limit must be at least 1".to_string(),
        ));
    }

    let total = items.len();
    let start = (page - 1).saturating_mul(limit).min(total);
    let end = start.saturating_add(limit).min(total);

    Ok(Page {
        items: items[start..end].to_vec(),
        total,
        page,
        limit,
        has_next: end < total,
        has_prev: page > 1,
    })
}

/// Aggregate figures for `organization` over its known `proposals` at `now`
pub fn organization_stats(
    organization: &Organization,
    proposals: &[Proposal],
    now: Timestamp,
) -> OrganizationStats {
    let active_proposals = proposals
        .iter()
        .filter(|p| {
            !p.executed
                && p.state != ProposalState::Cancelled
                && p.start_time <= now
                && now <= p.end_time
        })
        .count();

    let total_votes = proposals.iter().map(|p| p.votes.len()).sum();

    let supply = organization.total_supply.base_units();
    let participation_sum = proposals
        .iter()
        .filter(|_| !supply.is_zero())
        .map(|p| p.total_votes.base_units().saturating_mul(U256::from(10_000u64)) / supply)
        .fold(U256::ZERO, |acc, bps| acc.saturating_add(bps));
    let average_participation_bps = if proposals.is_empty() {
        0
    } else {
        u64::try_from(participation_sum / U256::from(proposals.len())).unwrap_or(u64::MAX)
    };

    let last_activity = proposals
        .iter()
        .flat_map(|p| {
            std::iter::once(p.created_at)
                .chain(p.executed_at)
                .chain(p.votes.iter().map(|v| v.timestamp))
        })
        .fold(organization.created_at, Timestamp::max);

    OrganizationStats {
        organization_id: organization.id,
        total_proposals: proposals.len(),
        active_proposals,
        total_members: organization.member_count,
        total_votes,
        average_participation_bps,
        treasury_value: organization.treasury_balance,
        last_activity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amount::TokenAmount;
    use crate::types::{GovernanceSettings, OrganizationMetadata, Vote};
    use assert_matches::assert_matches;
    use test_case::test_case;

    fn org(id: u64, name: &str, members: u64, treasury: u64, category: Category) -> Organization {
        Organization {
            id,
            name: name.to_string(),
            symbol: name.chars().take(3).collect::<String>().to_uppercase(),
            token_address: format!("0xtoken{}", id),
            governance_address: format!("0xgov{}", id),
            creator: "0xcreator".to_string(),
            created_at: 1_000 + id as i64,
            total_supply: TokenAmount::from_tokens(1_000),
            member_count: members,
            treasury_balance: TokenAmount::from_tokens(treasury),
            status: OrganizationStatus::Active,
            settings: GovernanceSettings::default(),
            metadata: OrganizationMetadata {
                category,
                tags: vec!["grants".to_string()],
                ..OrganizationMetadata::default()
            },
        }
    }

    fn proposal(id: u64, state: ProposalState, weight: u64, end_time: i64) -> Proposal {
        Proposal {
            id,
            organization_id: 0,
            proposer: "0xAbC".to_string(),
            title: format!("Proposal {}", id),
            description: String::new(),
            created_at: 2_000 + id as i64,
            start_time: 2_000,
            end_time,
            executed: state == ProposalState::Executed,
            executed_at: None,
            execution_payload: None,
            votes: vec![Vote {
                voter: "0xabc".to_string(),
                support: true,
                weight: TokenAmount::from_tokens(weight),
                reason: None,
                timestamp: 2_500 + id as i64,
            }],
            total_votes: TokenAmount::from_tokens(weight),
            for_votes: TokenAmount::from_tokens(weight),
            against_votes: TokenAmount::ZERO,
            state,
        }
    }

    fn sample_orgs() -> Vec<Organization> {
        vec![
            org(0, "Alpha Guild", 3, 50, Category::Gaming),
            org(1, "beta fund", 10, 500, Category::Investment),
            org(2, "Gamma Labs", 7, 5, Category::Defi),
        ]
    }

    #[test_case(OrganizationSortKey::CreatedAt, SortOrder::Desc => vec![2, 1, 0]; "newest first")]
    #[test_case(OrganizationSortKey::MemberCount, SortOrder::Desc => vec![1, 2, 0]; "most members")]
    #[test_case(OrganizationSortKey::TreasuryBalance, SortOrder::Asc => vec![2, 0, 1]; "smallest treasury")]
    #[test_case(OrganizationSortKey::Name, SortOrder::Asc => vec![0, 1, 2]; "name ignores case")]
    fn test_organization_sorting(sort_by: OrganizationSortKey, order: SortOrder) -> Vec<u64> {
        let filter = OrganizationFilter {
            sort_by,
            order,
            ..OrganizationFilter::default()
        };
        filter.apply(&sample_orgs()).iter().map(|o| o.id).collect()
    }

    #[test]
    fn test_organization_filtering() {
        let orgs = sample_orgs();

        let by_category = OrganizationFilter {
            category: Some(Category::Defi),
            ..OrganizationFilter::default()
        };
        assert_eq!(by_category.apply(&orgs).len(), 1);

        let by_members = OrganizationFilter {
            min_members: Some(4),
            max_members: Some(9),
            ..OrganizationFilter::default()
        };
        assert_eq!(by_members.apply(&orgs)[0].id, 2);

        let by_search = OrganizationFilter {
            search: Some("FUND".to_string()),
            ..OrganizationFilter::default()
        };
        assert_eq!(by_search.apply(&orgs)[0].id, 1);

        let by_tag = OrganizationFilter {
            search: Some("grant".to_string()),
            ..OrganizationFilter::default()
        };
        assert_eq!(by_tag.apply(&orgs).len(), 3);

        let paused = OrganizationFilter {
            status: Some(OrganizationStatus::Paused),
            ..OrganizationFilter::default()
        };
        assert!(paused.apply(&orgs).is_empty());
    }

    #[test]
    fn test_proposal_filtering_and_sorting() {
        let proposals = vec![
            proposal(1, ProposalState::Succeeded, 100, 3_000),
            proposal(2, ProposalState::Active, 300, 4_000),
            proposal(3, ProposalState::Succeeded, 200, 5_000),
        ];

        let succeeded = ProposalFilter {
            state: Some(ProposalState::Succeeded),
            sort_by: ProposalSortKey::TotalVotes,
            ..ProposalFilter::default()
        };
        let ids: Vec<_> = succeeded.apply(&proposals).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 1]);

        let window = ProposalFilter {
            proposer: Some("0xabc".to_string()),
            end_before: Some(4_000),
            sort_by: ProposalSortKey::EndTime,
            order: SortOrder::Asc,
            ..ProposalFilter::default()
        };
        let ids: Vec<_> = window.apply(&proposals).iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_paginate() {
        let items: Vec<u32> = (1..=5).collect();

        let first = paginate(&items, 1, 2).unwrap();
        assert_eq!(first.items, vec![1, 2]);
        assert!(first.has_next);
        assert!(!first.has_prev);

        let last = paginate(&items, 3, 2).unwrap();
        assert_eq!(last.items, vec![5]);
        assert!(!last.has_next);
        assert!(last.has_prev);

        let beyond = paginate(&items, 9, 2).unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, 5);

        assert_matches!(paginate(&items, 0, 2), Err(GovernanceError::Validation(_)));
        assert_matches!(paginate(&items, 1, 0), Err(GovernanceError::Validation(_)));
    }

    #[test]
    fn test_organization_stats() {
        let organization = org(0, "Alpha Guild", 3, 50, Category::Gaming);
        let proposals = vec![
            proposal(1, ProposalState::Succeeded, 100, 3_000),
            proposal(2, ProposalState::Active, 300, 4_000),
        ];

        let stats = organization_stats(&organization, &proposals, 3_500);
        assert_eq!(stats.total_proposals, 2);
        assert_eq!(stats.active_proposals, 1);
        assert_eq!(stats.total_votes, 2);
        // 10% and 30% of supply
        assert_eq!(stats.average_participation_bps, 2_000);
        assert_eq!(stats.treasury_value, TokenAmount::from_tokens(50));
        assert_eq!(stats.last_activity, 2_502);
    }

    #[test]
    fn test_stats_without_proposals() {
        let organization = org(4, "Quiet", 1, 0, Category::Other);
        let stats = organization_stats(&organization, &[], 10_000);
        assert_eq!(stats.average_participation_bps, 0);
        assert_eq!(stats.last_activity, organization.created_at);
    }
}
