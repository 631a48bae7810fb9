//! Example: Browse organizations through a governance gateway
//!
//! Reads gateway settings from `DAO_WORLD_*` environment variables, refreshes the catalog
//! and prints the first page of organizations sorted by member count.

use dao_world_client::{
    ClientConfig, GovernanceCoordinator, OrganizationFilter, OrganizationSortKey, ProposalFilter,
    ProposalState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dao_world_client::init_tracing();

    println!("=== DAO The World Organization Browser ===\n");

    let config = ClientConfig::from_env()?.with_max_retries(3);
    println!("Network: {:?}", config.network);
    println!("Gateway URL: {}", config.rpc_url);
    println!("Factory: {}\n", config.factory_address);

    let coordinator = GovernanceCoordinator::from_config(config)?;

    println!("Refreshing catalog...");
    let snapshot = match coordinator.refresh().await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            eprintln!("✗ Refresh failed: {}\n", e);
            return Err(e.into());
        }
    };
    println!(
        "✓ Loaded {} of {} organizations\n",
        snapshot.organizations.len(),
        snapshot.reported_organizations
    );

    let filter = OrganizationFilter {
        sort_by: OrganizationSortKey::MemberCount,
        ..Default::default()
    };
    let page = coordinator.search_organizations(&filter, 1, 10).await?;

    for organization in &page.items {
        println!(
            "#{} {} ({}) - {} members, treasury {}",
            organization.id,
            organization.name,
            organization.symbol,
            organization.member_count,
            organization.treasury_balance
        );

        let active = ProposalFilter {
            state: Some(ProposalState::Active),
            ..Default::default()
        };
        let proposals = coordinator
            .search_proposals(organization.id, &active, 1, 5)
            .await?;
        for proposal in &proposals.items {
            println!(
                "    [{}] {} (ends {})",
                proposal.state, proposal.title, proposal.end_time
            );
        }
    }

    if page.has_next {
        println!("\n... {} organizations in total", page.total);
    }

    Ok(())
}
