//! Example: Full governance round on the simulated chain
//!
//! Registers an organization, hands tokens to a second member, opens a treasury payment
//! proposal, votes on it, lets the voting period pass and executes it.

use dao_world_client::{
    CastVote, ChainBackend, ClientConfig, ExecuteProposal, FixedClock, GovernanceCoordinator,
    LocalChain, RegisterOrganization, SubmitProposal, TokenAmount, TreasuryInstruction,
    TreasuryTransactionKind,
};
use std::sync::Arc;

const SECOND_MEMBER: &str = "0x70997970C51812dc3A010C7d01b50e0d17dc79C8";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter("dao_world_client=info")
        .init();

    println!("=== DAO The World Governance Example ===\n");

    let config = ClientConfig::simulated();
    let clock = FixedClock::new(chrono::Utc::now().timestamp());
    let chain = LocalChain::from_config(&config, Arc::new(clock.clone()));

    let founder = GovernanceCoordinator::new(
        config.clone(),
        Arc::new(chain.clone()),
        Arc::new(clock.clone()),
    );
    let member = GovernanceCoordinator::new(
        config,
        Arc::new(chain.connect(SECOND_MEMBER)),
        Arc::new(clock.clone()),
    );

    // Register
    let registered = founder
        .register_organization(RegisterOrganization {
            name: "Test DAO".to_string(),
            symbol: "tst".to_string(),
            initial_supply: "1000000".to_string(),
            ..Default::default()
        })
        .await?;
    let Some(organization) = registered.into_value() else {
        anyhow::bail!("registration confirmed without a creation event");
    };
    println!(
        "✓ Registered {} ({}) as organization {}",
        organization.name, organization.symbol, organization.id
    );

    // Distribute and fund
    chain
        .mint(
            &organization.token_address,
            SECOND_MEMBER,
            TokenAmount::from_tokens(250_000),
        )
        .await?;
    chain
        .fund_treasury(
            &organization.governance_address,
            TokenAmount::from_tokens(10_000),
        )
        .await?;
    println!("✓ Minted 250000 TST to {}", SECOND_MEMBER);

    // Propose
    let payment = TreasuryInstruction {
        kind: TreasuryTransactionKind::Payment,
        recipient: SECOND_MEMBER.to_string(),
        amount: TokenAmount::parse_decimal("1500")?,
        description: "Audit of the governance contracts".to_string(),
    };
    let proposed = founder
        .submit_proposal(SubmitProposal {
            organization_id: organization.id,
            title: "Pay the auditor".to_string(),
            description: "Send 1500 tokens from the treasury".to_string(),
            execution_payload: Some(payment.encode()?),
        })
        .await?;
    let proposal_id = proposed.value().map(|p| p.id).unwrap_or(1);
    println!("✓ Proposal {} opened", proposal_id);

    // Vote
    for (who, coordinator, support) in [("founder", &founder, true), ("member", &member, false)] {
        let outcome = coordinator
            .cast_vote(CastVote {
                organization_id: organization.id,
                proposal_id,
                support,
                reason: Some(format!("{} position", who)),
            })
            .await?;
        if let Some(vote) = outcome.value() {
            println!(
                "✓ {} voted {} with {}",
                who,
                if vote.support { "for" } else { "against" },
                vote.weight
            );
        }
    }

    // Close voting and execute
    let settings = chain
        .governance_settings(&organization.governance_address)
        .await?;
    clock.advance(settings.min_voting_period as i64 + 1);

    let proposal = founder.proposal(organization.id, proposal_id).await?;
    println!(
        "\nProposal state after voting: {} (for {}, against {})",
        proposal.state, proposal.for_votes, proposal.against_votes
    );

    founder
        .execute_proposal(ExecuteProposal {
            organization_id: organization.id,
            proposal_id,
        })
        .await?;

    let treasury = founder.treasury(organization.id).await?;
    println!("✓ Executed; treasury balance now {}", treasury.balance);

    let stats = founder.stats(organization.id).await?;
    println!("\n=== Statistics ===");
    println!("  - Members: {}", stats.total_members);
    println!("  - Proposals: {}", stats.total_proposals);
    println!("  - Votes: {}", stats.total_votes);
    println!(
        "  - Average participation: {}.{:02}%",
        stats.average_participation_bps / 100,
        stats.average_participation_bps % 100
    );

    Ok(())
}
