//! DAO The World governance client
//!
//! This library turns chain-observable governance facts into a consistent view of
//! organizations and proposals, and coordinates the write path that changes them. It
//! registers organizations, opens proposals, casts token-weighted votes and executes
//! passed proposals against any [`ChainBackend`].
//!
//! # Features
//!
//! - **Lifecycle derivation**: proposal state as a pure function of time, votes and facts
//! - **Vote tallying**: 256-bit fixed-point quorum and threshold verdicts, no floats
//! - **Event decoding**: tagged-union decoding of confirmation logs
//! - **Catalog**: bounded-concurrency listings with partial-failure accounting and
//!   atomically swapped snapshots
//! - **Backends**: a JSON-RPC governance gateway, or an in-process simulated chain
//! - **Queries**: filtering, sorting, pagination and per-organization statistics
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use dao_world_client::{ClientConfig, GovernanceCoordinator, RegisterOrganization};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     dao_world_client::init_tracing();
//!
//!     let coordinator = GovernanceCoordinator::from_config(ClientConfig::simulated())?;
//!
//!     let outcome = coordinator
//!         .register_organization(RegisterOrganization {
//!             name: "Test DAO".to_string(),
//!             symbol: "TST".to_string(),
//!             initial_supply: "1000000".to_string(),
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     if let Some(organization) = outcome.value() {
//!         println!("Registered organization {}", organization.id);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Examples
//!
//! ## List organizations through a gateway
//!
//! ```rust,no_run
//! use dao_world_client::{ClientConfig, GovernanceCoordinator};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = GovernanceCoordinator::from_config(ClientConfig::from_env()?)?;
//!
//! let listing = coordinator.organizations().await?;
//! if listing.has_drift() {
//!     println!("{} of {} organizations loaded", listing.returned, listing.reported);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::broken_intra_doc_links)]

pub mod amount;
pub mod backend;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod query;
pub mod retry;
pub mod tally;
pub mod types;

// Re-export commonly used types
pub use amount::TokenAmount;
pub use backend::local::TreasuryInstruction;
pub use backend::{
    ChainBackend, Confirmation, ConfirmationMonitor, LocalChain, MonitorOptions, MonitorResult,
    RawLog, RpcBackend, TxHandle,
};
pub use catalog::{CatalogSnapshot, Listing, OrganizationCatalog};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{BackendKind, ClientConfig, Network};
pub use coordinator::{
    CastVote, ExecuteProposal, GovernanceCoordinator, RegisterOrganization, SubmitProposal,
    WriteOutcome,
};
pub use error::{GovernanceError, Result};
pub use events::{
    GovernanceEvent, OrganizationCreated, ProposalCreated, ProposalExecuted, VoteCast,
};
pub use lifecycle::{derive_status, resolve_state};
pub use query::{
    OrganizationFilter, OrganizationSortKey, ProposalFilter, ProposalSortKey, SortOrder,
};
pub use retry::RetryStrategy;
pub use tally::{tally, Tally};
pub use types::{
    Category, GovernanceSettings, Member, MemberRole, Organization, OrganizationId,
    OrganizationMetadata, OrganizationStats, OrganizationStatus, Page, Proposal, ProposalId,
    ProposalState, SettingsOverrides, Treasury, TreasuryTransaction, TreasuryTransactionKind,
    Vote,
};

/// Install a `tracing` subscriber filtered by `RUST_LOG`, defaulting to `info`
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
