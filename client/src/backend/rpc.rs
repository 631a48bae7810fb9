//! JSON-RPC governance gateway backend.
//!
//! The gateway holds the signer and fronts the factory and governance contracts. Every
//! [`ChainBackend`] operation maps to one `dao_*` JSON-RPC method. Reads go through the
//! configured [`RetryStrategy`]; writes are sent exactly once.

use crate::amount::TokenAmount;
use crate::backend::monitor::{ConfirmationMonitor, MonitorOptions, Receipt, ReceiptSource};
use crate::backend::{wire, ChainBackend, Confirmation, TxHandle};
use crate::config::ClientConfig;
use crate::error::{GovernanceError, Result};
use crate::retry::RetryStrategy;
use crate::types::{
    GovernanceSettings, MemberRecord, OrganizationRecord, ProposalId, ProposalRecord,
    TreasuryRecord, VoteRecord,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

/// JSON-RPC request ID type
type RequestId = u64;

/// Signer declined (EIP-1193)
const CODE_USER_REJECTED: i64 = 4001;
/// Execution reverted
const CODE_EXECUTION_REVERTED: i64 = 3;
/// Generic server error, used by nodes for reverts
const CODE_SERVER_ERROR: i64 = -32000;
/// Gateway: index unknown
const CODE_NOT_FOUND: i64 = -32004;

/// JSON-RPC request
#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: RequestId,
    method: &'a str,
    params: &'a Value,
}

/// JSON-RPC response
#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

/// JSON-RPC error
#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl JsonRpcError {
    fn into_governance_error(self) -> GovernanceError {
        match self.code {
            CODE_USER_REJECTED => GovernanceError::Rejected(self.message),
            CODE_EXECUTION_REVERTED | CODE_SERVER_ERROR => {
                let reason = match self.data {
                    Some(Value::String(reason)) if !reason.is_empty() => reason,
                    _ => self
                        .message
                        .strip_prefix("execution reverted: ")
                        .map(str::to_string)
                        .unwrap_or(self.message),
                };
                GovernanceError::BackendRejected { reason }
            }
            CODE_NOT_FOUND => GovernanceError::NotFound(self.message),
            code => GovernanceError::InvalidResponse(format!("{} (code: {})", self.message, code)),
        }
    }
}

/// Backend speaking JSON-RPC 2.0 to a governance gateway
#[derive(Clone)]
pub struct RpcBackend {
    /// HTTP client
    client: Client,
    /// Gateway URL
    base_url: String,
    /// Organization factory
    factory_address: String,
    /// Retry strategy for reads
    retry_strategy: RetryStrategy,
    /// Confirmation polling
    monitor: ConfirmationMonitor,
    /// Request ID counter
    request_id: Arc<AtomicU64>,
}

impl RpcBackend {
    /// Create a new RPC backend
    pub fn new(config: Arc<ClientConfig>) -> Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self {
            client,
            base_url: config.rpc_url.clone(),
            factory_address: config.factory_address.clone(),
            retry_strategy: RetryStrategy::from_config(&config),
            monitor: ConfirmationMonitor::new(MonitorOptions::from_config(&config)),
            request_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Get next request ID
    fn next_request_id(&self) -> RequestId {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// One JSON-RPC round trip
    async fn send_rpc(&self, method: &str, params: &Value) -> Result<Value> {
        let request_id = self.next_request_id();
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: request_id,
            method,
            params,
        };

        debug!("Gateway request: {} (id: {})", method, request_id);

        let response = self.client.post(&self.base_url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = format!("HTTP {}: {}", status, error_text);
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                GovernanceError::Network(message)
            } else {
                GovernanceError::InvalidResponse(message)
            });
        }

        let rpc_response: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| GovernanceError::InvalidResponse(e.to_string()))?;

        if let Some(rpc_error) = rpc_response.error {
            error!(
                "Gateway error for {}: {} (code: {})",
                method, rpc_error.message, rpc_error.code
            );
            return Err(rpc_error.into_governance_error());
        }

        Ok(rpc_response.result.unwrap_or(Value::Null))
    }

    /// Idempotent read, retried according to configuration
    async fn read<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let result = self
            .retry_strategy
            .retry(|| self.send_rpc(method, &params))
            .await?;
        if result.is_null() {
            return Err(GovernanceError::InvalidResponse(format!(
                "Missing result for {}",
                method
            )));
        }
        serde_json::from_value(result).map_err(|e| {
            GovernanceError::InvalidResponse(format!("Unexpected {} result: {}", method, e))
        })
    }

    /// Read a count that may come back as a number or quantity string
    async fn read_count(&self, method: &str, params: Value) -> Result<u64> {
        let value: Value = self.read(method, params).await?;
        wire::to_i64(&value)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| {
                GovernanceError::InvalidResponse(format!("{} returned {}", method, value))
            })
    }

    /// Transaction submission, never retried
    async fn write(&self, method: &str, params: Value) -> Result<TxHandle> {
        info!("Submitting {} to gateway", method);

        let result = self.send_rpc(method, &params).await?;
        let hash = match &result {
            Value::String(hash) => hash.clone(),
            Value::Object(obj) => obj
                .get("hash")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    GovernanceError::InvalidResponse(format!("Missing hash in {} result", method))
                })?,
            other => {
                return Err(GovernanceError::InvalidResponse(format!(
                    "Unexpected {} result: {}",
                    method, other
                )))
            }
        };

        info!("Transaction submitted: {}", hash);
        Ok(TxHandle::new(hash))
    }

    /// Health check - verify the gateway answers a factory read
    pub async fn health_check(&self) -> Result<bool> {
        debug!("Performing gateway health check");

        match self.organization_count().await {
            Ok(_) => {
                info!("Gateway health check passed");
                Ok(true)
            }
            Err(e) => {
                error!("Gateway health check failed: {}", e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ReceiptSource for RpcBackend {
    async fn fetch_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>> {
        let result = self
            .send_rpc("dao_getTransactionReceipt", &json!([tx_hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        serde_json::from_value(result)
            .map(Some)
            .map_err(|e| GovernanceError::InvalidResponse(format!("Malformed receipt: {}", e)))
    }
}

#[async_trait]
impl ChainBackend for RpcBackend {
    async fn create_organization(
        &self,
        name: &str,
        symbol: &str,
        initial_supply: TokenAmount,
        settings: &GovernanceSettings,
    ) -> Result<TxHandle> {
        self.write(
            "dao_createOrganization",
            json!([self.factory_address, name, symbol, initial_supply, settings]),
        )
        .await
    }

    async fn organization_count(&self) -> Result<u64> {
        self.read_count("dao_organizationCount", json!([self.factory_address]))
            .await
    }

    async fn organization_at(&self, index: u64) -> Result<OrganizationRecord> {
        self.read("dao_organizationAt", json!([self.factory_address, index]))
            .await
    }

    async fn create_proposal(
        &self,
        governance: &str,
        title: &str,
        description: &str,
        execution_payload: &str,
    ) -> Result<TxHandle> {
        self.write(
            "dao_createProposal",
            json!([governance, title, description, execution_payload]),
        )
        .await
    }

    async fn cast_vote(
        &self,
        governance: &str,
        proposal_id: ProposalId,
        support: bool,
        reason: &str,
    ) -> Result<TxHandle> {
        self.write(
            "dao_castVote",
            json!([governance, proposal_id, support, reason]),
        )
        .await
    }

    async fn execute_proposal(&self, governance: &str, proposal_id: ProposalId) -> Result<TxHandle> {
        self.write("dao_executeProposal", json!([governance, proposal_id]))
            .await
    }

    async fn proposal_count(&self, governance: &str) -> Result<u64> {
        self.read_count("dao_proposalCount", json!([governance]))
            .await
    }

    async fn proposal_at(&self, governance: &str, proposal_id: ProposalId) -> Result<ProposalRecord> {
        self.read("dao_proposalAt", json!([governance, proposal_id]))
            .await
    }

    async fn proposal_votes(
        &self,
        governance: &str,
        proposal_id: ProposalId,
    ) -> Result<Vec<VoteRecord>> {
        self.read("dao_proposalVotes", json!([governance, proposal_id]))
            .await
    }

    async fn governance_settings(&self, governance: &str) -> Result<GovernanceSettings> {
        self.read("dao_governanceSettings", json!([governance]))
            .await
    }

    async fn total_supply(&self, token: &str) -> Result<TokenAmount> {
        self.read("dao_totalSupply", json!([token])).await
    }

    async fn members(&self, governance: &str) -> Result<Vec<MemberRecord>> {
        self.read("dao_members", json!([governance])).await
    }

    async fn treasury(&self, governance: &str) -> Result<TreasuryRecord> {
        self.read("dao_treasury", json!([governance])).await
    }

    async fn await_confirmation(&self, tx: &TxHandle) -> Result<Confirmation> {
        self.monitor.wait(self, &tx.hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn create_test_config() -> Arc<ClientConfig> {
        Arc::new(ClientConfig::local().with_request_timeout(Duration::from_secs(10)))
    }

    #[test]
    fn test_rpc_backend_creation() {
        assert!(RpcBackend::new(create_test_config()).is_ok());
    }

    #[test]
    fn test_request_id_increment() {
        let backend = RpcBackend::new(create_test_config()).unwrap();
        assert_eq!(backend.next_request_id(), 1);
        assert_eq!(backend.next_request_id(), 2);
        assert_eq!(backend.next_request_id(), 3);
    }

    fn rpc_error(code: i64, message: &str, data: Option<Value>) -> GovernanceError {
        JsonRpcError {
            code,
            message: message.to_string(),
            data,
        }
        .into_governance_error()
    }

    #[test]
    fn test_error_code_mapping() {
        assert_matches!(
            rpc_error(4001, "User denied transaction signature", None),
            GovernanceError::Rejected(_)
        );
        assert_matches!(
            rpc_error(-32004, "organization 9 does not exist", None),
            GovernanceError::NotFound(_)
        );
        assert_matches!(
            rpc_error(-32601, "method not found", None),
            GovernanceError::InvalidResponse(_)
        );
    }

    #[test]
    fn test_revert_reason_extraction() {
        assert_matches!(
            rpc_error(3, "execution reverted: Already voted", None),
            GovernanceError::BackendRejected { reason } if reason == "Already voted"
        );
        assert_matches!(
            rpc_error(-32000, "execution reverted", Some(json!("Voting not active"))),
            GovernanceError::BackendRejected { reason } if reason == "Voting not active"
        );
    }
}
