//! Confirmation polling.
//!
//! A submitted transaction is polled for its receipt until the receipt appears or the
//! configured timeout elapses. The monitor is generic over where receipts come from so it
//! can be driven without a network.

use crate::backend::{wire, Confirmation, RawLog};
use crate::config::ClientConfig;
use crate::error::{GovernanceError, Result};
use crate::types::Timestamp;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Receipt of an included transaction, as a gateway reports it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    /// Transaction hash
    pub transaction_hash: String,
    /// Including block
    #[serde(deserialize_with = "wire::de_u64")]
    pub block_number: u64,
    /// Block time
    #[serde(default, deserialize_with = "wire::de_opt_i64")]
    pub block_timestamp: Option<Timestamp>,
    /// `0x1` on success, `0x0` on revert
    pub status: String,
    /// Decoded revert reason, if the transaction reverted
    #[serde(default)]
    pub revert_reason: Option<String>,
    /// Emitted logs
    #[serde(default)]
    pub logs: Vec<RawLog>,
}

impl Receipt {
    /// Whether execution succeeded
    pub fn succeeded(&self) -> bool {
        matches!(self.status.as_str(), "0x1" | "1" | "success")
    }
}

/// Anything that can look up a receipt by transaction hash
#[async_trait]
pub trait ReceiptSource: Send + Sync {
    /// `None` while the transaction is still pending
    async fn fetch_receipt(&self, tx_hash: &str) -> Result<Option<Receipt>>;
}

/// Monitoring options
#[derive(Debug, Clone)]
pub struct MonitorOptions {
    /// Poll interval (in milliseconds)
    pub poll_interval_ms: u64,
    /// Timeout (in seconds)
    pub timeout_secs: u64,
}

impl MonitorOptions {
    /// Create from client config
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            poll_interval_ms: config.confirmation_poll_interval_ms,
            timeout_secs: config.confirmation_timeout_secs,
        }
    }

    /// Set custom poll interval
    pub fn with_poll_interval(mut self, interval_ms: u64) -> Self {
        self.poll_interval_ms = interval_ms;
        self
    }

    /// Set custom timeout
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

/// Outcome of monitoring one transaction
#[derive(Debug, Clone)]
pub enum MonitorResult {
    /// Included and executed successfully
    Confirmed(Confirmation),
    /// Included but reverted
    Reverted {
        /// Transaction hash
        hash: String,
        /// Revert reason
        reason: String,
    },
    /// No receipt before the deadline
    Timeout,
}

/// Transaction confirmation monitor
#[derive(Debug, Clone)]
pub struct ConfirmationMonitor {
    options: MonitorOptions,
}

impl ConfirmationMonitor {
    /// Create a new monitor
    pub fn new(options: MonitorOptions) -> Self {
        Self { options }
    }

    /// Options in use
    pub fn options(&self) -> &MonitorOptions {
        &self.options
    }

    /// Poll `source` until the receipt for `tx_hash` appears or the timeout elapses.
    ///
    /// Transient lookup failures are logged and polling continues; only the deadline ends
    /// an unsuccessful wait.
    pub async fn monitor<S: ReceiptSource + ?Sized>(
        &self,
        source: &S,
        tx_hash: &str,
    ) -> Result<MonitorResult> {
        info!(
            "Monitoring transaction: {} (timeout: {}s)",
            tx_hash, self.options.timeout_secs
        );

        let start = Instant::now();
        let timeout = Duration::from_secs(self.options.timeout_secs);
        let poll_interval = Duration::from_millis(self.options.poll_interval_ms);

        loop {
            if start.elapsed() >= timeout {
                warn!("Transaction monitoring timed out: {}", tx_hash);
                return Ok(MonitorResult::Timeout);
            }

            match source.fetch_receipt(tx_hash).await {
                Ok(Some(receipt)) if receipt.succeeded() => {
                    info!(
                        "Transaction confirmed: {} (block {})",
                        tx_hash, receipt.block_number
                    );
                    return Ok(MonitorResult::Confirmed(Confirmation {
                        transaction_hash: receipt.transaction_hash,
                        block_number: receipt.block_number,
                        block_timestamp: receipt.block_timestamp,
                        logs: receipt.logs,
                    }));
                }
                Ok(Some(receipt)) => {
                    let reason = receipt
                        .revert_reason
                        .unwrap_or_else(|| "execution reverted".to_string());
                    warn!("Transaction reverted: {} ({})", tx_hash, reason);
                    return Ok(MonitorResult::Reverted {
                        hash: tx_hash.to_string(),
                        reason,
                    });
                }
                Ok(None) => {
                    debug!("Transaction not yet included: {}", tx_hash);
                }
                Err(e) if e.is_retryable() => {
                    debug!("Error fetching receipt for {}: {}", tx_hash, e);
                }
                Err(e) => return Err(e),
            }

            sleep(poll_interval).await;
        }
    }

    /// Wait for a transaction and translate the outcome into the error taxonomy
    pub async fn wait<S: ReceiptSource + ?Sized>(
        &self,
        source: &S,
        tx_hash: &str,
    ) -> Result<Confirmation> {
        match self.monitor(source, tx_hash).await? {
            MonitorResult::Confirmed(confirmation) => Ok(confirmation),
            MonitorResult::Reverted { reason, .. } => {
                Err(GovernanceError::BackendRejected { reason })
            }
            MonitorResult::Timeout => Err(GovernanceError::Network(format!(
                "confirmation of {} timed out after {}s",
                tx_hash, self.options.timeout_secs
            ))),
        }
    }
}
