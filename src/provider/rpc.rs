use alloy_primitives::{hex, Address, B256, U256, U64};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{AppError, AppResult, METHOD_NOT_FOUND_CODE};
use crate::provider::{
    DeploymentReceipt, DeploymentTransaction, SubmissionFailure, SubmissionHandle,
    SubmissionOutcome, WalletProvider,
};

/// Consecutive receipt-poll failures tolerated before giving up on a transaction.
const MAX_POLL_ERRORS: u32 = 5;

/// JSON-RPC 2.0 request envelope
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    pub params: Value,
}

/// JSON-RPC 2.0 response envelope
#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

/// Subset of `eth_getTransactionReceipt` we read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: B256,
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default)]
    status: Option<U64>,
    #[serde(default)]
    block_number: Option<U64>,
}

#[derive(Debug, Serialize)]
struct SendTransactionParams {
    from: Address,
    data: String,
    gas: String,
}

/// Cloneable request path shared with background receipt trackers.
#[derive(Clone)]
struct RpcTransport {
    http: Client,
    url: String,
    next_id: Arc<AtomicU64>,
}

impl RpcTransport {
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> AppResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "JSON-RPC request");

        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let response = self.http.post(&self.url).json(&request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("{} failed with status {}: {}", method, status, body);
            return Err(AppError::Rpc {
                code: i64::from(status.as_u16()),
                message: format!("provider returned {}", status),
            });
        }

        let body: RpcResponse = response.json().await?;
        if let Some(err) = body.error {
            debug!(method, id, code = err.code, "JSON-RPC error: {}", err.message);
            return Err(AppError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        Ok(serde_json::from_value(body.result.unwrap_or(Value::Null))?)
    }

    async fn send_and_track(
        &self,
        tx: DeploymentTransaction,
        poll_interval: Duration,
    ) -> SubmissionOutcome {
        let params = SendTransactionParams {
            from: tx.from,
            data: hex::encode_prefixed(&tx.data),
            gas: format!("{:#x}", tx.gas),
        };

        let hash: B256 = match self.call("eth_sendTransaction", json!([params])).await {
            Ok(hash) => hash,
            Err(e) if e.is_user_rejection() => {
                info!("Deployment rejected in wallet");
                return SubmissionOutcome::Failed(SubmissionFailure::Rejected);
            }
            Err(e) => {
                error!("eth_sendTransaction failed: {}", e);
                return SubmissionOutcome::Failed(SubmissionFailure::Provider(e.reason()));
            }
        };
        info!(%hash, "Deployment transaction submitted");

        let mut poll_errors = 0;
        loop {
            match self
                .call::<Option<RpcReceipt>>("eth_getTransactionReceipt", json!([hash]))
                .await
            {
                Ok(Some(receipt)) => return receipt_outcome(receipt),
                Ok(None) => poll_errors = 0,
                Err(e) => {
                    poll_errors += 1;
                    warn!(
                        "Receipt poll for {} failed ({}/{}): {}",
                        hash, poll_errors, MAX_POLL_ERRORS, e
                    );
                    if poll_errors >= MAX_POLL_ERRORS {
                        return SubmissionOutcome::Failed(SubmissionFailure::Dropped);
                    }
                }
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}

fn receipt_outcome(receipt: RpcReceipt) -> SubmissionOutcome {
    if receipt.status == Some(U64::ZERO) {
        return SubmissionOutcome::Failed(SubmissionFailure::Reverted {
            transaction_hash: receipt.transaction_hash,
        });
    }
    match receipt.contract_address {
        Some(contract_address) => SubmissionOutcome::Confirmed(DeploymentReceipt {
            transaction_hash: receipt.transaction_hash,
            contract_address,
            block_number: receipt.block_number.map(|n| n.to::<u64>()),
        }),
        None => SubmissionOutcome::Failed(SubmissionFailure::Provider(format!(
            "receipt for {} has no contract address",
            receipt.transaction_hash
        ))),
    }
}

/// Wallet provider reached over JSON-RPC on HTTP.
pub struct JsonRpcProvider {
    transport: RpcTransport,
    receipt_poll: Duration,
}

impl std::fmt::Debug for JsonRpcProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonRpcProvider")
            .field("url", &self.transport.url)
            .field("receipt_poll", &self.receipt_poll)
            .finish_non_exhaustive()
    }
}

impl JsonRpcProvider {
    pub fn new(url: &str, receipt_poll: Duration) -> AppResult<Self> {
        // No request timeout: wallet prompts wait on a human.
        let http = Client::builder().build()?;
        Ok(Self {
            transport: RpcTransport {
                http,
                url: url.to_string(),
                next_id: Arc::new(AtomicU64::new(1)),
            },
            receipt_poll,
        })
    }

    pub fn url(&self) -> &str {
        &self.transport.url
    }
}

#[async_trait]
impl WalletProvider for JsonRpcProvider {
    fn describe(&self) -> String {
        format!("json-rpc {}", self.transport.url)
    }

    async fn request_accounts(&self) -> AppResult<Vec<Address>> {
        self.transport.call("eth_requestAccounts", json!([])).await
    }

    async fn revoke_permissions(&self) -> AppResult<()> {
        match self
            .transport
            .call::<Value>("wallet_revokePermissions", json!([{ "eth_accounts": {} }]))
            .await
        {
            Ok(_) => Ok(()),
            Err(AppError::Rpc { code, message }) if code == METHOD_NOT_FOUND_CODE => {
                warn!("Provider does not support permission revocation: {}", message);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn get_balance(&self, account: Address) -> AppResult<U256> {
        self.transport
            .call("eth_getBalance", json!([account, "latest"]))
            .await
    }

    fn submit_transaction(&self, tx: DeploymentTransaction) -> SubmissionHandle {
        let (resolver, handle) = SubmissionHandle::channel();
        let transport = self.transport.clone();
        let poll = self.receipt_poll;
        tokio::spawn(async move {
            let mut resolver = resolver;
            let outcome = tokio::select! {
                outcome = transport.send_and_track(tx, poll) => Some(outcome),
                _ = resolver.closed() => None,
            };
            match outcome {
                Some(outcome) => resolver.resolve(outcome),
                None => debug!("Submission handle dropped, receipt tracking stopped"),
            }
        });
        handle
    }
}
