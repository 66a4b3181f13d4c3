//! Wallet provider abstraction.
//!
//! Everything the client asks of a wallet goes through [`WalletProvider`]:
//! account access, permission revocation, balance reads and transaction
//! submission. The handle is created once by [`ProviderGateway`] and shared
//! read-only between the session, balance reader and deployer.

pub mod gateway;
pub mod handle;
pub mod rpc;

use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use crate::error::AppResult;

pub use gateway::ProviderGateway;
pub use handle::{
    DeploymentReceipt, SubmissionFailure, SubmissionHandle, SubmissionOutcome, SubmissionResolver,
};
pub use rpc::JsonRpcProvider;

/// Unsigned contract-creation transaction. `to` is always absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentTransaction {
    pub from: Address,
    pub data: Bytes,
    pub gas: u64,
}

/// EIP-1193 style wallet transport.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Human-readable description used in logs.
    fn describe(&self) -> String;

    /// `eth_requestAccounts`. May suspend until the human approves.
    async fn request_accounts(&self) -> AppResult<Vec<Address>>;

    /// `wallet_revokePermissions` for `eth_accounts`.
    async fn revoke_permissions(&self) -> AppResult<()>;

    /// Native balance in wei at the latest block.
    async fn get_balance(&self, account: Address) -> AppResult<U256>;

    /// Submit a deployment. Returns immediately; the handle resolves once
    /// the wallet and chain have decided.
    fn submit_transaction(&self, tx: DeploymentTransaction) -> SubmissionHandle;
}

pub type SharedProvider = Arc<dyn WalletProvider>;
