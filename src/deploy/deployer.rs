use alloy_primitives::{Address, B256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::deploy::DeploymentRequest;
use crate::error::{AppError, AppResult};
use crate::provider::{DeploymentTransaction, SharedProvider, SubmissionHandle, SubmissionOutcome};
use crate::session::AccountSession;

/// Where a deployment stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeploymentResult {
    Pending,
    Deployed {
        contract_address: Address,
        transaction_hash: B256,
    },
    Failed {
        reason: String,
    },
}

impl DeploymentResult {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// The most recent deployment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentStatus {
    pub id: Uuid,
    pub from: Address,
    pub gas_limit: u64,
    pub submitted_at: DateTime<Utc>,
    pub result: DeploymentResult,
}

/// Reason recorded when a claimed deployment is dropped before it resolves.
pub const ABANDONED_REASON: &str = "deployment abandoned";

type StatusSlot = Arc<watch::Sender<Option<DeploymentStatus>>>;

/// Ownership of the pending record for one deployment id.
///
/// The record leaves `Pending` exactly once: through [`Claim::finish`], or
/// as abandoned when the claim is dropped unfinished.
#[derive(Debug)]
struct Claim {
    status: StatusSlot,
    id: Uuid,
    finished: bool,
}

impl Claim {
    fn finish(mut self, result: DeploymentResult) {
        self.finished = true;
        settle_status(&self.status, self.id, result);
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        if !self.finished {
            warn!(id = %self.id, "Deployment dropped before it resolved");
            settle_status(
                &self.status,
                self.id,
                DeploymentResult::Failed {
                    reason: ABANDONED_REASON.to_string(),
                },
            );
        }
    }
}

/// Move `id` out of `Pending`. Ignored when the record moved on already.
fn settle_status(status: &StatusSlot, id: Uuid, result: DeploymentResult) -> bool {
    status.send_if_modified(|current| match current {
        Some(status) if status.id == id && status.result.is_pending() => {
            status.result = result;
            true
        }
        _ => false,
    })
}

/// A submitted deployment that has not resolved yet.
///
/// Dropping it without [`ContractDeployer::settle`] records the deployment
/// as abandoned.
#[derive(Debug)]
pub struct PendingDeployment {
    claim: Claim,
    handle: SubmissionHandle,
}

impl PendingDeployment {
    pub fn id(&self) -> Uuid {
        self.claim.id
    }
}

/// Builds, submits and tracks contract deployments from the active account.
pub struct ContractDeployer {
    provider: SharedProvider,
    session: Arc<AccountSession>,
    status: StatusSlot,
}

impl ContractDeployer {
    pub fn new(provider: SharedProvider, session: Arc<AccountSession>) -> Self {
        let (status, _) = watch::channel(None);
        Self {
            provider,
            session,
            status: Arc::new(status),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<DeploymentStatus>> {
        self.status.subscribe()
    }

    pub fn status(&self) -> Option<DeploymentStatus> {
        self.status.borrow().clone()
    }

    /// Submit and wait for the single outcome.
    pub async fn deploy(&self, request: &DeploymentRequest) -> AppResult<DeploymentResult> {
        let pending = self.submit(request).await?;
        self.settle(pending).await
    }

    /// Submit a deployment and return as soon as the wallet has the transaction.
    ///
    /// Only one deployment may be pending at a time.
    pub async fn submit(&self, request: &DeploymentRequest) -> AppResult<PendingDeployment> {
        let from = self.session.connected_account()?;
        let claim = self.claim(from, request.gas_limit())?;
        info!(id = %claim.id, %from, gas = request.gas_limit(), "Starting contract deployment");

        // Re-confirm access; a no-op prompt when already granted.
        match self.provider.request_accounts().await {
            Ok(granted) if granted.contains(&from) => {}
            Ok(_) => {
                return Err(fail(claim, format!("account {} is no longer authorized", from)));
            }
            Err(e) => return Err(fail(claim, e.reason())),
        }

        // The session may have ended while the prompt was open.
        if self.session.connected_account().ok() != Some(from) {
            return Err(fail(
                claim,
                format!("session of {} ended before submission", from),
            ));
        }

        let data = match request.deploy_data() {
            Ok(data) => data,
            Err(e) => return Err(fail(claim, e.to_string())),
        };

        let handle = self.provider.submit_transaction(DeploymentTransaction {
            from,
            data,
            gas: request.gas_limit(),
        });
        Ok(PendingDeployment { claim, handle })
    }

    /// Wait for a submitted deployment to resolve and record the outcome.
    pub async fn settle(&self, pending: PendingDeployment) -> AppResult<DeploymentResult> {
        let PendingDeployment { claim, handle } = pending;
        match handle.outcome().await {
            SubmissionOutcome::Confirmed(receipt) => {
                info!(
                    id = %claim.id,
                    contract = %receipt.contract_address,
                    tx = %receipt.transaction_hash,
                    "Contract deployed"
                );
                let result = DeploymentResult::Deployed {
                    contract_address: receipt.contract_address,
                    transaction_hash: receipt.transaction_hash,
                };
                claim.finish(result.clone());
                Ok(result)
            }
            SubmissionOutcome::Failed(failure) => Err(fail(claim, failure.reason())),
        }
    }

    fn claim(&self, from: Address, gas_limit: u64) -> AppResult<Claim> {
        let id = Uuid::new_v4();
        let claimed = self.status.send_if_modified(|current| {
            if current.as_ref().is_some_and(|s| s.result.is_pending()) {
                return false;
            }
            *current = Some(DeploymentStatus {
                id,
                from,
                gas_limit,
                submitted_at: Utc::now(),
                result: DeploymentResult::Pending,
            });
            true
        });

        if claimed {
            Ok(Claim {
                status: self.status.clone(),
                id,
                finished: false,
            })
        } else {
            warn!("Deployment requested while another one is pending");
            Err(AppError::invalid_state("a deployment is already pending"))
        }
    }
}

fn fail(claim: Claim, reason: String) -> AppError {
    error!(id = %claim.id, "Contract deployment failed: {}", reason);
    claim.finish(DeploymentResult::Failed {
        reason: reason.clone(),
    });
    AppError::Deployment(reason)
}
