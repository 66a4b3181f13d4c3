use alloy_primitives::{Address, B256};
use serde::Serialize;
use tokio::sync::oneshot;

/// Receipt data the deployer cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeploymentReceipt {
    pub transaction_hash: B256,
    pub contract_address: Address,
    pub block_number: Option<u64>,
}

/// Why a submitted transaction did not produce a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionFailure {
    /// The human declined the wallet prompt.
    Rejected,
    /// Mined with a failed status.
    Reverted { transaction_hash: B256 },
    /// The provider stopped tracking the transaction.
    Dropped,
    /// Any other provider-side error.
    Provider(String),
}

impl SubmissionFailure {
    pub fn reason(&self) -> String {
        match self {
            Self::Rejected => "user rejected".to_string(),
            Self::Reverted { transaction_hash } => {
                format!("transaction reverted ({})", transaction_hash)
            }
            Self::Dropped => "transaction dropped".to_string(),
            Self::Provider(message) => message.clone(),
        }
    }
}

/// The single resolution of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Confirmed(DeploymentReceipt),
    Failed(SubmissionFailure),
}

/// Pending result of a submitted transaction.
///
/// Resolves exactly once: `outcome` consumes the handle, and the resolver
/// side can only send once. A resolver dropped without sending counts as
/// [`SubmissionFailure::Dropped`].
#[derive(Debug)]
pub struct SubmissionHandle {
    rx: oneshot::Receiver<SubmissionOutcome>,
}

/// Write side of a [`SubmissionHandle`], held by the provider.
#[derive(Debug)]
pub struct SubmissionResolver {
    tx: oneshot::Sender<SubmissionOutcome>,
}

impl SubmissionHandle {
    pub fn channel() -> (SubmissionResolver, SubmissionHandle) {
        let (tx, rx) = oneshot::channel();
        (SubmissionResolver { tx }, SubmissionHandle { rx })
    }

    /// A handle that is already resolved.
    pub fn resolved(outcome: SubmissionOutcome) -> Self {
        let (resolver, handle) = Self::channel();
        resolver.resolve(outcome);
        handle
    }

    pub async fn outcome(self) -> SubmissionOutcome {
        self.rx
            .await
            .unwrap_or(SubmissionOutcome::Failed(SubmissionFailure::Dropped))
    }
}

impl SubmissionResolver {
    pub fn resolve(self, outcome: SubmissionOutcome) {
        // Receiver gone means nobody is waiting any more.
        let _ = self.tx.send(outcome);
    }

    /// Completes once the handle has been dropped.
    pub async fn closed(&mut self) {
        self.tx.closed().await
    }
}
