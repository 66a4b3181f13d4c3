//! Renderable state.
//!
//! [`ViewSnapshot::compose`] is a pure function of the component states;
//! [`ViewModel`] watches every component and produces a new snapshot after
//! each change.

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::error;

use crate::balance::Balance;
use crate::deploy::DeploymentStatus;
use crate::error::AppError;
use crate::session::{Session, SessionState};

/// The one error currently shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiError {
    pub message: String,
    /// Raw diagnostic, for developer tooling only.
    #[serde(skip)]
    pub cause: String,
    pub raised_at: DateTime<Utc>,
}

impl UiError {
    pub fn from_error(err: &AppError) -> Self {
        Self {
            message: err.user_message().to_string(),
            cause: err.to_string(),
            raised_at: Utc::now(),
        }
    }
}

/// Single-slot error channel. A new error replaces the previous one.
#[derive(Clone)]
pub struct ErrorChannel {
    slot: Arc<watch::Sender<Option<UiError>>>,
}

impl Default for ErrorChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorChannel {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Log the diagnostic and make `err` the live UI error.
    pub fn raise(&self, err: &AppError) -> UiError {
        error!(recoverable = err.is_recoverable(), "{}", err);
        let ui = UiError::from_error(err);
        self.slot.send_replace(Some(ui.clone()));
        ui
    }

    pub fn current(&self) -> Option<UiError> {
        self.slot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<UiError>> {
        self.slot.subscribe()
    }
}

/// Everything the rendering shell needs, captured at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewSnapshot {
    pub provider_available: bool,
    pub session_state: SessionState,
    pub accounts: Vec<Address>,
    pub active_account: Option<Address>,
    pub balance: Option<Balance>,
    pub deployment: Option<DeploymentStatus>,
    pub error: Option<UiError>,
}

impl ViewSnapshot {
    pub fn compose(
        provider_available: bool,
        session: &Session,
        balance: Option<&Balance>,
        deployment: Option<&DeploymentStatus>,
        error: Option<&UiError>,
    ) -> Self {
        let active_account = session.active_account();
        Self {
            provider_available,
            session_state: session.state(),
            accounts: session.accounts().to_vec(),
            active_account,
            // A balance read for another account or an earlier connection is stale.
            balance: balance
                .filter(|b| {
                    active_account == Some(b.account) && b.session_epoch == session.epoch()
                })
                .cloned(),
            deployment: deployment.cloned(),
            error: error.cloned(),
        }
    }

    pub fn can_connect(&self) -> bool {
        self.provider_available && self.session_state == SessionState::Disconnected
    }

    pub fn can_disconnect(&self) -> bool {
        self.session_state == SessionState::Connected
    }

    pub fn can_deploy(&self) -> bool {
        self.session_state == SessionState::Connected
            && !self
                .deployment
                .as_ref()
                .is_some_and(|d| d.result.is_pending())
    }
}

/// Live view over every component.
pub struct ViewModel {
    provider_available: bool,
    session: watch::Receiver<Session>,
    balance: Option<watch::Receiver<Option<Balance>>>,
    deployment: Option<watch::Receiver<Option<DeploymentStatus>>>,
    error: watch::Receiver<Option<UiError>>,
}

impl ViewModel {
    pub fn new(
        provider_available: bool,
        session: watch::Receiver<Session>,
        balance: Option<watch::Receiver<Option<Balance>>>,
        deployment: Option<watch::Receiver<Option<DeploymentStatus>>>,
        error: watch::Receiver<Option<UiError>>,
    ) -> Self {
        Self {
            provider_available,
            session,
            balance,
            deployment,
            error,
        }
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let balance = self.balance.as_ref().and_then(|rx| rx.borrow().clone());
        let deployment = self.deployment.as_ref().and_then(|rx| rx.borrow().clone());
        ViewSnapshot::compose(
            self.provider_available,
            &self.session.borrow(),
            balance.as_ref(),
            deployment.as_ref(),
            self.error.borrow().as_ref(),
        )
    }

    /// Wait for any component to change and return the new snapshot.
    ///
    /// Returns `None` once the components have been dropped.
    pub async fn next(&mut self) -> Option<ViewSnapshot> {
        let changed = tokio::select! {
            r = self.session.changed() => r,
            r = changed_opt(&mut self.balance) => r,
            r = changed_opt(&mut self.deployment) => r,
            r = self.error.changed() => r,
        };
        changed.ok()?;
        self.mark_seen();
        Some(self.snapshot())
    }

    fn mark_seen(&mut self) {
        self.session.borrow_and_update();
        self.error.borrow_and_update();
        if let Some(rx) = self.balance.as_mut() {
            rx.borrow_and_update();
        }
        if let Some(rx) = self.deployment.as_mut() {
            rx.borrow_and_update();
        }
    }
}

async fn changed_opt<T>(
    rx: &mut Option<watch::Receiver<T>>,
) -> Result<(), watch::error::RecvError> {
    match rx {
        Some(rx) => rx.changed().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn balance_for_inactive_account_is_hidden() {
        let session = Session::default();
        let balance = Balance::from_wei(Address::repeat_byte(0xaa), U256::from(1u64), 0);
        let snapshot = ViewSnapshot::compose(true, &session, Some(&balance), None, None);
        assert!(snapshot.balance.is_none());
        assert!(snapshot.accounts.is_empty());
        assert_eq!(snapshot.session_state, SessionState::Uninitialized);
    }

    #[test]
    fn balance_from_earlier_connection_is_hidden() {
        let account = Address::repeat_byte(0xaa);
        let session = Session::connected(vec![account], 2).unwrap();

        let stale = Balance::from_wei(account, U256::from(5u64), 1);
        let snapshot = ViewSnapshot::compose(true, &session, Some(&stale), None, None);
        assert!(snapshot.balance.is_none());

        let fresh = Balance::from_wei(account, U256::from(5u64), 2);
        let snapshot = ViewSnapshot::compose(true, &session, Some(&fresh), None, None);
        assert_eq!(snapshot.balance, Some(fresh));
    }

    #[test]
    fn newer_error_replaces_older_one() {
        let errors = ErrorChannel::new();
        errors.raise(&AppError::BalanceQuery("timeout".into()));
        errors.raise(&AppError::Deployment("user rejected".into()));
        let current = errors.current().unwrap();
        assert_eq!(current.message, AppError::Deployment(String::new()).user_message());
        assert!(current.cause.contains("user rejected"));
    }

    #[test]
    fn error_cause_is_not_serialized() {
        let ui = UiError::from_error(&AppError::Connection("rpc 4001".into()));
        let value = serde_json::to_value(&ui).unwrap();
        assert!(value.get("cause").is_none());
        assert!(value["message"].as_str().unwrap().contains("connecting"));
    }
}
