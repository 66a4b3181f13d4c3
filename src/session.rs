//! Account session state machine.
//!
//! ```text
//! Uninitialized ─► Disconnected ─► Connecting ─► Connected ─► Disconnecting ─┐
//!       │               ▲              │                                     │
//!       │               └──────────────┴─────────────────────────────────────┘
//!       └─► Unavailable (no provider, terminal)
//! ```
//!
//! The session is the only writer of its state. Every transition out of a
//! resting state is a compare-and-set on the watch channel, so a second
//! `connect()` or `disconnect()` issued while one is in flight is rejected
//! instead of interleaving. An in-flight state whose future is dropped
//! before the wallet answers falls back to `Disconnected`.

use alloy_primitives::Address;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::provider::SharedProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Uninitialized,
    Unavailable,
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Accounts shared by the wallet plus the state they were observed in.
///
/// Fields are private so `active_account` can only ever be `None` or the
/// first element of `accounts`. `epoch` is distinct for every successful
/// connect and 0 outside a connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Session {
    state: SessionState,
    accounts: Vec<Address>,
    active_account: Option<Address>,
    #[serde(skip)]
    epoch: u64,
}

impl Session {
    pub(crate) fn connected(accounts: Vec<Address>, epoch: u64) -> Option<Self> {
        let active_account = *accounts.first()?;
        Some(Self {
            state: SessionState::Connected,
            accounts,
            active_account: Some(active_account),
            epoch,
        })
    }

    fn resting(state: SessionState) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn accounts(&self) -> &[Address] {
        &self.accounts
    }

    pub fn active_account(&self) -> Option<Address> {
        self.active_account
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn contains(&self, account: Address) -> bool {
        self.accounts.contains(&account)
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Puts the session back to `Disconnected` when dropped while armed.
struct InFlight<'a> {
    state: &'a watch::Sender<Session>,
    armed: bool,
}

impl<'a> InFlight<'a> {
    fn new(state: &'a watch::Sender<Session>) -> Self {
        Self { state, armed: true }
    }

    /// Publish the final session instead of resetting.
    fn complete(mut self, session: Session) {
        self.armed = false;
        self.state.send_replace(session);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state
                .send_replace(Session::resting(SessionState::Disconnected));
        }
    }
}

pub struct AccountSession {
    provider: Option<SharedProvider>,
    state: watch::Sender<Session>,
    epochs: AtomicU64,
}

impl AccountSession {
    /// Build the session for the outcome of provider detection.
    pub fn new(provider: Option<SharedProvider>) -> Self {
        let (state, _) = watch::channel(Session::default());
        let session = Self {
            provider,
            state,
            epochs: AtomicU64::new(0),
        };

        let initial = if session.provider.is_some() {
            SessionState::Disconnected
        } else {
            SessionState::Unavailable
        };
        session.state.send_replace(Session::resting(initial));
        info!("Account session initialized: {:?}", initial);
        session
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn current(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().state
    }

    pub fn active_account(&self) -> Option<Address> {
        self.state.borrow().active_account
    }

    /// Active account, but only while connected.
    pub fn connected_account(&self) -> AppResult<Address> {
        let session = self.state.borrow();
        match (session.state, session.active_account) {
            (SessionState::Connected, Some(account)) => Ok(account),
            (state, _) => Err(AppError::invalid_state(format!(
                "no connected account (session is {:?})",
                state
            ))),
        }
    }

    /// Epoch of the connection `account` belongs to, if it is connected.
    pub fn member_epoch(&self, account: Address) -> Option<u64> {
        let session = self.state.borrow();
        (session.is_connected() && session.contains(account)).then_some(session.epoch)
    }

    /// Ask the wallet for account access.
    ///
    /// The first returned account becomes active. Rejection, provider
    /// errors and abandoning the call put the session back in `Disconnected`.
    pub async fn connect(&self) -> AppResult<Address> {
        let provider = self.provider()?;
        self.transition(SessionState::Disconnected, SessionState::Connecting)?;
        let in_flight = InFlight::new(&self.state);
        info!("Requesting account access from {}", provider.describe());

        let accounts = provider.request_accounts().await.map_err(|e| {
            if e.is_user_rejection() {
                info!("Account access rejected in wallet");
            } else {
                warn!("Account access request failed: {}", e);
            }
            AppError::Connection(e.reason())
        })?;

        let epoch = self.epochs.fetch_add(1, Ordering::Relaxed) + 1;
        let Some(session) = Session::connected(accounts, epoch) else {
            warn!("Wallet granted access but returned no accounts");
            return Err(AppError::NoAccounts);
        };

        let active = session.active_account;
        info!(
            accounts = session.accounts.len(),
            "Wallet connected, active account {:?}", active
        );
        in_flight.complete(session);
        active.ok_or(AppError::NoAccounts)
    }

    /// Revoke account permissions and clear the session.
    ///
    /// The session ends up `Disconnected` whatever the provider answers; a
    /// provider error is still reported to the caller.
    pub async fn disconnect(&self) -> AppResult<()> {
        let provider = self.provider()?;
        self.transition(SessionState::Connected, SessionState::Disconnecting)?;
        let in_flight = InFlight::new(&self.state);

        let result = provider.revoke_permissions().await;
        drop(in_flight);

        match result {
            Ok(()) => {
                info!("Wallet disconnected");
                Ok(())
            }
            Err(e) => {
                warn!("Permission revocation failed, session cleared anyway: {}", e);
                Err(AppError::Connection(format!("revoke failed: {}", e.reason())))
            }
        }
    }

    fn provider(&self) -> AppResult<&SharedProvider> {
        self.provider
            .as_ref()
            .ok_or_else(|| AppError::NoProvider("wallet provider unavailable".to_string()))
    }

    fn transition(&self, from: SessionState, to: SessionState) -> AppResult<()> {
        let mut observed = from;
        let moved = self.state.send_if_modified(|session| {
            if session.state == from {
                session.state = to;
                true
            } else {
                observed = session.state;
                false
            }
        });

        if moved {
            Ok(())
        } else {
            Err(AppError::invalid_state(format!(
                "cannot move to {:?} while {:?}",
                to, observed
            )))
        }
    }
}
