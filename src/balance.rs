use alloy_primitives::{Address, U256};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::provider::SharedProvider;
use crate::session::AccountSession;

/// Decimal places between wei and ether.
pub const ETHER_DECIMALS: usize = 18;

/// 10^18
pub const WEI_PER_ETHER: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// Format a wei amount as ether without any rounding.
///
/// Trailing fractional zeros are trimmed, so whole amounts print as integers.
pub fn format_ether(wei: U256) -> String {
    let (whole, fraction) = wei.div_rem(WEI_PER_ETHER);
    if fraction.is_zero() {
        return whole.to_string();
    }
    let fraction = format!("{:0>width$}", fraction.to_string(), width = ETHER_DECIMALS);
    format!("{}.{}", whole, fraction.trim_end_matches('0'))
}

/// Native-currency balance of one account, read during one session epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Balance {
    pub account: Address,
    pub value_wei: U256,
    pub value_ether: String,
    #[serde(skip)]
    pub session_epoch: u64,
}

impl Balance {
    pub fn from_wei(account: Address, value_wei: U256, session_epoch: u64) -> Self {
        Self {
            account,
            value_wei,
            value_ether: format_ether(value_wei),
            session_epoch,
        }
    }
}

/// Reads balances for accounts of the active session.
///
/// Keeps the last successful reading; a failed query never replaces it.
/// The reading may belong to an earlier session, see [`Balance::session_epoch`].
pub struct BalanceReader {
    provider: SharedProvider,
    session: Arc<AccountSession>,
    latest: watch::Sender<Option<Balance>>,
}

impl BalanceReader {
    pub fn new(provider: SharedProvider, session: Arc<AccountSession>) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            provider,
            session,
            latest,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Balance>> {
        self.latest.subscribe()
    }

    pub fn latest(&self) -> Option<Balance> {
        self.latest.borrow().clone()
    }

    pub async fn get_balance(&self, account: Address) -> AppResult<Balance> {
        let epoch = self.session.member_epoch(account).ok_or_else(|| {
            AppError::invalid_state(format!(
                "{} is not an account of the active session",
                account
            ))
        })?;

        debug!(%account, "Querying balance");
        let wei = self.provider.get_balance(account).await.map_err(|e| {
            warn!(%account, "Balance query failed: {}", e);
            AppError::BalanceQuery(e.to_string())
        })?;

        // The session may have moved on while the query was in flight.
        if self.session.member_epoch(account) != Some(epoch) {
            return Err(AppError::invalid_state(format!(
                "session changed while reading balance of {}",
                account
            )));
        }

        let balance = Balance::from_wei(account, wei, epoch);
        info!(%account, ether = %balance.value_ether, "Balance updated");
        self.latest.send_replace(Some(balance.clone()));
        Ok(balance)
    }

    /// Re-read the balance of the current active account.
    pub async fn refresh(&self) -> AppResult<Balance> {
        let account = self.session.connected_account()?;
        self.get_balance(account).await
    }
}
