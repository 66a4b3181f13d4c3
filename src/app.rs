use alloy_primitives::Address;
use std::sync::Arc;
use tracing::info;

use crate::balance::{Balance, BalanceReader};
use crate::config::{AppConfig, DeployConfig};
use crate::deploy::{ContractDeployer, DeploymentRequest, DeploymentResult};
use crate::error::{AppError, AppResult};
use crate::provider::{ProviderGateway, SharedProvider};
use crate::session::AccountSession;
use crate::view::{ErrorChannel, ViewModel};

/// Wallet-backed components that only exist once a provider was detected.
struct Wallet {
    balance: BalanceReader,
    deployer: ContractDeployer,
}

/// Application controller.
///
/// Every action catches its own failure and routes it to the error channel,
/// so callers can fire actions from spawned tasks and only watch the view.
pub struct App {
    gateway: ProviderGateway,
    errors: ErrorChannel,
    session: Arc<AccountSession>,
    wallet: Option<Wallet>,
    deploy_defaults: DeployConfig,
}

impl App {
    /// Detect the provider once and build the components around it.
    pub fn bootstrap(config: &AppConfig) -> Self {
        let gateway = ProviderGateway::new();
        let detection = gateway.detect(&config.provider);
        Self::assemble(gateway, detection, config.deploy.clone())
    }

    /// Build around an already available provider.
    pub fn with_provider(provider: SharedProvider, deploy_defaults: DeployConfig) -> Self {
        let gateway = ProviderGateway::with_provider(provider.clone());
        Self::assemble(gateway, Ok(provider), deploy_defaults)
    }

    fn assemble(
        gateway: ProviderGateway,
        detection: AppResult<SharedProvider>,
        deploy_defaults: DeployConfig,
    ) -> Self {
        let errors = ErrorChannel::new();
        let (session, wallet) = match detection {
            Ok(provider) => {
                let session = Arc::new(AccountSession::new(Some(provider.clone())));
                let wallet = Wallet {
                    balance: BalanceReader::new(provider.clone(), session.clone()),
                    deployer: ContractDeployer::new(provider, session.clone()),
                };
                (session, Some(wallet))
            }
            Err(e) => {
                errors.raise(&e);
                (Arc::new(AccountSession::new(None)), None)
            }
        };

        Self {
            gateway,
            errors,
            session,
            wallet,
            deploy_defaults,
        }
    }

    pub fn is_available(&self) -> bool {
        self.gateway.is_available()
    }

    pub fn session(&self) -> &AccountSession {
        &self.session
    }

    pub fn errors(&self) -> &ErrorChannel {
        &self.errors
    }

    pub fn view(&self) -> ViewModel {
        ViewModel::new(
            self.is_available(),
            self.session.subscribe(),
            self.wallet.as_ref().map(|w| w.balance.subscribe()),
            self.wallet.as_ref().map(|w| w.deployer.subscribe()),
            self.errors.subscribe(),
        )
    }

    /// Connect the wallet and load the active account's balance.
    pub async fn connect(&self) -> AppResult<Address> {
        let account = self.report(self.session.connect().await)?;
        // A failed balance read is already reported; the connection stands.
        let _ = self.refresh_balance().await;
        Ok(account)
    }

    pub async fn disconnect(&self) -> AppResult<()> {
        self.report(self.session.disconnect().await)
    }

    pub async fn refresh_balance(&self) -> AppResult<Balance> {
        let result = match self.wallet() {
            Ok(wallet) => wallet.balance.refresh().await,
            Err(e) => Err(e),
        };
        self.report(result)
    }

    pub async fn deploy(&self, request: &DeploymentRequest) -> AppResult<DeploymentResult> {
        let result = match self.wallet() {
            Ok(wallet) => wallet.deployer.deploy(request).await,
            Err(e) => Err(e),
        };
        self.report(result)
    }

    /// Deploy an artifact file, falling back to the configured defaults.
    pub async fn deploy_artifact(
        &self,
        path: Option<&str>,
        constructor_args: Option<Vec<String>>,
    ) -> AppResult<DeploymentResult> {
        let request = self.report(self.artifact_request(path, constructor_args))?;
        self.deploy(&request).await
    }

    fn artifact_request(
        &self,
        path: Option<&str>,
        constructor_args: Option<Vec<String>>,
    ) -> AppResult<DeploymentRequest> {
        let path = path
            .or(self.deploy_defaults.artifact.as_deref())
            .ok_or_else(|| AppError::Artifact("no contract artifact configured".to_string()))?;
        let args = constructor_args.unwrap_or_else(|| self.deploy_defaults.constructor_args.clone());
        info!("Loading contract artifact {}", path);
        DeploymentRequest::from_artifact_file(path, args, self.deploy_defaults.gas_limit)
    }

    fn wallet(&self) -> AppResult<&Wallet> {
        self.wallet
            .as_ref()
            .ok_or_else(|| AppError::NoProvider("wallet provider unavailable".to_string()))
    }

    fn report<T>(&self, result: AppResult<T>) -> AppResult<T> {
        if let Err(e) = &result {
            self.errors.raise(e);
        }
        result
    }
}
