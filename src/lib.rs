pub mod app;
pub mod balance;
pub mod config;
pub mod deploy;
pub mod error;
pub mod provider;
pub mod session;
pub mod view;

pub use app::App;
pub use balance::{format_ether, Balance, BalanceReader};
pub use config::AppConfig;
pub use deploy::{ContractDeployer, DeploymentRequest, DeploymentResult, DeploymentStatus};
pub use error::{AppError, AppResult};
pub use provider::{ProviderGateway, SharedProvider, WalletProvider};
pub use session::{AccountSession, Session, SessionState};
pub use view::{ErrorChannel, UiError, ViewModel, ViewSnapshot};
