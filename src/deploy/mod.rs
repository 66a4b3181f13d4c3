pub mod deployer;
pub mod request;

pub use deployer::{
    ContractDeployer, DeploymentResult, DeploymentStatus, PendingDeployment, ABANDONED_REASON,
};
pub use request::DeploymentRequest;
