use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Wallet provider configuration.
///
/// The host injects the wallet transport by setting `url`; when it is absent
/// detection fails and the application stays unavailable.
#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    /// JSON-RPC endpoint of the injected wallet transport
    #[serde(default)]
    pub url: Option<String>,
    /// Interval between receipt polls while a transaction is pending
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
}

fn default_receipt_poll_ms() -> u64 {
    2000
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            url: None,
            receipt_poll_ms: default_receipt_poll_ms(),
        }
    }
}

impl ProviderConfig {
    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms.max(1))
    }
}

/// Contract deployment defaults
#[derive(Debug, Deserialize, Clone)]
pub struct DeployConfig {
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
    /// Artifact deployed when the shell is given no path
    #[serde(default)]
    pub artifact: Option<String>,
    #[serde(default)]
    pub constructor_args: Vec<String>,
}

fn default_gas_limit() -> u64 {
    2_000_000
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            gas_limit: default_gas_limit(),
            artifact: None,
            constructor_args: Vec::new(),
        }
    }
}

/// Root application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
}

impl AppConfig {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // e.g. DAPP_PROVIDER__URL, DAPP_DEPLOY__GAS_LIMIT
            .add_source(
                Environment::with_prefix("DAPP")
                    .separator("__")
                    .try_parsing(true),
            );

        Self::build(builder)
    }

    fn build(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }

    /// Initialize the global config singleton
    pub fn init() -> Result<&'static Self, ConfigError> {
        let config = Self::load()?;
        Ok(CONFIG.get_or_init(|| config))
    }
}
